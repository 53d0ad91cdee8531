//! Time as a seam: callers take `&dyn Clock` instead of reaching for
//! `Utc::now()` directly. Snapshot filenames embed a unix timestamp; tests
//! need to control that value without touching real wall-clock time.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::{Clock, DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A clock that starts at `start` and advances by one second on every
    /// read, so successive snapshots in a test never collide on filename.
    pub struct FakeClock {
        seconds: AtomicI64,
    }

    impl FakeClock {
        #[must_use]
        pub fn new(start: i64) -> Self {
            Self { seconds: AtomicI64::new(start) }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            let secs = self.seconds.fetch_add(1, Ordering::SeqCst);
            DateTime::from_timestamp(secs, 0).expect("fake clock second is in range")
        }
    }
}
