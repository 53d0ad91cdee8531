//! Apply audit trail: every apply attempt, success or failure, is
//! recorded. A failed write here must never fail an otherwise-successful
//! apply — see [`crate::db::insert_audit_record`].

use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::config::document::Config;
use crate::db::{self, DbPool};

/// Sha256 of the config's serialized bytes, hex-encoded. Not meant to match
/// byte-for-byte what was actually sent to the admin API — just a stable
/// fingerprint for the audit log.
#[must_use]
pub fn config_hash(config: &Config) -> String {
    let bytes = serde_json::to_vec(config).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

pub async fn record(
    pool: &DbPool,
    config: &Config,
    clock: &dyn Clock,
    success: bool,
    error_msg: Option<&str>,
) {
    let hash = config_hash(config);
    db::insert_audit_record(pool, &hash, clock.now(), success, error_msg).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document::{
        AccessLog, Apps, HttpApp, LogWriter, Logging, LoggingLogs, Storage,
    };
    use std::collections::BTreeMap;

    fn sample_config() -> Config {
        Config {
            apps: Apps { http: HttpApp { servers: BTreeMap::new() }, tls: None, security: None },
            logging: Logging {
                logs: LoggingLogs {
                    access: AccessLog {
                        level: "INFO".into(),
                        writer: LogWriter {
                            output: "file".into(),
                            filename: "/tmp/access.log".into(),
                            roll: true,
                            roll_size_mb: 10,
                            roll_keep: 5,
                            roll_keep_days: 7,
                        },
                        encoder: "json".into(),
                        include: vec!["http.log.access.access_log".into()],
                    },
                },
            },
            storage: Storage { module: "file_system".into(), root: "/data".into() },
        }
    }

    #[test]
    fn hash_is_stable_across_calls() {
        assert_eq!(config_hash(&sample_config()), config_hash(&sample_config()));
    }

    #[test]
    fn hash_changes_with_content() {
        let mut other = sample_config();
        other.storage.root = "/other".into();
        assert_ne!(config_hash(&sample_config()), config_hash(&other));
    }
}
