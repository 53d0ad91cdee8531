//! The apply lifecycle: generation and validation live in
//! [`crate::config`]; this module covers everything downstream of a valid
//! [`crate::config::document::Config`] — writing it to disk, posting it to
//! the admin API, and recording the outcome.

pub mod audit;
pub mod orchestrator;
pub mod rulesets;
pub mod snapshot;

pub use orchestrator::{apply, reapply_latest_snapshot};
