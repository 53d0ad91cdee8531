//! Error types for the configuration lifecycle.
//!
//! Mirrors the two-tier split used throughout the rest of the crate: typed,
//! matchable [`thiserror`] enums at module boundaries, with `eyre::Result` used
//! by orchestration-level glue that only needs to chain context.

use thiserror::Error;

/// Errors raised while compiling an [`crate::config::acl::AccessList`] into a handler.
#[derive(Debug, Error)]
pub enum AclError {
    #[error("invalid ip_rules JSON: {0}")]
    MalformedIpRules(#[source] serde_json::Error),
    #[error("invalid CIDR or IP address: {0}")]
    InvalidCidr(String),
}

/// Errors raised while assembling the full [`crate::config::document::Config`].
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid admin whitelist entry: {0}")]
    InvalidAdminWhitelist(String),
}

/// Errors raised by [`crate::config::validator::validate`].
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("config cannot be nil")]
    NilConfig,
    #[error("server {server} has no listen addresses")]
    EmptyListen { server: String },
    #[error("server {server} has invalid listen address {addr:?}: {reason}")]
    InvalidListen {
        server: String,
        addr: String,
        reason: String,
    },
    #[error("server {server} route {index} has no handlers")]
    EmptyHandle { server: String, index: usize },
    #[error("server {server} route {index} handler {handler_index} has an empty handler field")]
    EmptyHandlerField {
        server: String,
        index: usize,
        handler_index: usize,
    },
    #[error(
        "server {server} route {index} reverse_proxy handler has no upstreams"
    )]
    EmptyUpstreams { server: String, index: usize },
    #[error(
        "server {server} route {index} reverse_proxy upstream has invalid dial {dial:?}: {reason}"
    )]
    InvalidDial {
        server: String,
        index: usize,
        dial: String,
        reason: String,
    },
    #[error("server {server} has duplicate host {host:?} across multiple host-only routes")]
    DuplicateHost { server: String, host: String },
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors raised by the apply orchestrator.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(
        "refusing to apply config: Cerberus is enabled but admin_whitelist is empty"
    )]
    EmptyAdminWhitelist,
    #[error("failed to read source of truth: {0}")]
    ReadDb(String),
    #[error("failed to generate config: {0}")]
    Generate(#[source] GenerateError),
    #[error("validation failed: {0}")]
    Validate(#[source] ValidateError),
    #[error("failed to write ruleset {name}: {source}")]
    WriteRuleset {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to clean stale rulesets: {0}")]
    CleanRulesets(#[source] std::io::Error),
    #[error("failed to save snapshot: {0}")]
    SaveSnapshot(#[source] std::io::Error),
    #[error("failed to read snapshot: {0}")]
    ReadSnapshot(#[source] std::io::Error),
    #[error("apply failed (rolled back): {cause}")]
    RolledBack { cause: String },
    #[error("apply failed: {cause}, rollback also failed: {rollback_cause}")]
    RollbackFailed {
        cause: String,
        rollback_cause: String,
    },
}
