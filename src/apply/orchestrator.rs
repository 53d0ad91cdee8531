//! Apply Orchestrator: the single entry point that turns the
//! relational source of truth into a running, validated config.
//!
//! Stages run in order: read the DB, generate, validate, write rulesets and
//! clean up stale ones, snapshot, then POST to the admin API. A failure at
//! or after the snapshot stage deletes the failed snapshot, then rolls back
//! by re-posting the most recent remaining on-disk snapshot (failing the
//! rollback if none exists) and records the failure in the audit trail; a
//! failure before the snapshot stage never touches the admin API or the
//! audit log.
//!
//! `apply` takes a process-wide lock so two concurrent calls can't race on
//! the snapshot/ruleset directories (mirrors the host-control mutex the rest
//! of this lineage uses to serialize writes to shared state).

use std::path::Path;

use tokio::sync::Mutex;

use super::{audit, rulesets, snapshot};
use crate::admin_client::AdminClient;
use crate::clock::Clock;
use crate::config::document::Config;
use crate::config::{generate, validate, GenerateInput};
use crate::db::{self, DbPool};
use crate::error::ApplyError;

/// Applies the current source of truth. See the module docs for the stage
/// order and rollback behavior. `snapshot_retention` is the number of
/// snapshots kept after a successful apply. `config_dir` holds the rendered
/// rulesets and the snapshot history; it's also the root Caddy's own
/// `storage.root` nests two levels under (see
/// [`crate::runtime_config::DatabaseConfig`]).
///
/// # Errors
///
/// Returns [`ApplyError`] describing whichever stage failed. `RolledBack`
/// and `RollbackFailed` are only returned once the admin API has already
/// been reached with an earlier, good config.
pub async fn apply<A: AdminClient>(
    pool: &DbPool,
    admin_client: &A,
    clock: &dyn Clock,
    config_dir: &Path,
    storage_dir: &Path,
    snapshot_retention: usize,
    lock: &Mutex<()>,
) -> Result<(), ApplyError> {
    let _guard = lock.lock().await;

    let source = db::read_source_of_truth(pool).await.map_err(|err| ApplyError::ReadDb(err.to_string()))?;

    if source.runtime_flags.cerberus_enabled && source.security_config.admin_whitelist.trim().is_empty() {
        return Err(ApplyError::EmptyAdminWhitelist);
    }

    let (forward_auth_address, forward_auth_trust_header) = db::read_forward_auth_settings(pool)
        .await
        .map_err(|err| ApplyError::ReadDb(err.to_string()))?;

    let ruleset_paths = rulesets::write_all(config_dir, &source.rulesets, &source.security_config)
        .await
        .map_err(|(name, source)| ApplyError::WriteRuleset { name, source })?;

    rulesets::clean_stale(config_dir, &ruleset_paths).await.map_err(ApplyError::CleanRulesets)?;

    let storage_dir_str = storage_dir.to_string_lossy().into_owned();
    let input = GenerateInput {
        hosts: &source.hosts,
        storage_dir: &storage_dir_str,
        acme_email: &source.settings.acme_email,
        frontend_dir: &source.settings.frontend_dir,
        ssl_provider: &source.settings.ssl_provider,
        acme_staging: source.settings.acme_staging,
        flags: source.runtime_flags,
        admin_whitelist: &source.security_config.admin_whitelist,
        ruleset_paths: &ruleset_paths,
        decisions: &source.decisions,
        security_cfg: &source.security_config,
        auth_users: &source.auth_users,
        auth_providers: &source.auth_providers,
        auth_policies: &source.auth_policies,
        forward_auth_address: &forward_auth_address,
        forward_auth_trust_header,
    };

    let config = generate(&input).map_err(ApplyError::Generate)?;
    validate(&config).map_err(ApplyError::Validate)?;

    let snapshot_path = snapshot::save(config_dir, &config, clock).await.map_err(ApplyError::SaveSnapshot)?;

    match admin_client.load(&config).await {
        Ok(()) => {
            audit::record(pool, &config, clock, true, None).await;
            snapshot::rotate(config_dir, snapshot_retention).await.map_err(ApplyError::SaveSnapshot)?;
            Ok(())
        }
        Err(load_err) => {
            let _ = snapshot::delete(&snapshot_path).await;
            let cause = load_err.to_string();

            let rollback_result = rollback_to_latest_snapshot(admin_client, config_dir).await;

            match rollback_result {
                Ok(()) => {
                    audit::record(pool, &config, clock, false, Some(&cause)).await;
                    Err(ApplyError::RolledBack { cause })
                }
                Err(rollback_cause) => {
                    audit::record(
                        pool,
                        &config,
                        clock,
                        false,
                        Some(&format!("{cause} (rollback also failed: {rollback_cause})")),
                    )
                    .await;
                    Err(ApplyError::RollbackFailed { cause, rollback_cause })
                }
            }
        }
    }
}

/// Re-posts the most recent remaining on-disk snapshot. Fails (rather than
/// trivially succeeding) when no snapshot is left to roll back to.
async fn rollback_to_latest_snapshot<A: AdminClient>(admin_client: &A, config_dir: &Path) -> Result<(), String> {
    let path = snapshot::latest(config_dir)
        .await
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "no snapshot to roll back to".to_string())?;
    let previous = snapshot::read(&path).await.map_err(|err| err.to_string())?;
    admin_client.load(&previous).await.map_err(|err| err.to_string())
}

/// Reads the most recently saved snapshot and re-posts it to the admin API
/// without touching the database — used for a manual recovery apply when the
/// source of truth itself is suspect.
///
/// # Errors
///
/// Returns an error if no snapshot exists or the admin API rejects it.
pub async fn reapply_latest_snapshot<A: AdminClient>(
    admin_client: &A,
    config_dir: &Path,
) -> Result<Config, ApplyError> {
    let path = snapshot::latest(config_dir).await.map_err(ApplyError::ReadSnapshot)?.ok_or_else(|| {
        ApplyError::ReadSnapshot(std::io::Error::new(std::io::ErrorKind::NotFound, "no snapshot to reapply"))
    })?;
    let config = snapshot::read(&path).await.map_err(ApplyError::ReadSnapshot)?;
    admin_client
        .load(&config)
        .await
        .map_err(|err| ApplyError::RolledBack { cause: err.to_string() })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin_client::test_support::FakeAdminClient;
    use crate::clock::test_support::FakeClock;

    async fn fresh_pool() -> DbPool {
        let pool = DbPool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn insert_minimal_host(pool: &DbPool) {
        sqlx::query(
            "INSERT INTO proxy_hosts (uuid, domain_names, forward_host, forward_port) VALUES (?, ?, ?, ?)",
        )
        .bind("11111111-1111-1111-1111-111111111111")
        .bind("example.test")
        .bind("127.0.0.1")
        .bind(8080)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn successful_apply_loads_config_and_records_audit() {
        let pool = fresh_pool().await;
        insert_minimal_host(&pool).await;
        let dir = tempfile::tempdir().unwrap();
        let storage_dir = dir.path().join("data/caddy");
        let admin = FakeAdminClient::new();
        let clock = FakeClock::new(2_000);
        let lock = Mutex::new(());

        apply(&pool, &admin, &clock, dir.path(), &storage_dir, 10, &lock).await.unwrap();

        assert_eq!(admin.loaded.lock().unwrap().len(), 1);
        let audit_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM apply_audit")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audit_count, 1);
    }

    #[tokio::test]
    async fn refuses_to_apply_when_cerberus_on_and_whitelist_empty() {
        let pool = fresh_pool().await;
        sqlx::query("UPDATE security_config SET enabled = 1, admin_whitelist = '' WHERE id = 1")
            .execute(&pool)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage_dir = dir.path().join("data/caddy");
        let admin = FakeAdminClient::new();
        let clock = FakeClock::new(2_000);
        let lock = Mutex::new(());

        let err = apply(&pool, &admin, &clock, dir.path(), &storage_dir, 10, &lock).await.unwrap_err();
        assert!(matches!(err, ApplyError::EmptyAdminWhitelist));
        assert!(admin.loaded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_load_rolls_back_to_previous_admin_config() {
        let pool = fresh_pool().await;
        insert_minimal_host(&pool).await;
        let dir = tempfile::tempdir().unwrap();
        let storage_dir = dir.path().join("data/caddy");
        let clock = FakeClock::new(3_000);
        let lock = Mutex::new(());

        let admin = FakeAdminClient::new();
        apply(&pool, &admin, &clock, dir.path(), &storage_dir, 10, &lock).await.unwrap();
        let previous = snapshot::latest(dir.path()).await.unwrap().unwrap();
        let previous = snapshot::read(&previous).await.unwrap();

        sqlx::query(
            "INSERT INTO proxy_hosts (uuid, domain_names, forward_host, forward_port) VALUES (?, ?, ?, ?)",
        )
        .bind("22222222-2222-2222-2222-222222222222")
        .bind("second.test")
        .bind("127.0.0.1")
        .bind(9090)
        .execute(&pool)
        .await
        .unwrap();

        let failing = FakeAdminClient::failing_next(1);

        let err = apply(&pool, &failing, &clock, dir.path(), &storage_dir, 10, &lock).await.unwrap_err();
        assert!(matches!(err, ApplyError::RolledBack { .. }));
        assert_eq!(failing.get_config().await.unwrap(), previous);

        let failure_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM apply_audit WHERE success = 0")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(failure_count, 1);
    }

    #[tokio::test]
    async fn reapply_latest_snapshot_posts_most_recent_file() {
        let dir = tempfile::tempdir().unwrap();
        let clock = FakeClock::new(5_000);
        let empty_config = Config {
            apps: crate::config::document::Apps {
                http: crate::config::document::HttpApp { servers: std::collections::BTreeMap::new() },
                tls: None,
                security: None,
            },
            logging: crate::config::document::Logging {
                logs: crate::config::document::LoggingLogs {
                    access: crate::config::document::AccessLog {
                        level: "INFO".into(),
                        writer: crate::config::document::LogWriter {
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
            storage: crate::config::document::Storage { module: "file_system".into(), root: "/data".into() },
        };
        snapshot::save(dir.path(), &empty_config, &clock).await.unwrap();

        let admin = FakeAdminClient::new();
        let reapplied = reapply_latest_snapshot(&admin, dir.path()).await.unwrap();
        assert_eq!(reapplied, empty_config);
        assert_eq!(admin.loaded.lock().unwrap().len(), 1);
    }
}
