//! Database operations: reads the relational source of truth into
//! [`crate::model`] types and records apply outcomes.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use eyre::Context as _;
use sqlx::{FromRow, Sqlite, SqlitePool, migrate::MigrateDatabase};

use crate::model::{
    AccessList, AuthPolicy, AuthProvider, AuthUser, CertProvider, Certificate, DecisionAction,
    Location, ProxyHost, RuntimeFlags, SecurityConfig, SecurityDecision, SecurityRuleSet,
    Settings, SourceOfTruth, WafMode,
};

/// Database connection pool type alias.
pub type DbPool = SqlitePool;

/// Creates or opens the SQLite database and runs migrations.
///
/// # Errors
///
/// Returns an error if the database cannot be created, connected to, or
/// migrated.
pub async fn init_db(db_path: &Path) -> eyre::Result<DbPool> {
    let db_url = format!("sqlite:{}", db_path.display());

    if !Sqlite::database_exists(&db_url).await? {
        Sqlite::create_database(&db_url).await?;
    }

    let pool = SqlitePool::connect(&db_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

#[derive(FromRow)]
struct ProxyHostRow {
    id: i64,
    uuid: String,
    domain_names: String,
    forward_host: String,
    forward_port: i64,
    forward_scheme: String,
    enabled: bool,
    ssl_forced: bool,
    websocket_support: bool,
    hsts_enabled: bool,
    hsts_subdomains: bool,
    block_exploits: bool,
    forward_auth_enabled: bool,
    forward_auth_bypass: Option<String>,
    advanced_config: Option<String>,
    application: Option<String>,
    certificate_id: Option<i64>,
    access_list_id: Option<i64>,
    auth_policy_id: Option<i64>,
}

#[derive(FromRow)]
struct LocationRow {
    proxy_host_id: i64,
    path: String,
    forward_host: String,
    forward_port: i64,
}

#[derive(FromRow)]
struct CertificateRow {
    id: i64,
    uuid: String,
    provider: String,
    certificate: Option<String>,
    private_key: Option<String>,
}

#[derive(FromRow)]
struct AccessListRow {
    id: i64,
    kind: String,
    ip_rules_json: String,
    country_codes: String,
    local_network_only: bool,
    enabled: bool,
}

#[derive(FromRow)]
struct AuthPolicyRow {
    id: i64,
    name: String,
    enabled: bool,
}

#[derive(FromRow)]
struct AuthUserRow {
    id: i64,
    username: String,
    enabled: bool,
}

#[derive(FromRow)]
struct AuthProviderRow {
    id: i64,
    kind: String,
    client_id: String,
    issuer_url: String,
    enabled: bool,
}

#[derive(FromRow)]
struct SecurityRulesetRow {
    id: i64,
    name: String,
    content: String,
    mode: Option<String>,
    source_url: Option<String>,
}

#[derive(FromRow)]
struct SecurityDecisionRow {
    id: i64,
    action: String,
    ip: String,
}

#[derive(FromRow)]
struct SecurityConfigRow {
    enabled: bool,
    acl_enabled: bool,
    waf_enabled: bool,
    rate_limit_enabled: bool,
    crowdsec_enabled: bool,
    admin_whitelist: String,
    waf_mode: String,
    waf_rules_source: String,
    crowdsec_mode: String,
    crowdsec_api_url: String,
    rate_limit_requests: i64,
    rate_limit_window_sec: i64,
    rate_limit_burst: i64,
}

#[derive(FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

/// Reads every table [`crate::config::generator::generate`] needs, eagerly
/// loading each host's certificate, access list, and locations.
///
/// # Errors
///
/// Returns an error if any query fails.
pub async fn read_source_of_truth(pool: &DbPool) -> eyre::Result<SourceOfTruth> {
    let host_rows: Vec<ProxyHostRow> = sqlx::query_as("SELECT * FROM proxy_hosts ORDER BY id")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read proxy_hosts")?;

    let location_rows: Vec<LocationRow> = sqlx::query_as("SELECT * FROM locations")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read locations")?;
    let mut locations_by_host: HashMap<i64, Vec<Location>> = HashMap::new();
    for row in location_rows {
        locations_by_host.entry(row.proxy_host_id).or_default().push(Location {
            path: row.path,
            forward_host: row.forward_host,
            forward_port: row.forward_port as u16,
        });
    }

    let certificates: HashMap<i64, Certificate> = sqlx::query_as::<_, CertificateRow>("SELECT * FROM certificates")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read certificates")?
        .into_iter()
        .map(|row| {
            let provider = parse_cert_provider(&row.provider);
            (row.id, Certificate {
                id: row.id,
                uuid: row.uuid,
                provider,
                certificate: row.certificate,
                private_key: row.private_key,
            })
        })
        .collect();

    let access_lists: HashMap<i64, AccessList> = sqlx::query_as::<_, AccessListRow>("SELECT * FROM access_lists")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read access_lists")?
        .into_iter()
        .map(|row| (row.id, AccessList {
            id: row.id,
            kind: row.kind,
            ip_rules_json: row.ip_rules_json,
            country_codes: row.country_codes,
            local_network_only: row.local_network_only,
            enabled: row.enabled,
        }))
        .collect();

    let auth_policies_by_id: HashMap<i64, AuthPolicy> =
        sqlx::query_as::<_, AuthPolicyRow>("SELECT * FROM auth_policies")
            .fetch_all(pool)
            .await
            .wrap_err("failed to read auth_policies")?
            .into_iter()
            .map(|row| (row.id, AuthPolicy { id: row.id, name: row.name, enabled: row.enabled }))
            .collect();

    let hosts = host_rows
        .into_iter()
        .map(|row| ProxyHost {
            id: row.id,
            locations: locations_by_host.remove(&row.id).unwrap_or_default(),
            certificate: row.certificate_id.and_then(|id| certificates.get(&id).cloned()),
            access_list: row.access_list_id.and_then(|id| access_lists.get(&id).cloned()),
            auth_policy: row.auth_policy_id.and_then(|id| auth_policies_by_id.get(&id).cloned()),
            uuid: row.uuid,
            domain_names: row.domain_names,
            forward_host: row.forward_host,
            forward_port: row.forward_port as u16,
            forward_scheme: row.forward_scheme,
            enabled: row.enabled,
            ssl_forced: row.ssl_forced,
            websocket_support: row.websocket_support,
            hsts_enabled: row.hsts_enabled,
            hsts_subdomains: row.hsts_subdomains,
            block_exploits: row.block_exploits,
            forward_auth_enabled: row.forward_auth_enabled,
            forward_auth_bypass: row.forward_auth_bypass,
            advanced_config: row.advanced_config,
            application: row.application,
        })
        .collect();

    let auth_policies = auth_policies_by_id.into_values().collect();

    let auth_users = sqlx::query_as::<_, AuthUserRow>("SELECT * FROM auth_users")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read auth_users")?
        .into_iter()
        .map(|row| AuthUser { id: row.id, username: row.username, enabled: row.enabled })
        .collect();

    let auth_providers = sqlx::query_as::<_, AuthProviderRow>("SELECT * FROM auth_providers")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read auth_providers")?
        .into_iter()
        .map(|row| AuthProvider {
            id: row.id,
            kind: row.kind,
            enabled: row.enabled,
            client_id: row.client_id,
            issuer_url: row.issuer_url,
        })
        .collect();

    let rulesets = sqlx::query_as::<_, SecurityRulesetRow>("SELECT * FROM security_rulesets")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read security_rulesets")?
        .into_iter()
        .map(|row| SecurityRuleSet {
            id: row.id,
            name: row.name,
            content: row.content,
            mode: row.mode.as_deref().and_then(WafMode::parse),
            source_url: row.source_url,
        })
        .collect();

    let decisions = sqlx::query_as::<_, SecurityDecisionRow>("SELECT * FROM security_decisions")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read security_decisions")?
        .into_iter()
        .filter_map(|row| {
            let action = match row.action.as_str() {
                "block" => DecisionAction::Block,
                "allow" => DecisionAction::Allow,
                _ => return None,
            };
            Some(SecurityDecision { id: row.id, action, ip: row.ip })
        })
        .collect();

    let security_row: SecurityConfigRow = sqlx::query_as("SELECT * FROM security_config WHERE id = 1")
        .fetch_one(pool)
        .await
        .wrap_err("failed to read security_config")?;
    let runtime_flags = RuntimeFlags {
        cerberus_enabled: security_row.enabled,
        acl_enabled: security_row.acl_enabled,
        waf_enabled: security_row.waf_enabled,
        rate_limit_enabled: security_row.rate_limit_enabled,
        crowdsec_enabled: security_row.crowdsec_enabled,
    }
    .normalize();
    let security_config = SecurityConfig {
        enabled: security_row.enabled,
        admin_whitelist: security_row.admin_whitelist,
        waf_mode: security_row.waf_mode,
        waf_rules_source: security_row.waf_rules_source,
        crowdsec_mode: security_row.crowdsec_mode,
        crowdsec_api_url: security_row.crowdsec_api_url,
        rate_limit_requests: security_row.rate_limit_requests as u32,
        rate_limit_window_sec: security_row.rate_limit_window_sec as u32,
        rate_limit_burst: security_row.rate_limit_burst as u32,
    };

    let settings_rows: Vec<SettingRow> = sqlx::query_as("SELECT * FROM settings")
        .fetch_all(pool)
        .await
        .wrap_err("failed to read settings")?;
    let mut settings_map: HashMap<String, String> =
        settings_rows.into_iter().map(|row| (row.key, row.value)).collect();
    let settings = Settings {
        acme_email: settings_map.remove("acme_email").unwrap_or_default(),
        ssl_provider: settings_map.remove("ssl_provider").unwrap_or_default(),
        acme_staging: settings_map.remove("acme_staging").as_deref() == Some("true"),
        frontend_dir: settings_map.remove("frontend_dir").unwrap_or_default(),
    };

    Ok(SourceOfTruth {
        hosts,
        settings,
        security_config,
        rulesets,
        decisions,
        auth_users,
        auth_providers,
        auth_policies,
        runtime_flags,
    })
}

/// Reads the global forward-auth address/trust-header settings, not
/// bundled into [`SourceOfTruth`] because they're consumed directly by
/// [`crate::config::generator::GenerateInput`] rather than through it.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn read_forward_auth_settings(pool: &DbPool) -> eyre::Result<(String, bool)> {
    let rows: Vec<SettingRow> = sqlx::query_as(
        "SELECT * FROM settings WHERE key IN ('forward_auth_address', 'forward_auth_trust_header')",
    )
    .fetch_all(pool)
    .await
    .wrap_err("failed to read forward-auth settings")?;
    let mut map: HashMap<String, String> = rows.into_iter().map(|row| (row.key, row.value)).collect();
    let address = map.remove("forward_auth_address").unwrap_or_default();
    let trust_header = map.remove("forward_auth_trust_header").as_deref() == Some("true");
    Ok((address, trust_header))
}

fn parse_cert_provider(raw: &str) -> CertProvider {
    match raw {
        "letsencrypt" => CertProvider::Letsencrypt,
        "letsencrypt-staging" => CertProvider::LetsencryptStaging,
        "zerossl" => CertProvider::Zerossl,
        _ => CertProvider::Custom,
    }
}

/// Records an apply attempt's outcome. Errors writing the audit row are
/// logged and swallowed: a failed audit write must never fail an
/// otherwise-successful apply.
pub async fn insert_audit_record(
    pool: &DbPool,
    config_hash: &str,
    applied_at: DateTime<Utc>,
    success: bool,
    error_msg: Option<&str>,
) {
    let result = sqlx::query(
        "INSERT INTO apply_audit (config_hash, applied_at, success, error_msg) VALUES (?, ?, ?, ?)",
    )
    .bind(config_hash)
    .bind(applied_at.to_rfc3339())
    .bind(success)
    .bind(error_msg)
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(%err, "failed to write apply audit record");
    }
}
