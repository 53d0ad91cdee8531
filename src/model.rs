//! The relational model read by the core. These types are read-only to the
//! core: they are populated by [`crate::db`] from the source of truth and
//! consumed by [`crate::config::generator`].

use serde::{Deserialize, Serialize};

/// A single proxy host: a domain-to-upstream mapping plus its security, TLS,
/// and auth attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyHost {
    pub id: i64,
    pub uuid: String,
    /// Comma-separated, case-insensitive list of domains this host answers for.
    pub domain_names: String,
    pub forward_host: String,
    pub forward_port: u16,
    pub forward_scheme: String,
    pub enabled: bool,
    pub ssl_forced: bool,
    pub websocket_support: bool,
    pub hsts_enabled: bool,
    pub hsts_subdomains: bool,
    pub block_exploits: bool,
    pub forward_auth_enabled: bool,
    /// Comma-separated path prefixes exempt from forward-auth.
    pub forward_auth_bypass: Option<String>,
    /// Free-form JSON fragment merged into the route's handler list.
    pub advanced_config: Option<String>,
    pub certificate: Option<Certificate>,
    pub access_list: Option<AccessList>,
    pub auth_policy: Option<AuthPolicy>,
    /// WAF ruleset-selection hint.
    pub application: Option<String>,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub path: String,
    pub forward_host: String,
    pub forward_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertProvider {
    Custom,
    Letsencrypt,
    #[serde(rename = "letsencrypt-staging")]
    LetsencryptStaging,
    Zerossl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Certificate {
    pub id: i64,
    pub uuid: String,
    pub provider: CertProvider,
    pub certificate: Option<String>,
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessListType {
    Whitelist,
    Blacklist,
    GeoWhitelist,
    GeoBlacklist,
}

impl AccessListType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "whitelist" => Some(Self::Whitelist),
            "blacklist" => Some(Self::Blacklist),
            "geo_whitelist" => Some(Self::GeoWhitelist),
            "geo_blacklist" => Some(Self::GeoBlacklist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessList {
    pub id: i64,
    pub kind: String,
    /// Raw JSON text, `[{"cidr": "..."}]`. Parsed lazily so malformed input is
    /// surfaced as an `AclError` rather than rejected at load time.
    pub ip_rules_json: String,
    /// Comma-separated ISO-3166-1 alpha-2 codes.
    pub country_codes: String,
    pub local_network_only: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WafMode {
    Block,
    Monitor,
}

impl WafMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "block" => Some(Self::Block),
            "monitor" | "detection" => Some(Self::Monitor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityRuleSet {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub mode: Option<WafMode>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Block,
    Allow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityDecision {
    pub id: i64,
    pub action: DecisionAction,
    pub ip: String,
}

/// The singleton security settings row.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityConfig {
    pub enabled: bool,
    /// Comma-separated CIDRs, always allowed/never blocked.
    pub admin_whitelist: String,
    pub waf_mode: String,
    pub waf_rules_source: String,
    pub crowdsec_mode: String,
    pub crowdsec_api_url: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window_sec: u32,
    pub rate_limit_burst: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_whitelist: String::new(),
            waf_mode: String::new(),
            waf_rules_source: String::new(),
            crowdsec_mode: String::new(),
            crowdsec_api_url: String::new(),
            rate_limit_requests: 0,
            rate_limit_window_sec: 0,
            rate_limit_burst: 0,
        }
    }
}

/// Runtime security toggles. Sub-flags are forced false when `cerberus_enabled`
/// is false: disabling the top-level switch disables everything underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeFlags {
    pub cerberus_enabled: bool,
    pub acl_enabled: bool,
    pub waf_enabled: bool,
    pub rate_limit_enabled: bool,
    pub crowdsec_enabled: bool,
}

impl RuntimeFlags {
    /// Applies the break-glass rule: if Cerberus is off, every sub-flag is off.
    #[must_use]
    pub fn normalize(self) -> Self {
        if self.cerberus_enabled {
            self
        } else {
            Self {
                cerberus_enabled: false,
                acl_enabled: false,
                waf_enabled: false,
                rate_limit_enabled: false,
                crowdsec_enabled: false,
            }
        }
    }
}

/// An enabled local auth policy, named after itself in the emitted authorization
/// handler.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPolicy {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
}

/// A local identity-store user. Only `username`/`enabled` are
/// read by the core; password material is opaque and never touched here.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub enabled: bool,
}

/// An OAuth/OIDC identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthProvider {
    pub id: i64,
    pub kind: String,
    pub enabled: bool,
    pub client_id: String,
    pub issuer_url: String,
}

/// Global settings read from the key-value `settings` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub acme_email: String,
    pub ssl_provider: String,
    pub acme_staging: bool,
    /// Static-file root served by the catch-all route; empty disables it.
    pub frontend_dir: String,
}

/// Everything [`crate::config::generator::generate`] needs, gathered by
/// [`crate::db::read_source_of_truth`].
#[derive(Debug, Clone, Default)]
pub struct SourceOfTruth {
    pub hosts: Vec<ProxyHost>,
    pub settings: Settings,
    pub security_config: SecurityConfig,
    pub rulesets: Vec<SecurityRuleSet>,
    pub decisions: Vec<SecurityDecision>,
    pub auth_users: Vec<AuthUser>,
    pub auth_providers: Vec<AuthProvider>,
    pub auth_policies: Vec<AuthPolicy>,
    pub runtime_flags: RuntimeFlags,
}
