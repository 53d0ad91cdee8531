//! The generated configuration document: a typed mirror of the Caddy admin
//! JSON schema. Every field name here is wire-format-significant.
//!
//! The one spot where the document can't be fully typed is the handler list:
//! user-supplied `advanced_config` fragments may contain handler kinds
//! this crate doesn't construct itself. [`Handler::Other`] is the escape
//! hatch for that case; everything this crate constructs itself goes through a
//! named variant so pipeline-order invariants stay checkable by the compiler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SERVER_NAME: &str = "charon_server";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub apps: Apps,
    pub logging: Logging,
    pub storage: Storage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Apps {
    pub http: HttpApp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsApp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityApp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HttpApp {
    pub servers: BTreeMap<String, Server>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub listen: Vec<String>,
    pub routes: Vec<Route>,
    pub automatic_https: AutomaticHttps,
    pub logs: ServerLogs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomaticHttps {
    pub disable: bool,
    pub disable_redirects: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerLogs {
    pub default_logger_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Route {
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_: Option<Vec<Match>>,
    pub handle: Vec<Handler>,
    pub terminal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Match {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<RemoteIpMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Vec<Match>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "geoip2")]
    pub geoip2: Option<GeoIpMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteIpMatch {
    pub ranges: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoIpMatch {
    pub country_codes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    ReverseProxy(ReverseProxyHandler),
    Headers(HeadersHandler),
    Rewrite(RewriteHandler),
    FileServer(FileServerHandler),
    StaticResponse(StaticResponseHandler),
    Subroute(SubrouteHandler),
    Vars(VarsHandler),
    Waf(WafHandler),
    Crowdsec(CrowdsecHandler),
    RateLimit(RateLimitHandler),
    AuthenticationPortal(AuthenticationHandler),
    Authorize(AuthorizeHandler),
    /// A handler kind this crate doesn't construct itself, carried through
    /// verbatim from a user-supplied `advanced_config` fragment.
    Other(Map<String, Value>),
}

impl Handler {
    /// The discriminator string emitted as the `handler` field.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::ReverseProxy(_) => "reverse_proxy",
            Self::Headers(_) => "headers",
            Self::Rewrite(_) => "rewrite",
            Self::FileServer(_) => "file_server",
            Self::StaticResponse(_) => "static_response",
            Self::Subroute(_) => "subroute",
            Self::Vars(_) => "vars",
            Self::Waf(_) => "waf",
            Self::Crowdsec(_) => "crowdsec",
            Self::RateLimit(_) => "rate_limit",
            Self::AuthenticationPortal(_) => "authentication",
            Self::Authorize(_) => "authorize",
            Self::Other(map) => map.get("handler").and_then(Value::as_str).unwrap_or(""),
        }
    }
}

impl Serialize for Handler {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut value = match self {
            Self::ReverseProxy(h) => serde_json::to_value(h),
            Self::Headers(h) => serde_json::to_value(h),
            Self::Rewrite(h) => serde_json::to_value(h),
            Self::FileServer(h) => serde_json::to_value(h),
            Self::StaticResponse(h) => serde_json::to_value(h),
            Self::Subroute(h) => serde_json::to_value(h),
            Self::Vars(h) => serde_json::to_value(h),
            Self::Waf(h) => serde_json::to_value(h),
            Self::Crowdsec(h) => serde_json::to_value(h),
            Self::RateLimit(h) => serde_json::to_value(h),
            Self::AuthenticationPortal(h) => serde_json::to_value(h),
            Self::Authorize(h) => serde_json::to_value(h),
            Self::Other(map) => Ok(Value::Object(map.clone())),
        }
        .map_err(serde::ser::Error::custom)?;

        if !matches!(self, Self::Other(_))
            && let Value::Object(map) = &mut value
        {
            map.insert("handler".to_string(), Value::String(self.kind().to_string()));
        }
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Handler {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("handler")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        macro_rules! typed {
            ($variant:ident, $ty:ty) => {
                serde_json::from_value::<$ty>(value.clone())
                    .map(Self::$variant)
                    .map_err(serde::de::Error::custom)
            };
        }

        match kind.as_str() {
            "reverse_proxy" => typed!(ReverseProxy, ReverseProxyHandler),
            "headers" => typed!(Headers, HeadersHandler),
            "rewrite" => typed!(Rewrite, RewriteHandler),
            "file_server" => typed!(FileServer, FileServerHandler),
            "static_response" => typed!(StaticResponse, StaticResponseHandler),
            "subroute" => typed!(Subroute, SubrouteHandler),
            "vars" => typed!(Vars, VarsHandler),
            "waf" => typed!(Waf, WafHandler),
            "crowdsec" => typed!(Crowdsec, CrowdsecHandler),
            "rate_limit" => typed!(RateLimit, RateLimitHandler),
            "authentication" => typed!(AuthenticationPortal, AuthenticationHandler),
            "authorize" => typed!(Authorize, AuthorizeHandler),
            _ => match value {
                Value::Object(map) => Ok(Self::Other(map)),
                other => Err(serde::de::Error::custom(format!(
                    "handler must be a JSON object, got {other}"
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Upstream {
    pub dial: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HeaderBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HeaderSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HeaderSet {
    pub set: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReverseProxyHandler {
    pub upstreams: Vec<Upstream>,
    pub flush_interval: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_response: Option<Vec<HandleResponse>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandleResponse {
    #[serde(rename = "match")]
    pub match_: StatusCodeMatch,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusCodeMatch {
    pub status_code: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HeadersHandler {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HeaderSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewriteHandler {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileServerHandler {
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticResponseHandler {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SubrouteHandler {
    pub routes: Vec<Route>,
}

/// Placeholder for the `block_exploits` pipeline stage: presence in the
/// pipeline is what matters, not its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VarsHandler {
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub vars: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WafHandler {
    pub directives: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrowdsecHandler {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitHandler {
    pub requests: u32,
    pub window_sec: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthenticationHandler {
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizeHandler {
    pub policy: String,
}

// ---------------------------------------------------------------------------
// TLS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TlsApp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation: Option<TlsAutomation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificates: Option<TlsCertificates>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsAutomation {
    pub policies: Vec<TlsPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsPolicy {
    pub issuers: Vec<TlsIssuer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsIssuer {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsCertificates {
    pub load_pem: Vec<LoadPemCertificate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadPemCertificate {
    pub certificate: String,
    pub key: String,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Security app (caddy-security binding)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityApp {
    pub authentication: AuthenticationApp,
    pub authorization: AuthorizationApp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthenticationApp {
    pub portals: Vec<AuthPortal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthPortal {
    pub name: String,
    pub identity_stores: Vec<IdentityStore>,
    pub identity_providers: Vec<OauthProvider>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityStore {
    pub kind: String,
    pub users: Vec<IdentityUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityUser {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OauthProvider {
    pub kind: String,
    pub name: String,
    pub client_id: String,
    pub issuer_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationApp {
    pub policies: Vec<AuthzPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthzPolicy {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Logging & storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Logging {
    pub logs: LoggingLogs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingLogs {
    pub access: AccessLog,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessLog {
    pub level: String,
    pub writer: LogWriter,
    pub encoder: String,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogWriter {
    pub output: String,
    pub filename: String,
    pub roll: bool,
    pub roll_size_mb: u32,
    pub roll_keep: u32,
    pub roll_keep_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Storage {
    pub module: String,
    pub root: String,
}
