//! Config Generator: assembles the full document from the relational
//! model plus runtime security state.

use std::collections::{HashMap, HashSet};

use super::document::{
    AccessLog, AuthPortal, AuthenticationApp, AuthorizationApp, AuthzPolicy, Apps,
    AutomaticHttps, Config, HttpApp, IdentityStore, IdentityUser, LoadPemCertificate, Logging,
    LoggingLogs, LogWriter, Match, OauthProvider, RemoteIpMatch, Route, SecurityApp, Server,
    ServerLogs, Storage, SubrouteHandler, TlsApp, TlsAutomation, TlsCertificates, TlsIssuer,
    TlsPolicy, SERVER_NAME,
};
use super::handlers;
use super::{acl, advanced, waf};
use crate::error::GenerateError;
use crate::model::{
    AuthPolicy, AuthProvider, AuthUser, CertProvider, DecisionAction, ProxyHost, RuntimeFlags,
    SecurityConfig, SecurityDecision,
};
use crate::net::parse_admin_whitelist;

const STAGING_CA_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
const PORTAL_NAME: &str = "cpmp_portal";

/// Everything [`generate`] needs to assemble a [`Config`].
pub struct GenerateInput<'a> {
    pub hosts: &'a [ProxyHost],
    pub storage_dir: &'a str,
    pub acme_email: &'a str,
    pub frontend_dir: &'a str,
    pub ssl_provider: &'a str,
    pub acme_staging: bool,
    pub flags: RuntimeFlags,
    pub admin_whitelist: &'a str,
    pub ruleset_paths: &'a HashMap<String, String>,
    pub decisions: &'a [SecurityDecision],
    pub security_cfg: &'a SecurityConfig,
    pub auth_users: &'a [AuthUser],
    pub auth_providers: &'a [AuthProvider],
    pub auth_policies: &'a [AuthPolicy],
    pub forward_auth_address: &'a str,
    pub forward_auth_trust_header: bool,
}

/// Assembles the full config document. Pure given `input` and the
/// `ruleset_paths` the orchestrator has already written to disk: two calls
/// with equal inputs produce byte-identical JSON.
pub fn generate(input: &GenerateInput<'_>) -> Result<Config, GenerateError> {
    let admin_whitelist_cidrs = parse_admin_whitelist(input.admin_whitelist)
        .map_err(GenerateError::InvalidAdminWhitelist)?
        .into_iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>();

    let storage = Storage { module: "file_system".to_string(), root: input.storage_dir.to_string() };
    let logging = Logging {
        logs: LoggingLogs {
            access: AccessLog {
                level: "INFO".to_string(),
                writer: LogWriter {
                    output: "file".to_string(),
                    filename: format!("{}/../../logs/access.log", input.storage_dir),
                    roll: true,
                    roll_size_mb: 10,
                    roll_keep: 5,
                    roll_keep_days: 7,
                },
                encoder: "json".to_string(),
                include: vec!["http.log.access.access_log".to_string()],
            },
        },
    };

    let tls = build_tls_app(input);
    let security = build_security_app(input.auth_users, input.auth_providers, input.auth_policies);

    let mut servers = std::collections::BTreeMap::new();
    if !(input.hosts.is_empty() && input.frontend_dir.is_empty()) {
        let routes = build_routes(input, &admin_whitelist_cidrs)?;
        servers.insert(
            SERVER_NAME.to_string(),
            Server {
                listen: vec![":80".to_string(), ":443".to_string()],
                routes,
                automatic_https: AutomaticHttps { disable: false, disable_redirects: false },
                logs: ServerLogs { default_logger_name: "access_log".to_string() },
            },
        );
    }

    Ok(Config { apps: Apps { http: HttpApp { servers }, tls, security }, logging, storage })
}

fn build_tls_app(input: &GenerateInput<'_>) -> Option<TlsApp> {
    let issuers = if input.acme_email.is_empty() {
        Vec::new()
    } else {
        match input.ssl_provider {
            "letsencrypt" => vec![acme_issuer(input.acme_email, input.acme_staging)],
            "zerossl" => vec![zerossl_issuer()],
            _ => vec![acme_issuer(input.acme_email, input.acme_staging), zerossl_issuer()],
        }
    };

    let automation = (!issuers.is_empty())
        .then(|| TlsAutomation { policies: vec![TlsPolicy { issuers }] });

    let mut seen_cert_ids = HashSet::new();
    let mut load_pem = Vec::new();
    for host in input.hosts {
        let Some(cert) = &host.certificate else { continue };
        if cert.provider != CertProvider::Custom || !seen_cert_ids.insert(cert.id) {
            continue;
        }
        match (&cert.certificate, &cert.private_key) {
            (Some(certificate), Some(key)) if !certificate.is_empty() && !key.is_empty() => {
                load_pem.push(LoadPemCertificate {
                    certificate: certificate.clone(),
                    key: key.clone(),
                    tags: vec![cert.uuid.clone()],
                });
            }
            _ => tracing::warn!(cert_uuid = %cert.uuid, "skipping custom certificate missing cert or key"),
        }
    }
    let certificates = (!load_pem.is_empty()).then(|| TlsCertificates { load_pem });

    (automation.is_some() || certificates.is_some()).then(|| TlsApp { automation, certificates })
}

fn acme_issuer(email: &str, staging: bool) -> TlsIssuer {
    TlsIssuer {
        module: "acme".to_string(),
        email: Some(email.to_string()),
        ca: staging.then(|| STAGING_CA_URL.to_string()),
    }
}

fn zerossl_issuer() -> TlsIssuer {
    TlsIssuer { module: "zerossl".to_string(), email: None, ca: None }
}

fn build_security_app(
    users: &[AuthUser],
    providers: &[AuthProvider],
    policies: &[AuthPolicy],
) -> Option<SecurityApp> {
    let enabled_users: Vec<_> = users.iter().filter(|u| u.enabled).collect();
    let enabled_providers: Vec<_> = providers.iter().filter(|p| p.enabled).collect();
    if enabled_users.is_empty() && enabled_providers.is_empty() {
        return None;
    }

    let identity_stores = vec![IdentityStore {
        kind: "local".to_string(),
        users: enabled_users
            .iter()
            .map(|u| IdentityUser { username: u.username.clone() })
            .collect(),
    }];

    let identity_providers = enabled_providers
        .iter()
        .map(|p| OauthProvider {
            kind: "oauth".to_string(),
            name: p.kind.clone(),
            client_id: p.client_id.clone(),
            issuer_url: p.issuer_url.clone(),
        })
        .collect();

    let authz_policies = policies
        .iter()
        .filter(|p| p.enabled)
        .map(|p| AuthzPolicy { name: p.name.clone() })
        .collect();

    Some(SecurityApp {
        authentication: AuthenticationApp {
            portals: vec![AuthPortal { name: PORTAL_NAME.to_string(), identity_stores, identity_providers }],
        },
        authorization: AuthorizationApp { policies: authz_policies },
    })
}

fn build_routes(
    input: &GenerateInput<'_>,
    admin_whitelist_cidrs: &[String],
) -> Result<Vec<Route>, GenerateError> {
    let decision_subroute = build_decision_subroute(input.decisions, admin_whitelist_cidrs);

    let mut routes = Vec::new();
    let mut seen_domains: HashSet<String> = HashSet::new();

    for host in input.hosts.iter().rev() {
        if !host.enabled || host.domain_names.is_empty() {
            continue;
        }

        let unique_domains: Vec<String> = host
            .domain_names
            .split(',')
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .filter(|d| seen_domains.insert(d.clone()))
            .collect();
        if unique_domains.is_empty() {
            continue;
        }

        let pipeline = build_host_pipeline(input, host, &decision_subroute, admin_whitelist_cidrs)?;

        if host.forward_auth_enabled
            && let Some(bypass) = &host.forward_auth_bypass
        {
            for prefix in bypass.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                routes.push(Route {
                    match_: Some(vec![Match {
                        host: Some(unique_domains.clone()),
                        path: Some(vec![prefix.to_string(), format!("{prefix}/*")]),
                        ..Match::default()
                    }]),
                    handle: vec![handlers::reverse_proxy(
                        &format!("{}:{}", host.forward_host, host.forward_port),
                        host.websocket_support,
                    )],
                    terminal: true,
                });
            }
        }

        let security_prefix: Vec<_> = pipeline[..pipeline.len().saturating_sub(1)].to_vec();
        for location in &host.locations {
            let mut handle = security_prefix.clone();
            handle.push(handlers::reverse_proxy(
                &format!("{}:{}", location.forward_host, location.forward_port),
                host.websocket_support,
            ));
            routes.push(Route {
                match_: Some(vec![Match {
                    host: Some(unique_domains.clone()),
                    path: Some(vec![location.path.clone(), format!("{}/*", location.path)]),
                    ..Match::default()
                }]),
                handle,
                terminal: true,
            });
        }

        routes.push(Route {
            match_: Some(vec![Match { host: Some(unique_domains), ..Match::default() }]),
            handle: pipeline,
            terminal: true,
        });
    }

    if !input.frontend_dir.is_empty() {
        routes.push(Route {
            match_: None,
            handle: handlers::catch_all(input.frontend_dir),
            terminal: true,
        });
    }

    Ok(routes)
}

fn build_decision_subroute(
    decisions: &[SecurityDecision],
    admin_whitelist_cidrs: &[String],
) -> Option<super::document::Handler> {
    let blocked: Vec<String> = decisions
        .iter()
        .filter(|d| d.action == DecisionAction::Block)
        .map(|d| d.ip.clone())
        .collect();
    if blocked.is_empty() {
        return None;
    }

    let not = (!admin_whitelist_cidrs.is_empty()).then(|| {
        vec![Match { remote_ip: Some(RemoteIpMatch { ranges: admin_whitelist_cidrs.to_vec() }), ..Match::default() }]
    });

    Some(super::document::Handler::Subroute(SubrouteHandler {
        routes: vec![Route {
            match_: Some(vec![Match { remote_ip: Some(RemoteIpMatch { ranges: blocked }), not, ..Match::default() }]),
            handle: vec![super::document::Handler::StaticResponse(
                super::document::StaticResponseHandler {
                    status_code: 403,
                    body: Some("Access denied: blocked by security decision".to_string()),
                },
            )],
            terminal: true,
        }],
    }))
}

fn build_host_pipeline(
    input: &GenerateInput<'_>,
    host: &ProxyHost,
    decision_subroute: &Option<super::document::Handler>,
    admin_whitelist_cidrs: &[String],
) -> Result<Vec<super::document::Handler>, GenerateError> {
    let mut pipeline = Vec::new();

    if input.flags.crowdsec_enabled {
        pipeline.push(handlers::crowdsec(
            &input.security_cfg.crowdsec_mode,
            &input.security_cfg.crowdsec_api_url,
        ));
    }

    if input.flags.waf_enabled {
        let advanced_hint = host.advanced_config.as_deref().and_then(advanced::ruleset_name_hint);
        let path = waf::select_ruleset_path(
            &input.security_cfg.waf_rules_source,
            advanced_hint.as_deref(),
            host.application.as_deref(),
            input.ruleset_paths,
        );
        if let Some(path) = path {
            pipeline.push(waf::build_handler(&path));
        }
    }

    if input.flags.rate_limit_enabled {
        pipeline.push(handlers::rate_limit(
            input.security_cfg.rate_limit_requests,
            input.security_cfg.rate_limit_window_sec,
            input.security_cfg.rate_limit_burst,
        ));
    }

    if let Some(handler) = decision_subroute {
        pipeline.push(handler.clone());
    }

    if input.flags.acl_enabled
        && let Some(list) = &host.access_list
    {
        match acl::build(list, admin_whitelist_cidrs) {
            Ok(Some(handler)) => pipeline.push(handler),
            Ok(None) => {}
            Err(err) => tracing::warn!(host_uuid = %host.uuid, %err, "skipping ACL for host"),
        }
    }

    if let Some(policy) = &host.auth_policy
        && policy.enabled
    {
        pipeline.push(handlers::authentication_portal(PORTAL_NAME));
        pipeline.push(handlers::authorize(&policy.name));
    }

    if host.forward_auth_enabled && !input.forward_auth_address.is_empty() {
        pipeline.push(handlers::forward_auth(input.forward_auth_address, input.forward_auth_trust_header));
    }

    if host.hsts_enabled {
        pipeline.push(handlers::hsts_headers(host.hsts_subdomains));
    }

    if host.block_exploits {
        pipeline.push(handlers::block_exploits());
    }

    if let Some(raw) = &host.advanced_config {
        pipeline.extend(advanced::normalize(raw));
    }

    pipeline.push(handlers::reverse_proxy(
        &format!("{}:{}", host.forward_host, host.forward_port),
        host.websocket_support,
    ));

    Ok(pipeline)
}
