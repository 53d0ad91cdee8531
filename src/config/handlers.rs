//! Handler constructors. Each builds a typed fragment from primitives;
//! none of them can fail, because their inputs are assumed pre-validated by
//! the caller.

use std::collections::BTreeMap;

use super::document::{
    AuthenticationHandler, AuthorizeHandler, CrowdsecHandler, FileServerHandler, Handler,
    HandleResponse, HeaderBlock, HeaderSet, HeadersHandler, RateLimitHandler, RewriteHandler,
    ReverseProxyHandler, StatusCodeMatch, Upstream, VarsHandler, WafHandler,
};
use crate::config::document::Route;

/// Builds a `reverse_proxy` handler dialing `host:port`.
///
/// Streaming is always enabled (`flush_interval = -1`). When `enable_websocket`
/// is set, request headers are overridden to preserve the client's `Upgrade`
/// and `Connection` headers across the proxy hop.
#[must_use]
pub fn reverse_proxy(dial: &str, enable_websocket: bool) -> Handler {
    let headers = enable_websocket.then(|| HeaderBlock {
        request: Some(HeaderSet {
            set: BTreeMap::from([
                ("Connection".to_string(), vec!["{http.request.header.Connection}".to_string()]),
                ("Upgrade".to_string(), vec!["{http.request.header.Upgrade}".to_string()]),
            ]),
        }),
        response: None,
    });

    Handler::ReverseProxy(ReverseProxyHandler {
        upstreams: vec![Upstream { dial: dial.to_string() }],
        flush_interval: -1,
        headers,
        handle_response: None,
    })
}

/// Builds a `headers` handler setting the given response headers.
#[must_use]
pub fn headers(response_set: BTreeMap<String, Vec<String>>) -> Handler {
    Handler::Headers(HeadersHandler {
        request: None,
        response: Some(HeaderSet { set: response_set }),
    })
}

/// Builds the HSTS response-headers handler.
#[must_use]
pub fn hsts_headers(include_subdomains: bool) -> Handler {
    let mut value = "max-age=31536000".to_string();
    if include_subdomains {
        value.push_str("; includeSubDomains");
    }
    headers(BTreeMap::from([(
        "Strict-Transport-Security".to_string(),
        vec![value],
    )]))
}

/// Builds a `rewrite` handler.
#[must_use]
pub fn rewrite(uri: &str) -> Handler {
    Handler::Rewrite(RewriteHandler { uri: uri.to_string() })
}

/// Builds a `file_server` handler rooted at `root`.
#[must_use]
pub fn file_server(root: &str) -> Handler {
    Handler::FileServer(FileServerHandler { root: root.to_string() })
}

/// Builds the `block_exploits` placeholder stage. Its presence in the pipeline
/// is what matters; it carries no directives of its own.
#[must_use]
pub fn block_exploits() -> Handler {
    Handler::Vars(VarsHandler::default())
}

/// Builds the `waf` handler with the given pre-assembled directives string.
#[must_use]
pub fn waf(directives: String) -> Handler {
    Handler::Waf(WafHandler { directives })
}

/// Builds the `crowdsec` handler.
#[must_use]
pub fn crowdsec(mode: &str, api_url: &str) -> Handler {
    Handler::Crowdsec(CrowdsecHandler {
        mode: mode.to_string(),
        api_url: (!api_url.is_empty()).then(|| api_url.to_string()),
    })
}

/// Builds the `rate_limit` handler.
#[must_use]
pub fn rate_limit(requests: u32, window_sec: u32, burst: u32) -> Handler {
    Handler::RateLimit(RateLimitHandler { requests, window_sec, burst })
}

/// Builds the authentication-portal handler for the given portal name.
#[must_use]
pub fn authentication_portal(portal_name: &str) -> Handler {
    Handler::AuthenticationPortal(AuthenticationHandler {
        providers: vec![portal_name.to_string()],
    })
}

/// Builds the authorization handler naming the given policy.
#[must_use]
pub fn authorize(policy_name: &str) -> Handler {
    Handler::Authorize(AuthorizeHandler { policy: policy_name.to_string() })
}

/// Builds the forward-auth handler: a `reverse_proxy` to the auth service with
/// a `handle_response` mapping HTTP 200 to injection of
/// `Remote-User`/`Remote-Email`/`Remote-Name`/`Remote-Groups` request headers
/// on the downstream call. When `trust_forward_header` is set, the original
/// `X-Forwarded-Method`/`X-Forwarded-Uri` are also forwarded to the auth
/// service.
#[must_use]
pub fn forward_auth(address: &str, trust_forward_header: bool) -> Handler {
    let mut request_set = BTreeMap::new();
    if trust_forward_header {
        request_set.insert(
            "X-Forwarded-Method".to_string(),
            vec!["{http.request.method}".to_string()],
        );
        request_set.insert(
            "X-Forwarded-Uri".to_string(),
            vec!["{http.request.uri}".to_string()],
        );
    }
    let headers = (!request_set.is_empty()).then(|| HeaderBlock {
        request: Some(HeaderSet { set: request_set }),
        response: None,
    });

    let injected: BTreeMap<String, Vec<String>> = [
        ("Remote-User", "{http.reverse_proxy.header.Remote-User}"),
        ("Remote-Email", "{http.reverse_proxy.header.Remote-Email}"),
        ("Remote-Name", "{http.reverse_proxy.header.Remote-Name}"),
        ("Remote-Groups", "{http.reverse_proxy.header.Remote-Groups}"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
    .collect();

    let handle_response = vec![HandleResponse {
        match_: StatusCodeMatch { status_code: vec![200] },
        routes: vec![Route {
            match_: None,
            handle: vec![Handler::Headers(HeadersHandler {
                request: Some(HeaderSet { set: injected }),
                response: None,
            })],
            terminal: false,
        }],
    }];

    Handler::ReverseProxy(ReverseProxyHandler {
        upstreams: vec![Upstream { dial: address.to_string() }],
        flush_interval: -1,
        headers,
        handle_response: Some(handle_response),
    })
}

/// Builds the catch-all 404 pipeline: rewrite to `/unknown.html`, then serve
/// static files rooted at `frontend_dir`.
#[must_use]
pub fn catch_all(frontend_dir: &str) -> Vec<Handler> {
    vec![rewrite("/unknown.html"), file_server(frontend_dir)]
}
