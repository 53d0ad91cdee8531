//! Validator: a pure function over a generated [`Config`]. Returns the
//! first failure found; never partial.

use std::collections::HashSet;

use super::document::{Config, Handler};
use crate::error::ValidateError;

/// Validates `config` in place, short-circuiting on the first issue found.
pub fn validate(config: &Config) -> Result<(), ValidateError> {
    for (server_name, server) in &config.apps.http.servers {
        if server.listen.is_empty() {
            return Err(ValidateError::EmptyListen { server: server_name.clone() });
        }
        for addr in &server.listen {
            validate_listen_address(server_name, addr)?;
        }

        let mut seen_hosts: HashSet<String> = HashSet::new();
        for (index, route) in server.routes.iter().enumerate() {
            if route.handle.is_empty() {
                return Err(ValidateError::EmptyHandle { server: server_name.clone(), index });
            }
            for (handler_index, handler) in route.handle.iter().enumerate() {
                validate_handler(server_name, index, handler_index, handler)?;
            }

            if is_host_only_route(route)
                && let Some(match_list) = &route.match_
            {
                for m in match_list {
                    if let Some(hosts) = &m.host {
                        for host in hosts {
                            if !seen_hosts.insert(host.clone()) {
                                return Err(ValidateError::DuplicateHost {
                                    server: server_name.clone(),
                                    host: host.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    serde_json::to_vec(config).map_err(ValidateError::Serialize)?;

    Ok(())
}

/// A route whose only match field is `host` with no `path`.
fn is_host_only_route(route: &super::document::Route) -> bool {
    match &route.match_ {
        Some(matches) => matches.iter().all(|m| {
            m.host.is_some() && m.path.is_none() && m.remote_ip.is_none() && m.geoip2.is_none() && m.not.is_none()
        }),
        None => false,
    }
}

fn validate_handler(
    server: &str,
    index: usize,
    handler_index: usize,
    handler: &Handler,
) -> Result<(), ValidateError> {
    if handler.kind().is_empty() {
        return Err(ValidateError::EmptyHandlerField {
            server: server.to_string(),
            index,
            handler_index,
        });
    }

    if let Handler::ReverseProxy(rp) = handler {
        if rp.upstreams.is_empty() {
            return Err(ValidateError::EmptyUpstreams { server: server.to_string(), index });
        }
        for upstream in &rp.upstreams {
            validate_dial(server, index, &upstream.dial)?;
        }
    }

    if let Handler::Subroute(sub) = handler {
        for route in &sub.routes {
            for (nested_index, nested_handler) in route.handle.iter().enumerate() {
                validate_handler(server, index, nested_index, nested_handler)?;
            }
        }
    }

    Ok(())
}

fn validate_dial(server: &str, index: usize, dial: &str) -> Result<(), ValidateError> {
    let Some((host, port)) = dial.rsplit_once(':') else {
        return Err(ValidateError::InvalidDial {
            server: server.to_string(),
            index,
            dial: dial.to_string(),
            reason: "missing ':' separator".to_string(),
        });
    };
    if host.is_empty() {
        return Err(ValidateError::InvalidDial {
            server: server.to_string(),
            index,
            dial: dial.to_string(),
            reason: "empty host".to_string(),
        });
    }
    port.parse::<u16>().map_err(|_| ValidateError::InvalidDial {
        server: server.to_string(),
        index,
        dial: dial.to_string(),
        reason: "port is not a valid u16".to_string(),
    })?;
    Ok(())
}

fn validate_listen_address(server: &str, addr: &str) -> Result<(), ValidateError> {
    // `[network/]host:port`
    let without_network = addr.split('/').next_back().unwrap_or(addr);
    let Some((host, port)) = without_network.rsplit_once(':') else {
        return Err(ValidateError::InvalidListen {
            server: server.to_string(),
            addr: addr.to_string(),
            reason: "missing ':' separator".to_string(),
        });
    };
    let port_num: u32 = port.parse().map_err(|_| ValidateError::InvalidListen {
        server: server.to_string(),
        addr: addr.to_string(),
        reason: "port is not numeric".to_string(),
    })?;
    if port_num > 65535 {
        return Err(ValidateError::InvalidListen {
            server: server.to_string(),
            addr: addr.to_string(),
            reason: "port out of range".to_string(),
        });
    }
    if !host.is_empty() && host.parse::<std::net::IpAddr>().is_err() {
        return Err(ValidateError::InvalidListen {
            server: server.to_string(),
            addr: addr.to_string(),
            reason: "host is not a valid IP literal".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document::{
        Apps, AutomaticHttps, HttpApp, Logging, LoggingLogs, LogWriter, AccessLog, Match, Route,
        ReverseProxyHandler, Server, ServerLogs, Storage, Upstream,
    };
    use std::collections::BTreeMap;

    fn base_config() -> Config {
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

    fn server_with_route(route: Route) -> Server {
        Server {
            listen: vec![":80".into(), ":443".into()],
            routes: vec![route],
            automatic_https: AutomaticHttps { disable: false, disable_redirects: false },
            logs: ServerLogs { default_logger_name: "access_log".into() },
        }
    }

    fn rp_route(host: &str, dial: &str) -> Route {
        Route {
            match_: Some(vec![Match { host: Some(vec![host.into()]), ..Match::default() }]),
            handle: vec![Handler::ReverseProxy(ReverseProxyHandler {
                upstreams: vec![Upstream { dial: dial.into() }],
                flush_interval: -1,
                headers: None,
                handle_response: None,
            })],
            terminal: true,
        }
    }

    #[test]
    fn empty_skeleton_is_valid() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn valid_single_host_route() {
        let mut cfg = base_config();
        cfg.apps.http.servers.insert(
            "charon_server".into(),
            server_with_route(rp_route("media.example.com", "media:32400")),
        );
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn empty_listen_is_rejected() {
        let mut cfg = base_config();
        let mut server = server_with_route(rp_route("a.com", "a:1"));
        server.listen = vec![];
        cfg.apps.http.servers.insert("s".into(), server);
        assert!(matches!(validate(&cfg), Err(ValidateError::EmptyListen { .. })));
    }

    #[test]
    fn invalid_dial_is_rejected() {
        let mut cfg = base_config();
        cfg.apps.http.servers.insert(
            "s".into(),
            server_with_route(rp_route("a.com", "not-a-valid-dial")),
        );
        assert!(matches!(validate(&cfg), Err(ValidateError::InvalidDial { .. })));
    }

    #[test]
    fn duplicate_host_only_route_is_rejected() {
        let mut cfg = base_config();
        let mut server = server_with_route(rp_route("dup.com", "a:1"));
        server.routes.push(rp_route("dup.com", "b:2"));
        cfg.apps.http.servers.insert("s".into(), server);
        assert!(matches!(validate(&cfg), Err(ValidateError::DuplicateHost { .. })));
    }

    #[test]
    fn same_host_with_path_is_not_a_duplicate() {
        let mut cfg = base_config();
        let mut server = server_with_route(rp_route("dup.com", "a:1"));
        server.routes.push(Route {
            match_: Some(vec![Match {
                host: Some(vec!["dup.com".into()]),
                path: Some(vec!["/api".into()]),
                ..Match::default()
            }]),
            handle: vec![Handler::ReverseProxy(ReverseProxyHandler {
                upstreams: vec![Upstream { dial: "b:2".into() }],
                flush_interval: -1,
                headers: None,
                handle_response: None,
            })],
            terminal: true,
        });
        cfg.apps.http.servers.insert("s".into(), server);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn empty_handle_is_rejected() {
        let mut cfg = base_config();
        let route = Route { match_: None, handle: vec![], terminal: true };
        cfg.apps.http.servers.insert("s".into(), server_with_route(route));
        assert!(matches!(validate(&cfg), Err(ValidateError::EmptyHandle { .. })));
    }

    #[test]
    fn unknown_handler_kind_is_accepted() {
        let mut cfg = base_config();
        let other = Handler::Other(
            serde_json::json!({"handler": "templates"}).as_object().unwrap().clone(),
        );
        let route = Route { match_: None, handle: vec![other], terminal: true };
        cfg.apps.http.servers.insert("s".into(), server_with_route(route));
        assert!(validate(&cfg).is_ok());
    }
}
