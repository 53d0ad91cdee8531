//! ACL Builder. Compiles an [`AccessList`] plus the admin whitelist
//! into a single guard `subroute` handler, or `None` if the list is disabled
//! or of an unrecognized type.

use serde::Deserialize;

use crate::config::document::{Handler, Match, RemoteIpMatch, Route, StaticResponseHandler};
use crate::error::AclError;
use crate::model::AccessList;
use crate::net::local_network_ranges;

#[derive(Debug, Deserialize)]
struct IpRule {
    cidr: String,
}

/// Builds the ACL guard handler for `list`, folding in `admin_whitelist_cidrs`
/// (already-parsed CIDRs, always allowed regardless of the list's own rules).
///
/// Returns `Ok(None)` if the list is disabled or its type is unrecognized (the
/// caller proceeds without an ACL stage in both cases). Returns `Err` only for
/// malformed `ip_rules` JSON.
pub fn build(list: &AccessList, admin_whitelist_cidrs: &[String]) -> Result<Option<Handler>, AclError> {
    if !list.enabled {
        return Ok(None);
    }

    let Some(kind) = crate::model::AccessListType::parse(&list.kind) else {
        return Ok(None);
    };

    use crate::model::AccessListType::{Blacklist, GeoBlacklist, GeoWhitelist, Whitelist};

    let handler = match kind {
        Whitelist if list.local_network_only => {
            let mut ranges: Vec<String> = local_network_ranges().iter().map(ToString::to_string).collect();
            ranges.extend(admin_whitelist_cidrs.iter().cloned());
            allow_subroute(ranges, "Access denied: Not a local network IP")
        }
        Whitelist => {
            let mut ranges = parse_ip_rules(&list.ip_rules_json)?;
            ranges.extend(admin_whitelist_cidrs.iter().cloned());
            allow_subroute(ranges, "Access denied: IP not in whitelist")
        }
        Blacklist => {
            let ranges = parse_ip_rules(&list.ip_rules_json)?;
            deny_subroute(ranges, admin_whitelist_cidrs, "Access denied: IP blacklisted")
        }
        GeoWhitelist => {
            let codes = split_country_codes(&list.country_codes);
            allow_geo_subroute(codes, "Access denied: Geographic restriction")
        }
        GeoBlacklist => {
            let codes = split_country_codes(&list.country_codes);
            deny_geo_subroute(codes, "Access denied: Geographic restriction")
        }
    };

    Ok(Some(handler))
}

fn parse_ip_rules(raw_json: &str) -> Result<Vec<String>, AclError> {
    let rules: Vec<IpRule> =
        serde_json::from_str(raw_json).map_err(AclError::MalformedIpRules)?;
    Ok(rules.into_iter().map(|r| r.cidr).collect())
}

fn split_country_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn deny_response(message: &str) -> Route {
    Route {
        match_: None,
        handle: vec![Handler::StaticResponse(StaticResponseHandler {
            status_code: 403,
            body: Some(message.to_string()),
        })],
        terminal: true,
    }
}

fn subroute_gate(allow_match: Match, deny_message: &str) -> Handler {
    Handler::Subroute(crate::config::document::SubrouteHandler {
        routes: vec![
            Route {
                match_: Some(vec![allow_match]),
                handle: vec![],
                terminal: true,
            },
            deny_response(deny_message),
        ],
    })
}

fn allow_subroute(ranges: Vec<String>, deny_message: &str) -> Handler {
    subroute_gate(
        Match {
            remote_ip: Some(RemoteIpMatch { ranges }),
            ..Match::default()
        },
        deny_message,
    )
}

fn deny_subroute(deny_ranges: Vec<String>, admin_whitelist_cidrs: &[String], deny_message: &str) -> Handler {
    // Allow branch matches when the request is NOT in the deny set, or IS in
    // the admin whitelist.
    let not_blacklisted = Match {
        not: Some(vec![Match {
            remote_ip: Some(RemoteIpMatch { ranges: deny_ranges }),
            ..Match::default()
        }]),
        ..Match::default()
    };

    if admin_whitelist_cidrs.is_empty() {
        return subroute_gate(not_blacklisted, deny_message);
    }

    let admin_exempt = Match {
        remote_ip: Some(RemoteIpMatch { ranges: admin_whitelist_cidrs.to_vec() }),
        ..Match::default()
    };

    Handler::Subroute(crate::config::document::SubrouteHandler {
        routes: vec![
            Route { match_: Some(vec![admin_exempt]), handle: vec![], terminal: true },
            Route { match_: Some(vec![not_blacklisted]), handle: vec![], terminal: true },
            deny_response(deny_message),
        ],
    })
}

fn allow_geo_subroute(country_codes: Vec<String>, deny_message: &str) -> Handler {
    subroute_gate(
        Match {
            geoip2: Some(crate::config::document::GeoIpMatch { country_codes }),
            ..Match::default()
        },
        deny_message,
    )
}

fn deny_geo_subroute(country_codes: Vec<String>, deny_message: &str) -> Handler {
    subroute_gate(
        Match {
            not: Some(vec![Match {
                geoip2: Some(crate::config::document::GeoIpMatch { country_codes }),
                ..Match::default()
            }]),
            ..Match::default()
        },
        deny_message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_list(kind: &str) -> AccessList {
        AccessList {
            id: 1,
            kind: kind.to_string(),
            ip_rules_json: "[]".to_string(),
            country_codes: String::new(),
            local_network_only: false,
            enabled: true,
        }
    }

    #[test]
    fn disabled_list_yields_none() {
        let mut list = base_list("whitelist");
        list.enabled = false;
        assert!(build(&list, &[]).unwrap().is_none());
    }

    #[test]
    fn unknown_type_yields_none() {
        let list = base_list("rainbow");
        assert!(build(&list, &[]).unwrap().is_none());
    }

    #[test]
    fn malformed_ip_rules_is_error() {
        let mut list = base_list("whitelist");
        list.ip_rules_json = "not json".to_string();
        assert!(build(&list, &[]).is_err());
    }

    #[test]
    fn whitelist_includes_admin_cidrs() {
        let mut list = base_list("whitelist");
        list.ip_rules_json = r#"[{"cidr":"1.2.3.0/24"}]"#.to_string();
        let handler = build(&list, &["10.0.0.1/32".to_string()]).unwrap().unwrap();
        let Handler::Subroute(sub) = handler else { panic!("expected subroute") };
        let allow_match = sub.routes[0].match_.as_ref().unwrap()[0].clone();
        let ranges = allow_match.remote_ip.unwrap().ranges;
        assert!(ranges.contains(&"1.2.3.0/24".to_string()));
        assert!(ranges.contains(&"10.0.0.1/32".to_string()));
    }

    #[test]
    fn local_network_only_uses_rfc1918_plus_admin() {
        let mut list = base_list("whitelist");
        list.local_network_only = true;
        let handler = build(&list, &["203.0.113.1/32".to_string()]).unwrap().unwrap();
        let Handler::Subroute(sub) = handler else { panic!("expected subroute") };
        let ranges = sub.routes[0].match_.as_ref().unwrap()[0].remote_ip.as_ref().unwrap().ranges.clone();
        assert!(ranges.contains(&"10.0.0.0/8".to_string()));
        assert!(ranges.contains(&"203.0.113.1/32".to_string()));
    }

    #[test]
    fn blacklist_subtracts_admin_whitelist() {
        let mut list = base_list("blacklist");
        list.ip_rules_json = r#"[{"cidr":"6.6.6.6/32"}]"#.to_string();
        let handler = build(&list, &["6.6.6.6/32".to_string()]).unwrap().unwrap();
        let Handler::Subroute(sub) = handler else { panic!("expected subroute") };
        // admin-exempt route, not-blacklisted route, deny route
        assert_eq!(sub.routes.len(), 3);
    }

    #[test]
    fn blacklist_without_admin_whitelist_has_two_routes() {
        let mut list = base_list("blacklist");
        list.ip_rules_json = r#"[{"cidr":"6.6.6.6/32"}]"#.to_string();
        let handler = build(&list, &[]).unwrap().unwrap();
        let Handler::Subroute(sub) = handler else { panic!("expected subroute") };
        assert_eq!(sub.routes.len(), 2);
    }

    #[test]
    fn geo_whitelist_matches_country_codes() {
        let mut list = base_list("geo_whitelist");
        list.country_codes = "US, CA".to_string();
        let handler = build(&list, &[]).unwrap().unwrap();
        let Handler::Subroute(sub) = handler else { panic!("expected subroute") };
        let codes = sub.routes[0].match_.as_ref().unwrap()[0].geoip2.as_ref().unwrap().country_codes.clone();
        assert_eq!(codes, vec!["US".to_string(), "CA".to_string()]);
    }
}
