//! WAF ruleset selection.

use std::collections::HashMap;

use crate::config::document::Handler;
use crate::config::handlers;
use crate::model::{SecurityConfig, SecurityRuleSet, WafMode};

/// Resolves the on-disk path to `Include`, trying each source in priority
/// order and skipping any that doesn't name a ruleset with a known path.
/// Returns `None` when nothing resolves — callers must then omit the WAF
/// handler entirely rather than emit a directive-less stub.
#[must_use]
pub fn select_ruleset_path(
    waf_rules_source: &str,
    advanced_config_hint: Option<&str>,
    application_hint: Option<&str>,
    ruleset_paths: &HashMap<String, String>,
) -> Option<String> {
    [
        Some(waf_rules_source).filter(|s| !s.is_empty()),
        advanced_config_hint,
        application_hint,
        Some("owasp-crs"),
    ]
    .into_iter()
    .flatten()
    .find_map(|name| ruleset_paths.get(name).cloned())
}

/// Builds the `waf` handler for the given resolved path.
#[must_use]
pub fn build_handler(path: &str) -> Handler {
    handlers::waf(format!("Include {path}\n"))
}

/// Resolves the Coraza engine-mode directive for a ruleset: per-ruleset
/// `mode` wins; if unset, falls back to `security_cfg.waf_mode == "monitor"`.
#[must_use]
pub fn engine_mode(ruleset: &SecurityRuleSet, security_cfg: &SecurityConfig) -> &'static str {
    let detection_only = match ruleset.mode {
        Some(WafMode::Monitor) => true,
        Some(WafMode::Block) => false,
        None => security_cfg.waf_mode == "monitor",
    };
    if detection_only { "DetectionOnly" } else { "On" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> HashMap<String, String> {
        HashMap::from([
            ("owasp-crs".to_string(), "/rulesets/owasp-crs.conf".to_string()),
            ("custom".to_string(), "/rulesets/custom.conf".to_string()),
        ])
    }

    #[test]
    fn prefers_security_config_source() {
        let path = select_ruleset_path("custom", Some("owasp-crs"), None, &paths());
        assert_eq!(path.as_deref(), Some("/rulesets/custom.conf"));
    }

    #[test]
    fn falls_back_to_advanced_config_hint() {
        let path = select_ruleset_path("", Some("custom"), None, &paths());
        assert_eq!(path.as_deref(), Some("/rulesets/custom.conf"));
    }

    #[test]
    fn falls_back_to_application_hint() {
        let path = select_ruleset_path("", None, Some("custom"), &paths());
        assert_eq!(path.as_deref(), Some("/rulesets/custom.conf"));
    }

    #[test]
    fn falls_back_to_owasp_crs() {
        let path = select_ruleset_path("", None, None, &paths());
        assert_eq!(path.as_deref(), Some("/rulesets/owasp-crs.conf"));
    }

    #[test]
    fn none_when_nothing_resolves() {
        let path = select_ruleset_path("nonexistent", None, None, &HashMap::new());
        assert!(path.is_none());
    }

    #[test]
    fn engine_mode_prefers_per_ruleset_setting() {
        let ruleset = SecurityRuleSet {
            id: 1,
            name: "x".into(),
            content: String::new(),
            mode: Some(WafMode::Monitor),
            source_url: None,
        };
        let cfg = SecurityConfig { waf_mode: "block".into(), ..SecurityConfig::default() };
        assert_eq!(engine_mode(&ruleset, &cfg), "DetectionOnly");
    }

    #[test]
    fn engine_mode_falls_back_to_global_monitor() {
        let ruleset = SecurityRuleSet {
            id: 1,
            name: "x".into(),
            content: String::new(),
            mode: None,
            source_url: None,
        };
        let cfg = SecurityConfig { waf_mode: "monitor".into(), ..SecurityConfig::default() };
        assert_eq!(engine_mode(&ruleset, &cfg), "DetectionOnly");
    }

    #[test]
    fn engine_mode_defaults_on() {
        let ruleset = SecurityRuleSet {
            id: 1,
            name: "x".into(),
            content: String::new(),
            mode: None,
            source_url: None,
        };
        let cfg = SecurityConfig::default();
        assert_eq!(engine_mode(&ruleset, &cfg), "On");
    }
}
