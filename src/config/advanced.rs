//! Advanced-config normalizer. Parses a user-supplied JSON fragment
//! (object or array of objects) and canonicalizes header values before
//! handing each recognized handler object off to [`Handler`]'s deserializer.
//!
//! Never fails: malformed or unrecognized input degrades to an empty handler
//! list plus a logged warning, rather than aborting the whole generation.

use serde_json::{Map, Value};

use super::document::Handler;

/// Parses `raw` and returns the list of handler records to prepend ahead of
/// the generator's own pipeline — see [`AdvancedConfigMode`] for the other
/// option.
#[must_use]
pub fn normalize(raw: &str) -> Vec<Handler> {
    normalize_with_mode(raw, AdvancedConfigMode::Prepend).1
}

/// How a parsed advanced_config fragment is combined with the generator's own
/// pipeline. `Prepend` is the default and what the generator uses; `Replace`
/// is kept available for callers that want the fragment to stand alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvancedConfigMode {
    #[default]
    Prepend,
    Replace,
}

/// As [`normalize`], but also returns the resolved mode so a caller can decide
/// whether to prepend the result to its own pipeline or replace it outright.
pub fn normalize_with_mode(raw: &str, mode: AdvancedConfigMode) -> (AdvancedConfigMode, Vec<Handler>) {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!("ignoring malformed advanced_config: {err}");
            return (mode, Vec::new());
        }
    };

    let entries: Vec<Value> = match parsed {
        Value::Object(_) => vec![parsed],
        Value::Array(items) => items,
        _ => {
            tracing::warn!("ignoring advanced_config: expected an object or array of objects");
            return (mode, Vec::new());
        }
    };

    let mut handlers = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Object(mut obj) = entry else {
            tracing::warn!("ignoring non-object advanced_config entry");
            continue;
        };
        if !is_recognized_handler(&obj) {
            tracing::warn!(
                "ignoring advanced_config entry without a handler field outside subroute context"
            );
            continue;
        }
        canonicalize_header_locations(&mut obj);
        match serde_json::from_value::<Handler>(Value::Object(obj)) {
            Ok(handler) => handlers.push(handler),
            Err(err) => tracing::warn!("ignoring unparseable advanced_config handler: {err}"),
        }
    }

    (mode, handlers)
}

/// Reads `host.advanced_config.ruleset_name` defensively, as a fallback WAF
/// ruleset hint below the `application` field: any parse failure or type
/// mismatch yields `None` rather than an error.
#[must_use]
pub fn ruleset_name_hint(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let obj = match value {
        Value::Object(obj) => obj,
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Object(obj) if obj.contains_key("ruleset_name") => Some(obj),
            _ => None,
        })?,
        _ => return None,
    };
    obj.get("ruleset_name")?.as_str().map(str::to_string)
}

fn is_recognized_handler(obj: &Map<String, Value>) -> bool {
    obj.get("handler").and_then(Value::as_str).is_some()
}

fn canonicalize_header_locations(obj: &mut Map<String, Value>) {
    if let Some(Value::Object(req)) = obj.get_mut("request") {
        canonicalize_set_block(req);
    }
    if let Some(Value::Object(resp)) = obj.get_mut("response") {
        canonicalize_set_block(resp);
    }
    if let Some(Value::Object(headers)) = obj.get_mut("headers") {
        if let Some(Value::Object(req)) = headers.get_mut("request") {
            canonicalize_set_block(req);
        }
        if let Some(Value::Object(resp)) = headers.get_mut("response") {
            canonicalize_set_block(resp);
        }
    }
    // nested handle[*] of a subroute fragment
    if let Some(Value::Array(handle)) = obj.get_mut("handle") {
        for item in handle.iter_mut() {
            if let Value::Object(inner) = item {
                canonicalize_header_locations(inner);
            }
        }
    }
    if let Some(Value::Array(routes)) = obj.get_mut("routes") {
        for route in routes.iter_mut() {
            if let Value::Object(route_obj) = route
                && let Some(Value::Array(handle)) = route_obj.get_mut("handle")
            {
                for item in handle.iter_mut() {
                    if let Value::Object(inner) = item {
                        canonicalize_header_locations(inner);
                    }
                }
            }
        }
    }
}

fn canonicalize_set_block(block: &mut Map<String, Value>) {
    let Some(Value::Object(set_map)) = block.get_mut("set") else {
        return;
    };
    for value in set_map.values_mut() {
        if let Some(list) = canonicalize_header_value(value) {
            *value = Value::Array(list.into_iter().map(Value::String).collect());
        }
    }
}

/// Coerces a scalar header value to a single-element array of its string
/// form; an existing array is kept, with its elements coerced to strings.
/// Returns `None` (leaving the value untouched) for anything else.
fn canonicalize_header_value(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Number(n) => Some(vec![n.to_string()]),
        Value::Bool(b) => Some(vec![b.to_string()]),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_json_is_ignored() {
        assert!(normalize("not json").is_empty());
    }

    #[test]
    fn scalar_fragment_is_ignored() {
        assert!(normalize("42").is_empty());
    }

    #[test]
    fn object_without_handler_field_is_ignored() {
        assert!(normalize(r#"{"foo": "bar"}"#).is_empty());
    }

    #[test]
    fn scalar_header_value_promoted_to_array() {
        let handlers = normalize(
            r#"{"handler":"headers","response":{"set":{"X-Frame-Options":"DENY"}}}"#,
        );
        assert_eq!(handlers.len(), 1);
        let Handler::Headers(h) = &handlers[0] else {
            panic!("expected headers handler");
        };
        assert_eq!(h.response.as_ref().unwrap().set["X-Frame-Options"], vec!["DENY"]);
    }

    #[test]
    fn array_header_value_preserved_losslessly() {
        let handlers = normalize(
            r#"{"handler":"headers","response":{"set":{"Vary":["Accept-Encoding","Cookie"]}}}"#,
        );
        let Handler::Headers(h) = &handlers[0] else {
            panic!("expected headers handler");
        };
        assert_eq!(
            h.response.as_ref().unwrap().set["Vary"],
            vec!["Accept-Encoding", "Cookie"]
        );
    }

    #[test]
    fn array_of_handlers_all_processed() {
        let handlers = normalize(
            r#"[{"handler":"rewrite","uri":"/a"},{"handler":"rewrite","uri":"/b"}]"#,
        );
        assert_eq!(handlers.len(), 2);
    }

    #[test]
    fn ruleset_name_hint_reads_nested_field() {
        let hint = ruleset_name_hint(r#"{"handler":"waf","ruleset_name":"custom-crs"}"#);
        assert_eq!(hint.as_deref(), Some("custom-crs"));
    }

    #[test]
    fn ruleset_name_hint_is_none_on_garbage() {
        assert!(ruleset_name_hint("not json").is_none());
        assert!(ruleset_name_hint(r#"{"no_hint_here": true}"#).is_none());
    }
}
