//! Sensitive-field redaction for anything that reaches the log pipeline.
//!
//! Works on `serde_json::Value` trees. Any object key that contains one of
//! [`SENSITIVE_KEYWORDS`] (case-insensitive) has its value replaced by
//! [`REDACTION_MARKER`]. The input is never mutated; a redacted copy is
//! returned.

use serde::Serialize;
use serde_json::{Map, Value};

pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Key fragments that mark a field as secret. `zelidauth`, `zelid` and
/// `loginphrase` are the Flux platform's credential fields.
pub const SENSITIVE_KEYWORDS: &[&str] = &[
    "token",
    "password",
    "signature",
    "zelidauth",
    "zelid",
    "loginphrase",
];

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Return a redacted copy of `value`.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted: Map<String, Value> = map
                .iter()
                .map(|(key, val)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String(REDACTION_MARKER.to_string()))
                    } else {
                        (key.clone(), redact(val))
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        scalar => scalar.clone(),
    }
}

/// Serialize `data` and redact the result. Values that fail to serialize
/// collapse to `null` rather than leaking their `Debug` form.
pub fn redact_serializable<T: Serialize + ?Sized>(data: &T) -> Value {
    match serde_json::to_value(data) {
        Ok(value) => redact(&value),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_nested_keys_case_insensitively() {
        let input = json!({
            "node": "IP1-node01",
            "ZelIDAuth": "abc",
            "session": {
                "accessToken": "t0k3n",
                "user": { "Password": "hunter2", "name": "ops" }
            },
            "steps": [ { "signatureHex": "ff" }, { "ok": true } ]
        });

        let out = redact(&input);

        assert_eq!(out["node"], "IP1-node01");
        assert_eq!(out["ZelIDAuth"], REDACTION_MARKER);
        assert_eq!(out["session"]["accessToken"], REDACTION_MARKER);
        assert_eq!(out["session"]["user"]["Password"], REDACTION_MARKER);
        assert_eq!(out["session"]["user"]["name"], "ops");
        assert_eq!(out["steps"][0]["signatureHex"], REDACTION_MARKER);
        assert_eq!(out["steps"][1]["ok"], true);
    }

    #[test]
    fn sensitive_subtree_is_replaced_whole() {
        let input = json!({ "tokens": { "a": 1, "b": [1, 2] } });
        assert_eq!(redact(&input), json!({ "tokens": REDACTION_MARKER }));
    }

    #[test]
    fn source_is_untouched_and_redaction_is_idempotent() {
        let input = json!({ "loginPhrase": "1700000000abc", "list": [{ "zelid": "1Abc" }] });
        let before = input.clone();

        let once = redact(&input);
        let twice = redact(&once);

        assert_eq!(input, before);
        assert_eq!(once, twice);
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(redact(&json!("token")), json!("token"));
        assert_eq!(redact(&json!(42)), json!(42));
        assert_eq!(redact(&Value::Null), Value::Null);
    }

    #[test]
    fn serializable_structs_are_redacted() {
        #[derive(Serialize)]
        struct AuthState {
            logged_in: bool,
            token: Option<String>,
        }

        let out = redact_serializable(&AuthState {
            logged_in: true,
            token: Some("secret".into()),
        });
        assert_eq!(out, json!({ "logged_in": true, "token": REDACTION_MARKER }));
    }
}
