//! Rendering of `CodexOptions::config` into `--config key=value` overrides.
//!
//! Nested objects are flattened into dotted keys; leaves are rendered as TOML
//! literals the CLI parses on its side.

use serde_json::{Map, Number, Value};

use crate::errors::CodexError;

/// Flattens a config object into `dotted.key=<toml>` strings, in insertion order.
pub fn serialize_config_overrides(config: &Map<String, Value>) -> Result<Vec<String>, CodexError> {
    let mut overrides = Vec::new();
    flatten_into(config, "", &mut overrides)?;
    Ok(overrides)
}

fn flatten_into(
    object: &Map<String, Value>,
    prefix: &str,
    out: &mut Vec<String>,
) -> Result<(), CodexError> {
    if object.is_empty() {
        if !prefix.is_empty() {
            out.push(format!("{prefix}={{}}"));
        }
        return Ok(());
    }

    for (key, value) in object {
        if key.is_empty() {
            return Err(empty_key());
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) => flatten_into(child, &path, out)?,
            leaf => {
                let rendered = to_config_value(leaf, &path)?;
                out.push(format!("{path}={rendered}"));
            }
        }
    }
    Ok(())
}

/// Renders one JSON value as a TOML literal.
///
/// `path` only feeds error messages.
pub fn to_config_value(value: &Value, path: &str) -> Result<String, CodexError> {
    match value {
        Value::String(text) => serde_json::to_string(text)
            .map_err(|err| CodexError::config(format!("config override at {path}: {err}"))),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Number(number) => render_number(number, path),
        Value::Array(values) => {
            let rendered = values
                .iter()
                .enumerate()
                .map(|(index, item)| to_config_value(item, &format!("{path}[{index}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", rendered.join(", ")))
        }
        Value::Object(entries) => {
            let mut parts = Vec::with_capacity(entries.len());
            for (key, child) in entries {
                if key.is_empty() {
                    return Err(empty_key());
                }
                let rendered = to_config_value(child, &format!("{path}.{key}"))?;
                parts.push(format!("{} = {rendered}", format_key(key)?));
            }
            Ok(format!("{{{}}}", parts.join(", ")))
        }
        Value::Null => Err(CodexError::config(format!(
            "config override at {path} cannot be null"
        ))),
    }
}

fn render_number(number: &Number, path: &str) -> Result<String, CodexError> {
    if let Some(int) = number.as_i64() {
        return Ok(int.to_string());
    }
    if let Some(int) = number.as_u64() {
        return Ok(int.to_string());
    }
    match number.as_f64() {
        Some(float) if float.is_finite() => Ok(format_float(float)),
        _ => Err(CodexError::config(format!(
            "config override at {path} must be a finite number"
        ))),
    }
}

/// Formats a float as a TOML float literal.
///
/// Integral values keep a `.0` so they stay floats on the CLI side. Magnitudes
/// outside `1e-4..1e16` use a signed two-digit exponent (`1e-07`, `1.5e+16`).
fn format_float(value: f64) -> String {
    let scientific = format!("{value:e}");
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };
    if (-4..16).contains(&exponent) {
        let plain = value.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    }
}

fn format_key(key: &str) -> Result<String, CodexError> {
    let bare = key
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if bare {
        Ok(key.to_string())
    } else {
        serde_json::to_string(key)
            .map_err(|err| CodexError::config(format!("config override key {key:?}: {err}")))
    }
}

fn empty_key() -> CodexError {
    CodexError::config("config override keys must be non-empty strings")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn flattens_nested_objects_into_dotted_keys() {
        let overrides = serialize_config_overrides(&object(json!({
            "approval_policy": "never",
            "sandbox_workspace_write": {"network_access": true},
            "empty": {},
        })))
        .expect("overrides");
        assert_eq!(
            overrides,
            vec![
                "approval_policy=\"never\"",
                "sandbox_workspace_write.network_access=true",
                "empty={}",
            ]
        );
        assert!(
            serialize_config_overrides(&Map::new())
                .expect("empty")
                .is_empty()
        );
    }

    #[test]
    fn floats_stay_toml_floats() {
        let cases = [
            (json!(1.0), "1.0"),
            (json!(1.5), "1.5"),
            (json!(-0.0), "-0.0"),
            (json!(0.0), "0.0"),
            (json!(0.0001), "0.0001"),
            (json!(1e-7), "1e-07"),
            (json!(2.5e-5), "2.5e-05"),
            (json!(1e15), "1000000000000000.0"),
            (json!(1e16), "1e+16"),
            (json!(1.5e300), "1.5e+300"),
            (json!(42), "42"),
        ];
        for (value, expected) in cases {
            assert_eq!(to_config_value(&value, "value").expect("render"), expected);
        }
    }

    #[test]
    fn renders_inline_tables_with_quoted_keys_when_needed() {
        let value = json!({
            "plain": "value",
            "needs.dot": {"nested-key": [1, true, "x"]},
        });
        assert_eq!(
            to_config_value(&value, "value").expect("render"),
            r#"{plain = "value", "needs.dot" = {nested-key = [1, true, "x"]}}"#
        );
        assert_eq!(
            to_config_value(&json!("привет"), "value").expect("render"),
            "\"привет\""
        );
    }

    #[test]
    fn overrides_keep_caller_key_order() {
        let config: Map<String, Value> =
            serde_json::from_str(r#"{"zeta": 1, "alpha": {"b": 2, "a": 3}}"#).expect("parse");
        assert_eq!(
            serialize_config_overrides(&config).expect("overrides"),
            vec!["zeta=1", "alpha.b=2", "alpha.a=3"]
        );
    }

    #[test]
    fn rejects_null_and_empty_keys() {
        let err = to_config_value(&json!({"root": null}), "value").expect_err("null");
        assert_eq!(
            err,
            CodexError::Config("config override at value.root cannot be null".into())
        );

        let err = serialize_config_overrides(&object(json!({"": 1}))).expect_err("empty key");
        assert!(matches!(err, CodexError::Config(msg) if msg.contains("non-empty")));
    }
}
