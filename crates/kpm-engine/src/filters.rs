//! Kubernetes-oriented filters for expression templates

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use sha2::{Digest, Sha256};

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.to_string())
}

/// Serialize a value as YAML
///
/// Usage: {{ params.variables.labels | toyaml | nindent(4) }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    let yaml = serde_yaml::to_string(&json).map_err(invalid)?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Serialize a value as compact JSON
///
/// Usage: {{ params.shard | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    let json: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    serde_json::to_string(&json).map_err(invalid)
}

/// Usage: {{ params.variables.password | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;
    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

/// Wrap in double quotes, escaping as needed
#[must_use]
pub fn quote(value: Value) -> String {
    let s = value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[must_use]
pub fn squote(value: Value) -> String {
    let s = value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    format!("'{}'", s.replace('\'', "''"))
}

/// Indent every line, prefixed with a newline
///
/// Usage: {{ block | nindent(4) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Indent every non-empty line
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fail rendering when a value is missing or empty
///
/// Usage: {{ params.variables.host | required("host is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

/// Hex SHA256 of a string, handy for config checksums
#[must_use]
pub fn sha256sum(value: String) -> String {
    hex_digest(Sha256::digest(value.as_bytes()).as_slice())
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Truncate to at most `length` characters
///
/// Usage: {{ name | trunc(63) }}
#[must_use]
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

#[must_use]
pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

#[must_use]
pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

/// Register every filter on an environment
pub fn register(env: &mut minijinja::Environment<'_>) {
    env.add_filter("toyaml", toyaml);
    env.add_filter("tojson", tojson);
    env.add_filter("b64encode", b64encode);
    env.add_filter("b64decode", b64decode);
    env.add_filter("quote", quote);
    env.add_filter("squote", squote);
    env.add_filter("nindent", nindent);
    env.add_filter("indent", indent);
    env.add_filter("required", required);
    env.add_filter("sha256", sha256sum);
    env.add_filter("trunc", trunc);
    env.add_filter("trimprefix", trimprefix);
    env.add_filter("trimsuffix", trimsuffix);
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::{Environment, context};

    fn render(template: &str, ctx: minijinja::Value) -> String {
        let mut env = Environment::new();
        register(&mut env);
        env.render_str(template, ctx).unwrap()
    }

    #[test]
    fn test_toyaml() {
        let out = render(
            "{{ labels | toyaml }}",
            context! { labels => serde_json::json!({"app": "web"}) },
        );
        assert_eq!(out, "app: web");
    }

    #[test]
    fn test_tojson() {
        let out = render("{{ v | tojson }}", context! { v => serde_json::json!({"a": [1, 2]}) });
        assert_eq!(out, r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_b64_roundtrip() {
        assert_eq!(b64encode("hello".to_string()), "aGVsbG8=");
        assert_eq!(b64decode("aGVsbG8=".to_string()).unwrap(), "hello");
        assert!(b64decode("!!!".to_string()).is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("say \"hi\"")), r#""say \"hi\"""#);
        assert_eq!(quote(Value::from(3)), "\"3\"");
        assert_eq!(squote(Value::from("it's")), "'it''s'");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n\n  b");
        assert_eq!(nindent("a: 1".to_string(), 4), "\n    a: 1");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("x"), None).is_ok());
        assert!(required(Value::from(""), None).is_err());
        let err = required(Value::UNDEFINED, Some("host is required".into())).unwrap_err();
        assert!(err.to_string().contains("host is required"));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(trunc("abcdef".to_string(), 3), "abc");
        assert_eq!(trimprefix("v1.2".to_string(), "v".to_string()), "1.2");
        assert_eq!(trimsuffix("web.yaml".to_string(), ".yaml".to_string()), "web");
        assert_eq!(
            sha256sum("abc".to_string()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
