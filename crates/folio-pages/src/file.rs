//! Markdown file codec: `+++`-delimited TOML frontmatter and a body.
//!
//! ```text
//! +++
//! title = "About"
//! +++
//! Body text
//! ```
//!
//! The body is stored in the `markdown` field; every other field goes into
//! the frontmatter. JSON `null` has no TOML form and is dropped on write.

use folio_store::{StoreError, StoreResult};
use folio_types::RowData;
use serde_json::Value;

/// Row field holding the file body.
pub const BODY_FIELD: &str = "markdown";

const DELIMITER: &str = "+++";

/// Split a raw file into its frontmatter (without delimiters) and body.
///
/// A file that does not open with the delimiter line, or never closes it,
/// is all body.
pub fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = strip_delimiter_line(raw) else {
        return (None, raw);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == DELIMITER {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(header), body);
        }
        offset += line.len();
    }
    (None, raw)
}

fn strip_delimiter_line(raw: &str) -> Option<&str> {
    let rest = raw.strip_prefix(DELIMITER)?;
    rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))
}

/// Encode a row payload as file contents.
pub fn encode(data: &RowData) -> StoreResult<String> {
    let mut header = toml::Table::new();
    let mut body = String::new();

    for (field, value) in data {
        if field == BODY_FIELD {
            if let Value::String(text) = value {
                body.push_str(text);
                continue;
            }
        }
        if let Some(value) = json_to_toml(value)? {
            header.insert(field.clone(), value);
        }
    }

    if header.is_empty() {
        // A body that looks like frontmatter needs an empty header in front.
        if split_frontmatter(&body).0.is_some() {
            return Ok(format!("{DELIMITER}\n{DELIMITER}\n{body}"));
        }
        return Ok(body);
    }

    let header = toml::to_string(&header)
        .map_err(|e| StoreError::Serialization(format!("frontmatter: {e}")))?;
    Ok(format!("{DELIMITER}\n{header}{DELIMITER}\n{body}"))
}

/// Decode file contents into a row payload.
pub fn decode(raw: &str) -> StoreResult<RowData> {
    let (header, body) = split_frontmatter(raw);
    let mut data = RowData::new();

    if let Some(header) = header {
        let table: toml::Table = toml::from_str(header)
            .map_err(|e| StoreError::Serialization(format!("frontmatter: {e}")))?;
        for (field, value) in table {
            data.insert(field, toml_to_json(value));
        }
    }

    data.insert(BODY_FIELD.to_string(), Value::String(body.to_string()));
    Ok(data)
}

fn json_to_toml(value: &Value) -> StoreResult<Option<toml::Value>> {
    Ok(Some(match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                toml::Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                toml::Value::Float(f)
            } else {
                return Err(StoreError::Serialization(format!(
                    "number {n} does not fit in frontmatter"
                )));
            }
        }
        Value::String(s) => toml::Value::String(s.clone()),
        Value::Array(items) => {
            let mut array = Vec::with_capacity(items.len());
            for item in items {
                if let Some(item) = json_to_toml(item)? {
                    array.push(item);
                }
            }
            toml::Value::Array(array)
        }
        Value::Object(map) => {
            let mut table = toml::Table::new();
            for (k, v) in map {
                if let Some(v) = json_to_toml(v)? {
                    table.insert(k.clone(), v);
                }
            }
            toml::Value::Table(table)
        }
    }))
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> RowData {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn split_with_frontmatter() {
        let raw = "+++\ntitle = \"About\"\n+++\nHello\n";
        let (header, body) = split_frontmatter(raw);
        assert_eq!(header, Some("title = \"About\"\n"));
        assert_eq!(body, "Hello\n");
    }

    #[test]
    fn split_without_frontmatter() {
        let raw = "Just text\n+++\n";
        assert_eq!(split_frontmatter(raw), (None, raw));
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let raw = "+++\ntitle = 1\n";
        assert_eq!(split_frontmatter(raw), (None, raw));
    }

    #[test]
    fn crlf_delimiters() {
        let raw = "+++\r\ntitle = \"x\"\r\n+++\r\nbody";
        let (header, body) = split_frontmatter(raw);
        assert_eq!(header, Some("title = \"x\"\r\n"));
        assert_eq!(body, "body");
    }

    #[test]
    fn encode_then_decode() {
        let row = data(json!({
            "title": "News",
            "published": true,
            "taxonomy": {"tag": ["rust", "cms"]},
            "markdown": "# News\n",
        }));
        let raw = encode(&row).unwrap();
        assert!(raw.starts_with("+++\n"));
        assert!(raw.ends_with("+++\n# News\n"));
        assert_eq!(decode(&raw).unwrap(), row);
    }

    #[test]
    fn nulls_are_dropped() {
        let row = data(json!({"title": "x", "summary": null, "list": [1, null, 2]}));
        let decoded = decode(&encode(&row).unwrap()).unwrap();
        assert!(!decoded.contains_key("summary"));
        assert_eq!(decoded["list"], json!([1, 2]));
    }

    #[test]
    fn body_only_file() {
        let row = data(json!({"markdown": "plain"}));
        let raw = encode(&row).unwrap();
        assert_eq!(raw, "plain");
        assert_eq!(decode(&raw).unwrap(), row);
    }

    #[test]
    fn body_resembling_frontmatter_survives() {
        let row = data(json!({"markdown": "+++\nx = 1\n+++\nhello"}));
        let raw = encode(&row).unwrap();
        assert_eq!(raw, "+++\n+++\n+++\nx = 1\n+++\nhello");
        assert_eq!(decode(&raw).unwrap(), row);
    }

    #[test]
    fn non_string_body_goes_to_frontmatter() {
        let row = data(json!({"markdown": 5}));
        let raw = encode(&row).unwrap();
        assert!(raw.contains("markdown = 5"));
    }

    #[test]
    fn invalid_frontmatter_is_a_serialization_error() {
        let err = decode("+++\nnot toml\n+++\n").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn datetimes_decode_as_strings() {
        let decoded = decode("+++\ndate = 2024-05-01T10:00:00Z\n+++\n").unwrap();
        assert_eq!(decoded["date"], json!("2024-05-01T10:00:00Z"));
    }
}
