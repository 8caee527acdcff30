//! Deterministic structured-data parsing: json, csv and line-oriented input
//! normalized into rows plus warnings. Pure text processing, no I/O.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StructuredFormat {
    #[default]
    Json,
    Csv,
    Lines,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredParseResponse {
    pub parsed: Vec<Value>,
    pub warnings: Vec<String>,
}

impl StructuredParseResponse {
    fn empty_with_warning(warning: impl Into<String>) -> Self {
        Self {
            parsed: vec![],
            warnings: vec![warning.into()],
        }
    }
}

pub fn parse_structured(
    raw_text: &str,
    format: StructuredFormat,
    delimiter: Option<&str>,
    column_names: Option<&[String]>,
    required_fields: Option<&[String]>,
) -> StructuredParseResponse {
    if raw_text.trim().is_empty() {
        return StructuredParseResponse::empty_with_warning("Input text is empty");
    }

    match format {
        StructuredFormat::Json => parse_json(raw_text, required_fields),
        StructuredFormat::Csv => parse_csv(raw_text, delimiter, column_names, required_fields),
        StructuredFormat::Lines => parse_lines(raw_text, delimiter, column_names, required_fields),
    }
}

fn parse_json(raw_text: &str, required_fields: Option<&[String]>) -> StructuredParseResponse {
    let decoded: Value = match serde_json::from_str(raw_text) {
        Ok(value) => value,
        Err(e) => {
            return StructuredParseResponse::empty_with_warning(format!("JSON decode error: {}", e));
        }
    };
    let parsed = match decoded {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut warnings = Vec::new();
    let parsed = ensure_required_fields(parsed, required_fields, &mut warnings);
    StructuredParseResponse { parsed, warnings }
}

fn parse_csv(
    raw_text: &str,
    delimiter: Option<&str>,
    column_names: Option<&[String]>,
    required_fields: Option<&[String]>,
) -> StructuredParseResponse {
    let delimiter = delimiter.and_then(|d| d.chars().next()).unwrap_or(',');
    let rows: Vec<Vec<String>> = raw_text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| split_csv_line(line, delimiter))
        .collect();
    if rows.is_empty() {
        return StructuredParseResponse::empty_with_warning("CSV input contains no rows");
    }

    let (header, data_rows): (Vec<String>, &[Vec<String>]) = match column_names {
        Some(names) => (names.to_vec(), &rows[..]),
        None => (rows[0].clone(), &rows[1..]),
    };

    let mut parsed = Vec::with_capacity(data_rows.len());
    for row in data_rows {
        let mut entry = serde_json::Map::new();
        for (col_index, column) in header.iter().enumerate() {
            let cell = row.get(col_index).cloned().unwrap_or_default();
            entry.insert(column.clone(), Value::String(cell));
        }
        parsed.push(Value::Object(entry));
    }

    let mut warnings = Vec::new();
    let parsed = ensure_required_fields(parsed, required_fields, &mut warnings);
    StructuredParseResponse { parsed, warnings }
}

fn parse_lines(
    raw_text: &str,
    delimiter: Option<&str>,
    column_names: Option<&[String]>,
    required_fields: Option<&[String]>,
) -> StructuredParseResponse {
    let delimiter = delimiter.unwrap_or("\n");
    let lines: Vec<&str> = raw_text
        .split(delimiter)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return StructuredParseResponse::empty_with_warning("No line entries found");
    }

    let mut parsed = Vec::with_capacity(lines.len());
    for line in lines {
        let mut entry = serde_json::Map::new();
        match column_names {
            Some([first, rest @ ..]) => {
                entry.insert(first.clone(), Value::String(line.to_string()));
                for extra in rest {
                    entry.insert(extra.clone(), Value::String(String::new()));
                }
            }
            _ => {
                entry.insert("line".to_string(), Value::String(line.to_string()));
            }
        }
        parsed.push(Value::Object(entry));
    }

    let mut warnings = Vec::new();
    let parsed = ensure_required_fields(parsed, required_fields, &mut warnings);
    StructuredParseResponse { parsed, warnings }
}

/// Minimal quote-aware csv field splitting: double quotes group fields,
/// doubled quotes escape themselves.
fn split_csv_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

fn ensure_required_fields(
    parsed: Vec<Value>,
    required_fields: Option<&[String]>,
    warnings: &mut Vec<String>,
) -> Vec<Value> {
    let Some(required) = required_fields else {
        return parsed;
    };
    if required.is_empty() {
        return parsed;
    }
    for (idx, entry) in parsed.iter().enumerate() {
        let Value::Object(map) = entry else {
            warnings.push(format!(
                "Entry {} is not an object; skipping field validation",
                idx + 1
            ));
            continue;
        };
        let missing: Vec<&String> = required
            .iter()
            .filter(|field| {
                map.get(field.as_str())
                    .map(|v| matches!(v, Value::Null) || v.as_str() == Some(""))
                    .unwrap_or(true)
            })
            .collect();
        if !missing.is_empty() {
            warnings.push(format!("Entry {} missing fields: {:?}", idx + 1, missing));
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_empty_input() {
        let response = parse_structured("  ", StructuredFormat::Json, None, None, None);
        assert!(response.parsed.is_empty());
        assert_eq!(response.warnings, vec!["Input text is empty".to_string()]);
    }

    #[test]
    fn test_json_array_and_scalar() {
        let response =
            parse_structured(r#"[{"a": 1}, {"a": 2}]"#, StructuredFormat::Json, None, None, None);
        assert_eq!(response.parsed, vec![json!({"a": 1}), json!({"a": 2})]);
        assert!(response.warnings.is_empty());

        // A single object is wrapped in a one-element list
        let response = parse_structured(r#"{"a": 1}"#, StructuredFormat::Json, None, None, None);
        assert_eq!(response.parsed, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_json_decode_error() {
        let response = parse_structured("{broken", StructuredFormat::Json, None, None, None);
        assert!(response.parsed.is_empty());
        assert!(response.warnings[0].starts_with("JSON decode error"));
    }

    #[test]
    fn test_csv_with_header() {
        let response = parse_structured(
            "name,price\napple,1.20\nbanana,0.50",
            StructuredFormat::Csv,
            None,
            None,
            None,
        );
        assert_eq!(
            response.parsed,
            vec![
                json!({"name": "apple", "price": "1.20"}),
                json!({"name": "banana", "price": "0.50"}),
            ]
        );
    }

    #[test]
    fn test_csv_with_supplied_columns_and_short_rows() {
        let columns = vec!["name".to_string(), "price".to_string()];
        let response = parse_structured(
            "apple;1.20\nbanana",
            StructuredFormat::Csv,
            Some(";"),
            Some(&columns),
            None,
        );
        assert_eq!(
            response.parsed,
            vec![
                json!({"name": "apple", "price": "1.20"}),
                json!({"name": "banana", "price": ""}),
            ]
        );
    }

    #[test]
    fn test_csv_quoted_fields() {
        let response = parse_structured(
            "name,desc\nwidget,\"a, quoted \"\"thing\"\"\"",
            StructuredFormat::Csv,
            None,
            None,
            None,
        );
        assert_eq!(
            response.parsed,
            vec![json!({"name": "widget", "desc": "a, quoted \"thing\""})]
        );
    }

    #[test]
    fn test_lines_default_and_named() {
        let response =
            parse_structured("one\n\ntwo", StructuredFormat::Lines, None, None, None);
        assert_eq!(
            response.parsed,
            vec![json!({"line": "one"}), json!({"line": "two"})]
        );

        let columns = vec!["value".to_string(), "note".to_string()];
        let response =
            parse_structured("one|two", StructuredFormat::Lines, Some("|"), Some(&columns), None);
        assert_eq!(
            response.parsed,
            vec![
                json!({"value": "one", "note": ""}),
                json!({"value": "two", "note": ""}),
            ]
        );
    }

    #[test]
    fn test_required_field_warnings() {
        let required = vec!["price".to_string()];
        let response = parse_structured(
            r#"[{"name": "apple"}, {"name": "pear", "price": "1"}]"#,
            StructuredFormat::Json,
            None,
            None,
            Some(&required),
        );
        assert_eq!(response.warnings.len(), 1);
        assert!(response.warnings[0].contains("Entry 1"));
    }
}
