//! Parameter template substitution.
//!
//! Step parameters may embed `{{<step_id>.response.data.<path>}}` tokens
//! (walk a dependency's JSON output) or `{{<named_input>}}` tokens (request
//! scoped values). A string that is exactly one token is replaced by the
//! resolved JSON value, so numbers stay numbers; tokens embedded in longer
//! strings are rendered as text. Unknown token shapes are rejected, not
//! passed through.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// Why substitution failed; all map to the `substitution_error` wire code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{{{{{token}}}}}' references unknown step or input '{reference}'")]
    UnknownReference { token: String, reference: String },
    #[error("template '{{{{{token}}}}}' path does not exist in the step output")]
    MissingPath { token: String },
    #[error("template '{{{{{token}}}}}' has an unsupported shape")]
    UnknownShape { token: String },
}

/// Values available to one step's substitution pass.
pub struct SubstitutionContext<'a> {
    /// Outputs of completed (successful) dependency steps, by step id.
    pub outputs: &'a HashMap<String, Value>,
    /// Request-scoped named inputs.
    pub inputs: &'a HashMap<String, Value>,
}

/// Resolves every template token in `parameters`.
pub fn resolve_parameters(
    parameters: &serde_json::Map<String, Value>,
    ctx: &SubstitutionContext<'_>,
) -> Result<serde_json::Map<String, Value>, TemplateError> {
    let mut resolved = serde_json::Map::with_capacity(parameters.len());
    for (key, value) in parameters {
        resolved.insert(key.clone(), resolve_value(value, ctx)?);
    }
    Ok(resolved)
}

fn resolve_value(value: &Value, ctx: &SubstitutionContext<'_>) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(s: &str, ctx: &SubstitutionContext<'_>) -> Result<Value, TemplateError> {
    let tokens = find_tokens(s);
    if tokens.is_empty() {
        return Ok(Value::String(s.to_string()));
    }

    // Exactly one token spanning the whole string: substitute the JSON value
    // itself so numeric outputs stay numeric.
    if tokens.len() == 1 && tokens[0].0 == 0 && tokens[0].1 == s.len() {
        return resolve_token(&tokens[0].2, ctx);
    }

    let mut rendered = String::with_capacity(s.len());
    let mut cursor = 0;
    for (start, end, token) in tokens {
        rendered.push_str(&s[cursor..start]);
        let value = resolve_token(&token, ctx)?;
        match value {
            Value::String(text) => rendered.push_str(&text),
            other => rendered.push_str(&other.to_string()),
        }
        cursor = end;
    }
    rendered.push_str(&s[cursor..]);
    Ok(Value::String(rendered))
}

/// `(start, end, inner)` for each `{{inner}}` occurrence.
fn find_tokens(s: &str) -> Vec<(usize, usize, String)> {
    let mut tokens = Vec::new();
    let mut cursor = 0;
    while let Some(open) = s[cursor..].find("{{") {
        let start = cursor + open;
        let Some(close) = s[start..].find("}}") else {
            break;
        };
        let end = start + close + 2;
        tokens.push((start, end, s[start + 2..end - 2].trim().to_string()));
        cursor = end;
    }
    tokens
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn resolve_token(token: &str, ctx: &SubstitutionContext<'_>) -> Result<Value, TemplateError> {
    let segments: Vec<&str> = token.split('.').collect();
    if !segments.iter().all(|s| is_identifier(s)) {
        return Err(TemplateError::UnknownShape {
            token: token.to_string(),
        });
    }

    if segments.len() == 1 {
        return ctx
            .inputs
            .get(segments[0])
            .cloned()
            .ok_or_else(|| TemplateError::UnknownReference {
                token: token.to_string(),
                reference: segments[0].to_string(),
            });
    }

    let step_id = segments[0];
    let output = ctx
        .outputs
        .get(step_id)
        .ok_or_else(|| TemplateError::UnknownReference {
            token: token.to_string(),
            reference: step_id.to_string(),
        })?;

    let mut current = output;
    for segment in &segments[1..] {
        current = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(|| TemplateError::MissingPath {
            token: token.to_string(),
        })?;
    }
    Ok(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(
        outputs: &'a HashMap<String, Value>,
        inputs: &'a HashMap<String, Value>,
    ) -> SubstitutionContext<'a> {
        SubstitutionContext { outputs, inputs }
    }

    fn geocode_outputs() -> HashMap<String, Value> {
        let mut outputs = HashMap::new();
        outputs.insert(
            "geocode".to_string(),
            json!({"success": true, "response": {"data": {"lat": 35.6762, "lon": 139.6503, "city": "Tokyo"}}}),
        );
        outputs
    }

    /// **Scenario**: a whole-string token substitutes the JSON value, so the
    /// geocoder's numeric latitude stays a number.
    #[test]
    fn whole_string_token_keeps_numbers_numeric() {
        let outputs = geocode_outputs();
        let inputs = HashMap::new();
        let mut params = serde_json::Map::new();
        params.insert("lat".into(), json!("{{geocode.response.data.lat}}"));
        params.insert("lon".into(), json!("{{geocode.response.data.lon}}"));

        let resolved = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap();
        assert_eq!(resolved["lat"], json!(35.6762));
        assert_eq!(resolved["lon"], json!(139.6503));
        assert!(resolved["lat"].is_number());
    }

    #[test]
    fn embedded_token_renders_as_text() {
        let outputs = geocode_outputs();
        let inputs = HashMap::new();
        let mut params = serde_json::Map::new();
        params.insert(
            "query".into(),
            json!("weather near {{geocode.response.data.city}} today"),
        );
        let resolved = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap();
        assert_eq!(resolved["query"], json!("weather near Tokyo today"));
    }

    #[test]
    fn named_input_resolves() {
        let outputs = HashMap::new();
        let mut inputs = HashMap::new();
        inputs.insert("city".to_string(), json!("Tokyo"));
        let mut params = serde_json::Map::new();
        params.insert("city".into(), json!("{{city}}"));
        let resolved = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap();
        assert_eq!(resolved["city"], json!("Tokyo"));
    }

    /// **Scenario**: a dangling path fails with a missing-path error rather
    /// than passing the token through.
    #[test]
    fn missing_path_is_an_error() {
        let outputs = geocode_outputs();
        let inputs = HashMap::new();
        let mut params = serde_json::Map::new();
        params.insert("alt".into(), json!("{{geocode.response.data.altitude}}"));
        let err = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap_err();
        assert!(matches!(err, TemplateError::MissingPath { .. }));
    }

    #[test]
    fn unknown_step_is_an_error() {
        let outputs = HashMap::new();
        let inputs = HashMap::new();
        let mut params = serde_json::Map::new();
        params.insert("lat".into(), json!("{{ghost.response.data.lat}}"));
        let err = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap_err();
        assert!(
            matches!(err, TemplateError::UnknownReference { reference, .. } if reference == "ghost")
        );
    }

    /// **Scenario**: unsupported shapes (indexing syntax, spaces) are
    /// rejected instead of silently passed along.
    #[test]
    fn unknown_shape_is_rejected() {
        let outputs = geocode_outputs();
        let inputs = HashMap::new();
        for bad in ["{{geocode.response.data[0]}}", "{{geocode step}}"] {
            let mut params = serde_json::Map::new();
            params.insert("x".into(), json!(bad));
            let err = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap_err();
            assert!(matches!(err, TemplateError::UnknownShape { .. }), "{bad}");
        }
    }

    #[test]
    fn arrays_and_nested_objects_are_resolved() {
        let outputs = geocode_outputs();
        let inputs = HashMap::new();
        let mut params = serde_json::Map::new();
        params.insert(
            "points".into(),
            json!([{"lat": "{{geocode.response.data.lat}}"}, "plain"]),
        );
        let resolved = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap();
        assert_eq!(resolved["points"][0]["lat"], json!(35.6762));
        assert_eq!(resolved["points"][1], json!("plain"));
    }

    #[test]
    fn array_index_segments_walk_arrays() {
        let mut outputs = HashMap::new();
        outputs.insert(
            "search".to_string(),
            json!({"response": {"data": {"hits": [{"id": "first"}, {"id": "second"}]}}}),
        );
        let inputs = HashMap::new();
        let mut params = serde_json::Map::new();
        params.insert("top".into(), json!("{{search.response.data.hits.0.id}}"));
        let resolved = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap();
        assert_eq!(resolved["top"], json!("first"));
    }

    #[test]
    fn plain_values_pass_through_untouched() {
        let outputs = HashMap::new();
        let inputs = HashMap::new();
        let mut params = serde_json::Map::new();
        params.insert("n".into(), json!(42));
        params.insert("s".into(), json!("no templates here"));
        let resolved = resolve_parameters(&params, &ctx(&outputs, &inputs)).unwrap();
        assert_eq!(resolved["n"], json!(42));
        assert_eq!(resolved["s"], json!("no templates here"));
    }
}
