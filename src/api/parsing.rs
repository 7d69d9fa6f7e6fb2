//! Extraction helpers for API Gateway proxy events (payload v1 and v2).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::errors::AdminConfigError;

pub fn v_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

pub fn v_str<'a>(root: &'a Value, path: &[&str]) -> Option<&'a str> {
    v_path(root, path).and_then(|v| v.as_str())
}

/// HTTP method, upper-cased.
pub fn request_method(payload: &Value) -> Option<String> {
    v_str(payload, &["requestContext", "http", "method"])
        .or_else(|| v_str(payload, &["httpMethod"]))
        .map(str::to_ascii_uppercase)
}

/// Request path, lower-cased and without a trailing slash.
pub fn request_path(payload: &Value) -> Option<String> {
    v_str(payload, &["rawPath"])
        .or_else(|| v_str(payload, &["path"]))
        .map(|p| p.trim_end_matches('/').to_ascii_lowercase())
}

/// Looks up a query-string parameter, matching the name case-insensitively.
///
/// Prefers the pre-parsed `queryStringParameters` map and falls back to
/// decoding `rawQueryString`.
pub fn query_param(payload: &Value, name: &str) -> Option<String> {
    let parsed = payload
        .get("queryStringParameters")
        .and_then(Value::as_object)
        .and_then(|map| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .and_then(|(_, v)| v.as_str())
                .map(ToString::to_string)
        });
    if parsed.is_some() {
        return parsed;
    }

    v_str(payload, &["rawQueryString"])?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, raw)| {
            let raw = raw.replace('+', " ");
            urlencoding::decode(&raw).ok().map(|v| v.into_owned())
        })
}

/// Request body as text, decoding base64 when API Gateway flagged it.
pub fn request_body(payload: &Value) -> Result<String, AdminConfigError> {
    let Some(body) = v_str(payload, &["body"]) else {
        return Err(AdminConfigError::InvalidRequest("Missing body".to_string()));
    };

    let is_base64 = payload
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_base64 {
        return Ok(body.to_string());
    }

    let bytes = STANDARD
        .decode(body)
        .map_err(|e| AdminConfigError::InvalidRequest(format!("Invalid base64 body: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| AdminConfigError::InvalidRequest(format!("Body is not UTF-8: {e}")))
}
