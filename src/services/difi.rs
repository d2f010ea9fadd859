//! DiFi: the site's batched JSON RPC endpoint (`global/difi.php`).
//!
//! A request carries one or more `c[]` call strings
//! (`Class;method;arg1,arg2,...`); the response wraps each call's result in
//! a status envelope:
//!
//! ```json
//! {"DiFi": {"status": "SUCCESS",
//!           "response": {"calls": [{"response": {"status": "SUCCESS",
//!                                                "content": ...}}]}}}
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};

pub const DIFI_PATH: &str = "/global/difi.php";

const SUCCESS: &str = "SUCCESS";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "DiFi")]
    difi: Batch,
}

#[derive(Debug, Deserialize)]
struct Batch {
    status: String,
    #[serde(default)]
    response: Option<BatchResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    calls: Vec<Call>,
}

#[derive(Debug, Deserialize)]
struct Call {
    response: CallResponse,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    status: String,
    #[serde(default)]
    content: Value,
}

/// Query parameters for a batch of calls.
pub fn query_params(calls: &[String]) -> Vec<(&'static str, &str)> {
    let mut params: Vec<(&'static str, &str)> =
        calls.iter().map(|c| ("c[]", c.as_str())).collect();
    params.push(("t", "json"));
    params
}

/// `Class;method` part of a call string, used as error context.
pub fn method_name(call: &str) -> &str {
    match call.match_indices(';').nth(1) {
        Some((idx, _)) => &call[..idx],
        None => call,
    }
}

/// Validate a DiFi response and return each call's content, in call order.
pub fn parse_response(body: &str, calls: &[String]) -> Result<Vec<Value>> {
    let context = calls
        .first()
        .map(|c| method_name(c).to_string())
        .unwrap_or_else(|| "DiFi".to_string());

    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| AppError::parse(&context, e))?;

    if envelope.difi.status != SUCCESS {
        return Err(AppError::upstream(
            &context,
            format!("DiFi request failed with status {}", envelope.difi.status),
        ));
    }

    let returned = envelope.difi.response.map(|r| r.calls).unwrap_or_default();
    if returned.len() != calls.len() {
        return Err(AppError::parse(
            &context,
            format!("expected {} call results, got {}", calls.len(), returned.len()),
        ));
    }

    returned
        .into_iter()
        .zip(calls)
        .map(|(call, name)| {
            if call.response.status != SUCCESS {
                Err(AppError::upstream(
                    method_name(name),
                    format!(
                        "call failed with status {}: {}",
                        call.response.status,
                        describe_failure(&call.response.content)
                    ),
                ))
            } else {
                Ok(call.response.content)
            }
        })
        .collect()
}

fn describe_failure(content: &Value) -> String {
    content
        .pointer("/error/human")
        .or_else(|| content.get("error"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| content.to_string())
}

/// Read an id that upstream sends either as a string or as a number.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read an integer that upstream sends either as a string or as a number.
pub fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a string field, treating null and absence as empty.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
