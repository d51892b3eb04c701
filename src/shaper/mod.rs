// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turning function results into HTTP responses.
//!
//! A function result is a JSON object shaped like
//!
//! ```json
//! {
//!   "statusCode": 200,
//!   "headers": { "content-type": "text/plain" },
//!   "multiValueHeaders": { "set-cookie": ["a=1", "b=2"] },
//!   "body": "hello",
//!   "isBase64Encoded": false
//! }
//! ```

pub mod ansi;
mod scheduled;


use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use hyper::header::{self, HeaderName, HeaderValue};
use serde_json::{Map, Value, json};

use crate::core::DevResponse;
use crate::functions::{InvocationError, InvocationResult};

pub use scheduled::help_response;

const RECOGNIZED_KEYS: [&str; 6] = [
    "statusCode",
    "headers",
    "multiValueHeaders",
    "body",
    "isBase64Encoded",
    "metadata",
];

/// Request details the shaper needs.
#[derive(Debug, Clone, Copy)]
pub struct ShapeContext<'a> {
    pub request_id: &'a str,
    pub accept: Option<&'a str>,
    /// Reached through the builders namespace
    pub builder: bool,
    pub function_name: &'a str,
}

/// A validated function result.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub status: u16,
    /// Header name and its values, in result order
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Bytes,
    pub ignored_keys: Vec<String>,
    pub builder_function: bool,
}

/// Validate a raw result. The error string is shown to the developer.
pub fn parse_result(value: &Value) -> Result<FunctionResponse, String> {
    let object = match value {
        Value::Object(object) => object,
        other => return Err(format!("Your function response must be an object. You gave: {other}")),
    };

    let status = match object.get("statusCode") {
        None | Some(Value::Null) => 200,
        Some(raw) => parse_status(raw).ok_or_else(|| {
            format!(
                "Your function response must have a numerical statusCode. You gave: {}",
                display_value(raw)
            )
        })?,
    };

    let body_text = match object.get("body") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(format!(
                "Your function response must have a string body. You gave: {}",
                display_value(other)
            ));
        }
    };

    let is_base64 = object
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let body = if is_base64 {
        STANDARD
            .decode(body_text.trim())
            .map(Bytes::from)
            .map_err(|e| format!("Your function returned an invalid base64 body: {e}"))?
    } else {
        Bytes::from(body_text)
    };

    let ignored_keys = object
        .keys()
        .filter(|k| !RECOGNIZED_KEYS.contains(&k.as_str()))
        .cloned()
        .collect();

    let builder_function = object
        .get("metadata")
        .and_then(|m| m.get("builder_function"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(FunctionResponse {
        status,
        headers: merge_headers(object),
        body,
        ignored_keys,
        builder_function,
    })
}

/// Accept integers and numeric strings in the HTTP status range.
pub(crate) fn parse_status(raw: &Value) -> Option<u16> {
    let n = match raw {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u16::try_from(n).ok().filter(|s| (100..=599).contains(s))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `multiValueHeaders` win over `headers` for the same (case-insensitive) name.
fn merge_headers(object: &Map<String, Value>) -> Vec<(String, Vec<String>)> {
    let mut merged: Vec<(String, Vec<String>)> = Vec::new();

    if let Some(Value::Object(single)) = object.get("headers") {
        for (name, value) in single {
            match scalar_to_string(value) {
                Some(v) => merged.push((name.to_ascii_lowercase(), vec![v])),
                None => log::warn!("Ignoring non-scalar value for header '{}'", name),
            }
        }
    }

    if let Some(Value::Object(multi)) = object.get("multiValueHeaders") {
        for (name, values) in multi {
            let name = name.to_ascii_lowercase();
            let values: Vec<String> = match values {
                Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
                other => scalar_to_string(other).into_iter().collect(),
            };
            merged.retain(|(existing, _)| *existing != name);
            merged.push((name, values));
        }
    }

    merged
}

/// Build the HTTP response for an invocation outcome.
pub fn shape(result: &InvocationResult, ctx: &ShapeContext<'_>) -> DevResponse {
    match result {
        Ok(value) => shape_result(value, ctx),
        Err(error) => shape_error(error, ctx),
    }
}

pub fn shape_result(value: &Value, ctx: &ShapeContext<'_>) -> DevResponse {
    if value.is_null() {
        log::error!("Function '{}' returned no response", ctx.function_name);
        return shape_error(&InvocationError::crashed(), ctx);
    }

    let parsed = match parse_result(value) {
        Ok(parsed) => parsed,
        Err(message) => {
            log::error!("Function '{}': {}", ctx.function_name, message);
            return stamp(DevResponse::text(500, message), ctx);
        }
    };

    if !parsed.ignored_keys.is_empty() {
        log::debug!(
            "Function '{}' returned unrecognized keys: {}",
            ctx.function_name,
            parsed.ignored_keys.join(", ")
        );
    }
    if ctx.builder && !parsed.builder_function {
        log::warn!(
            "Function '{}' was called as a builder but is not wrapped with the builder helper",
            ctx.function_name
        );
    }

    let mut response = DevResponse::new(parsed.status);
    for (name, values) in &parsed.headers {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            log::warn!("Function '{}' returned invalid header name '{}'", ctx.function_name, name);
            continue;
        };

        let folded: Vec<String> = if header_name == header::SET_COOKIE {
            values.clone()
        } else {
            vec![values.join(", ")]
        };

        for value in folded {
            match HeaderValue::from_str(&value) {
                Ok(v) => {
                    response.headers.append(header_name.clone(), v);
                }
                Err(_) => log::warn!(
                    "Function '{}' returned invalid value for header '{}'",
                    ctx.function_name,
                    name
                ),
            }
        }
    }
    response.body = parsed.body;

    stamp(response, ctx)
}

/// Report an invocation error as a 500, JSON or text by `Accept`.
pub fn shape_error(error: &InvocationError, ctx: &ShapeContext<'_>) -> DevResponse {
    let wants_json = ctx.accept.is_some_and(|a| a.contains("application/json"));

    let response = if wants_json {
        DevResponse::json(
            500,
            &json!({
                "errorType": error.error_type,
                "errorMessage": error.message,
                "trace": error.stack_trace,
            }),
        )
    } else {
        let mut text = format!("{}: {}", error.error_type, error.message);
        for line in &error.stack_trace {
            text.push('\n');
            text.push_str(line);
        }
        DevResponse::text(500, text)
    };

    stamp(response, ctx)
}

/// Strip `etag` and add the request id.
fn stamp(mut response: DevResponse, ctx: &ShapeContext<'_>) -> DevResponse {
    response.headers.remove(header::ETAG);
    if let Ok(id) = HeaderValue::from_str(ctx.request_id) {
        response
            .headers
            .insert(HeaderName::from_static("x-nf-request-id"), id);
    }
    response
}
