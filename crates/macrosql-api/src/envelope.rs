//! Request and response payloads of the resource routes

use macrosql_core::{AdHocFilter, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"data": ...}` request wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct Request<T> {
    #[serde(alias = "Data")]
    pub data: T,
}

/// Body of `/interpolate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    pub raw_sql: String,

    /// Go duration; empty falls back to the configured default
    #[serde(default)]
    pub round: String,

    #[serde(default)]
    pub filters: Option<Vec<AdHocFilter>>,

    pub range: TimeRange,

    /// Go duration; empty means no interval
    #[serde(default)]
    pub interval: String,
}

/// Body of `/ast` and `/macroCTE`
#[derive(Debug, Clone, Deserialize)]
pub struct AstData {
    pub query: String,
}

/// Response envelope shared by all routes
///
/// On failure `error` is set, `error_message` is non-empty and `data` is
/// `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub error: bool,

    #[serde(rename = "errorMessage")]
    pub error_message: String,

    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn success(data: T) -> Self {
        Self {
            error: false,
            error_message: String::new(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            error_message: message.into(),
            data: None,
        }
    }
}

/// Failure envelope as JSON
pub fn failure_body(message: impl Into<String>) -> Value {
    serde_json::json!({
        "error": true,
        "errorMessage": message.into(),
        "data": null,
    })
}

/// Transport-level response of a route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub const OK: u16 = 200;
    pub const NOT_FOUND: u16 = 404;

    pub fn ok(body: Value) -> Self {
        Self { status: Self::OK, body }
    }

    pub fn not_found(path: &str) -> Self {
        Self {
            status: Self::NOT_FOUND,
            body: failure_body(format!("no resource route for {path}")),
        }
    }

    /// Decode the envelope's `data` on success, or return its error message
    pub fn into_data<T: for<'de> Deserialize<'de>>(self) -> Result<Option<T>, String> {
        let response: Response<T> = serde_json::from_value(self.body).map_err(|e| e.to_string())?;
        if response.error {
            Err(response.error_message)
        } else {
            Ok(response.data)
        }
    }
}
