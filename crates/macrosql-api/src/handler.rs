//! Resource route handler
//!
//! Decodes route bodies, runs the SQL engine and wraps every outcome in the
//! response envelope. Failures never change the transport status: decoding,
//! parse and interpolation errors all answer 200 with `error: true`. Only an
//! unknown route answers 404.

use macrosql_core::{parse_duration, Config, InterpolationRequest, QueryContext};
use macrosql_sql::{Cte, CteExtractor, Interpolator};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlparser::ast::Statement;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};
use crate::envelope::{failure_body, AstData, HttpResponse, QueryData, Request, Response};
use crate::error::ApiError;

/// Message of panics caught on the read-only routes
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// Resource routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Parsed tree of a query
    Ast,
    /// Macro expansion
    Interpolate,
    /// CTE placeholders of a query
    MacroCte,
}

impl Route {
    pub const ALL: [Route; 3] = [Route::Ast, Route::Interpolate, Route::MacroCte];

    pub fn path(&self) -> &'static str {
        match self {
            Self::Ast => "/ast",
            Self::Interpolate => "/interpolate",
            Self::MacroCte => "/macroCTE",
        }
    }

    /// Match a request path; the leading slash is optional
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        Self::ALL.into_iter().find(|route| {
            let expected = route.path();
            path == expected || path == &expected[1..]
        })
    }
}

/// Serves the resource routes for one configuration
pub struct ResourceHandler {
    config: Config,
    interpolator: Interpolator,
}

impl ResourceHandler {
    pub fn new(config: Config) -> Self {
        let interpolator = Interpolator::new(config.dialect);
        Self { config, interpolator }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one request
    pub fn handle(&self, path: &str, body: &[u8], ctx: &QueryContext) -> HttpResponse {
        let Some(route) = Route::from_path(path) else {
            warn!(path, "unknown resource route");
            return HttpResponse::not_found(path);
        };

        debug!(route = route.path(), bytes = body.len(), "handling resource request");

        guarded(route, || self.dispatch(route, body, ctx))
    }

    fn dispatch(&self, route: Route, body: &[u8], ctx: &QueryContext) -> Value {
        match route {
            Route::Ast => respond(route, self.ast(body)),
            Route::Interpolate => respond(route, self.interpolate(body, ctx)),
            Route::MacroCte => respond(route, self.macro_ctes(body)),
        }
    }

    /// `/ast`: parse `data.query` into statements
    pub fn ast(&self, body: &[u8]) -> Result<Vec<Statement>, ApiError> {
        let request: Request<AstData> = decode(body)?;
        let parsed = self.interpolator.parser().parse(&request.data.query)?;
        Ok(parsed.statements)
    }

    /// `/interpolate`: expand the macros of `data.rawSql`
    pub fn interpolate(&self, body: &[u8], ctx: &QueryContext) -> Result<String, ApiError> {
        let request: Request<QueryData> = decode(body)?;
        let data = request.data;

        let round = self.config.effective_round(&data.round)?;
        let interval = parse_duration(&data.interval)?;
        let request = InterpolationRequest::new(data.raw_sql, data.range)
            .with_filters(data.filters.unwrap_or_default())
            .with_round(round)
            .with_interval(interval);

        Ok(self.interpolator.interpolate(&request, ctx)?)
    }

    /// `/macroCTE`: list the CTE placeholders of `data.query`
    pub fn macro_ctes(&self, body: &[u8]) -> Result<Vec<Cte>, ApiError> {
        let request: Request<AstData> = decode(body)?;
        let query = request.data.query;

        if is_describe(&query) {
            return Ok(Vec::new());
        }

        let parsed = self.interpolator.parser().parse(&query)?;
        let extraction = CteExtractor::with_source(&parsed.sql).extract(&parsed.statements)?;
        Ok(extraction.into_vec())
    }
}

/// Run `serve`, turning a panic into the route's failure envelope
fn guarded<F>(route: Route, serve: F) -> HttpResponse
where
    F: FnOnce() -> Value,
{
    match panic::catch_unwind(AssertUnwindSafe(serve)) {
        Ok(body) => HttpResponse::ok(body),
        Err(payload) => {
            let message = match route {
                Route::Interpolate => panic_message(payload.as_ref()),
                Route::Ast | Route::MacroCte => UNKNOWN_ERROR.to_string(),
            };
            error!(route = route.path(), %message, "resource handler panicked");
            HttpResponse::ok(failure_body(message))
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<Request<T>, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

fn respond<T: Serialize>(route: Route, result: Result<T, ApiError>) -> Value {
    let response = match result {
        Ok(data) => Response::success(data),
        Err(e) => {
            if e.is_cancelled() {
                warn!(route = route.path(), error = %e, "request cancelled");
            } else {
                debug!(route = route.path(), error = %e, "request failed");
            }
            Response::failure(e.to_string())
        }
    };

    serde_json::to_value(&response).unwrap_or_else(|e| failure_body(e.to_string()))
}

/// `DESCRIBE t` / `DESC t` never carries placeholders
fn is_describe(query: &str) -> bool {
    query
        .split_whitespace()
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("DESCRIBE") || word.eq_ignore_ascii_case("DESC"))
}

/// Panic payload as a JSON string
fn panic_message(payload: &(dyn Any + Send)) -> String {
    let text = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        return UNKNOWN_ERROR.to_string();
    };

    serde_json::to_string(&text).unwrap_or(text)
}
