//! macrosql resource routes
//!
//! Transport-agnostic handlers behind the query editor's resource calls:
//!
//! - `/ast`: the parsed tree of a query
//! - `/interpolate`: a query with every macro expanded
//! - `/macroCTE`: the CTE placeholders of a query
//!
//! Every route answers with the `{error, errorMessage, data}` envelope.
//! The CLI's `serve` command drives these handlers over stdio.

mod envelope;
mod error;
mod handler;

pub use envelope::{failure_body, AstData, HttpResponse, QueryData, Request, Response};
pub use error::ApiError;
pub use handler::{ResourceHandler, Route, UNKNOWN_ERROR};
