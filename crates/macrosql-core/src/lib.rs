//! macrosql core
//!
//! Domain types shared by the SQL engine, the resource routes and the CLI:
//! time ranges, ad-hoc filters, interpolation requests, Go-style durations,
//! cancellation contexts, configuration and stable diagnostic codes.

pub mod diagnostic;
pub mod config;
pub mod duration;
pub mod time_range;
pub mod filter;
pub mod request;
pub mod context;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use config::{Config, ConfigError, DialectConfig};
pub use duration::{parse_duration, DurationError};
pub use time_range::{TimeRange, TimeRangeError};
pub use filter::{AdHocFilter, FilterOperator, UnknownOperator, SYNTHETIC_EMPTY, SYNTHETIC_NULL};
pub use request::InterpolationRequest;
pub use context::{QueryContext, Cancelled};
