//! SQL parsing and macro interpolation
//!
//! This crate handles:
//! - Parsing SQL templates using datafusion-sqlparser-rs, with `$__name`
//!   macro placeholders promoted to plain identifiers
//! - The macro catalog: which `$__` names are recognized and how
//! - Walking statements to locate macro call sites and CTE placeholders
//! - Rendering macro expansions and re-serializing the rewritten SQL
//! - Extracting CTE placeholders for introspection

pub mod parser;
pub mod macros;
pub mod walker;
pub mod render;
pub mod interpolator;
pub mod cte;
pub mod error;

pub use parser::{SqlParser, ParsedSql, ParseError, render_statements};
pub use macros::{resolve, is_registered, Resolution, MacroKind, MacroSpec, MacroInvocation, TimeFilterKind, IntervalKind, Precision, CATALOG, MACRO_PREFIX};
pub use walker::{walk, walk_mut, walk_statement_mut, classify_expr, classify_cte, SiteRef, SiteMut, CallSite, CtePlaceholder, ShapeError, ShapeTarget};
pub use render::{FragmentRenderer, Fragment, RenderError};
pub use interpolator::Interpolator;
pub use cte::{extract_ctes, CteExtractor, CteExtraction, Cte};
pub use error::{Error, ErrorKind};
