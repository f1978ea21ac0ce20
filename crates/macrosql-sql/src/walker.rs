//! AST walker
//!
//! Traverses statements with the sqlparser visitor and hands every macro
//! site to a callback. Queries are visited before their contents, so CTE
//! placeholders of a `WITH` clause come before the expressions inside it;
//! expressions are visited after their children, so a macro nested in
//! another macro's arguments is seen (and can be replaced) first.
//!
//! The callback decides what happens: returning `ControlFlow::Break` stops
//! the walk and the break value is returned to the caller.

use macrosql_core::Location;
use sqlparser::ast::{Cte, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, Query, Statement, Visit, VisitMut, Visitor, VisitorMut};
use std::marker::PhantomData;
use std::ops::ControlFlow;
use crate::macros::{is_registered, resolve, MacroInvocation, Resolution, MACRO_PREFIX};

/// A macro site seen by the read-only walk
#[derive(Debug)]
pub enum SiteRef<'a> {
    /// Registered macro call in expression position
    Call {
        invocation: MacroInvocation,
        expr: &'a Expr,
    },
    /// CTE whose alias is a placeholder
    Cte(CtePlaceholder<'a>),
    /// Macro-like node that cannot be classified
    Malformed(ShapeError),
}

/// A macro site seen by the rewriting walk
#[derive(Debug)]
pub enum SiteMut<'a> {
    Call(CallSite<'a>),
    Cte(CtePlaceholder<'a>),
    Malformed(ShapeError),
}

/// Macro call bound to its slot in the tree
#[derive(Debug)]
pub struct CallSite<'a> {
    pub invocation: MacroInvocation,
    slot: &'a mut Expr,
}

impl<'a> CallSite<'a> {
    /// Replace the macro call with `expr`
    pub fn replace(self, expr: Expr) {
        *self.slot = expr;
    }

    pub fn expr(&self) -> &Expr {
        self.slot
    }
}

/// `WITH $__name AS (...)` site
#[derive(Debug, Clone, Copy)]
pub struct CtePlaceholder<'a> {
    /// Alias with the macro prefix stripped
    pub name: &'a str,
    pub cte: &'a Cte,
    pub location: Option<Location>,
}

impl<'a> CtePlaceholder<'a> {
    /// Alias exactly as written, prefix included
    pub fn macro_text(&self) -> &'a str {
        &self.cte.alias.name.value
    }
}

/// Which kind of node a [`ShapeError`] is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeTarget {
    Call,
    Cte,
}

/// A macro name used with an argument shape the catalog does not accept
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ShapeError {
    pub name: String,
    pub message: String,
    pub target: ShapeTarget,
    pub location: Option<Location>,
}

/// Walk `statements` without modifying them
pub fn walk<B, F>(statements: &[Statement], callback: F) -> ControlFlow<B>
where
    F: FnMut(SiteRef<'_>) -> ControlFlow<B>,
{
    let mut visitor = SiteVisitor {
        callback,
        _break: PhantomData,
    };
    for statement in statements {
        if let ControlFlow::Break(b) = Visit::visit(statement, &mut visitor) {
            return ControlFlow::Break(b);
        }
    }
    ControlFlow::Continue(())
}

/// Walk a single statement, allowing call sites to be replaced
pub fn walk_statement_mut<B, F>(statement: &mut Statement, callback: F) -> ControlFlow<B>
where
    F: FnMut(SiteMut<'_>) -> ControlFlow<B>,
{
    let mut visitor = SiteVisitorMut {
        callback,
        _break: PhantomData,
    };
    VisitMut::visit(statement, &mut visitor)
}

/// Walk `statements`, allowing call sites to be replaced
pub fn walk_mut<B, F>(statements: &mut [Statement], mut callback: F) -> ControlFlow<B>
where
    F: FnMut(SiteMut<'_>) -> ControlFlow<B>,
{
    for statement in statements.iter_mut() {
        if let ControlFlow::Break(b) = walk_statement_mut(statement, &mut callback) {
            return ControlFlow::Break(b);
        }
    }
    ControlFlow::Continue(())
}

struct SiteVisitor<F, B> {
    callback: F,
    _break: PhantomData<B>,
}

impl<F, B> Visitor for SiteVisitor<F, B>
where
    F: FnMut(SiteRef<'_>) -> ControlFlow<B>,
{
    type Break = B;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<B> {
        for site in cte_sites(query) {
            let site = match site {
                Ok(placeholder) => SiteRef::Cte(placeholder),
                Err(error) => SiteRef::Malformed(error),
            };
            if let ControlFlow::Break(b) = (self.callback)(site) {
                return ControlFlow::Break(b);
            }
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &Expr) -> ControlFlow<B> {
        match classify_expr(expr) {
            Some(Ok(invocation)) => (self.callback)(SiteRef::Call { invocation, expr }),
            Some(Err(error)) => (self.callback)(SiteRef::Malformed(error)),
            None => ControlFlow::Continue(()),
        }
    }
}

struct SiteVisitorMut<F, B> {
    callback: F,
    _break: PhantomData<B>,
}

impl<F, B> VisitorMut for SiteVisitorMut<F, B>
where
    F: FnMut(SiteMut<'_>) -> ControlFlow<B>,
{
    type Break = B;

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<B> {
        for site in cte_sites(query) {
            let site = match site {
                Ok(placeholder) => SiteMut::Cte(placeholder),
                Err(error) => SiteMut::Malformed(error),
            };
            if let ControlFlow::Break(b) = (self.callback)(site) {
                return ControlFlow::Break(b);
            }
        }
        ControlFlow::Continue(())
    }

    fn post_visit_expr(&mut self, expr: &mut Expr) -> ControlFlow<B> {
        match classify_expr(expr) {
            Some(Ok(invocation)) => (self.callback)(SiteMut::Call(CallSite { invocation, slot: expr })),
            Some(Err(error)) => (self.callback)(SiteMut::Malformed(error)),
            None => ControlFlow::Continue(()),
        }
    }
}

fn cte_sites(query: &Query) -> Vec<Result<CtePlaceholder<'_>, ShapeError>> {
    match &query.with {
        Some(with) => with.cte_tables.iter().filter_map(classify_cte).collect(),
        None => Vec::new(),
    }
}

/// Classify an expression as a macro call
///
/// `None` for anything that is not a registered macro name, including
/// unknown `$__` names, which pass through untouched.
pub fn classify_expr(expr: &Expr) -> Option<Result<MacroInvocation, ShapeError>> {
    let (ident, args) = match expr {
        Expr::Identifier(ident) => (ident, Ok(Vec::new())),
        Expr::Function(func) => {
            let [ident] = func.name.0.as_slice() else {
                return None;
            };
            (ident, function_args(&func.args))
        }
        _ => return None,
    };

    if ident.quote_style.is_some() || !ident.value.starts_with(MACRO_PREFIX) {
        return None;
    }

    let name = ident.value.as_str();
    let location = ident_location(ident);
    let shape_error = |message: String| ShapeError {
        name: name.to_string(),
        message,
        target: ShapeTarget::Call,
        location,
    };

    let args = match args {
        Ok(args) => args,
        Err(message) if is_registered(name) => return Some(Err(shape_error(message))),
        Err(_) => return None,
    };

    match resolve(name, args.len()) {
        Resolution::Found(entry) => Some(Ok(MacroInvocation {
            name: entry.name.to_string(),
            kind: entry.kind,
            args,
            location,
        })),
        Resolution::ArityMismatch { expected } => Some(Err(shape_error(format!(
            "expects {} argument(s), got {}",
            expected
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
            args.len()
        )))),
        Resolution::Unknown => None,
    }
}

/// Positional expression arguments, or a message describing the bad shape
fn function_args(args: &FunctionArguments) -> Result<Vec<Expr>, String> {
    match args {
        FunctionArguments::None => Ok(Vec::new()),
        FunctionArguments::Subquery(_) => Err("a subquery is not a valid macro argument".to_string()),
        FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Ok(expr.clone()),
                other => Err(format!("unsupported macro argument `{other}`")),
            })
            .collect(),
    }
}

/// Classify a CTE as a placeholder
pub fn classify_cte(cte: &Cte) -> Option<Result<CtePlaceholder<'_>, ShapeError>> {
    let alias = &cte.alias.name;
    if alias.quote_style.is_some() {
        return None;
    }
    let name = alias.value.strip_prefix(MACRO_PREFIX)?;
    let location = ident_location(alias);

    let reason = if name.is_empty() {
        Some("placeholder CTE has no name after the macro prefix")
    } else if is_registered(&alias.value) {
        Some("placeholder CTE name collides with a registered macro")
    } else {
        None
    };

    Some(match reason {
        Some(reason) => Err(ShapeError {
            name: alias.value.clone(),
            message: reason.to_string(),
            target: ShapeTarget::Cte,
            location,
        }),
        None => Ok(CtePlaceholder { name, cte, location }),
    })
}

fn ident_location(ident: &Ident) -> Option<Location> {
    let start = ident.span.start;
    if start.line == 0 {
        None
    } else {
        Some(Location::new(start.line, start.column))
    }
}
