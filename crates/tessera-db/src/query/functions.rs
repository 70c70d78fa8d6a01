//! Function visitors.
//!
//! A [`FunctionVisitor`] claims call shapes the built-in catalogue does not
//! translate, or translates differently per dialect. The walker asks each
//! visitor of the current dialect in order and the first one whose
//! [`can_resolve`](FunctionVisitor::can_resolve) returns `true` emits the
//! call. Visitors never see the dialect's visitor list, so they cannot
//! recurse into dispatch except by walking operands through the walker.
//!
//! Three visitors are always installed after any user visitors: type
//! conversion, null checks and string concatenation.

use std::fmt;
use std::sync::Arc;

use tessera_core::TesseraResult;

use crate::dialect::DialectSettings;
use crate::query::compiler::Walker;
use crate::query::expr::{CallExpr, Method};

/// Translates one family of calls.
pub trait FunctionVisitor: fmt::Debug + Send + Sync {
    /// A short name for logs and error messages.
    fn name(&self) -> &str;

    /// Whether this visitor translates `call` under `dialect`.
    fn can_resolve(&self, call: &CallExpr, dialect: &dyn DialectSettings) -> bool;

    /// Whether the emitted SQL is a boolean condition rather than a value.
    fn yields_predicate(&self, _call: &CallExpr) -> bool {
        false
    }

    /// Writes the translation of `call` into the walker.
    fn visit(&self, walker: &mut Walker<'_>, call: &CallExpr) -> TesseraResult<()>;
}

/// The visitors every dialect carries.
pub fn default_visitors() -> Vec<Arc<dyn FunctionVisitor>> {
    vec![
        Arc::new(ConvertVisitor),
        Arc::new(NullCheckVisitor),
        Arc::new(ConcatVisitor),
    ]
}

/// `Convert<T>(x)`: `CONVERT(T, x)` on SQL Server, `CAST(x AS T)` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertVisitor;

impl FunctionVisitor for ConvertVisitor {
    fn name(&self) -> &str {
        "convert"
    }

    fn can_resolve(&self, call: &CallExpr, dialect: &dyn DialectSettings) -> bool {
        match &call.method {
            Method::Convert(ty) => call.operands().count() == 1 && dialect.cast_type(ty).is_some(),
            _ => false,
        }
    }

    fn visit(&self, walker: &mut Walker<'_>, call: &CallExpr) -> TesseraResult<()> {
        let Method::Convert(ty) = &call.method else {
            return Err(walker.unsupported_call(call));
        };
        let operand = call
            .operands()
            .next()
            .ok_or_else(|| walker.unsupported_call(call))?;
        let inner = walker.render_value(operand)?;
        let sql = walker.dialect().convert(&inner, ty)?;
        walker.write(&sql);
        Ok(())
    }
}

/// `IsNull(x)` as a predicate and `Coalesce(a, b, ...)` as a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCheckVisitor;

impl FunctionVisitor for NullCheckVisitor {
    fn name(&self) -> &str {
        "null-check"
    }

    fn can_resolve(&self, call: &CallExpr, _dialect: &dyn DialectSettings) -> bool {
        match call.method {
            Method::IsNull => call.operands().count() == 1,
            Method::Coalesce => call.operands().count() >= 2,
            _ => false,
        }
    }

    fn yields_predicate(&self, call: &CallExpr) -> bool {
        call.method == Method::IsNull
    }

    fn visit(&self, walker: &mut Walker<'_>, call: &CallExpr) -> TesseraResult<()> {
        let parts = call
            .operands()
            .map(|n| walker.render_value(n))
            .collect::<TesseraResult<Vec<_>>>()?;
        let sql = if call.method == Method::IsNull {
            let subject = parts.first().ok_or_else(|| walker.unsupported_call(call))?;
            format!("{subject} IS NULL")
        } else if parts.len() == 2 {
            format!("{}({})", walker.dialect().null_replacement_fn(), parts.join(", "))
        } else {
            format!("COALESCE({})", parts.join(", "))
        };
        walker.write(&sql);
        Ok(())
    }
}

/// `Concat(a, b, ...)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatVisitor;

impl FunctionVisitor for ConcatVisitor {
    fn name(&self) -> &str {
        "concat"
    }

    fn can_resolve(&self, call: &CallExpr, _dialect: &dyn DialectSettings) -> bool {
        call.method == Method::Concat && call.operands().next().is_some()
    }

    fn visit(&self, walker: &mut Walker<'_>, call: &CallExpr) -> TesseraResult<()> {
        let parts = call
            .operands()
            .map(|n| walker.render_value(n))
            .collect::<TesseraResult<Vec<_>>>()?;
        let sql = walker.dialect().concat(&parts);
        walker.write(&sql);
        Ok(())
    }
}
