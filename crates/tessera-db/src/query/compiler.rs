//! The compiler entry point and the expression walker.
//!
//! [`SqlCompiler::compile`] turns a [`Command`] into an [`EmittedCommand`]:
//! the command visitor for its kind drives a fresh [`Walker`], then the
//! placeholder pass rewrites canonical `@pN` placeholders into the dialect's
//! parameter style.
//!
//! The walker is a recursive descent over [`Node`] with an explicit output
//! mode. A boolean-valued node in value position is wrapped in
//! `CASE WHEN ... THEN 1 ELSE 0 END`, and a value node in predicate position
//! is compared against `1`. Lambda parameters are bound positionally to the
//! sources of the innermost statement; bindings from enclosing statements
//! stay visible, which is how nested queries correlate.
//!
//! Every constant becomes a parameter. Caller data never reaches the SQL
//! text.

use std::sync::Arc;

use tessera_core::logging::compile_span;
use tessera_core::{NamingConvention, Settings, TesseraError, TesseraResult};
use tracing::{debug, trace};

use crate::dialect::{Dialect, DialectRegistry};
use crate::entity::{ColumnDescriptor, EntityDescriptor, EntityRegistry};
use crate::query::assembly::{assemble, EmittedCommand};
use crate::query::command::{Command, Join, SelectQuery};
use crate::query::expr::{BinaryOp, CallExpr, Method, Node, UnaryOp};
use crate::query::functions::FunctionVisitor;
use crate::query::visitors::{
    self, CommandVisitor, DeleteVisitor, InsertVisitor, SelectVisitor, UpdateVisitor,
};
use crate::value::{SqlType, Value};

/// Everything a compilation reads: the dialect, the entity registry, the
/// naming convention and the default timeout.
#[derive(Debug, Clone)]
pub struct QueryContext {
    dialect: Arc<Dialect>,
    entities: Arc<EntityRegistry>,
    convention: NamingConvention,
    default_timeout: Option<u32>,
}

impl QueryContext {
    pub fn new(dialect: Arc<Dialect>, entities: Arc<EntityRegistry>) -> Self {
        Self {
            dialect,
            entities,
            convention: NamingConvention::default(),
            default_timeout: None,
        }
    }

    /// Picks the dialect named by `settings.provider` and copies the
    /// convention and default timeout.
    pub fn from_settings(
        settings: &Settings,
        dialects: &DialectRegistry,
        entities: Arc<EntityRegistry>,
    ) -> TesseraResult<Self> {
        Ok(Self {
            dialect: dialects.get(&settings.provider)?,
            entities,
            convention: settings.naming_convention,
            default_timeout: settings.default_command_timeout,
        })
    }

    #[must_use]
    pub fn with_convention(mut self, convention: NamingConvention) -> Self {
        self.convention = convention;
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, seconds: Option<u32>) -> Self {
        self.default_timeout = seconds;
        self
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    pub fn entities(&self) -> &Arc<EntityRegistry> {
        &self.entities
    }

    pub const fn convention(&self) -> NamingConvention {
        self.convention
    }

    pub const fn default_timeout(&self) -> Option<u32> {
        self.default_timeout
    }
}

/// Compiles commands against one [`QueryContext`].
///
/// The compiler holds no per-compilation state and can be shared across
/// threads.
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    context: QueryContext,
}

impl SqlCompiler {
    pub const fn new(context: QueryContext) -> Self {
        Self { context }
    }

    pub const fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Compiles one command. Either the whole statement is produced or an
    /// error is returned; there is no partial output.
    pub fn compile(&self, command: &Command) -> TesseraResult<EmittedCommand> {
        let provider = self.context.dialect.name();
        let span = compile_span(command.kind(), provider);
        let _entered = span.enter();

        let rendered = match command {
            Command::Select(query) => self.render(&mut SelectVisitor::new(query)),
            Command::Insert(insert) => self.render(&mut InsertVisitor::new(insert)),
            Command::Update(update) => self.render(&mut UpdateVisitor::new(update)),
            Command::Delete(delete) => self.render(&mut DeleteVisitor::new(delete)),
            Command::Raw(raw) => Ok(Rendered {
                sql: raw.sql.clone(),
                parameters: raw.parameters.clone(),
                aliases: Vec::new(),
            }),
        }
        .map_err(|err| {
            debug!(code = err.code(), error = %err, "compilation failed");
            err
        })?;

        let style = self.context.dialect.parameter_style();
        let (sql, parameters) = assemble(&rendered.sql, &rendered.parameters, style)?;
        debug!(
            entity = command.entity().unwrap_or("-"),
            parameters = parameters.len(),
            "compiled command"
        );
        trace!(%sql, "emitted sql");

        Ok(EmittedCommand {
            sql,
            parameters,
            aliases: rendered.aliases,
            timeout_seconds: command.timeout().or(self.context.default_timeout),
            style,
        })
    }

    fn render(&self, visitor: &mut dyn CommandVisitor) -> TesseraResult<Rendered> {
        let mut walker = Walker::new(&self.context);
        visitors::run(visitor, &mut walker)?;
        Ok(walker.finish())
    }
}

/// SQL with canonical placeholders, before assembly.
#[derive(Debug)]
pub(crate) struct Rendered {
    pub(crate) sql: String,
    pub(crate) parameters: Vec<(String, Value)>,
    pub(crate) aliases: Vec<(String, String)>,
}

/// What the node being walked must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A boolean condition.
    Predicate,
    /// A scalar value.
    Value,
}

/// A table in scope: its qualifier (alias or table name) and descriptor.
#[derive(Debug, Clone)]
pub struct Source {
    qualifier: String,
    alias: Option<String>,
    entity: Arc<EntityDescriptor>,
}

impl Source {
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }
}

/// The select list of a nested query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubSelect {
    One,
    Count,
    Projection,
}

#[derive(Debug, Clone, Copy)]
enum LikeShape {
    Contains,
    Prefix,
    Suffix,
}

fn unsupported(message: String) -> TesseraError {
    TesseraError::UnsupportedExpression(message)
}

/// Escapes LIKE wildcards with `!`. `[` is a wildcard on SQL Server.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '!' | '%' | '_' | '[') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

/// Per-compilation state: output buffer, parameters, scopes and aliases.
#[derive(Debug)]
pub struct Walker<'a> {
    ctx: &'a QueryContext,
    buf: String,
    params: Vec<(String, Value)>,
    frames: Vec<Vec<Source>>,
    bindings: Vec<(String, Source)>,
    aliases: Vec<(String, String)>,
    mode: Mode,
}

impl<'a> Walker<'a> {
    pub fn new(ctx: &'a QueryContext) -> Self {
        Self {
            ctx,
            buf: String::new(),
            params: Vec::new(),
            frames: vec![Vec::new()],
            bindings: Vec::new(),
            aliases: Vec::new(),
            mode: Mode::Value,
        }
    }

    pub fn dialect(&self) -> &'a Dialect {
        &self.ctx.dialect
    }

    /// The mode of the node currently being emitted.
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub fn write(&mut self, sql: &str) {
        self.buf.push_str(sql);
    }

    pub fn quote(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    /// Registers a parameter and returns its canonical placeholder.
    pub fn bind(&mut self, value: Value) -> String {
        let name = format!("p{}", self.params.len());
        let placeholder = format!("@{name}");
        self.params.push((name, value));
        placeholder
    }

    pub fn write_param(&mut self, value: Value) {
        let placeholder = self.bind(value);
        self.buf.push_str(&placeholder);
    }

    pub fn walk_predicate(&mut self, node: &Node) -> TesseraResult<()> {
        self.walk_in(node, Mode::Predicate)
    }

    pub fn walk_value(&mut self, node: &Node) -> TesseraResult<()> {
        self.walk_in(node, Mode::Value)
    }

    /// Runs `f` against an empty buffer and returns what it wrote.
    pub fn capture(
        &mut self,
        f: impl FnOnce(&mut Self) -> TesseraResult<()>,
    ) -> TesseraResult<String> {
        let saved = std::mem::take(&mut self.buf);
        let result = f(self);
        let captured = std::mem::replace(&mut self.buf, saved);
        result.map(|()| captured)
    }

    pub fn render_value(&mut self, node: &Node) -> TesseraResult<String> {
        self.capture(|w| w.walk_value(node))
    }

    pub fn render_predicate(&mut self, node: &Node) -> TesseraResult<String> {
        self.capture(|w| w.walk_predicate(node))
    }

    /// The error for a call nothing can translate.
    pub fn unsupported_call(&self, call: &CallExpr) -> TesseraError {
        unsupported(format!(
            "no translation for call {} on {}",
            call.signature(),
            self.dialect().name()
        ))
    }

    // ── scopes ──────────────────────────────────────────────────────

    /// Adds an aliased source (`[table] AS [tN]`) to the innermost frame.
    pub(crate) fn add_source(&mut self, entity: &str) -> TesseraResult<Source> {
        let descriptor = self.ctx.entities.resolve(entity, self.ctx.convention)?;
        let alias = format!("t{}", self.aliases.len());
        self.aliases.push((alias.clone(), descriptor.table.clone()));
        let source = Source {
            qualifier: alias.clone(),
            alias: Some(alias),
            entity: descriptor,
        };
        self.push_source(source.clone());
        Ok(source)
    }

    /// Adds a source qualified by its table name, as mutations use.
    pub(crate) fn add_table_source(&mut self, entity: &str) -> TesseraResult<Source> {
        let descriptor = self.ctx.entities.resolve(entity, self.ctx.convention)?;
        let source = Source {
            qualifier: descriptor.table.clone(),
            alias: None,
            entity: descriptor,
        };
        self.push_source(source.clone());
        Ok(source)
    }

    fn push_source(&mut self, source: Source) {
        match self.frames.last_mut() {
            Some(frame) => frame.push(source),
            None => self.frames.push(vec![source]),
        }
    }

    /// `[table] AS [alias]`, or `[table]` for unaliased sources.
    pub(crate) fn declaration(&self, source: &Source) -> String {
        let table = self.quote(&source.entity.table);
        match &source.alias {
            Some(alias) => format!("{table} AS {}", self.quote(alias)),
            None => table,
        }
    }

    pub(crate) fn column_sql(&self, source: &Source, column: &ColumnDescriptor) -> String {
        format!(
            "{}.{}",
            self.quote(&source.qualifier),
            self.quote(&column.physical)
        )
    }

    /// Every column of a source, aliased to the member name where the
    /// physical name differs.
    pub(crate) fn source_columns(&self, source: &Source) -> Vec<(String, Option<String>)> {
        source
            .entity
            .columns
            .iter()
            .map(|c| {
                let alias = (c.physical != c.member).then(|| c.member.clone());
                (self.column_sql(source, c), alias)
            })
            .collect()
    }

    fn with_bindings<T>(
        &mut self,
        params: &[String],
        f: impl FnOnce(&mut Self) -> TesseraResult<T>,
    ) -> TesseraResult<T> {
        let sources = self.frames.last().map(Vec::as_slice).unwrap_or_default();
        if params.len() > sources.len() {
            return Err(TesseraError::InvalidCommand(format!(
                "lambda ({}) takes {} parameters but only {} sources are in scope",
                params.join(", "),
                params.len(),
                sources.len()
            )));
        }
        let new: Vec<(String, Source)> = params.iter().cloned().zip(sources.iter().cloned()).collect();
        let mark = self.bindings.len();
        self.bindings.extend(new);
        let result = f(self);
        self.bindings.truncate(mark);
        result
    }

    fn binding(&self, name: &str) -> TesseraResult<&Source> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
            .ok_or_else(|| unsupported(format!("`{name}` is not a parameter of any enclosing lambda")))
    }

    fn member_column(&self, node: &Node) -> Option<&ColumnDescriptor> {
        let Node::Member { target, member } = node else {
            return None;
        };
        let Node::Parameter(name) = target.as_ref() else {
            return None;
        };
        self.binding(name).ok()?.entity.column(member)
    }

    fn member_sql(&self, target: &Node, member: &str) -> TesseraResult<String> {
        let Node::Parameter(name) = target else {
            return Err(unsupported(format!(
                "member access `{target}.{member}`: only lambda parameters can be dereferenced"
            )));
        };
        let source = self.binding(name)?;
        let column = source.entity.require_column(member)?;
        Ok(self.column_sql(source, column))
    }

    // ── projections and nested queries ──────────────────────────────

    /// Renders a projection into `(sql, alias)` items.
    pub(crate) fn render_projection(
        &mut self,
        node: &Node,
    ) -> TesseraResult<Vec<(String, Option<String>)>> {
        match node {
            Node::Lambda { params, body } => self.with_bindings(params, |w| w.render_projection(body)),
            Node::New(new) => {
                if new.bindings.is_empty() {
                    return Err(TesseraError::InvalidCommand(format!(
                        "projection `{node}` has no members"
                    )));
                }
                let mut items = Vec::with_capacity(new.bindings.len());
                for binding in &new.bindings {
                    items.push((self.render_value(&binding.value)?, binding.name.clone()));
                }
                Ok(items)
            }
            Node::Parameter(name) => {
                let source = self.binding(name)?.clone();
                Ok(self.source_columns(&source))
            }
            other => Ok(vec![(self.render_value(other)?, None)]),
        }
    }

    pub(crate) fn emit_joins(&mut self, joins: &[Join], sources: &[Source]) -> TesseraResult<()> {
        for (join, source) in joins.iter().zip(sources) {
            let head = format!(" {} {} ON ", join.kind.sql_keyword(), self.declaration(source));
            self.write(&head);
            self.walk_predicate(&join.on)?;
        }
        Ok(())
    }

    /// Writes ` WHERE a AND NOT (b) ...`; `true` negates a condition.
    pub(crate) fn emit_where(&mut self, conditions: &[(&Node, bool)]) -> TesseraResult<()> {
        let wrap = conditions.len() > 1;
        for (i, (node, negated)) in conditions.iter().enumerate() {
            self.write(if i == 0 { " WHERE " } else { " AND " });
            if *negated {
                self.write("NOT ");
            }
            if wrap || *negated {
                self.write("(");
            }
            self.walk_predicate(node)?;
            if wrap || *negated {
                self.write(")");
            }
        }
        Ok(())
    }

    fn emit_subquery(
        &mut self,
        query: &SelectQuery,
        list: SubSelect,
        extra: Option<(&Node, bool)>,
    ) -> TesseraResult<()> {
        if query.is_paged() || query.aggregate.is_some() {
            return Err(TesseraError::InvalidCommand(format!(
                "nested query over '{}' cannot be paged or aggregated",
                query.entity
            )));
        }
        self.frames.push(Vec::new());
        let result = self.emit_subquery_body(query, list, extra);
        self.frames.pop();
        result
    }

    fn emit_subquery_body(
        &mut self,
        query: &SelectQuery,
        list: SubSelect,
        extra: Option<(&Node, bool)>,
    ) -> TesseraResult<()> {
        let primary = self.add_source(&query.entity)?;
        let joined = query
            .joins
            .iter()
            .map(|j| self.add_source(&j.entity))
            .collect::<TesseraResult<Vec<_>>>()?;

        let select_list = match list {
            SubSelect::One => "1".to_string(),
            SubSelect::Count => "COUNT(*)".to_string(),
            SubSelect::Projection => {
                let single_column = || {
                    TesseraError::InvalidCommand(format!(
                        "nested query over '{}' used as a collection must project exactly one column",
                        query.entity
                    ))
                };
                let projection = query.projection.as_ref().ok_or_else(single_column)?;
                let mut items = self.render_projection(projection)?;
                if items.len() != 1 {
                    return Err(single_column());
                }
                items.remove(0).0
            }
        };
        let distinct = if query.distinct && list == SubSelect::Projection {
            "DISTINCT "
        } else {
            ""
        };
        let head = format!(
            "SELECT {distinct}{select_list} FROM {}",
            self.declaration(&primary)
        );
        self.write(&head);
        self.emit_joins(&query.joins, &joined)?;

        let mut conditions = Vec::with_capacity(2);
        if let Some(predicate) = &query.predicate {
            conditions.push((predicate, false));
        }
        conditions.extend(extra);
        self.emit_where(&conditions)
    }

    /// Writes an assigned value, coercing constants to the column's type.
    pub(crate) fn walk_assigned(
        &mut self,
        node: &Node,
        column_ty: Option<&SqlType>,
    ) -> TesseraResult<()> {
        match node {
            Node::Constant { value, ty } => self.emit_constant(value, column_ty.or(ty.as_ref())),
            other => self.walk_value(other),
        }
    }

    pub(crate) fn finish(self) -> Rendered {
        Rendered {
            sql: self.buf,
            parameters: self.params,
            aliases: self.aliases,
        }
    }

    // ── dispatch ────────────────────────────────────────────────────

    fn walk_in(&mut self, node: &Node, mode: Mode) -> TesseraResult<()> {
        if let Node::Lambda { params, body } = node {
            return self.with_bindings(params, |w| w.walk_in(body, mode));
        }
        let saved = self.mode;
        let result = match (mode, self.yields_predicate(node)) {
            (Mode::Predicate, true) | (Mode::Value, false) => {
                self.mode = mode;
                self.emit(node)
            }
            (Mode::Predicate, false) => {
                self.mode = Mode::Value;
                let result = self.emit(node);
                self.buf.push_str(" = 1");
                result
            }
            (Mode::Value, true) => {
                self.mode = Mode::Predicate;
                self.buf.push_str("CASE WHEN ");
                let result = self.emit(node);
                self.buf.push_str(" THEN 1 ELSE 0 END");
                result
            }
        };
        self.mode = saved;
        result
    }

    fn visitor_for(&self, call: &CallExpr) -> Option<&'a Arc<dyn FunctionVisitor>> {
        let dialect = self.dialect();
        dialect
            .visitors()
            .iter()
            .find(|v| v.can_resolve(call, dialect.settings()))
    }

    fn yields_predicate(&self, node: &Node) -> bool {
        match node {
            Node::Binary { op, .. } => op.is_comparison() || op.is_logical(),
            Node::Unary { op: UnaryOp::Not, .. } => true,
            Node::Lambda { body, .. } => self.yields_predicate(body),
            Node::Call(call) => self
                .visitor_for(call)
                .map_or_else(|| call.method.yields_predicate(), |v| v.yields_predicate(call)),
            _ => false,
        }
    }

    fn emit(&mut self, node: &Node) -> TesseraResult<()> {
        match node {
            Node::Constant { value, ty } => self.emit_constant(value, ty.as_ref()),
            Node::Parameter(name) => Err(unsupported(format!(
                "lambda parameter `{name}` stands for a whole row and cannot be used as a value"
            ))),
            Node::Member { target, member } => {
                let sql = self.member_sql(target, member)?;
                self.write(&sql);
                Ok(())
            }
            Node::Unary { op: UnaryOp::Not, operand } => {
                self.write("NOT (");
                self.walk_predicate(operand)?;
                self.write(")");
                Ok(())
            }
            Node::Unary { op: UnaryOp::Negate, operand } => {
                // A bare `-` before another `-` would open a line comment.
                let wrap = !matches!(operand.as_ref(), Node::Member { .. } | Node::Constant { .. });
                self.write(if wrap { "-(" } else { "-" });
                self.walk_value(operand)?;
                if wrap {
                    self.write(")");
                }
                Ok(())
            }
            Node::Binary { op, left, right } => self.emit_binary(*op, left, right),
            Node::Conditional { test, then, otherwise } => {
                self.write("CASE WHEN ");
                self.walk_predicate(test)?;
                self.write(" THEN ");
                self.walk_value(then)?;
                self.write(" ELSE ");
                self.walk_value(otherwise)?;
                self.write(" END");
                Ok(())
            }
            Node::Call(call) => self.emit_call(call),
            Node::New(_) => Err(unsupported(format!(
                "object construction `{node}` is only valid as a projection"
            ))),
            Node::Lambda { .. } => self.walk_in(node, self.mode),
            Node::Query(query) => Err(unsupported(format!(
                "nested query over '{}' is only valid inside Contains, Any, All or Count",
                query.entity
            ))),
        }
    }

    fn emit_constant(&mut self, value: &Value, ty: Option<&SqlType>) -> TesseraResult<()> {
        if let Value::List(_) = value {
            return Err(unsupported(
                "a list constant is only valid as the collection of Contains".to_string(),
            ));
        }
        let value = match ty {
            Some(ty) => value.coerce(ty)?,
            None => value.clone(),
        };
        if value.is_null() {
            self.write("NULL");
        } else {
            self.write_param(value);
        }
        Ok(())
    }

    // ── operators ───────────────────────────────────────────────────

    fn emit_binary(&mut self, op: BinaryOp, left: &Node, right: &Node) -> TesseraResult<()> {
        if op.is_logical() {
            self.operand(op, left, false, Mode::Predicate)?;
            self.write(&format!(" {} ", op.sql()));
            return self.operand(op, right, true, Mode::Predicate);
        }

        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let subject = if right.is_null_constant() {
                Some(left)
            } else if left.is_null_constant() {
                Some(right)
            } else {
                None
            };
            if let Some(subject) = subject {
                self.operand(op, subject, false, Mode::Value)?;
                self.write(if op == BinaryOp::Eq { " IS NULL" } else { " IS NOT NULL" });
                return Ok(());
            }
        }

        if op == BinaryOp::Add && (self.is_textual(left) || self.is_textual(right)) {
            let mut parts = Vec::new();
            self.collect_concat(left, &mut parts)?;
            self.collect_concat(right, &mut parts)?;
            let sql = self.dialect().concat(&parts);
            self.write(&sql);
            return Ok(());
        }

        self.operand(op, left, false, Mode::Value)?;
        self.write(&format!(" {} ", op.sql()));
        self.operand(op, right, true, Mode::Value)
    }

    fn operand(
        &mut self,
        parent: BinaryOp,
        node: &Node,
        is_right: bool,
        mode: Mode,
    ) -> TesseraResult<()> {
        let inner = match node {
            Node::Lambda { body, .. } => body.as_ref(),
            other => other,
        };
        let wrap = match inner {
            Node::Binary { op, .. } => {
                op.precedence() < parent.precedence()
                    || (is_right
                        && op.precedence() == parent.precedence()
                        && parent.is_left_associative_only())
            }
            _ => false,
        };
        if wrap {
            self.write("(");
        }
        self.walk_in(node, mode)?;
        if wrap {
            self.write(")");
        }
        Ok(())
    }

    fn is_textual(&self, node: &Node) -> bool {
        match node {
            Node::Constant { ty: Some(SqlType::String), .. } => true,
            Node::Member { .. } => self
                .member_column(node)
                .is_some_and(|c| c.sql_type == Some(SqlType::String)),
            Node::Call(call) => matches!(
                call.method,
                Method::ToUpper | Method::ToLower | Method::Trim | Method::Substring | Method::Concat
            ),
            Node::Binary { op: BinaryOp::Add, left, right } => {
                self.is_textual(left) || self.is_textual(right)
            }
            _ => false,
        }
    }

    fn collect_concat(&mut self, node: &Node, parts: &mut Vec<String>) -> TesseraResult<()> {
        match node {
            Node::Binary { op: BinaryOp::Add, left, right } if self.is_textual(node) => {
                self.collect_concat(left, parts)?;
                self.collect_concat(right, parts)
            }
            other => {
                parts.push(self.render_value(other)?);
                Ok(())
            }
        }
    }

    // ── calls ───────────────────────────────────────────────────────

    fn emit_call(&mut self, call: &CallExpr) -> TesseraResult<()> {
        if let Some(visitor) = self.visitor_for(call) {
            trace!(visitor = visitor.name(), call = %call.signature(), "function visitor");
            return visitor.visit(self, call);
        }
        match &call.method {
            Method::Contains => self.emit_contains(call),
            Method::StartsWith => self.emit_like_call(call, LikeShape::Prefix),
            Method::EndsWith => self.emit_like_call(call, LikeShape::Suffix),
            Method::Any => self.emit_quantifier(call, false),
            Method::All => self.emit_quantifier(call, true),
            Method::Count => self.emit_count(call),
            Method::ToUpper => self.emit_wrapped(call, "UPPER"),
            Method::ToLower => self.emit_wrapped(call, "LOWER"),
            Method::Length => self.emit_wrapped(call, self.dialect().length_fn()),
            Method::Trim => {
                let subject = self.unary_operand(call)?;
                let inner = self.render_value(subject)?;
                let sql = self.dialect().trim(&inner);
                self.write(&sql);
                Ok(())
            }
            Method::Substring => self.emit_substring(call),
            Method::IndexOf => self.emit_index_of(call),
            Method::Now if call.operands().next().is_none() => {
                self.write(self.dialect().now());
                Ok(())
            }
            method => match method.date_part() {
                Some(part) => {
                    let subject = self.unary_operand(call)?;
                    let inner = self.render_value(subject)?;
                    let sql = self.dialect().date_part(part, &inner);
                    self.write(&sql);
                    Ok(())
                }
                None => Err(self.unsupported_call(call)),
            },
        }
    }

    fn unary_operand<'c>(&self, call: &'c CallExpr) -> TesseraResult<&'c Node> {
        let mut operands = call.operands();
        match (operands.next(), operands.next()) {
            (Some(only), None) => Ok(only),
            _ => Err(self.unsupported_call(call)),
        }
    }

    fn binary_operands<'c>(&self, call: &'c CallExpr) -> TesseraResult<(&'c Node, &'c Node)> {
        match (call.target.as_deref(), call.args.as_slice()) {
            (Some(target), [arg]) => Ok((target, arg)),
            (None, [first, second]) => Ok((first, second)),
            _ => Err(self.unsupported_call(call)),
        }
    }

    /// The collection and optional predicate of `Any`, `All` and `Count`.
    fn collection_operands<'c>(
        &self,
        call: &'c CallExpr,
    ) -> TesseraResult<(&'c SelectQuery, Option<&'c Node>)> {
        let (collection, predicate) = match (call.target.as_deref(), call.args.as_slice()) {
            (Some(target), []) => (target, None),
            (Some(target), [predicate]) | (None, [target, predicate]) => (target, Some(predicate)),
            (None, [target]) => (target, None),
            _ => return Err(self.unsupported_call(call)),
        };
        match collection {
            Node::Query(query) => Ok((query, predicate)),
            other => Err(unsupported(format!(
                "{} over `{other}`: only nested queries can be used as collections",
                call.method
            ))),
        }
    }

    fn emit_wrapped(&mut self, call: &CallExpr, function: &str) -> TesseraResult<()> {
        let subject = self.unary_operand(call)?;
        let inner = self.render_value(subject)?;
        self.write(&format!("{function}({inner})"));
        Ok(())
    }

    fn emit_contains(&mut self, call: &CallExpr) -> TesseraResult<()> {
        let (collection, item) = self.binary_operands(call)?;
        match collection {
            Node::Query(query) => {
                self.walk_value(item)?;
                self.write(" IN (");
                self.emit_subquery(query, SubSelect::Projection, None)?;
                self.write(")");
                Ok(())
            }
            Node::Constant { value: Value::List(items), ty } => {
                if items.is_empty() {
                    self.write("1 = 0");
                    return Ok(());
                }
                let element = match ty {
                    Some(SqlType::List(inner)) => Some(inner.as_ref()),
                    _ => None,
                };
                self.walk_value(item)?;
                self.write(" IN (");
                for (i, value) in items.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    let value = match element {
                        Some(ty) => value.coerce(ty)?,
                        None => value.clone(),
                    };
                    self.write_param(value);
                }
                self.write(")");
                Ok(())
            }
            subject => self.emit_like(subject, item, LikeShape::Contains),
        }
    }

    fn emit_like_call(&mut self, call: &CallExpr, shape: LikeShape) -> TesseraResult<()> {
        let (subject, pattern) = self.binary_operands(call)?;
        self.emit_like(subject, pattern, shape)
    }

    fn emit_like(&mut self, subject: &Node, pattern: &Node, shape: LikeShape) -> TesseraResult<()> {
        self.walk_value(subject)?;
        self.write(" LIKE ");
        if let Node::Constant { value, .. } = pattern {
            let Value::String(text) = value else {
                return Err(unsupported(format!("pattern `{pattern}` is not a string")));
            };
            let escaped = escape_like(text);
            let pattern = match shape {
                LikeShape::Contains => format!("%{escaped}%"),
                LikeShape::Prefix => format!("{escaped}%"),
                LikeShape::Suffix => format!("%{escaped}"),
            };
            self.write_param(Value::String(pattern));
            self.write(" ESCAPE '!'");
            return Ok(());
        }
        let inner = self.render_value(pattern)?;
        let wildcard = "'%'".to_string();
        let parts = match shape {
            LikeShape::Contains => vec![wildcard.clone(), inner, wildcard],
            LikeShape::Prefix => vec![inner, wildcard],
            LikeShape::Suffix => vec![wildcard, inner],
        };
        let sql = self.dialect().concat(&parts);
        self.write(&sql);
        Ok(())
    }

    fn emit_quantifier(&mut self, call: &CallExpr, universal: bool) -> TesseraResult<()> {
        let (query, predicate) = self.collection_operands(call)?;
        if universal {
            let predicate = predicate.ok_or_else(|| {
                TesseraError::InvalidCommand(format!(
                    "All over '{}' needs a predicate",
                    query.entity
                ))
            })?;
            self.write("NOT EXISTS (");
            self.emit_subquery(query, SubSelect::One, Some((predicate, true)))?;
        } else {
            self.write("EXISTS (");
            self.emit_subquery(query, SubSelect::One, predicate.map(|p| (p, false)))?;
        }
        self.write(")");
        Ok(())
    }

    fn emit_count(&mut self, call: &CallExpr) -> TesseraResult<()> {
        let (query, predicate) = self.collection_operands(call)?;
        self.write("(");
        self.emit_subquery(query, SubSelect::Count, predicate.map(|p| (p, false)))?;
        self.write(")");
        Ok(())
    }

    /// Zero-based start in the tree, one-based in SQL.
    fn emit_substring(&mut self, call: &CallExpr) -> TesseraResult<()> {
        let (subject, start, length) = match (call.target.as_deref(), call.args.as_slice()) {
            (Some(s), [start]) | (None, [s, start]) => (s, start, None),
            (Some(s), [start, len]) | (None, [s, start, len]) => (s, start, Some(len)),
            _ => return Err(self.unsupported_call(call)),
        };
        let dialect = self.dialect();
        let subject_sql = self.render_value(subject)?;
        let start_sql = match start.as_constant().and_then(Value::as_int) {
            Some(n) => self.bind(Value::Int(n.saturating_add(1))),
            None => format!("({} + 1)", self.render_value(start)?),
        };
        let length_sql = match length {
            Some(len) => Some(self.render_value(len)?),
            None if dialect.substring_requires_length() => {
                Some(format!("{}({subject_sql})", dialect.length_fn()))
            }
            None => None,
        };
        let sql = match length_sql {
            Some(len) => format!("{}({subject_sql}, {start_sql}, {len})", dialect.substring_fn()),
            None => format!("{}({subject_sql}, {start_sql})", dialect.substring_fn()),
        };
        self.write(&sql);
        Ok(())
    }

    /// Zero-based in the tree, `-1` when absent.
    fn emit_index_of(&mut self, call: &CallExpr) -> TesseraResult<()> {
        let (haystack, needle) = self.binary_operands(call)?;
        let dialect = self.dialect();
        let haystack = self.render_value(haystack)?;
        let needle = self.render_value(needle)?;
        let inner = if dialect.index_of_swapped() {
            format!("{}({haystack}, {needle})", dialect.index_of_fn())
        } else {
            format!("{}({needle}, {haystack})", dialect.index_of_fn())
        };
        self.write(&format!("({inner} - 1)"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySql, SqlServer, Sqlite};
    use crate::entity::EntityBuilder;
    use crate::query::command::{Select, SelectQuery};
    use crate::query::expr::Node;

    fn context(dialect: Dialect) -> QueryContext {
        let entities = EntityRegistry::new();
        entities
            .register_builder(
                EntityBuilder::new("User")
                    .table("User")
                    .key("Id")
                    .column("Name")
                    .of_type(SqlType::String)
                    .column("Age")
                    .of_type(SqlType::Int)
                    .column("Active")
                    .of_type(SqlType::Bool),
            )
            .unwrap();
        entities
            .register_builder(
                EntityBuilder::new("Order")
                    .table("Orders")
                    .key("Id")
                    .column("UserId")
                    .column("Total")
                    .of_type(SqlType::Float),
            )
            .unwrap();
        QueryContext::new(Arc::new(dialect), Arc::new(entities))
    }

    fn filtered(dialect: Dialect, body: Node) -> EmittedCommand {
        let query = Select::from("User")
            .filter(Node::lambda(["u"], body))
            .build()
            .unwrap();
        SqlCompiler::new(context(dialect))
            .compile(&Command::Select(query))
            .unwrap()
    }

    fn u(member: &str) -> Node {
        Node::param("u").member(member)
    }

    fn where_clause(cmd: &EmittedCommand) -> &str {
        cmd.sql.split(" WHERE ").nth(1).unwrap_or("")
    }

    // ── operators ───────────────────────────────────────────────────

    #[test]
    fn test_null_comparison_becomes_is_null() {
        let cmd = filtered(
            Dialect::new(SqlServer),
            u("Name").equals(Node::null(SqlType::String)),
        );
        assert_eq!(where_clause(&cmd), "[t0].[Name] IS NULL");
        assert!(cmd.parameters.is_empty());

        let cmd = filtered(
            Dialect::new(SqlServer),
            u("Name").not_equals(Node::null(SqlType::String)),
        );
        assert_eq!(where_clause(&cmd), "[t0].[Name] IS NOT NULL");
    }

    #[test]
    fn test_precedence_parentheses() {
        let cmd = filtered(
            Dialect::new(SqlServer),
            u("Age").gt(1) & (u("Age").lt(5) | u("Age").equals(9)),
        );
        assert_eq!(
            where_clause(&cmd),
            "[t0].[Age] > @p0 AND ([t0].[Age] < @p1 OR [t0].[Age] = @p2)"
        );

        let cmd = filtered(Dialect::new(SqlServer), (u("Age") - (u("Age") - 1)).gt(0));
        assert_eq!(where_clause(&cmd), "[t0].[Age] - ([t0].[Age] - @p0) > @p1");
    }

    #[test]
    fn test_value_in_predicate_position_compares_to_one() {
        let cmd = filtered(Dialect::new(SqlServer), u("Active"));
        assert_eq!(where_clause(&cmd), "[t0].[Active] = 1");
    }

    #[test]
    fn test_not_wraps_predicate() {
        let cmd = filtered(Dialect::new(Sqlite), !u("Age").gt(3));
        assert_eq!(where_clause(&cmd), "NOT (\"t0\".\"Age\" > @p0)");
    }

    #[test]
    fn test_string_addition_uses_dialect_concat() {
        let cmd = filtered(
            Dialect::new(MySql::default()),
            (u("Name") + "!").equals("ada!"),
        );
        assert_eq!(where_clause(&cmd), "CONCAT(`t0`.`Name`, ?p0) = ?p1");
    }

    #[test]
    fn test_double_negation_is_parenthesized() {
        let cmd = filtered(Dialect::new(SqlServer), (-(-u("Age"))).gt(5));
        assert_eq!(where_clause(&cmd), "-(-[t0].[Age]) > @p0");
        assert_eq!(cmd.parameters.len(), 1);

        let query = Select::from("User")
            .order_by(Node::lambda(["u"], -(-u("Age"))))
            .skip(10)
            .take(5)
            .build()
            .unwrap();
        let cmd = SqlCompiler::new(context(Dialect::new(Sqlite)))
            .compile(&Command::Select(query))
            .unwrap();
        assert!(!cmd.sql.contains("--"));
        assert!(cmd
            .sql
            .ends_with("ORDER BY -(-\"t0\".\"Age\") ASC LIMIT 5 OFFSET 10"));
    }

    // ── conditionals ────────────────────────────────────────────────

    fn projected(dialect: Dialect, body: Node) -> EmittedCommand {
        let query = Select::from("User")
            .project(Node::lambda(["u"], body))
            .build()
            .unwrap();
        SqlCompiler::new(context(dialect))
            .compile(&Command::Select(query))
            .unwrap()
    }

    #[test]
    fn test_conditional_projection_becomes_case() {
        let cmd = projected(
            Dialect::new(SqlServer),
            Node::conditional(u("Active"), u("Name"), Node::constant("n/a")),
        );
        assert_eq!(
            cmd.sql,
            "SELECT CASE WHEN [t0].[Active] = 1 THEN [t0].[Name] ELSE @p0 END FROM [User] AS [t0]"
        );
        assert_eq!(cmd.parameter("p0"), Some(&Value::String("n/a".into())));
    }

    #[test]
    fn test_conditional_in_filter() {
        let cmd = filtered(
            Dialect::new(SqlServer),
            Node::conditional(u("Age").ge(18), u("Name"), Node::constant("minor")).equals("ada"),
        );
        assert_eq!(
            where_clause(&cmd),
            "CASE WHEN [t0].[Age] >= @p0 THEN [t0].[Name] ELSE @p1 END = @p2"
        );
    }

    #[test]
    fn test_comparison_projected_as_value() {
        let cmd = projected(Dialect::new(Sqlite), u("Age").gt(18));
        assert_eq!(
            cmd.sql,
            "SELECT CASE WHEN \"t0\".\"Age\" > @p0 THEN 1 ELSE 0 END FROM \"User\" AS \"t0\""
        );
    }

    // ── calls ───────────────────────────────────────────────────────

    #[test]
    fn test_like_escapes_wildcards() {
        let cmd = filtered(Dialect::new(SqlServer), u("Name").contains("50%_off"));
        assert_eq!(where_clause(&cmd), "[t0].[Name] LIKE @p0 ESCAPE '!'");
        assert_eq!(cmd.parameters[0].1, Value::String("%50!%!_off%".into()));
    }

    #[test]
    fn test_contains_list_and_empty_list() {
        let ids = Node::constant(Value::List(vec![Value::Int(1), Value::Int(2)]));
        let cmd = filtered(Dialect::new(SqlServer), ids.contains(u("Id")));
        assert_eq!(where_clause(&cmd), "[t0].[Id] IN (@p0, @p1)");

        let empty = Node::constant(Value::List(vec![]));
        let cmd = filtered(Dialect::new(SqlServer), empty.contains(u("Id")));
        assert_eq!(where_clause(&cmd), "1 = 0");
    }

    #[test]
    fn test_any_correlates_with_outer_source() {
        let orders = Select::from("Order")
            .filter(Node::lambda(
                ["o"],
                Node::param("o").member("UserId").equals(u("Id")),
            ))
            .build()
            .unwrap();
        let cmd = filtered(
            Dialect::new(SqlServer),
            Node::query(orders).call(Method::Any, vec![]),
        );
        assert_eq!(
            where_clause(&cmd),
            "EXISTS (SELECT 1 FROM [Orders] AS [t1]"
        );
        assert!(cmd.sql.ends_with("WHERE [t1].[UserId] = [t0].[Id])"));
    }

    #[test]
    fn test_all_negates_predicate() {
        let cmd = filtered(
            Dialect::new(SqlServer),
            Node::query(SelectQuery::new("Order")).call(
                Method::All,
                vec![Node::lambda(["o"], Node::param("o").member("Total").gt(0.0))],
            ),
        );
        assert!(cmd
            .sql
            .ends_with("NOT EXISTS (SELECT 1 FROM [Orders] AS [t1] WHERE NOT ([t1].[Total] > @p0))"));
    }

    #[test]
    fn test_substring_and_index_of_are_zero_based() {
        let cmd = filtered(
            Dialect::new(SqlServer),
            u("Name")
                .call(Method::Substring, vec![Node::constant(2)])
                .equals("x"),
        );
        assert_eq!(
            where_clause(&cmd),
            "SUBSTRING([t0].[Name], @p0, LEN([t0].[Name])) = @p1"
        );
        assert_eq!(cmd.parameters[0].1, Value::Int(3));

        let cmd = filtered(
            Dialect::new(Sqlite),
            u("Name").call(Method::IndexOf, vec![Node::constant("a")]).equals(0),
        );
        assert_eq!(where_clause(&cmd), "(INSTR(\"t0\".\"Name\", @p0) - 1) = @p1");
    }

    #[test]
    fn test_unregistered_call_names_signature() {
        let query = Select::from("User")
            .filter(Node::lambda(
                ["u"],
                Node::static_call(Method::named("SqlFunctions", "Soundex"), vec![u("Name")]).equals("x"),
            ))
            .build()
            .unwrap();
        let err = SqlCompiler::new(context(Dialect::new(SqlServer)))
            .compile(&Command::Select(query))
            .unwrap_err();
        assert_eq!(err.code(), "unsupported_expression");
        assert!(err.to_string().contains("SqlFunctions.Soundex(1 args)"));
    }

    #[test]
    fn test_member_on_non_parameter_is_unsupported() {
        let query = Select::from("User")
            .filter(Node::lambda(
                ["u"],
                u("Name").member("Length").equals(3),
            ))
            .build()
            .unwrap();
        let err = SqlCompiler::new(context(Dialect::new(SqlServer)))
            .compile(&Command::Select(query))
            .unwrap_err();
        assert_eq!(err.code(), "unsupported_expression");
    }

    #[test]
    fn test_constant_that_does_not_fit_its_type() {
        let cmd = SqlCompiler::new(context(Dialect::new(SqlServer))).compile(&Command::Select(
            Select::from("User")
                .filter(Node::lambda(["u"], u("Age").equals(Node::typed("abc", SqlType::Int))))
                .build()
                .unwrap(),
        ));
        assert_eq!(cmd.unwrap_err().code(), "unsupported_expression");
    }

    // ── context ─────────────────────────────────────────────────────

    #[test]
    fn test_timeout_falls_back_to_default() {
        let ctx = context(Dialect::new(Sqlite)).with_default_timeout(Some(30));
        let compiler = SqlCompiler::new(ctx);
        let plain = compiler
            .compile(&Command::Select(SelectQuery::new("User")))
            .unwrap();
        assert_eq!(plain.timeout_seconds, Some(30));
        let own = compiler
            .compile(&Command::Select(Select::from("User").timeout(5).build().unwrap()))
            .unwrap();
        assert_eq!(own.timeout_seconds, Some(5));
    }

    #[test]
    fn test_from_settings_selects_provider() {
        let settings = Settings::default().with_provider("mssql");
        let ctx = QueryContext::from_settings(
            &settings,
            &DialectRegistry::with_defaults(),
            Arc::new(EntityRegistry::new()),
        )
        .unwrap();
        assert_eq!(ctx.dialect().name(), "SqlServer");
    }
}
