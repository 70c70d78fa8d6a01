//! Command descriptors and their builders.
//!
//! A [`Command`] is everything the compiler needs to emit one statement. The
//! builders ([`Select`], [`Insert`], [`Update`], [`Delete`]) enforce the
//! structural rules up front: a mutation needs a predicate or a key match,
//! and Insert/Update need at least one assignment.

use tessera_core::{TesseraError, TesseraResult};

use crate::query::expr::Node;
use crate::value::Value;

/// Ordering of a select.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    /// A key selector, usually `x => x.Member`.
    pub key: Node,
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A joined source. The `on` lambda sees every source up to and including
/// this one.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub entity: String,
    pub kind: JoinKind,
    pub on: Node,
}

/// A scalar aggregate replacing the projection of a select.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count,
    Sum(Node),
    Min(Node),
    Max(Node),
    Avg(Node),
}

impl Aggregate {
    pub const fn function(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum(_) => "SUM",
            Self::Min(_) => "MIN",
            Self::Max(_) => "MAX",
            Self::Avg(_) => "AVG",
        }
    }

    pub const fn selector(&self) -> Option<&Node> {
        match self {
            Self::Count => None,
            Self::Sum(n) | Self::Min(n) | Self::Max(n) | Self::Avg(n) => Some(n),
        }
    }
}

/// A SELECT descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// The entity key of the primary source.
    pub entity: String,
    pub joins: Vec<Join>,
    pub predicate: Option<Node>,
    /// `None` selects every column of the primary source.
    pub projection: Option<Node>,
    pub order_by: Vec<Ordering>,
    pub take: Option<u64>,
    pub skip: u64,
    pub distinct: bool,
    pub aggregate: Option<Aggregate>,
    pub timeout: Option<u32>,
}

impl SelectQuery {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            joins: Vec::new(),
            predicate: None,
            projection: None,
            order_by: Vec::new(),
            take: None,
            skip: 0,
            distinct: false,
            aggregate: None,
            timeout: None,
        }
    }

    /// `true` when the select carries a take or skip.
    pub const fn is_paged(&self) -> bool {
        self.take.is_some() || self.skip > 0
    }
}

/// `member = value` in an insert or update.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub member: String,
    pub value: Node,
}

/// Explicit column opt-in/opt-out for inserts and updates.
///
/// Without an allow list, key and read-only columns are skipped. With one,
/// exactly the listed members are written (keys and read-only members
/// included). The deny list always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    pub allow: Option<Vec<String>>,
    pub deny: Vec<String>,
}

/// Matches a single row by its key columns, in key declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMatch {
    pub values: Vec<Value>,
}

impl KeyMatch {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    pub entity: String,
    pub assignments: Vec<Assignment>,
    pub columns: ColumnSelection,
    /// Append the dialect's identity select.
    pub fetch_identity: bool,
    pub timeout: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    pub entity: String,
    pub assignments: Vec<Assignment>,
    pub predicate: Option<Node>,
    pub key: Option<KeyMatch>,
    pub columns: ColumnSelection,
    pub timeout: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand {
    pub entity: String,
    pub predicate: Option<Node>,
    pub key: Option<KeyMatch>,
    pub timeout: Option<u32>,
}

/// Caller-written SQL using canonical placeholders (`@name`, `:name` or
/// `?name`), routed through the same placeholder assembly as compiled SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    pub sql: String,
    pub parameters: Vec<(String, Value)>,
    pub timeout: Option<u32>,
}

impl RawCommand {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }
}

/// Any compilable command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(SelectQuery),
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
    Raw(RawCommand),
}

impl Command {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Raw(_) => "raw",
        }
    }

    /// The target entity, if the command has one.
    pub fn entity(&self) -> Option<&str> {
        match self {
            Self::Select(q) => Some(&q.entity),
            Self::Insert(c) => Some(&c.entity),
            Self::Update(c) => Some(&c.entity),
            Self::Delete(c) => Some(&c.entity),
            Self::Raw(_) => None,
        }
    }

    /// The command-level timeout override.
    pub const fn timeout(&self) -> Option<u32> {
        match self {
            Self::Select(q) => q.timeout,
            Self::Insert(c) => c.timeout,
            Self::Update(c) => c.timeout,
            Self::Delete(c) => c.timeout,
            Self::Raw(c) => c.timeout,
        }
    }
}

macro_rules! command_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Command {
                fn from(c: $ty) -> Self {
                    Self::$variant(c)
                }
            }
        )*
    };
}

command_from!(
    SelectQuery => Select,
    InsertCommand => Insert,
    UpdateCommand => Update,
    DeleteCommand => Delete,
    RawCommand => Raw,
);

pub(crate) fn unconditioned(kind: &str, entity: &str) -> TesseraError {
    TesseraError::UnconditionedMutation(format!(
        "{kind} on '{entity}' has neither a predicate nor a key match; \
         add a filter or a key to target specific rows"
    ))
}

fn and_predicates(existing: Option<Node>, next: Node) -> Node {
    match existing {
        Some(prev) => prev.and(next),
        None => next,
    }
}

// ── builders ───────────────────────────────────────────────────────────

/// Fluent builder for [`SelectQuery`].
///
/// ```
/// use tessera_db::query::command::Select;
/// use tessera_db::query::expr::Node;
///
/// let query = Select::from("User")
///     .filter(Node::lambda(["u"], Node::param("u").member("Id").gt(100)))
///     .order_by(Node::key_selector("u", "Id"))
///     .skip(10)
///     .take(5)
///     .build()
///     .unwrap();
/// assert_eq!(query.take, Some(5));
/// assert_eq!(query.skip, 10);
/// ```
#[derive(Debug, Clone)]
pub struct Select {
    query: SelectQuery,
}

impl Select {
    pub fn from(entity: impl Into<String>) -> Self {
        Self {
            query: SelectQuery::new(entity),
        }
    }

    /// Adds a predicate lambda; repeated calls are combined with AND.
    #[must_use]
    pub fn filter(mut self, predicate: Node) -> Self {
        self.query.predicate = Some(and_predicates(self.query.predicate.take(), predicate));
        self
    }

    #[must_use]
    pub fn join(mut self, entity: impl Into<String>, on: Node) -> Self {
        self.query.joins.push(Join {
            entity: entity.into(),
            kind: JoinKind::Inner,
            on,
        });
        self
    }

    #[must_use]
    pub fn left_join(mut self, entity: impl Into<String>, on: Node) -> Self {
        self.query.joins.push(Join {
            entity: entity.into(),
            kind: JoinKind::Left,
            on,
        });
        self
    }

    #[must_use]
    pub fn project(mut self, projection: Node) -> Self {
        self.query.projection = Some(projection);
        self
    }

    #[must_use]
    pub fn order_by(mut self, key: Node) -> Self {
        self.query.order_by.push(Ordering {
            key,
            descending: false,
        });
        self
    }

    #[must_use]
    pub fn order_by_desc(mut self, key: Node) -> Self {
        self.query.order_by.push(Ordering {
            key,
            descending: true,
        });
        self
    }

    #[must_use]
    pub const fn take(mut self, take: u64) -> Self {
        self.query.take = Some(take);
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.query.skip = skip;
        self
    }

    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    #[must_use]
    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.query.aggregate = Some(aggregate);
        self
    }

    #[must_use]
    pub fn count(self) -> Self {
        self.aggregate(Aggregate::Count)
    }

    #[must_use]
    pub const fn timeout(mut self, seconds: u32) -> Self {
        self.query.timeout = Some(seconds);
        self
    }

    pub fn build(self) -> TesseraResult<SelectQuery> {
        if let Some(Node::Lambda { body, .. }) = &self.query.projection {
            if matches!(body.as_ref(), Node::New(new) if new.bindings.is_empty()) {
                return Err(TesseraError::InvalidCommand(format!(
                    "projection over '{}' produces no columns",
                    self.query.entity
                )));
            }
        }
        if self.query.aggregate.is_some() && self.query.is_paged() {
            return Err(TesseraError::InvalidCommand(
                "an aggregate cannot be combined with take/skip".to_string(),
            ));
        }
        Ok(self.query)
    }
}

/// Fluent builder for [`InsertCommand`].
#[derive(Debug, Clone)]
pub struct Insert {
    command: InsertCommand,
}

impl Insert {
    pub fn into(entity: impl Into<String>) -> Self {
        Self {
            command: InsertCommand {
                entity: entity.into(),
                assignments: Vec::new(),
                columns: ColumnSelection::default(),
                fetch_identity: false,
                timeout: None,
            },
        }
    }

    /// Assigns a constant.
    #[must_use]
    pub fn set(self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_expr(member, Node::constant(value))
    }

    /// Assigns an arbitrary expression.
    #[must_use]
    pub fn set_expr(mut self, member: impl Into<String>, value: Node) -> Self {
        self.command.assignments.push(Assignment {
            member: member.into(),
            value,
        });
        self
    }

    /// Restricts the written columns to `members`.
    #[must_use]
    pub fn allow<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.columns.allow = Some(members.into_iter().map(Into::into).collect());
        self
    }

    /// Never writes `members`.
    #[must_use]
    pub fn deny<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.columns.deny.extend(members.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub const fn fetch_identity(mut self) -> Self {
        self.command.fetch_identity = true;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, seconds: u32) -> Self {
        self.command.timeout = Some(seconds);
        self
    }

    pub fn build(self) -> TesseraResult<InsertCommand> {
        if self.command.assignments.is_empty() {
            return Err(TesseraError::InvalidCommand(format!(
                "insert into '{}' has no column bindings",
                self.command.entity
            )));
        }
        Ok(self.command)
    }
}

/// Fluent builder for [`UpdateCommand`].
#[derive(Debug, Clone)]
pub struct Update {
    command: UpdateCommand,
}

impl Update {
    pub fn table(entity: impl Into<String>) -> Self {
        Self {
            command: UpdateCommand {
                entity: entity.into(),
                assignments: Vec::new(),
                predicate: None,
                key: None,
                columns: ColumnSelection::default(),
                timeout: None,
            },
        }
    }

    #[must_use]
    pub fn set(self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_expr(member, Node::constant(value))
    }

    /// Assigns an expression, e.g. `u => u.Visits + 1`.
    #[must_use]
    pub fn set_expr(mut self, member: impl Into<String>, value: Node) -> Self {
        self.command.assignments.push(Assignment {
            member: member.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: Node) -> Self {
        self.command.predicate = Some(and_predicates(self.command.predicate.take(), predicate));
        self
    }

    #[must_use]
    pub fn key(mut self, key: KeyMatch) -> Self {
        self.command.key = Some(key);
        self
    }

    #[must_use]
    pub fn allow<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.columns.allow = Some(members.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn deny<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.columns.deny.extend(members.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub const fn timeout(mut self, seconds: u32) -> Self {
        self.command.timeout = Some(seconds);
        self
    }

    pub fn build(self) -> TesseraResult<UpdateCommand> {
        if self.command.predicate.is_none() && self.command.key.is_none() {
            return Err(unconditioned("update", &self.command.entity));
        }
        if self.command.assignments.is_empty() {
            return Err(TesseraError::InvalidCommand(format!(
                "update of '{}' sets no columns",
                self.command.entity
            )));
        }
        Ok(self.command)
    }
}

/// Fluent builder for [`DeleteCommand`].
#[derive(Debug, Clone)]
pub struct Delete {
    command: DeleteCommand,
}

impl Delete {
    pub fn from(entity: impl Into<String>) -> Self {
        Self {
            command: DeleteCommand {
                entity: entity.into(),
                predicate: None,
                key: None,
                timeout: None,
            },
        }
    }

    #[must_use]
    pub fn filter(mut self, predicate: Node) -> Self {
        self.command.predicate = Some(and_predicates(self.command.predicate.take(), predicate));
        self
    }

    #[must_use]
    pub fn key(mut self, key: KeyMatch) -> Self {
        self.command.key = Some(key);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, seconds: u32) -> Self {
        self.command.timeout = Some(seconds);
        self
    }

    pub fn build(self) -> TesseraResult<DeleteCommand> {
        if self.command.predicate.is_none() && self.command.key.is_none() {
            return Err(unconditioned("delete", &self.command.entity));
        }
        Ok(self.command)
    }
}
