//! The query tree.
//!
//! A [`Node`] is an immutable expression describing a predicate, projection,
//! ordering key or assigned value. Lambda parameters stand for the sources of
//! the statement they appear in (the target entity first, then joins, in
//! order); the walker binds them to table aliases when it compiles the tree.
//!
//! ```
//! use tessera_db::query::expr::Node;
//!
//! // u => u.Id > 100 && u.Name.StartsWith("a")
//! let u = Node::param("u");
//! let predicate = Node::lambda(
//!     ["u"],
//!     u.clone().member("Id").gt(100) & u.member("Name").starts_with("a"),
//! );
//! assert_eq!(predicate.to_string(), "u => ((u.Id > 100) && u.Name.StartsWith(\"a\"))");
//! ```

use std::fmt;
use std::ops;

use crate::query::command::SelectQuery;
use crate::value::{SqlType, Value};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Negate,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Mod => 6,
        }
    }

    /// The SQL operator token.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
            other => other.sql(),
        }
    }

    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// `a - (b - c)` differs from `(a - b) - c`.
    pub const fn is_left_associative_only(self) -> bool {
        matches!(self, Self::Sub | Self::Div | Self::Mod)
    }
}

/// Calendar parts extractable from dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    /// The `DATEPART`-style keyword.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }
}

/// The closed catalogue of call shapes.
///
/// `Named` carries any other signature; only a registered function visitor
/// can translate it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Contains,
    StartsWith,
    EndsWith,
    Any,
    All,
    Count,
    ToUpper,
    ToLower,
    Trim,
    Substring,
    IndexOf,
    Length,
    Concat,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Now,
    Convert(SqlType),
    IsNull,
    Coalesce,
    Named { owner: String, name: String },
}

impl Method {
    /// A method declared on `owner`, resolved only through function visitors.
    pub fn named(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Named {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Whether the catalogue translation of this call is a boolean condition
    /// rather than a value.
    pub const fn yields_predicate(&self) -> bool {
        matches!(
            self,
            Self::Contains | Self::StartsWith | Self::EndsWith | Self::Any | Self::All | Self::IsNull
        )
    }

    pub const fn date_part(&self) -> Option<DatePart> {
        match self {
            Self::Year => Some(DatePart::Year),
            Self::Month => Some(DatePart::Month),
            Self::Day => Some(DatePart::Day),
            Self::Hour => Some(DatePart::Hour),
            Self::Minute => Some(DatePart::Minute),
            Self::Second => Some(DatePart::Second),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convert(ty) => write!(f, "Convert<{ty}>"),
            Self::Named { owner, name } => write!(f, "{owner}.{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A method call. `target` is `None` for static calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub target: Option<Box<Node>>,
    pub method: Method,
    pub args: Vec<Node>,
}

impl CallExpr {
    /// The target followed by the arguments.
    pub fn operands(&self) -> impl Iterator<Item = &Node> {
        self.target.as_deref().into_iter().chain(self.args.iter())
    }

    /// A description of the call signature used in error messages.
    pub fn signature(&self) -> String {
        let target = if self.target.is_some() { "instance " } else { "" };
        format!("{target}{}({} args)", self.method, self.args.len())
    }
}

/// One member of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// The output column name; `None` leaves the expression unaliased.
    pub name: Option<String>,
    pub value: Node,
}

impl Binding {
    pub fn named(name: impl Into<String>, value: Node) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }

    pub const fn unnamed(value: Node) -> Self {
        Self { name: None, value }
    }
}

/// A projection (`new { ... }`).
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpr {
    pub type_name: Option<String>,
    pub bindings: Vec<Binding>,
}

/// A query tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A caller-supplied constant with its static type. `None` for an untyped
    /// `NULL`.
    Constant { value: Value, ty: Option<SqlType> },
    /// A reference to a lambda parameter.
    Parameter(String),
    /// `target.member`.
    Member { target: Box<Node>, member: String },
    Unary { op: UnaryOp, operand: Box<Node> },
    Binary { op: BinaryOp, left: Box<Node>, right: Box<Node> },
    /// `test ? then : otherwise`.
    Conditional {
        test: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
    Call(CallExpr),
    New(NewExpr),
    Lambda { params: Vec<String>, body: Box<Node> },
    /// A nested query used as a collection (`Contains`, `Any`, `All`, `Count`).
    Query(Box<SelectQuery>),
}

// ── construction ───────────────────────────────────────────────────────

impl Node {
    /// A constant typed by its Rust type.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let ty = value.natural_type();
        Self::Constant { value, ty }
    }

    /// A constant with an explicit static type. The value is checked against
    /// the type when the tree is compiled.
    pub fn typed(value: impl Into<Value>, ty: SqlType) -> Self {
        Self::Constant {
            value: value.into(),
            ty: Some(ty),
        }
    }

    /// A typed `NULL`.
    pub const fn null(ty: SqlType) -> Self {
        Self::Constant {
            value: Value::Null,
            ty: Some(ty),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    pub fn lambda<I, S>(params: I, body: Self) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Lambda {
            params: params.into_iter().map(Into::into).collect(),
            body: Box::new(body),
        }
    }

    /// `x => x.member`, the common shape of ordering keys.
    pub fn key_selector(param: &str, member: &str) -> Self {
        Self::lambda([param], Self::param(param).member(member))
    }

    pub fn new_object(bindings: Vec<Binding>) -> Self {
        Self::New(NewExpr {
            type_name: None,
            bindings,
        })
    }

    pub fn query(query: SelectQuery) -> Self {
        Self::Query(Box::new(query))
    }

    pub fn conditional(test: Self, then: Self, otherwise: Self) -> Self {
        Self::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// A static call such as `Now()` or `Convert<int>(x)`.
    pub fn static_call(method: Method, args: Vec<Self>) -> Self {
        Self::Call(CallExpr {
            target: None,
            method,
            args,
        })
    }

    #[must_use]
    pub fn member(self, member: impl Into<String>) -> Self {
        Self::Member {
            target: Box::new(self),
            member: member.into(),
        }
    }

    #[must_use]
    pub fn call(self, method: Method, args: Vec<Self>) -> Self {
        Self::Call(CallExpr {
            target: Some(Box::new(self)),
            method,
            args,
        })
    }

    fn binary(self, op: BinaryOp, other: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    #[must_use]
    pub fn equals(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Eq, other.into())
    }

    #[must_use]
    pub fn not_equals(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Ne, other.into())
    }

    #[must_use]
    pub fn gt(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Gt, other.into())
    }

    #[must_use]
    pub fn ge(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Ge, other.into())
    }

    #[must_use]
    pub fn lt(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Lt, other.into())
    }

    #[must_use]
    pub fn le(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Le, other.into())
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.binary(BinaryOp::And, other)
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    #[must_use]
    pub fn contains(self, item: impl Into<Self>) -> Self {
        self.call(Method::Contains, vec![item.into()])
    }

    #[must_use]
    pub fn starts_with(self, prefix: impl Into<Self>) -> Self {
        self.call(Method::StartsWith, vec![prefix.into()])
    }

    #[must_use]
    pub fn ends_with(self, suffix: impl Into<Self>) -> Self {
        self.call(Method::EndsWith, vec![suffix.into()])
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        Self::static_call(Method::IsNull, vec![self])
    }

    /// The value carried by a constant node.
    pub const fn as_constant(&self) -> Option<&Value> {
        match self {
            Self::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    /// `true` for a constant holding `NULL`.
    pub const fn is_null_constant(&self) -> bool {
        matches!(self, Self::Constant { value: Value::Null, .. })
    }
}

macro_rules! node_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Node {
                fn from(v: $ty) -> Self {
                    Self::constant(v)
                }
            }
        )*
    };
}

node_from_value!(bool, i32, i64, f64, &str, String, Value, uuid::Uuid, chrono::NaiveDate, chrono::NaiveDateTime);

impl ops::BitAnd for Node {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl ops::BitOr for Node {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl ops::Not for Node {
    type Output = Self;

    fn not(self) -> Self {
        Self::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

impl ops::Neg for Node {
    type Output = Self;

    fn neg(self) -> Self {
        Self::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }
}

macro_rules! node_arith {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl<T: Into<Node>> ops::$trait<T> for Node {
                type Output = Self;

                fn $method(self, rhs: T) -> Self {
                    self.binary(BinaryOp::$op, rhs.into())
                }
            }
        )*
    };
}

node_arith!(Add::add => Add, Sub::sub => Sub, Mul::mul => Mul, Div::div => Div, Rem::rem => Mod);

// ── description ────────────────────────────────────────────────────────

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { value: Value::String(s), .. } => write!(f, "{s:?}"),
            Self::Constant { value, .. } => write!(f, "{value}"),
            Self::Parameter(name) => f.write_str(name),
            Self::Member { target, member } => write!(f, "{target}.{member}"),
            Self::Unary { op: UnaryOp::Not, operand } => write!(f, "!{operand}"),
            Self::Unary { op: UnaryOp::Negate, operand } => write!(f, "-{operand}"),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Conditional { test, then, otherwise } => {
                write!(f, "({test} ? {then} : {otherwise})")
            }
            Self::Call(call) => {
                if let Some(target) = &call.target {
                    write!(f, "{target}.")?;
                }
                write!(f, "{}(", call.method)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::New(new) => {
                write!(f, "new {}{{ ", new.type_name.as_deref().unwrap_or(""))?;
                for (i, b) in new.bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match &b.name {
                        Some(name) => write!(f, "{name} = {}", b.value)?,
                        None => write!(f, "{}", b.value)?,
                    }
                }
                f.write_str(" }")
            }
            Self::Lambda { params, body } => match params.as_slice() {
                [single] => write!(f, "{single} => {body}"),
                many => write!(f, "({}) => {body}", many.join(", ")),
            },
            Self::Query(query) => write!(f, "<query over {}>", query.entity),
        }
    }
}
