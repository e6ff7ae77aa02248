//! Predicate and sort-key expressions.
//!
//! # Responsibility
//! - Provide a small AST that backends can translate to a native query
//!   language (`Compare`, `IsNull`, boolean combinators, field paths).
//! - Keep an in-process closure fallback for logic the AST cannot express.
//!
//! # Invariants
//! - Expressions are immutable and cheap to clone (closures sit behind `Arc`).
//! - Closures must be pure: engines may evaluate them more than once.

use crate::model::value::Value;
use std::fmt::{self, Debug, Formatter, Write as _};
use std::sync::Arc;

/// Comparison operator of a field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

type ClosureFilter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type ClosureKey<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// Filter expression over items of type `T`.
pub enum Predicate<T> {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    And(Vec<Predicate<T>>),
    Or(Vec<Predicate<T>>),
    Not(Box<Predicate<T>>),
    /// In-process only; never pushed to a backend query language.
    Custom(ClosureFilter<T>),
}

impl<T> Predicate<T> {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Whether a backend with a native query language can translate this.
    pub fn is_translatable(&self) -> bool {
        match self {
            Self::Compare { .. } | Self::IsNull(_) => true,
            Self::And(parts) | Self::Or(parts) => parts.iter().all(Self::is_translatable),
            Self::Not(inner) => inner.is_translatable(),
            Self::Custom(_) => false,
        }
    }

    /// Canonical text used for query-shape fingerprints.
    pub(crate) fn describe(&self, out: &mut String) {
        match self {
            Self::Compare { field, op, value } => {
                let _ = write!(out, "({field}{}{value:?})", op.symbol());
            }
            Self::IsNull(field) => {
                let _ = write!(out, "({field} is null)");
            }
            Self::And(parts) | Self::Or(parts) => {
                out.push_str(if matches!(self, Self::And(_)) { "and[" } else { "or[" });
                for part in parts {
                    part.describe(out);
                }
                out.push(']');
            }
            Self::Not(inner) => {
                out.push_str("not");
                inner.describe(out);
            }
            Self::Custom(_) => out.push_str("custom"),
        }
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Compare { field, op, value } => Self::Compare {
                field: field.clone(),
                op: *op,
                value: value.clone(),
            },
            Self::IsNull(field) => Self::IsNull(field.clone()),
            Self::And(parts) => Self::And(parts.clone()),
            Self::Or(parts) => Self::Or(parts.clone()),
            Self::Not(inner) => Self::Not(inner.clone()),
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<T> Debug for Predicate<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.describe(&mut out);
        f.write_str(&out)
    }
}

/// Field reference used to build predicates: `field("value").gt(10)`.
#[derive(Debug, Clone)]
pub struct FieldRef(String);

/// Starts a predicate on a dotted field path.
pub fn field(path: impl Into<String>) -> FieldRef {
    FieldRef(path.into())
}

impl FieldRef {
    fn compare<T>(self, op: CompareOp, value: impl Into<Value>) -> Predicate<T> {
        Predicate::Compare {
            field: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn eq<T>(self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne<T>(self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt<T>(self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le<T>(self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt<T>(self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge<T>(self, value: impl Into<Value>) -> Predicate<T> {
        self.compare(CompareOp::Ge, value)
    }

    pub fn is_null<T>(self) -> Predicate<T> {
        Predicate::IsNull(self.0)
    }

    pub fn is_not_null<T>(self) -> Predicate<T> {
        Predicate::IsNull(self.0).not()
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// What a sort orders by.
pub enum SortKey<T> {
    Field(String),
    /// In-process only.
    Computed(ClosureKey<T>),
}

impl<T> SortKey<T> {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    pub fn is_translatable(&self) -> bool {
        matches!(self, Self::Field(_))
    }
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Field(path) => Self::Field(path.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<T> Debug for SortKey<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(path) => write!(f, "Field({path})"),
            Self::Computed(_) => f.write_str("Computed"),
        }
    }
}

impl<T> From<&str> for SortKey<T> {
    fn from(value: &str) -> Self {
        Self::Field(value.to_string())
    }
}

impl<T> From<String> for SortKey<T> {
    fn from(value: String) -> Self {
        Self::Field(value)
    }
}

impl<T> From<FieldRef> for SortKey<T> {
    fn from(value: FieldRef) -> Self {
        Self::Field(value.0)
    }
}

/// One sort key with its direction.
#[derive(Debug)]
pub struct OrderSpec<T> {
    pub key: SortKey<T>,
    pub direction: Direction,
}

impl<T> Clone for OrderSpec<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            direction: self.direction,
        }
    }
}

impl<T> OrderSpec<T> {
    pub(crate) fn describe(&self, out: &mut String) {
        let dir = match self.direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        let _ = write!(out, "{:?} {dir};", self.key);
    }
}
