//! Query construction and filtering API.
//!
//! This module provides type-safe query construction with filtering, sorting
//! and result windowing.
//!
//! # Query building
//!
//! Queries can be assembled three ways, all producing a [`QuerySpec`]:
//!
//! ```ignore
//! use shelf::query::{asc, field, QueryOption, QuerySpec};
//!
//! // Fluent builder
//! let spec = QuerySpec::builder()
//!     .filter(field("age").gt(18))
//!     .sort("name", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//!
//! // Variadic options (duplicates are merged: filters AND together,
//! // sorts concatenate, the last limit and skip win)
//! let spec = QuerySpec::from_options([
//!     QueryOption::Filter(field("age").gt(18)),
//!     QueryOption::Sort(vec![asc("name")]),
//!     QueryOption::Limit(10),
//! ]);
//! ```
//!
//! # Filter expressions
//!
//! [`field`] starts a comparison on a (possibly nested, dot-separated) field
//! path:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`, `between`
//! - Membership: `in_values`, `contains`
//! - String: `like`, `regex`
//! - Existence: `is_null`, `is_not_null`
//!
//! Expressions combine with [`Expr::and`] and [`Expr::or`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
///
/// Specifies which field to sort by and in which direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortTerm {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Creates an ascending sort term for the given field.
pub fn asc(field: impl Into<String>) -> SortTerm {
    SortTerm { field: field.into(), direction: SortDirection::Asc }
}

/// Creates a descending sort term for the given field.
pub fn desc(field: impl Into<String>) -> SortTerm {
    SortTerm { field: field.into(), direction: SortDirection::Desc }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Value is one of the listed literals.
    In,
    /// Array field contains the value, or string field contains the substring.
    Contains,
    /// String matches a SQL-style wildcard pattern (`%` and `_`).
    Like,
    /// String matches a regular expression.
    Regex,
    /// Field is absent or null.
    IsNull,
    /// Field is present and not null.
    IsNotNull,
    /// Value lies within an inclusive range, given as a two-element array.
    Between,
}

/// A filter expression for querying stored documents.
///
/// Expressions can be combined using the logical operators `And` and `Or`
/// to build complex predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Field comparison expression.
    Field {
        /// The field path to compare, dot-separated for nested fields.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The literal to compare against.
        value: Value,
    },
}

impl Expr {
    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            expr => Expr::And(vec![expr, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            expr => Expr::Or(vec![expr, other]),
        }
    }
}

/// A literal that can appear on the right-hand side of a field comparison.
///
/// Dates convert to their millisecond offset from the Unix epoch, so stored
/// timestamps and query literals compare numerically.
pub trait IntoLiteral {
    /// Converts the value into its stored representation.
    fn into_literal(self) -> Value;
}

macro_rules! impl_into_literal {
    ($($ty:ty),*) => {
        $(impl IntoLiteral for $ty {
            fn into_literal(self) -> Value {
                Value::from(self)
            }
        })*
    };
}

impl_into_literal!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, &str, String);

impl IntoLiteral for Value {
    fn into_literal(self) -> Value {
        self
    }
}

impl IntoLiteral for DateTime<Utc> {
    fn into_literal(self) -> Value {
        Value::from(self.timestamp_millis())
    }
}

impl<L: IntoLiteral> IntoLiteral for Option<L> {
    fn into_literal(self) -> Value {
        match self {
            Some(value) => value.into_literal(),
            None => Value::Null,
        }
    }
}

/// Starts a comparison on the given field path.
///
/// Nested fields use dot separation, e.g. `field("address.city")`.
pub fn field(name: impl Into<String>) -> Field {
    Field { name: name.into() }
}

/// A field path awaiting a comparison operator.
///
/// Produced by [`field`]; each method consumes it and yields an [`Expr`].
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
}

impl Field {
    fn compare(self, op: FieldOp, value: Value) -> Expr {
        Expr::Field { field: self.name, op, value }
    }

    /// Equal to. Object literals expand into a conjunction of per-field
    /// equalities over dotted paths.
    pub fn eq(self, value: impl IntoLiteral) -> Expr {
        match value.into_literal() {
            Value::Object(map) => object_comparison(&self.name, map, FieldOp::Eq),
            value => self.compare(FieldOp::Eq, value),
        }
    }

    /// Not equal to. Object literals expand into a conjunction of per-field
    /// inequalities over dotted paths.
    pub fn ne(self, value: impl IntoLiteral) -> Expr {
        match value.into_literal() {
            Value::Object(map) => object_comparison(&self.name, map, FieldOp::Ne),
            value => self.compare(FieldOp::Ne, value),
        }
    }

    /// Greater than.
    pub fn gt(self, value: impl IntoLiteral) -> Expr {
        self.compare(FieldOp::Gt, value.into_literal())
    }

    /// Greater than or equal to.
    pub fn gte(self, value: impl IntoLiteral) -> Expr {
        self.compare(FieldOp::Gte, value.into_literal())
    }

    /// Less than.
    pub fn lt(self, value: impl IntoLiteral) -> Expr {
        self.compare(FieldOp::Lt, value.into_literal())
    }

    /// Less than or equal to.
    pub fn lte(self, value: impl IntoLiteral) -> Expr {
        self.compare(FieldOp::Lte, value.into_literal())
    }

    /// Value is one of the listed literals.
    pub fn in_values<L: IntoLiteral>(self, values: impl IntoIterator<Item = L>) -> Expr {
        let list = values.into_iter().map(IntoLiteral::into_literal).collect();
        self.compare(FieldOp::In, Value::Array(list))
    }

    /// Array field contains the value, or string field contains the substring.
    pub fn contains(self, value: impl IntoLiteral) -> Expr {
        self.compare(FieldOp::Contains, value.into_literal())
    }

    /// String matches a SQL-style wildcard pattern.
    ///
    /// `%` matches any run of characters and `_` matches exactly one.
    pub fn like(self, pattern: impl Into<String>) -> Expr {
        self.compare(FieldOp::Like, Value::String(pattern.into()))
    }

    /// String matches the given regular expression.
    pub fn regex(self, pattern: impl Into<String>) -> Expr {
        self.compare(FieldOp::Regex, Value::String(pattern.into()))
    }

    /// Field is absent or null.
    pub fn is_null(self) -> Expr {
        self.compare(FieldOp::IsNull, Value::Null)
    }

    /// Field is present and not null.
    pub fn is_not_null(self) -> Expr {
        self.compare(FieldOp::IsNotNull, Value::Null)
    }

    /// Value lies within the inclusive range `[low, high]`.
    pub fn between(self, low: impl IntoLiteral, high: impl IntoLiteral) -> Expr {
        let range = vec![low.into_literal(), high.into_literal()];
        self.compare(FieldOp::Between, Value::Array(range))
    }
}

/// Expands an object literal into per-field comparisons over dotted paths.
fn object_comparison(prefix: &str, map: Map<String, Value>, op: FieldOp) -> Expr {
    let mut terms = Vec::with_capacity(map.len());
    for (key, value) in map {
        let path = format!("{prefix}.{key}");
        match value {
            Value::Object(inner) => terms.push(object_comparison(&path, inner, op)),
            value => terms.push(Expr::Field { field: path, op, value }),
        }
    }
    Expr::And(terms)
}

/// A complete, declarative description of a read: an optional filter,
/// sort terms, and a result window.
///
/// A default spec matches every element of the queried type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Filter predicate; `None` matches everything.
    pub filter: Option<Expr>,
    /// Sort terms applied in order, earlier terms taking precedence.
    pub sort: Vec<SortTerm>,
    /// Maximum number of results to return.
    pub limit: Option<usize>,
    /// Number of leading results to discard. Only honored together with a
    /// limit; a skip without a limit is dropped when the query is compiled.
    pub skip: Option<usize>,
}

impl QuerySpec {
    /// Creates an empty spec that matches every element.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new builder for constructing a spec fluently.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// Builds a spec from a sequence of [`QueryOption`]s.
    ///
    /// Duplicate options merge deterministically: filters combine with AND,
    /// sort terms concatenate in the order given, and for limit and skip the
    /// last occurrence wins.
    pub fn from_options(options: impl IntoIterator<Item = QueryOption>) -> Self {
        let mut spec = QuerySpec::new();
        for option in options {
            match option {
                QueryOption::Filter(expr) => {
                    spec.filter = Some(match spec.filter.take() {
                        Some(existing) => existing.and(expr),
                        None => expr,
                    });
                }
                QueryOption::Sort(terms) => spec.sort.extend(terms),
                QueryOption::SortTerm(term) => spec.sort.push(term),
                QueryOption::Limit(limit) => spec.limit = Some(limit),
                QueryOption::Skip(skip) => spec.skip = Some(skip),
            }
        }
        spec
    }
}

/// A single query clause for the option-list form of query construction.
#[derive(Debug, Clone)]
pub enum QueryOption {
    /// Filter predicate. Multiple filters combine with AND.
    Filter(Expr),
    /// A group of sort terms, appended in order.
    Sort(Vec<SortTerm>),
    /// A single sort term.
    SortTerm(SortTerm),
    /// Maximum number of results. The last limit given wins.
    Limit(usize),
    /// Number of leading results to discard. The last skip given wins.
    Skip(usize),
}

/// Builder for constructing [`QuerySpec`] instances using a fluent API.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    spec: QuerySpec,
}

impl QueryBuilder {
    /// Sets the filter predicate. A second call ANDs onto the first.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.spec.filter = Some(match self.spec.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Appends a sort term for the given field and direction.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.spec.sort.push(SortTerm { field: field.into(), direction });
        self
    }

    /// Appends a group of sort terms.
    pub fn sorts(mut self, terms: impl IntoIterator<Item = SortTerm>) -> Self {
        self.spec.sort.extend(terms);
        self
    }

    /// Sets the maximum number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Sets the number of leading results to discard.
    pub fn skip(mut self, skip: usize) -> Self {
        self.spec.skip = Some(skip);
        self
    }

    /// Finalizes the builder into a [`QuerySpec`].
    pub fn build(self) -> QuerySpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn and_flattens_into_existing_conjunction() {
        let expr = field("a").eq(1).and(field("b").eq(2)).and(field("c").eq(3));
        match expr {
            Expr::And(list) => assert_eq!(list.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn object_literal_expands_to_dotted_paths() {
        let expr = field("address").eq(json!({ "city": "Turin", "geo": { "lat": 45 } }));
        let Expr::And(terms) = expr else { panic!("expected And") };
        assert!(terms.contains(&Expr::Field {
            field: "address.city".into(),
            op: FieldOp::Eq,
            value: json!("Turin"),
        }));
        assert!(terms.iter().any(|t| matches!(
            t,
            Expr::And(inner) if inner.contains(&Expr::Field {
                field: "address.geo.lat".into(),
                op: FieldOp::Eq,
                value: json!(45),
            })
        )));
    }

    #[test]
    fn date_literals_become_epoch_millis() {
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let expr = field("created_at").gt(when);
        assert_eq!(
            expr,
            Expr::Field {
                field: "created_at".into(),
                op: FieldOp::Gt,
                value: json!(when.timestamp_millis()),
            }
        );
    }

    #[test]
    fn options_merge_filters_and_take_last_limit() {
        let spec = QuerySpec::from_options([
            QueryOption::Filter(field("a").eq(1)),
            QueryOption::Limit(10),
            QueryOption::Filter(field("b").eq(2)),
            QueryOption::SortTerm(asc("a")),
            QueryOption::Limit(3),
            QueryOption::Skip(5),
        ]);
        assert_eq!(spec.filter, Some(field("a").eq(1).and(field("b").eq(2))));
        assert_eq!(spec.limit, Some(3));
        assert_eq!(spec.skip, Some(5));
        assert_eq!(spec.sort, vec![asc("a")]);
    }

    #[test]
    fn builder_concatenates_sorts() {
        let spec = QuerySpec::builder()
            .sort("age", SortDirection::Desc)
            .sorts([asc("name"), desc("city")])
            .build();
        assert_eq!(spec.sort, vec![desc("age"), asc("name"), desc("city")]);
    }
}
