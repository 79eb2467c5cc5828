//! Query descriptors produced by `parser` and consumed by `executor`.
//!
//! A descriptor is built once per query and never mutated afterwards.

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    Insert(InsertQuery),
    Delete(DeleteQuery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunc::Count),
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateArg {
    Wildcard,
    Column(String),
    /// `DISTINCT (a, b, ...)`
    Distinct(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldExpr {
    Wildcard,
    Column(String),
    Aggregate { func: AggregateFunc, arg: AggregateArg },
}

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub expr: FieldExpr,
    /// The expression as written, with `APPROXIMATE_COUNT` normalised to
    /// `COUNT`.
    pub text: String,
    pub alias: Option<String>,
    /// Written as `APPROXIMATE_COUNT(...)`.
    pub approximate: bool,
    /// Result key: the whole SELECT item as written, alias clause included.
    /// Approximate calls are keyed `APPROXIMATE_COUNT(...)`.
    pub key: String,
}

impl Field {
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            expr: FieldExpr::Column(name.clone()),
            text: name.clone(),
            alias: None,
            approximate: false,
            key: name,
        }
    }

    pub fn label(&self) -> &str {
        &self.key
    }

    /// Whether an ORDER BY term names this field, by alias, by expression
    /// or by its full result key.
    pub fn answers_to(&self, name: &str) -> bool {
        self.alias.as_deref() == Some(name) || self.text == name || self.key == name
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.expr, FieldExpr::Aggregate { .. })
    }

    pub fn is_count_star(&self) -> bool {
        matches!(
            self.expr,
            FieldExpr::Aggregate {
                func: AggregateFunc::Count,
                arg: AggregateArg::Wildcard
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub table: String,
    pub left_key: String,
    pub right_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Like,
}

/// A single `field <op> value` test. A quoted `value` keeps its delimiters
/// around the unescaped body; they are stripped during coercion. LIKE
/// patterns are stored unquoted.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    /// A column name or an aggregate call's normalised text.
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub fields: Vec<Field>,
    pub table: String,
    pub join: Option<JoinSpec>,
    /// Combined with AND semantics, whatever connector separated them.
    pub where_clauses: Vec<WhereClause>,
    pub group_by: Option<Vec<String>>,
    pub order_by: Option<Vec<OrderSpec>>,
    pub limit: Option<usize>,
    pub is_distinct: bool,
    /// Non-empty only when `is_count_distinct` is set.
    pub distinct_fields: Vec<String>,
    pub is_count_distinct: bool,
    pub is_approximate_count: bool,
    pub has_aggregate_without_group_by: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<String>,
    pub returning_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub where_clauses: Vec<WhereClause>,
}
