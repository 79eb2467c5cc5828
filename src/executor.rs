//! SELECT, INSERT and DELETE execution against a [`RowStore`].
//!
//! A SELECT runs a fixed pipeline: approximate fast path, load, join,
//! filter, aggregate or group, order, then projection, DISTINCT and LIMIT.
//! Every query-level failure leaves the executor as
//! `MiniError::Execution`; row-store failures are passed through.

use crate::ast::{
    AggregateArg, AggregateFunc, DeleteQuery, Field, FieldExpr, InsertQuery, JoinKind, JoinSpec,
    Operator, OrderSpec, SelectQuery, SortDirection, Statement, WhereClause,
};
use crate::error::MiniError;
use crate::estimator::{Estimator, DEFAULT_BIT_SAMPLE_SIZE, DEFAULT_DIGEST_SIZE};
use crate::model::{Cell, Row, Table};
use crate::parser::parse_statement;
use crate::store::RowStore;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info};

pub const INSERT_MESSAGE: &str = "Row inserted successfully.";
pub const DELETE_MESSAGE: &str = "Rows deleted successfully.";

/// Estimator parameters used for every approximate count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub bit_sample_size: u8,
    pub digest_size: u16,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            bit_sample_size: DEFAULT_BIT_SAMPLE_SIZE,
            digest_size: DEFAULT_DIGEST_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecOutput {
    Rows(Vec<Row>),
    Inserted(InsertOutcome),
    Deleted(DeleteOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub message: String,
    /// Set only when the id was generated.
    pub inserted_id: Option<String>,
    pub returning: Row,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub message: String,
    pub deleted: usize,
}

pub struct Executor<S> {
    store: S,
    config: ExecutorConfig,
}

impl<S: RowStore> Executor<S> {
    pub fn new(store: S, config: ExecutorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Parses `sql` and runs it.
    pub fn execute(&self, sql: &str) -> Result<ExecOutput, MiniError> {
        let statement = parse_statement(sql).map_err(MiniError::in_execution)?;
        match statement {
            Statement::Select(query) => self.execute_select(&query).map(ExecOutput::Rows),
            Statement::Insert(query) => self.execute_insert(&query).map(ExecOutput::Inserted),
            Statement::Delete(query) => self.execute_delete(&query).map(ExecOutput::Deleted),
        }
    }

    pub fn execute_select(&self, query: &SelectQuery) -> Result<Vec<Row>, MiniError> {
        let started = Instant::now();
        let rows = self.select(query).map_err(MiniError::in_execution)?;
        debug!(
            table = %query.table,
            rows = rows.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "select finished"
        );
        Ok(rows)
    }

    pub fn execute_insert(&self, query: &InsertQuery) -> Result<InsertOutcome, MiniError> {
        self.insert(query).map_err(MiniError::in_execution)
    }

    pub fn execute_delete(&self, query: &DeleteQuery) -> Result<DeleteOutcome, MiniError> {
        self.delete(query).map_err(MiniError::in_execution)
    }

    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, MiniError> {
        if let Some(field) = streamed_count_field(query) {
            info!(table = %query.table, "approximate count over streamed rows");
            let estimator = self.store.read_table_for_estimator(
                &query.table,
                self.config.bit_sample_size,
                self.config.digest_size,
            )?;
            let row: Row = [(result_key(field), rounded_estimate(&estimator))]
                .into_iter()
                .collect();
            return Ok(apply_limit(vec![row], query.limit));
        }

        let main = self.store.read_table(&query.table)?;
        let rows = match &query.join {
            Some(spec) => {
                let other = self.store.read_table(&spec.table)?;
                join_tables(&query.table, &main, spec, &other)?
            }
            None => main.rows,
        };

        let predicates = compile_predicates(&query.where_clauses)?;
        let rows = filter_rows(rows, &predicates)?;

        let mut result = if let Some(group_by) = &query.group_by {
            group_rows(&rows, group_by, &query.fields, self.config)?
        } else if query.has_aggregate_without_group_by {
            vec![aggregate_rows(&rows, &query.fields, self.config)?]
        } else {
            let mut rows = rows;
            if let Some(order) = &query.order_by {
                sort_rows(&mut rows, &order_keys(order, &query.fields, false));
            }
            let projected = project_rows(&rows, &query.fields)?;
            let projected = if query.is_distinct {
                distinct_rows(projected)
            } else {
                projected
            };
            return Ok(apply_limit(projected, query.limit));
        };

        if let Some(order) = &query.order_by {
            sort_rows(&mut result, &order_keys(order, &query.fields, true));
        }
        Ok(apply_limit(result, query.limit))
    }

    fn insert(&self, query: &InsertQuery) -> Result<InsertOutcome, MiniError> {
        let mut table = self.store.read_table(&query.table)?;
        let mut columns = query.columns.clone();
        let mut values = query.values.clone();

        let mut inserted_id = None;
        let has_id_column = table.columns.iter().any(|c| c == "id");
        if !columns.iter().any(|c| c == "id") && !table.rows.is_empty() && has_id_column {
            let max_id = table
                .rows
                .iter()
                .filter_map(|row| row.get("id"))
                .filter_map(|cell| cell.to_string().trim().parse::<i64>().ok())
                .max()
                .unwrap_or(0);
            let next = max_id
                .checked_add(1)
                .ok_or_else(|| MiniError::Invalid(format!("no id left after {max_id} in {}", query.table)))?
                .to_string();
            columns.push("id".to_string());
            values.push(next.clone());
            inserted_id = Some(next);
        }

        if table.columns.is_empty() {
            table.columns = columns.clone();
        } else {
            for column in &columns {
                if !table.columns.contains(column) {
                    table.columns.push(column.clone());
                }
            }
        }

        let row: Row = table
            .columns
            .iter()
            .map(|header| {
                let value = columns
                    .iter()
                    .position(|c| c == header)
                    .map_or("", |i| values[i].as_str());
                (header.clone(), Cell::text(value))
            })
            .collect();

        table.rows.push(row.clone());
        self.store.write_table(&query.table, &table)?;
        info!(table = %query.table, id = ?inserted_id, "row inserted");

        let mut returning = Row::new();
        for column in &query.returning_columns {
            if column == "*" {
                for (name, cell) in row.iter() {
                    returning.insert(name, cell.clone());
                }
            } else {
                returning.insert(column.clone(), row.get(column).cloned().unwrap_or(Cell::Null));
            }
        }

        Ok(InsertOutcome {
            message: INSERT_MESSAGE.to_string(),
            inserted_id,
            returning,
        })
    }

    fn delete(&self, query: &DeleteQuery) -> Result<DeleteOutcome, MiniError> {
        let mut table = self.store.read_table(&query.table)?;
        let before = table.rows.len();

        if query.where_clauses.is_empty() {
            table.rows.clear();
        } else {
            let predicates = compile_predicates(&query.where_clauses)?;
            let mut kept = Vec::with_capacity(table.rows.len());
            for row in table.rows {
                if !matches_all(&row, &predicates)? {
                    kept.push(row);
                }
            }
            table.rows = kept;
        }

        let deleted = before - table.rows.len();
        self.store.write_table(&query.table, &table)?;
        info!(table = %query.table, deleted, "rows deleted");
        Ok(DeleteOutcome {
            message: DELETE_MESSAGE.to_string(),
            deleted,
        })
    }
}

/// `APPROXIMATE_COUNT(*)` alone over a single unfiltered table can be
/// answered without loading the table.
fn streamed_count_field(query: &SelectQuery) -> Option<&Field> {
    match query.fields.as_slice() {
        [field]
            if field.approximate
                && field.is_count_star()
                && query.where_clauses.is_empty()
                && query.join.is_none()
                && query.group_by.is_none() =>
        {
            Some(field)
        }
        _ => None,
    }
}

fn result_key(field: &Field) -> String {
    field.key.clone()
}

fn rounded_estimate(estimator: &Estimator) -> Cell {
    Cell::Int(estimator.estimate().round() as i64)
}

fn apply_limit(mut rows: Vec<Row>, limit: Option<usize>) -> Vec<Row> {
    if let Some(n) = limit {
        rows.truncate(n);
    }
    rows
}

fn lookup<'r>(row: &'r Row, field: &str) -> Result<&'r Cell, MiniError> {
    row.resolve(field)
        .ok_or_else(|| MiniError::Evaluation(format!("Invalid field: {field}")))
}

/// Values of `fields` joined with `|`; null contributes an empty string.
fn composite_key(row: &Row, fields: &[String]) -> Result<String, MiniError> {
    let mut key = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            key.push('|');
        }
        match lookup(row, field)? {
            Cell::Null => {}
            cell => key.push_str(&cell.to_string()),
        }
    }
    Ok(key)
}

// ---------------------------------------------------------------------------
// Values and comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Value<'a> {
    Null,
    Number(f64),
    Text(Cow<'a, str>),
}

impl Value<'_> {
    fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Number(n) => Cow::Owned(Cell::from_number(*n).to_string()),
            Value::Text(s) => Cow::Borrowed(s.as_ref()),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Strips one layer of quotes, then reads the text as a number if it is
/// one in full.
fn coerce_text(raw: &str) -> Value<'_> {
    let text = strip_quotes(raw);
    match parse_number(text) {
        Some(n) => Value::Number(n),
        None => Value::Text(Cow::Borrowed(text)),
    }
}

fn coerce(cell: &Cell) -> Value<'_> {
    match cell {
        Cell::Null => Value::Null,
        Cell::Int(i) => Value::Number(*i as f64),
        Cell::Float(f) => Value::Number(*f),
        Cell::Text(s) => coerce_text(s),
    }
}

/// Numbers compare numerically, anything else as text. Null sorts first
/// and equals only null.
fn compare_values(a: &Value<'_>, b: &Value<'_>) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => a.as_text().cmp(&b.as_text()),
    }
}

fn operator_holds(operator: Operator, ordering: Ordering) -> bool {
    match operator {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::NotEq => ordering != Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Lt => ordering == Ordering::Less,
        Operator::GtEq => ordering != Ordering::Less,
        Operator::LtEq => ordering != Ordering::Greater,
        Operator::Like => false,
    }
}

// ---------------------------------------------------------------------------
// WHERE
// ---------------------------------------------------------------------------

/// `%` matches any run, `_` one character; the match is anchored and
/// case-insensitive.
fn like_regex(pattern: &str) -> Result<Regex, MiniError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 6);
    out.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    Regex::new(&out)
        .map_err(|e| MiniError::Evaluation(format!("Invalid LIKE pattern '{pattern}': {e}")))
}

enum Predicate<'q> {
    Compare {
        field: &'q str,
        operator: Operator,
        value: Value<'q>,
    },
    Like {
        field: &'q str,
        pattern: Regex,
    },
}

impl<'q> Predicate<'q> {
    fn compile(clause: &'q WhereClause) -> Result<Self, MiniError> {
        Ok(match clause.operator {
            Operator::Like => Predicate::Like {
                field: &clause.field,
                pattern: like_regex(&clause.value)?,
            },
            operator => Predicate::Compare {
                field: &clause.field,
                operator,
                value: coerce_text(&clause.value),
            },
        })
    }

    fn matches(&self, row: &Row) -> Result<bool, MiniError> {
        match self {
            Predicate::Like { field, pattern } => Ok(match lookup(row, field)? {
                Cell::Null => false,
                Cell::Text(s) => pattern.is_match(s),
                other => pattern.is_match(&other.to_string()),
            }),
            Predicate::Compare {
                field,
                operator,
                value,
            } => {
                let lhs = coerce(lookup(row, field)?);
                Ok(operator_holds(*operator, compare_values(&lhs, value)))
            }
        }
    }
}

fn compile_predicates(clauses: &[WhereClause]) -> Result<Vec<Predicate<'_>>, MiniError> {
    clauses.iter().map(Predicate::compile).collect()
}

fn matches_all(row: &Row, predicates: &[Predicate<'_>]) -> Result<bool, MiniError> {
    for predicate in predicates {
        if !predicate.matches(row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn filter_rows(rows: Vec<Row>, predicates: &[Predicate<'_>]) -> Result<Vec<Row>, MiniError> {
    if predicates.is_empty() {
        return Ok(rows);
    }
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if matches_all(&row, predicates)? {
            kept.push(row);
        }
    }
    Ok(kept)
}

// ---------------------------------------------------------------------------
// JOIN
// ---------------------------------------------------------------------------

fn key_column<'t>(table: &'t Table, key: &str) -> Result<&'t str, MiniError> {
    let bare = key.rsplit_once('.').map_or(key, |(_, column)| column);
    table
        .columns
        .iter()
        .find(|c| *c == bare)
        .map(String::as_str)
        .ok_or_else(|| MiniError::Evaluation(format!("Invalid field: {key}")))
}

fn key_of<'r>(row: &'r Row, column: &str) -> Option<&'r str> {
    row.get(column).and_then(Cell::as_text)
}

fn index_rows<'t>(rows: &'t [Row], column: &str) -> HashMap<&'t str, Vec<&'t Row>> {
    let mut index: HashMap<&str, Vec<&Row>> = HashMap::new();
    for row in rows {
        if let Some(key) = key_of(row, column) {
            index.entry(key).or_default().push(row);
        }
    }
    index
}

/// Appends every column of `table` as `name.column`, null when `row` is
/// absent.
fn qualify_into(out: &mut Row, name: &str, table: &Table, row: Option<&Row>) {
    for column in &table.columns {
        let cell = row
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or(Cell::Null);
        out.insert(format!("{name}.{column}"), cell);
    }
}

fn join_tables(
    main_name: &str,
    main: &Table,
    spec: &JoinSpec,
    other: &Table,
) -> Result<Vec<Row>, MiniError> {
    // ON keys may be written in either order.
    let (main_key, other_key) = match spec.left_key.split_once('.') {
        Some((qualifier, _)) if qualifier == spec.table && qualifier != main_name => {
            (&spec.right_key, &spec.left_key)
        }
        _ => (&spec.left_key, &spec.right_key),
    };
    let main_column = key_column(main, main_key)?;
    let other_column = key_column(other, other_key)?;

    let combine = |m: Option<&Row>, o: Option<&Row>| {
        let mut row = Row::with_capacity(main.columns.len() + other.columns.len());
        qualify_into(&mut row, main_name, main, m);
        qualify_into(&mut row, &spec.table, other, o);
        row
    };

    let mut out = Vec::new();
    match spec.kind {
        JoinKind::Inner | JoinKind::Left => {
            let index = index_rows(&other.rows, other_column);
            for m in &main.rows {
                match key_of(m, main_column).and_then(|k| index.get(k)) {
                    Some(found) => out.extend(found.iter().map(|o| combine(Some(m), Some(*o)))),
                    None if spec.kind == JoinKind::Left => out.push(combine(Some(m), None)),
                    None => {}
                }
            }
        }
        JoinKind::Right => {
            let index = index_rows(&main.rows, main_column);
            for o in &other.rows {
                match key_of(o, other_column).and_then(|k| index.get(k)) {
                    Some(found) => out.extend(found.iter().map(|m| combine(Some(*m), Some(o)))),
                    None => out.push(combine(None, Some(o))),
                }
            }
        }
    }
    debug!(
        kind = ?spec.kind,
        left = main.rows.len(),
        right = other.rows.len(),
        joined = out.len(),
        "joined tables"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

enum AggState {
    Count(u64),
    Distinct(HashSet<String>),
    Approximate(Estimator),
    Sum(f64),
    Avg { total: f64, count: u64 },
    Min(Option<f64>),
    Max(Option<f64>),
}

struct Aggregate<'q> {
    field: &'q Field,
    arg: &'q AggregateArg,
    state: AggState,
}

impl<'q> Aggregate<'q> {
    /// `None` for fields that are not aggregate calls.
    fn new(field: &'q Field, config: ExecutorConfig) -> Result<Option<Self>, MiniError> {
        let FieldExpr::Aggregate { func, arg } = &field.expr else {
            return Ok(None);
        };
        let state = match (func, arg) {
            (AggregateFunc::Count, _) if field.approximate => AggState::Approximate(
                Estimator::new(config.bit_sample_size, config.digest_size)?,
            ),
            (AggregateFunc::Count, AggregateArg::Distinct(_)) => AggState::Distinct(HashSet::new()),
            (AggregateFunc::Count, _) => AggState::Count(0),
            (AggregateFunc::Sum, AggregateArg::Column(_)) => AggState::Sum(0.0),
            (AggregateFunc::Avg, AggregateArg::Column(_)) => AggState::Avg {
                total: 0.0,
                count: 0,
            },
            (AggregateFunc::Min, AggregateArg::Column(_)) => AggState::Min(None),
            (AggregateFunc::Max, AggregateArg::Column(_)) => AggState::Max(None),
            _ => {
                return Err(MiniError::Evaluation(format!(
                    "Invalid argument in {}",
                    field.text
                )))
            }
        };
        Ok(Some(Self { field, arg, state }))
    }

    fn add(&mut self, row: &Row) -> Result<(), MiniError> {
        let arg = self.arg;
        match &mut self.state {
            AggState::Count(n) => *n += 1,
            AggState::Distinct(seen) => {
                if let AggregateArg::Distinct(columns) = arg {
                    seen.insert(composite_key(row, columns)?);
                }
            }
            AggState::Approximate(estimator) => match arg {
                AggregateArg::Distinct(columns) => {
                    estimator.insert(composite_key(row, columns)?.as_bytes())
                }
                _ => estimator.insert(&serde_json::to_vec(row)?),
            },
            AggState::Sum(total) => {
                if let Some(n) = numeric_arg(arg, row)? {
                    *total += n;
                }
            }
            AggState::Avg { total, count } => {
                if let Some(n) = numeric_arg(arg, row)? {
                    *total += n;
                    *count += 1;
                }
            }
            AggState::Min(current) => {
                if let Some(n) = numeric_arg(arg, row)? {
                    *current = Some(current.map_or(n, |c| c.min(n)));
                }
            }
            AggState::Max(current) => {
                if let Some(n) = numeric_arg(arg, row)? {
                    *current = Some(current.map_or(n, |c| c.max(n)));
                }
            }
        }
        Ok(())
    }

    fn finish(&self) -> Cell {
        match &self.state {
            AggState::Count(n) => Cell::Int(*n as i64),
            AggState::Distinct(seen) => Cell::Int(seen.len() as i64),
            AggState::Approximate(estimator) => rounded_estimate(estimator),
            AggState::Sum(total) => Cell::from_number(*total),
            AggState::Avg { count: 0, .. } => Cell::Null,
            AggState::Avg { total, count } => Cell::from_number(total / *count as f64),
            AggState::Min(v) | AggState::Max(v) => v.map_or(Cell::Null, Cell::from_number),
        }
    }
}

/// Numeric value of the aggregate's column on `row`; non-numeric and null
/// values are skipped.
fn numeric_arg(arg: &AggregateArg, row: &Row) -> Result<Option<f64>, MiniError> {
    let AggregateArg::Column(column) = arg else {
        return Ok(None);
    };
    Ok(match coerce(lookup(row, column)?) {
        Value::Number(n) => Some(n),
        _ => None,
    })
}

fn new_aggregates(
    fields: &[Field],
    config: ExecutorConfig,
) -> Result<Vec<Aggregate<'_>>, MiniError> {
    fields
        .iter()
        .filter_map(|f| Aggregate::new(f, config).transpose())
        .collect()
}

fn aggregate_rows(rows: &[Row], fields: &[Field], config: ExecutorConfig) -> Result<Row, MiniError> {
    let mut aggregates = new_aggregates(fields, config)?;
    for row in rows {
        for aggregate in &mut aggregates {
            aggregate.add(row)?;
        }
    }
    Ok(aggregates
        .iter()
        .map(|a| (result_key(a.field), a.finish()))
        .collect())
}

/// Groups are emitted in the order their key was first seen.
fn group_rows(
    rows: &[Row],
    group_by: &[String],
    fields: &[Field],
    config: ExecutorConfig,
) -> Result<Vec<Row>, MiniError> {
    let mut groups: Vec<(Vec<Cell>, Vec<Aggregate<'_>>)> = Vec::new();
    let mut index: HashMap<Vec<Cell>, usize> = HashMap::new();

    for row in rows {
        let key = group_by
            .iter()
            .map(|f| lookup(row, f).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                groups.push((key.clone(), new_aggregates(fields, config)?));
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        for aggregate in &mut groups[slot].1 {
            aggregate.add(row)?;
        }
    }
    debug!(groups = groups.len(), "grouped rows");

    Ok(groups
        .into_iter()
        .map(|(key, aggregates)| {
            let mut out = Row::with_capacity(key.len() + aggregates.len());
            for (field, cell) in group_by.iter().zip(key) {
                out.insert(field.clone(), cell);
            }
            for aggregate in &aggregates {
                out.insert(result_key(aggregate.field), aggregate.finish());
            }
            out
        })
        .collect())
}

// ---------------------------------------------------------------------------
// ORDER BY, projection, DISTINCT
// ---------------------------------------------------------------------------

/// Maps each ORDER BY term onto the key it reads on the rows being sorted.
/// Source rows are sorted before projection, so an alias points back at
/// its column; aggregated rows carry aggregates under their result key.
fn order_keys(specs: &[OrderSpec], fields: &[Field], aggregated: bool) -> Vec<OrderSpec> {
    specs
        .iter()
        .map(|spec| {
            let field = match fields.iter().find(|f| f.answers_to(&spec.field)) {
                Some(field) => match &field.expr {
                    FieldExpr::Column(column) => column.clone(),
                    FieldExpr::Aggregate { .. } if aggregated => result_key(field),
                    _ => spec.field.clone(),
                },
                None => spec.field.clone(),
            };
            OrderSpec {
                field,
                direction: spec.direction,
            }
        })
        .collect()
}

fn sort_value<'r>(row: &'r Row, field: &str) -> Value<'r> {
    row.resolve(field).map_or(Value::Null, coerce)
}

/// Stable; rows equal on every key keep their relative order.
fn sort_rows(rows: &mut [Row], specs: &[OrderSpec]) {
    rows.sort_by(|a, b| {
        for spec in specs {
            let ordering = compare_values(&sort_value(a, &spec.field), &sort_value(b, &spec.field));
            let ordering = match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(row: &Row, fields: &[Field]) -> Result<Row, MiniError> {
    let mut out = Row::with_capacity(fields.len());
    for field in fields {
        match &field.expr {
            FieldExpr::Wildcard => {
                for (name, cell) in row.iter() {
                    out.insert(name, cell.clone());
                }
            }
            FieldExpr::Column(column) => out.insert(field.label(), lookup(row, column)?.clone()),
            FieldExpr::Aggregate { .. } => {
                return Err(MiniError::Evaluation(format!(
                    "Unexpected aggregate {}",
                    field.text
                )))
            }
        }
    }
    Ok(out)
}

fn project_rows(rows: &[Row], fields: &[Field]) -> Result<Vec<Row>, MiniError> {
    rows.iter().map(|row| project(row, fields)).collect()
}

/// First occurrence of each distinct value tuple wins.
fn distinct_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen: HashSet<Vec<Cell>> = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let key: Vec<Cell> = row.iter().map(|(_, cell)| cell.clone()).collect();
        if seen.insert(key) {
            out.push(row);
        }
    }
    out
}
