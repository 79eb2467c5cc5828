//! Tokenizer and recursive-descent parser for the query dialect.
//!
//! Entry points accept a single statement (an optional trailing `;` is
//! ignored) and report every failure as `MiniError::Parse`, whose message
//! reads `Query parsing error: <cause>`.

use crate::ast::{
    AggregateArg, AggregateFunc, DeleteQuery, Field, FieldExpr, InsertQuery, JoinKind, JoinSpec,
    Operator, OrderSpec, SelectQuery, SortDirection, Statement, WhereClause,
};
use crate::error::MiniError;
use tracing::debug;

const APPROXIMATE_COUNT: &str = "APPROXIMATE_COUNT";

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Keyword(String),
    Word(String),
    /// A quoted run; `quote` is the delimiter, `value` the unescaped body.
    Quoted { value: String, quote: char },
    Number(String),
    Operator(String),
    Symbol(char),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "SELECT"
            | "DISTINCT"
            | "FROM"
            | "WHERE"
            | "GROUP"
            | "ORDER"
            | "BY"
            | "LIMIT"
            | "ASC"
            | "DESC"
            | "AS"
            | "AND"
            | "OR"
            | "LIKE"
            | "JOIN"
            | "INNER"
            | "LEFT"
            | "RIGHT"
            | "OUTER"
            | "ON"
            | "INSERT"
            | "INTO"
            | "VALUES"
            | "RETURNING"
            | "DELETE"
    )
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn tokenize(mut self) -> Result<Vec<Token>, MiniError> {
        let mut tokens = Vec::new();
        loop {
            while let Some(c) = self.peek_char().filter(|c| c.is_whitespace()) {
                self.pos += c.len_utf8();
            }
            let start = self.pos;
            let Some(ch) = self.peek_char() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    start,
                    end: start,
                });
                return Ok(tokens);
            };
            let kind = self.next_kind(ch)?;
            tokens.push(Token {
                kind,
                start,
                end: self.pos,
            });
        }
    }

    fn next_kind(&mut self, ch: char) -> Result<TokenKind, MiniError> {
        if ch.is_alphabetic() || ch == '_' {
            let start = self.pos;
            while let Some(c) = self
                .peek_char()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            {
                self.pos += c.len_utf8();
            }
            let word = &self.input[start..self.pos];
            let upper = word.to_ascii_uppercase();
            if is_keyword(&upper) {
                return Ok(TokenKind::Keyword(upper));
            }
            return Ok(TokenKind::Word(word.to_string()));
        }

        let rest = &self.input[self.pos..];
        let signed_number = ch == '-'
            && rest[1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit());
        if ch.is_ascii_digit() || signed_number {
            let start = self.pos;
            self.pos += 1;
            let mut saw_dot = false;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.pos += 1;
                } else if c == '.' && !saw_dot {
                    saw_dot = true;
                    self.pos += 1;
                } else {
                    break;
                }
            }
            return Ok(TokenKind::Number(self.input[start..self.pos].to_string()));
        }

        match ch {
            '\'' | '"' | '`' => return self.lex_quoted(ch),
            _ => {}
        }

        for op in [">=", "<=", "!=", "<>", "=="] {
            if rest.starts_with(op) {
                self.pos += 2;
                return Ok(TokenKind::Operator(op.to_string()));
            }
        }

        self.pos += ch.len_utf8();
        match ch {
            '=' | '<' | '>' => Ok(TokenKind::Operator(ch.to_string())),
            '(' | ')' | ',' | '.' | ';' | '*' => Ok(TokenKind::Symbol(ch)),
            _ => Err(MiniError::Syntax(format!("Unexpected character '{ch}'"))),
        }
    }

    fn lex_quoted(&mut self, quote: char) -> Result<TokenKind, MiniError> {
        self.pos += quote.len_utf8();
        let mut value = String::new();
        while let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
            if c != quote {
                value.push(c);
                continue;
            }
            // A doubled delimiter escapes itself.
            if self.peek_char() == Some(quote) {
                value.push(quote);
                self.pos += quote.len_utf8();
                continue;
            }
            return Ok(TokenKind::Quoted { value, quote });
        }
        Err(MiniError::Syntax("Unterminated quoted string".into()))
    }
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, MiniError> {
        let input = input.trim();
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            input,
            tokens,
            pos: 0,
        })
    }

    fn current(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos;
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), TokenKind::Keyword(k) if k == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str, err: &str) -> Result<(), MiniError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(MiniError::Syntax(err.to_string()))
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if matches!(self.current(), TokenKind::Symbol(s) if *s == symbol) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char, err: &str) -> Result<(), MiniError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(MiniError::Syntax(err.to_string()))
        }
    }

    fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .map(|i| self.tokens[i].end)
            .unwrap_or(0)
    }

    /// Requires the statement to be fully consumed, allowing one `;`.
    fn finish(&mut self) -> Result<(), MiniError> {
        self.eat_symbol(';');
        let tok = &self.tokens[self.pos];
        if tok.kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(MiniError::Syntax(format!(
                "Unexpected token '{}'",
                &self.input[tok.start..tok.end]
            )))
        }
    }

    fn name_part(&mut self) -> Option<String> {
        let part = match self.current() {
            TokenKind::Word(w) => w.clone(),
            TokenKind::Quoted { value, quote } if *quote != '\'' => value.clone(),
            _ => return None,
        };
        self.advance();
        Some(part)
    }

    /// A possibly qualified name such as `student.name` or
    /// `"public"."grades"`, returned as its unquoted parts.
    fn name_parts(&mut self) -> Option<Vec<String>> {
        let mut parts = vec![self.name_part()?];
        while matches!(self.current(), TokenKind::Symbol('.')) {
            let save = self.pos;
            self.advance();
            match self.name_part() {
                Some(p) => parts.push(p),
                None => {
                    self.pos = save;
                    break;
                }
            }
        }
        Some(parts)
    }

    fn qualified_name(&mut self) -> Option<String> {
        self.name_parts().map(|parts| parts.join("."))
    }

    /// The last part of a name, dropping schema and table qualifiers.
    fn bare_name(&mut self) -> Option<String> {
        self.name_parts().and_then(|mut parts| parts.pop())
    }

    fn name_list(&mut self, err: &str) -> Result<Vec<String>, MiniError> {
        let mut out = Vec::new();
        loop {
            out.push(
                self.qualified_name()
                    .ok_or_else(|| MiniError::Syntax(err.to_string()))?,
            );
            if !self.eat_symbol(',') {
                return Ok(out);
            }
        }
    }

    fn select(&mut self) -> Result<SelectQuery, MiniError> {
        const INVALID: &str = "Invalid SELECT format";
        self.expect_keyword("SELECT", INVALID)?;
        let is_distinct = self.eat_keyword("DISTINCT");

        let mut fields = Vec::new();
        let mut is_approximate_count = false;
        loop {
            let (field, approximate) = self.field()?;
            is_approximate_count |= approximate;
            fields.push(field);
            if !self.eat_symbol(',') {
                break;
            }
        }

        self.expect_keyword("FROM", INVALID)?;
        let table = self
            .bare_name()
            .ok_or_else(|| MiniError::Syntax(INVALID.into()))?;

        let join = self.join()?;

        let where_clauses = if self.eat_keyword("WHERE") {
            self.where_clauses()?
        } else {
            Vec::new()
        };

        let mut group_by = None;
        let mut order_by = None;
        let mut limit = None;
        let mut saw_limit = false;
        loop {
            if self.is_keyword("GROUP") && group_by.is_none() {
                self.advance();
                self.expect_keyword("BY", "Invalid GROUP BY clause")?;
                group_by = Some(self.name_list("Invalid GROUP BY clause")?);
            } else if self.is_keyword("ORDER") && order_by.is_none() {
                self.advance();
                self.expect_keyword("BY", "Invalid ORDER BY clause")?;
                order_by = Some(self.order_specs()?);
            } else if self.is_keyword("LIMIT") && !saw_limit {
                self.advance();
                saw_limit = true;
                limit = self.limit()?;
            } else {
                break;
            }
        }
        self.finish()?;

        let (is_count_distinct, distinct_fields) = fields
            .iter()
            .find_map(|f| match &f.expr {
                FieldExpr::Aggregate {
                    arg: AggregateArg::Distinct(cols),
                    ..
                } => Some((true, cols.clone())),
                _ => None,
            })
            .unwrap_or((false, Vec::new()));
        let has_aggregate_without_group_by =
            group_by.is_none() && fields.iter().any(Field::is_aggregate);

        Ok(SelectQuery {
            fields,
            table,
            join,
            where_clauses,
            group_by,
            order_by,
            limit,
            is_distinct,
            distinct_fields,
            is_count_distinct,
            is_approximate_count,
            has_aggregate_without_group_by,
        })
    }

    /// One SELECT-list entry. The flag reports an `APPROXIMATE_COUNT` call.
    fn field(&mut self) -> Result<(Field, bool), MiniError> {
        const INVALID: &str = "Invalid SELECT format";
        let start = self.tokens[self.pos].start;

        let (expr, approximate) = if self.eat_symbol('*') {
            (FieldExpr::Wildcard, false)
        } else {
            self.expression(INVALID)?
        };
        let written = &self.input[start..self.previous_end()];
        let text = if approximate {
            format!("COUNT{}", &written[APPROXIMATE_COUNT.len()..])
        } else {
            written.to_string()
        };

        let alias = if self.eat_keyword("AS") {
            Some(
                self.name_part()
                    .ok_or_else(|| MiniError::Syntax(INVALID.into()))?,
            )
        } else {
            None
        };
        let mut key = self.input[start..self.previous_end()].to_string();
        if approximate {
            key = format!("{APPROXIMATE_COUNT}{}", &key[APPROXIMATE_COUNT.len()..]);
        }

        Ok((
            Field {
                expr,
                text,
                alias,
                approximate,
                key,
            },
            approximate,
        ))
    }

    /// A column reference or an aggregate call. The flag reports an
    /// `APPROXIMATE_COUNT` call.
    fn expression(&mut self, invalid: &str) -> Result<(FieldExpr, bool), MiniError> {
        let next = self.tokens.get(self.pos + 1).map(|t| &t.kind);
        let function = match (self.current(), next) {
            (TokenKind::Word(w), Some(TokenKind::Symbol('('))) => Some(w.clone()),
            _ => None,
        };
        match function {
            Some(name) => {
                self.advance();
                self.advance();
                self.aggregate(&name)
            }
            None => {
                let column = self
                    .qualified_name()
                    .ok_or_else(|| MiniError::Syntax(invalid.into()))?;
                Ok((FieldExpr::Column(column), false))
            }
        }
    }

    /// Parses the argument list of `name(`, through the closing paren.
    fn aggregate(&mut self, name: &str) -> Result<(FieldExpr, bool), MiniError> {
        let approximate = name.eq_ignore_ascii_case(APPROXIMATE_COUNT);
        let func = if approximate {
            AggregateFunc::Count
        } else {
            AggregateFunc::from_name(name)
                .ok_or_else(|| MiniError::Syntax(format!("Unsupported function: {name}")))?
        };

        let arg = if self.eat_symbol('*') {
            AggregateArg::Wildcard
        } else if self.eat_keyword("DISTINCT") {
            if func != AggregateFunc::Count {
                return Err(MiniError::Syntax(format!(
                    "DISTINCT is only supported inside COUNT, not {name}"
                )));
            }
            let cols = if self.eat_symbol('(') {
                let cols = self.name_list("Invalid DISTINCT column list")?;
                self.expect_symbol(')', "Invalid DISTINCT column list")?;
                cols
            } else {
                self.name_list("Invalid DISTINCT column list")?
            };
            AggregateArg::Distinct(cols)
        } else {
            let column = self
                .qualified_name()
                .ok_or_else(|| MiniError::Syntax(format!("Invalid argument to {name}")))?;
            AggregateArg::Column(column)
        };
        self.expect_symbol(')', &format!("Unclosed call to {name}"))?;
        Ok((FieldExpr::Aggregate { func, arg }, approximate))
    }

    fn join(&mut self) -> Result<Option<JoinSpec>, MiniError> {
        const INVALID: &str = "Invalid JOIN format";
        let kind = if self.eat_keyword("INNER") {
            JoinKind::Inner
        } else if self.eat_keyword("LEFT") {
            self.eat_keyword("OUTER");
            JoinKind::Left
        } else if self.eat_keyword("RIGHT") {
            self.eat_keyword("OUTER");
            JoinKind::Right
        } else if self.is_keyword("JOIN") {
            JoinKind::Inner
        } else {
            return Ok(None);
        };
        self.expect_keyword("JOIN", INVALID)?;
        let table = self
            .bare_name()
            .ok_or_else(|| MiniError::Syntax(INVALID.into()))?;
        self.expect_keyword("ON", INVALID)?;
        let left_key = self
            .qualified_name()
            .ok_or_else(|| MiniError::Syntax(INVALID.into()))?;
        if !matches!(self.current(), TokenKind::Operator(op) if op == "=") {
            return Err(MiniError::Syntax(INVALID.into()));
        }
        self.advance();
        let right_key = self
            .qualified_name()
            .ok_or_else(|| MiniError::Syntax(INVALID.into()))?;
        Ok(Some(JoinSpec {
            kind,
            table,
            left_key,
            right_key,
        }))
    }

    /// Clauses may be separated by AND or OR; both are kept as a flat list
    /// that the executor combines with AND.
    fn where_clauses(&mut self) -> Result<Vec<WhereClause>, MiniError> {
        let mut clauses = Vec::new();
        loop {
            clauses.push(self.where_clause()?);
            if self.eat_keyword("AND") {
                continue;
            }
            if self.eat_keyword("OR") {
                debug!("OR in WHERE clause is evaluated as AND");
                continue;
            }
            return Ok(clauses);
        }
    }

    fn where_clause(&mut self) -> Result<WhereClause, MiniError> {
        const INVALID: &str = "Invalid WHERE clause format";
        let field = self
            .qualified_name()
            .ok_or_else(|| MiniError::Syntax(INVALID.into()))?;

        if self.eat_keyword("LIKE") {
            let pattern = match &self.advance().kind {
                TokenKind::Quoted { value, .. } => value.clone(),
                TokenKind::Word(w) | TokenKind::Number(w) => w.clone(),
                _ => return Err(MiniError::Syntax(INVALID.into())),
            };
            return Ok(WhereClause {
                field,
                operator: Operator::Like,
                value: pattern,
            });
        }

        let operator = match self.current() {
            TokenKind::Operator(op) => operator_from_symbol(op)?,
            _ => return Err(MiniError::Syntax(INVALID.into())),
        };
        self.advance();

        // Quoted values are re-wrapped around their unescaped body so the
        // executor can still tell `'1'` from `1`.
        let value = match &self.advance().kind {
            TokenKind::Quoted { value, quote } => format!("{quote}{value}{quote}"),
            TokenKind::Number(v) | TokenKind::Word(v) => v.clone(),
            _ => return Err(MiniError::Syntax(INVALID.into())),
        };
        Ok(WhereClause {
            field,
            operator,
            value,
        })
    }

    /// Terms are columns, aliases or aggregate calls; a call is stored as
    /// its written text with `APPROXIMATE_COUNT` spelled in capitals.
    fn order_specs(&mut self) -> Result<Vec<OrderSpec>, MiniError> {
        const INVALID: &str = "Invalid ORDER BY clause";
        let mut specs = Vec::new();
        loop {
            let start = self.tokens[self.pos].start;
            let field = match self.expression(INVALID)? {
                (FieldExpr::Column(column), _) => column,
                (_, true) => {
                    let written = &self.input[start..self.previous_end()];
                    format!("{APPROXIMATE_COUNT}{}", &written[APPROXIMATE_COUNT.len()..])
                }
                _ => self.input[start..self.previous_end()].to_string(),
            };
            let direction = if self.eat_keyword("DESC") {
                SortDirection::Desc
            } else {
                self.eat_keyword("ASC");
                SortDirection::Asc
            };
            specs.push(OrderSpec { field, direction });
            if !self.eat_symbol(',') {
                return Ok(specs);
            }
        }
    }

    /// Negative limits are treated as absent.
    fn limit(&mut self) -> Result<Option<usize>, MiniError> {
        let TokenKind::Number(n) = self.current().clone() else {
            return Err(MiniError::Syntax("Invalid LIMIT value".into()));
        };
        self.advance();
        let value: i64 = n
            .parse()
            .map_err(|_| MiniError::Syntax(format!("Invalid LIMIT value: {n}")))?;
        Ok(usize::try_from(value).ok())
    }

    fn insert(&mut self) -> Result<InsertQuery, MiniError> {
        const INVALID: &str = "Invalid INSERT INTO syntax";
        self.expect_keyword("INSERT", INVALID)?;
        self.expect_keyword("INTO", INVALID)?;
        let table = self
            .bare_name()
            .ok_or_else(|| MiniError::Syntax(INVALID.into()))?;

        self.expect_symbol('(', INVALID)?;
        let mut columns = Vec::new();
        loop {
            columns.push(
                self.bare_name()
                    .ok_or_else(|| MiniError::Syntax(INVALID.into()))?,
            );
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')', INVALID)?;

        self.expect_keyword("VALUES", INVALID)?;
        self.expect_symbol('(', INVALID)?;
        let mut values = Vec::new();
        loop {
            let value = match &self.advance().kind {
                TokenKind::Quoted { value, .. } => value.clone(),
                TokenKind::Number(n) | TokenKind::Word(n) => n.clone(),
                _ => return Err(MiniError::Syntax(INVALID.into())),
            };
            values.push(value);
            if !self.eat_symbol(',') {
                break;
            }
        }
        self.expect_symbol(')', INVALID)?;

        if columns.len() != values.len() {
            return Err(MiniError::Syntax(format!(
                "Column count ({}) does not match value count ({})",
                columns.len(),
                values.len()
            )));
        }

        let mut returning_columns = Vec::new();
        if self.eat_keyword("RETURNING") {
            loop {
                if self.eat_symbol('*') {
                    returning_columns.push("*".to_string());
                } else {
                    returning_columns.push(
                        self.bare_name()
                            .ok_or_else(|| MiniError::Syntax("Invalid RETURNING clause".into()))?,
                    );
                }
                if !self.eat_symbol(',') {
                    break;
                }
            }
        }
        self.finish()?;

        Ok(InsertQuery {
            table,
            columns,
            values,
            returning_columns,
        })
    }

    fn delete(&mut self) -> Result<DeleteQuery, MiniError> {
        const INVALID: &str = "Invalid DELETE FROM syntax";
        self.expect_keyword("DELETE", INVALID)?;
        self.expect_keyword("FROM", INVALID)?;
        let table = self
            .bare_name()
            .ok_or_else(|| MiniError::Syntax(INVALID.into()))?;
        let where_clauses = if self.eat_keyword("WHERE") {
            self.where_clauses()?
        } else {
            Vec::new()
        };
        self.finish()?;
        Ok(DeleteQuery {
            table,
            where_clauses,
        })
    }
}

fn operator_from_symbol(op: &str) -> Result<Operator, MiniError> {
    match op {
        "=" => Ok(Operator::Eq),
        "!=" | "<>" => Ok(Operator::NotEq),
        ">" => Ok(Operator::Gt),
        "<" => Ok(Operator::Lt),
        ">=" => Ok(Operator::GtEq),
        "<=" => Ok(Operator::LtEq),
        other => Err(MiniError::Evaluation(format!("Unsupported operator: {other}"))),
    }
}

fn parse_error(err: MiniError) -> MiniError {
    match err {
        MiniError::Parse(_) => err,
        other => MiniError::Parse(other.to_string()),
    }
}

pub fn parse_select(text: &str) -> Result<SelectQuery, MiniError> {
    Parser::new(text)
        .and_then(|mut p| p.select())
        .map_err(parse_error)
}

pub fn parse_insert(text: &str) -> Result<InsertQuery, MiniError> {
    Parser::new(text)
        .and_then(|mut p| p.insert())
        .map_err(parse_error)
}

pub fn parse_delete(text: &str) -> Result<DeleteQuery, MiniError> {
    Parser::new(text)
        .and_then(|mut p| p.delete())
        .map_err(parse_error)
}

/// Dispatches on the leading keyword.
pub fn parse_statement(text: &str) -> Result<Statement, MiniError> {
    let lowered = text.trim_start().to_ascii_lowercase();
    let first = lowered.split_whitespace().next().unwrap_or("");
    match first {
        "select" => parse_select(text).map(Statement::Select),
        "insert" => parse_insert(text).map(Statement::Insert),
        "delete" => parse_delete(text).map(Statement::Delete),
        _ => Err(MiniError::NotSupported("Unsupported command".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(field: &str, operator: Operator, value: &str) -> WhereClause {
        WhereClause {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    fn labels(q: &SelectQuery) -> Vec<&str> {
        q.fields.iter().map(Field::label).collect()
    }

    #[test]
    fn parses_plain_select() {
        let q = parse_select("SELECT id, name FROM student").unwrap();
        assert_eq!(q.fields, vec![Field::column("id"), Field::column("name")]);
        assert_eq!(q.table, "student");
        assert!(q.where_clauses.is_empty());
        assert_eq!(q.join, None);
        assert_eq!(q.group_by, None);
        assert_eq!(q.order_by, None);
        assert_eq!(q.limit, None);
        assert!(!q.is_distinct);
        assert!(!q.has_aggregate_without_group_by);
    }

    #[test]
    fn keywords_are_case_insensitive_and_whitespace_is_ignored() {
        let q = parse_select("   select id from student where age = 25 ;  ").unwrap();
        assert_eq!(q.table, "student");
        assert_eq!(q.where_clauses, vec![clause("age", Operator::Eq, "25")]);
    }

    #[test]
    fn where_clauses_split_on_and_and_or() {
        let q = parse_select("SELECT id, name FROM student WHERE age = 30 AND name = John").unwrap();
        assert_eq!(
            q.where_clauses,
            vec![
                clause("age", Operator::Eq, "30"),
                clause("name", Operator::Eq, "John")
            ]
        );

        let q = parse_select("SELECT id FROM student WHERE age = 30 or name = 'Jane'").unwrap();
        assert_eq!(q.where_clauses.len(), 2);
        assert_eq!(q.where_clauses[1], clause("name", Operator::Eq, "'Jane'"));
    }

    #[test]
    fn relational_operators_keep_two_char_forms() {
        let q = parse_select(
            "SELECT id FROM student WHERE a >= 1 AND b <= 2 AND c != 3 AND d > 4 AND e < 5 AND f <> 6",
        )
        .unwrap();
        let ops: Vec<Operator> = q.where_clauses.iter().map(|c| c.operator).collect();
        assert_eq!(
            ops,
            vec![
                Operator::GtEq,
                Operator::LtEq,
                Operator::NotEq,
                Operator::Gt,
                Operator::Lt,
                Operator::NotEq
            ]
        );
    }

    #[test]
    fn where_values_keep_their_quotes() {
        let q = parse_select(r#"SELECT DISTINCT course FROM enrollment WHERE student_id = "1""#)
            .unwrap();
        assert!(q.is_distinct);
        assert_eq!(q.where_clauses, vec![clause("student_id", Operator::Eq, "\"1\"")]);
    }

    #[test]
    fn like_patterns_are_unquoted() {
        let q = parse_select("SELECT name FROM student WHERE name LIKE 'J%' AND age LIKE '2%'")
            .unwrap();
        assert_eq!(
            q.where_clauses,
            vec![
                clause("name", Operator::Like, "J%"),
                clause("age", Operator::Like, "2%")
            ]
        );
    }

    #[test]
    fn parses_each_join_kind() {
        for (kw, kind) in [
            ("INNER", JoinKind::Inner),
            ("LEFT", JoinKind::Left),
            ("RIGHT", JoinKind::Right),
        ] {
            let sql = format!("SELECT * FROM table1 {kw} JOIN table2 ON table1.id = table2.ref_id");
            let q = parse_select(&sql).unwrap();
            assert_eq!(
                q.join,
                Some(JoinSpec {
                    kind,
                    table: "table2".into(),
                    left_key: "table1.id".into(),
                    right_key: "table2.ref_id".into(),
                })
            );
            assert_eq!(q.fields[0].expr, FieldExpr::Wildcard);
        }
    }

    #[test]
    fn join_with_where_and_group_by() {
        let q = parse_select(
            r#"SELECT student.name, COUNT(*) FROM student INNER JOIN enrollment ON student.id=enrollment.student_id WHERE enrollment.course = "Mathematics" GROUP BY student.name"#,
        )
        .unwrap();
        assert_eq!(labels(&q), vec!["student.name", "COUNT(*)"]);
        assert_eq!(q.group_by, Some(vec!["student.name".to_string()]));
        assert_eq!(
            q.where_clauses,
            vec![clause("enrollment.course", Operator::Eq, "\"Mathematics\"")]
        );
        assert!(!q.has_aggregate_without_group_by);
    }

    #[test]
    fn aggregates_without_group_by_are_flagged() {
        for sql in [
            "SELECT COUNT(*) FROM student",
            "SELECT SUM(age) FROM student",
            "SELECT AVG(age) FROM student",
            "SELECT MIN(age) FROM student",
            "SELECT max(age) FROM student",
        ] {
            let q = parse_select(sql).unwrap();
            assert!(q.has_aggregate_without_group_by, "{sql}");
        }
        let q = parse_select("SELECT SUM(age) FROM student").unwrap();
        assert_eq!(
            q.fields[0].expr,
            FieldExpr::Aggregate {
                func: AggregateFunc::Sum,
                arg: AggregateArg::Column("age".into())
            }
        );
        assert_eq!(q.fields[0].label(), "SUM(age)");
    }

    #[test]
    fn order_by_defaults_to_ascending() {
        let q = parse_select("SELECT COUNT(id), age FROM student GROUP BY age ORDER BY age DESC, id")
            .unwrap();
        assert_eq!(q.group_by, Some(vec!["age".to_string()]));
        assert_eq!(
            q.order_by,
            Some(vec![
                OrderSpec {
                    field: "age".into(),
                    direction: SortDirection::Desc
                },
                OrderSpec {
                    field: "id".into(),
                    direction: SortDirection::Asc
                },
            ])
        );
    }

    #[test]
    fn limit_values() {
        assert_eq!(parse_select("SELECT id FROM student LIMIT 2").unwrap().limit, Some(2));
        assert_eq!(parse_select("SELECT id FROM student LIMIT 0").unwrap().limit, Some(0));
        assert_eq!(parse_select("SELECT id FROM student LIMIT 1000").unwrap().limit, Some(1000));
        assert_eq!(parse_select("SELECT id FROM student LIMIT -1").unwrap().limit, None);
    }

    #[test]
    fn distinct_order_and_limit_together() {
        let q = parse_select("SELECT DISTINCT age FROM student ORDER BY age DESC LIMIT 2").unwrap();
        assert!(q.is_distinct);
        assert_eq!(q.limit, Some(2));
        assert_eq!(q.order_by.unwrap()[0].direction, SortDirection::Desc);
    }

    #[test]
    fn count_distinct_keeps_inner_commas_together() {
        let q = parse_select("SELECT COUNT(DISTINCT (name, age)) FROM student_large").unwrap();
        assert_eq!(q.fields.len(), 1);
        assert_eq!(q.fields[0].label(), "COUNT(DISTINCT (name, age))");
        assert!(q.is_count_distinct);
        assert!(!q.is_approximate_count);
        assert_eq!(q.distinct_fields, vec!["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn approximate_count_is_normalised() {
        let q = parse_select("SELECT APPROXIMATE_COUNT(*) FROM student_large").unwrap();
        assert!(q.is_approximate_count);
        assert!(q.fields[0].is_count_star());
        assert_eq!(q.fields[0].text, "COUNT(*)");
        assert_eq!(q.fields[0].label(), "APPROXIMATE_COUNT(*)");

        let q = parse_select("SELECT APPROXIMATE_COUNT(DISTINCT (name, age)) FROM student_large")
            .unwrap();
        assert!(q.is_approximate_count);
        assert!(q.is_count_distinct);
        assert_eq!(q.fields[0].text, "COUNT(DISTINCT (name, age))");
        assert_eq!(q.fields[0].label(), "APPROXIMATE_COUNT(DISTINCT (name, age))");

        let q = parse_select("SELECT approximate_count(*) as n FROM student_large").unwrap();
        assert_eq!(q.fields[0].label(), "APPROXIMATE_COUNT(*) as n");
    }

    #[test]
    fn labels_keep_the_alias_clause_as_written() {
        let q = parse_select("SELECT COUNT(id) as count, age FROM student GROUP BY age").unwrap();
        assert_eq!(labels(&q), vec!["COUNT(id) as count", "age"]);
        assert_eq!(q.fields[0].text, "COUNT(id)");
        assert_eq!(q.fields[0].alias.as_deref(), Some("count"));
        assert!(q.fields[0].answers_to("count"));
        assert!(q.fields[0].answers_to("COUNT(id)"));
        assert!(!q.fields[0].answers_to("age"));
    }

    #[test]
    fn order_by_accepts_aggregate_calls() {
        let q = parse_select("SELECT age, COUNT(*) FROM student GROUP BY age ORDER BY COUNT(*) DESC, age")
            .unwrap();
        assert_eq!(
            q.order_by.unwrap(),
            vec![
                OrderSpec {
                    field: "COUNT(*)".into(),
                    direction: SortDirection::Desc
                },
                OrderSpec {
                    field: "age".into(),
                    direction: SortDirection::Asc
                }
            ]
        );

        let q = parse_select(
            "SELECT name, approximate_count(*) FROM t GROUP BY name ORDER BY approximate_count(*)",
        )
        .unwrap();
        assert_eq!(q.order_by.unwrap()[0].field, "APPROXIMATE_COUNT(*)");

        let err = parse_select("SELECT id FROM t ORDER BY").unwrap_err();
        assert_eq!(err.to_string(), "Query parsing error: Invalid ORDER BY clause");
    }

    #[test]
    fn quoted_where_values_are_unescaped() {
        let q = parse_select("SELECT id FROM t WHERE name = 'O''Brien' AND nick = \"say \"\"hi\"\"\"").unwrap();
        assert_eq!(
            q.where_clauses,
            vec![
                clause("name", Operator::Eq, "'O'Brien'"),
                clause("nick", Operator::Eq, "\"say \"hi\"\"")
            ]
        );
    }

    #[test]
    fn malformed_select_is_reported() {
        let err = parse_select("SELECT FROM table").unwrap_err();
        assert_eq!(err.to_string(), "Query parsing error: Invalid SELECT format");

        let err = parse_select("SELECT id student").unwrap_err();
        assert_eq!(err.to_string(), "Query parsing error: Invalid SELECT format");
    }

    #[test]
    fn malformed_where_is_reported() {
        let err = parse_select("SELECT id FROM student WHERE age").unwrap_err();
        assert_eq!(err.to_string(), "Query parsing error: Invalid WHERE clause format");

        let err = parse_select("SELECT id FROM student WHERE age == 3").unwrap_err();
        assert_eq!(err.to_string(), "Query parsing error: Unsupported operator: ==");
    }

    #[test]
    fn parses_insert_with_qualifiers_and_returning() {
        let q = parse_insert(
            r#"INSERT INTO "public"."grades" ("grades"."student_id", course, grade) VALUES ('4', 'Physics', 'A') RETURNING "grades"."id", grade"#,
        )
        .unwrap();
        assert_eq!(q.table, "grades");
        assert_eq!(q.columns, vec!["student_id", "course", "grade"]);
        assert_eq!(q.values, vec!["4", "Physics", "A"]);
        assert_eq!(q.returning_columns, vec!["id", "grade"]);
    }

    #[test]
    fn insert_requires_matching_value_count() {
        let err = parse_insert("INSERT INTO grades (a, b) VALUES ('1')").unwrap_err();
        assert!(matches!(err, MiniError::Parse(_)));

        let err = parse_insert("INSERT grades (a) VALUES ('1')").unwrap_err();
        assert_eq!(err.to_string(), "Query parsing error: Invalid INSERT INTO syntax");
    }

    #[test]
    fn parses_delete() {
        let q = parse_delete("DELETE FROM courses WHERE course_id = '2'").unwrap();
        assert_eq!(q.table, "courses");
        assert_eq!(q.where_clauses, vec![clause("course_id", Operator::Eq, "'2'")]);

        let q = parse_delete("delete from courses").unwrap();
        assert!(q.where_clauses.is_empty());

        let err = parse_delete("DELETE courses").unwrap_err();
        assert_eq!(err.to_string(), "Query parsing error: Invalid DELETE FROM syntax");
    }

    #[test]
    fn statement_dispatch() {
        assert!(matches!(
            parse_statement("select * from t").unwrap(),
            Statement::Select(_)
        ));
        assert!(matches!(
            parse_statement("UPDATE t SET a = 1").unwrap_err(),
            MiniError::NotSupported(_)
        ));
    }
}
