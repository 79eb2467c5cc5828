use crate::error::MiniError;
use crate::executor::Executor;
use crate::parser::{parse_delete, parse_insert, parse_select};
use crate::store::RowStore;
use serde::Serialize;
use std::io::{BufRead, Write};
use tracing::debug;

pub const BANNER: &str =
    "SQL Query Engine CLI. Enter your SQL commands, or type \"exit\" to quit.";
pub const PROMPT: &str = "SQL> ";
pub const FAREWELL: &str = "Exiting SQL CLI";

fn pretty<T: Serialize>(value: &T) -> Result<String, MiniError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn run_line<S: RowStore>(executor: &Executor<S>, line: &str) -> Result<String, MiniError> {
    let lowered = line.to_ascii_lowercase();
    if lowered.starts_with("select") {
        let query = parse_select(line).map_err(MiniError::in_execution)?;
        let rows = executor.execute_select(&query)?;
        return Ok(format!("Result: {}", pretty(&rows)?));
    }
    if lowered.starts_with("insert into") {
        let query = parse_insert(line).map_err(MiniError::in_execution)?;
        return pretty(&executor.execute_insert(&query)?);
    }
    if lowered.starts_with("delete from") {
        let query = parse_delete(line).map_err(MiniError::in_execution)?;
        return pretty(&executor.execute_delete(&query)?);
    }
    Err(MiniError::NotSupported("Unsupported command".into()))
}

/// Prompt loop over `input`. Query failures are printed and the loop
/// continues; only I/O on `out` ends it early.
pub fn run<S, R, W>(executor: &Executor<S>, input: R, mut out: W) -> Result<(), MiniError>
where
    S: RowStore,
    R: BufRead,
    W: Write,
{
    writeln!(out, "{BANNER}")?;
    write!(out, "{PROMPT}")?;
    out.flush()?;

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        if !line.is_empty() {
            match run_line(executor, line) {
                Ok(text) => writeln!(out, "{text}")?,
                Err(MiniError::NotSupported(msg)) => writeln!(out, "{msg}")?,
                Err(err) => {
                    debug!(error = %err, "query failed");
                    writeln!(out, "Error: {err}")?;
                }
            }
        }
        write!(out, "{PROMPT}")?;
        out.flush()?;
    }

    writeln!(out, "{FAREWELL}")?;
    out.flush()?;
    Ok(())
}
