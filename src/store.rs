use crate::error::MiniError;
use crate::estimator::Estimator;
use crate::model::{Cell, Row, Table};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Table access used by the executor.
pub trait RowStore {
    /// Loads a table in full; columns come from the header row.
    fn read_table(&self, name: &str) -> Result<Table, MiniError>;

    /// Replaces the table with `table`'s header and rows.
    fn write_table(&self, name: &str, table: &Table) -> Result<(), MiniError>;

    /// Streams every row into a fresh estimator without keeping the rows.
    fn read_table_for_estimator(
        &self,
        name: &str,
        bit_sample_size: u8,
        digest_size: u16,
    ) -> Result<Estimator, MiniError>;
}

/// A directory of `<table>.csv` files.
#[derive(Clone)]
pub struct Store {
    root: Arc<PathBuf>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MiniError> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(MiniError::NotFound(format!(
                "data directory {}",
                root.display()
            )));
        }
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn table_path(&self, name: &str) -> Result<PathBuf, MiniError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(MiniError::Invalid(format!("invalid table name: {name}")));
        }
        Ok(self.root.join(format!("{name}.csv")))
    }

    fn open_reader(&self, name: &str) -> Result<csv::Reader<File>, MiniError> {
        let path = self.table_path(name)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MiniError::NotFound(format!("table {name}")),
            _ => MiniError::Io(e),
        })?;
        Ok(ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file))
    }
}

fn record_to_row(columns: &[String], record: &StringRecord) -> Row {
    let mut row = Row::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let value = record.get(i).unwrap_or("");
        row.insert(column.clone(), Cell::text(value));
    }
    row
}

fn cell_to_field(cell: Option<&Cell>) -> String {
    match cell {
        None | Some(Cell::Null) => String::new(),
        Some(cell) => cell.to_string(),
    }
}

impl RowStore for Store {
    fn read_table(&self, name: &str) -> Result<Table, MiniError> {
        let mut reader = self.open_reader(name)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record_to_row(&columns, &record?));
        }
        debug!(table = name, rows = rows.len(), "read table");
        Ok(Table { columns, rows })
    }

    fn write_table(&self, name: &str, table: &Table) -> Result<(), MiniError> {
        let path = self.table_path(name)?;
        let tmp = path.with_extension("csv.tmp");
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_path(&tmp)?;
        if !table.columns.is_empty() {
            writer.write_record(&table.columns)?;
        }
        for row in &table.rows {
            writer.write_record(
                table
                    .columns
                    .iter()
                    .map(|c| cell_to_field(row.get(c))),
            )?;
        }
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, &path)?;
        debug!(table = name, rows = table.rows.len(), "wrote table");
        Ok(())
    }

    fn read_table_for_estimator(
        &self,
        name: &str,
        bit_sample_size: u8,
        digest_size: u16,
    ) -> Result<Estimator, MiniError> {
        let mut estimator = Estimator::new(bit_sample_size, digest_size)?;
        let mut reader = self.open_reader(name)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut record = StringRecord::new();
        let mut streamed = 0u64;
        while reader.read_record(&mut record)? {
            let row = record_to_row(&columns, &record);
            estimator.insert(&serde_json::to_vec(&row)?);
            streamed += 1;
        }
        debug!(table = name, rows = streamed, "streamed table into estimator");
        Ok(estimator)
    }
}
