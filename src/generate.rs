use crate::error::MiniError;
use csv::WriterBuilder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::io::Write;
use tracing::info;

const FIRST_NAMES: &[&str] = &[
    "Aaliyah", "Aiden", "Alice", "Amara", "Arjun", "Bob", "Camila", "Chen", "Chloe", "Dante",
    "Diego", "Elena", "Ethan", "Fatima", "Felix", "Grace", "Hana", "Hugo", "Isla", "Ivan",
    "Jane", "Javier", "John", "Kai", "Keira", "Liam", "Lucia", "Mateo", "Maya", "Mei",
    "Nadia", "Noah", "Olga", "Omar", "Priya", "Quinn", "Rafael", "Rosa", "Sami", "Sofia",
    "Tariq", "Theo", "Uma", "Victor", "Wen", "Ximena", "Yara", "Yusuf", "Zara", "Zoe",
];

const MIN_AGE: u32 = 18;
const MAX_AGE: u32 = 100;
const PROGRESS_EVERY: u64 = 500_000;

/// Writes `rows` synthetic `id,name,age` records to `out`, one at a time.
/// The same seed always produces the same file.
pub fn write_students<W: Write>(out: W, rows: u64, seed: u64) -> Result<(), MiniError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut writer = WriterBuilder::new().from_writer(out);
    writer.write_record(["id", "name", "age"])?;
    for id in 1..=rows {
        let name = FIRST_NAMES.choose(&mut rng).copied().unwrap_or("Alice");
        let age = rng.gen_range(MIN_AGE..=MAX_AGE);
        writer.write_record([id.to_string(), name.to_string(), age.to_string()])?;
        if id % PROGRESS_EVERY == 0 {
            info!(rows = id, "generated records");
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, ExecutorConfig};
    use crate::store::{RowStore, Store};
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn output_is_readable_and_in_range() {
        let dir = tempdir().unwrap();
        write_students(File::create(dir.path().join("gen.csv")).unwrap(), 500, 3).unwrap();
        let table = Store::open(dir.path()).unwrap().read_table("gen").unwrap();
        assert_eq!(table.columns, vec!["id", "name", "age"]);
        assert_eq!(table.rows.len(), 500);
        for (i, row) in table.rows.iter().enumerate() {
            assert_eq!(row.get("id").unwrap().to_string(), (i + 1).to_string());
            let age: u32 = row.get("age").unwrap().to_string().parse().unwrap();
            assert!((MIN_AGE..=MAX_AGE).contains(&age));
        }
    }

    #[test]
    fn same_seed_same_rows() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_students(&mut a, 200, 11).unwrap();
        write_students(&mut b, 200, 11).unwrap();
        assert_eq!(a, b);
        let mut c = Vec::new();
        write_students(&mut c, 200, 12).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn approximate_count_tracks_generated_size() {
        let dir = tempdir().unwrap();
        write_students(
            File::create(dir.path().join("student_large.csv")).unwrap(),
            30_000,
            42,
        )
        .unwrap();
        let executor = Executor::new(Store::open(dir.path()).unwrap(), ExecutorConfig::default());
        let out = serde_json::to_value(
            executor
                .execute("SELECT APPROXIMATE_COUNT(*) FROM student_large")
                .unwrap(),
        )
        .unwrap();
        let estimate = out[0]["APPROXIMATE_COUNT(*)"].as_f64().unwrap();
        assert!((estimate - 30_000.0).abs() / 30_000.0 < 0.05, "estimate {estimate}");
    }
}
