use crate::table::ResultTable;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for a written table: `directory/base_name<timestamp>extension`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportTarget {
    pub directory: PathBuf,
    pub base_name: String,
    pub extension: String,
}

impl Default for ExportTarget {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            base_name: "generic".to_string(),
            extension: ".csv".to_string(),
        }
    }
}

impl ExportTarget {
    pub fn file_name(&self, timestamp: &str) -> String {
        format!("{}{}{}", self.base_name, timestamp, self.extension)
    }
}

/// Writes `table` as CSV under a freshly timestamped name and returns the path.
///
/// The file only appears once fully written.
pub fn write_csv(table: &ResultTable, target: &ExportTarget) -> Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%y%m%d_%H%M%S").to_string();
    let path = target.directory.join(target.file_name(&timestamp));
    write_csv_to(table, &path)?;
    info!(path = %path.display(), rows = table.len(), "results written");
    Ok(path)
}

/// Writes `table` to exactly `path`, via a sibling temporary file.
pub fn write_csv_to(table: &ResultTable, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".partial");
    let tmp_path = path.with_file_name(tmp_name);

    let written = write_records(table, &tmp_path);
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to move results into {}", path.display()))
}

fn write_records(table: &ResultTable, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Loads a table previously written by [`write_csv`], e.g. to resume from disk.
pub fn read_csv(path: &Path) -> Result<ResultTable> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let mut row = Vec::with_capacity(record.len());
        for (cell, column) in record.iter().zip(&columns) {
            match cell.trim().parse::<f64>() {
                Ok(v) => row.push(v),
                Err(_) => bail!(
                    "Row {}: column `{}` has non-numeric value `{}`",
                    line + 1,
                    column,
                    cell
                ),
            }
        }
        rows.push(row);
    }

    Ok(ResultTable::from_rows(columns, rows)?)
}

#[cfg(test)]
mod tests {
    use super::{read_csv, write_csv, write_csv_to, ExportTarget};
    use crate::table::ResultTable;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> ResultTable {
        ResultTable::from_rows(
            vec!["t".into(), "G".into()],
            vec![vec![0.0, 0.54], vec![0.01, 0.5312345678901234]],
        )
        .unwrap()
    }

    #[test]
    fn timestamped_name_and_contents() {
        let dir = TempDir::new().unwrap();
        let target = ExportTarget {
            directory: dir.path().to_path_buf(),
            base_name: "milk_".into(),
            extension: ".csv".into(),
        };
        let path = write_csv(&sample(), &target).unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("milk_"));
        assert!(name.ends_with(".csv"));
        // yymmdd_HHMMSS
        assert_eq!(name.len(), "milk_".len() + 13 + ".csv".len());

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "t,G\n0,0.54\n0.01,0.5312345678901234\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn read_back_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.csv");
        write_csv_to(&sample(), &path).unwrap();
        assert_eq!(read_csv(&path).unwrap(), sample());
    }

    #[test]
    fn failed_write_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("run.csv");
        assert!(write_csv_to(&sample(), &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn read_rejects_non_numeric_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "t,G\n0,abc\n").unwrap();
        let err = read_csv(&path).unwrap_err();
        assert!(err.to_string().contains("`G`"));
    }

    #[test]
    fn default_target() {
        let target = ExportTarget::default();
        assert_eq!(target.file_name("240101_000000"), "generic240101_000000.csv");
    }
}
