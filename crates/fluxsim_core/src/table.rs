use crate::error::SimulationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the time column every result table carries.
pub const TIME_COLUMN: &str = "t";

/// Rows of sampled model outputs sharing one column schema.
///
/// This is the only carrier of simulation history and the only input for resuming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableData")]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct TableData {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl TryFrom<TableData> for ResultTable {
    type Error = SimulationError;

    fn try_from(data: TableData) -> Result<Self, Self::Error> {
        ResultTable::from_rows(data.columns, data.rows)
    }
}

impl ResultTable {
    /// Creates an empty table. Column names must be unique.
    pub fn new(columns: Vec<String>) -> Result<Self, SimulationError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(SimulationError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, SimulationError> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<f64>) -> Result<(), SimulationError> {
        if row.len() != self.columns.len() {
            return Err(SimulationError::Schema(format!(
                "row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Copies one column out of the table.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| r[idx])
    }

    pub fn last_row(&self) -> Option<&[f64]> {
        self.rows.last().map(Vec::as_slice)
    }

    pub fn times(&self) -> Option<Vec<f64>> {
        self.column(TIME_COLUMN)
    }
}
