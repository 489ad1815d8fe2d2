//! CSV import/export
//!
//! Two readers:
//! - [`read_csv`] is strict and rebuilds a [`TelemetryDataset`]
//! - [`read_table`] is lenient and keeps raw cells for the verifier, which
//!   must be able to report on broken files instead of failing on them

use crate::telemetry::channels::{csv_header, LAP_COLUMN, SETUP_COLUMN};
use crate::telemetry::{Channel, Setup, TelemetryDataset, TelemetryFrame};
use crate::{Error, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Format one cell: shortest round-trip float, integers for whole-number channels.
#[must_use]
pub fn format_value(channel: Channel, value: f64) -> String {
    if channel.is_integral() {
        #[allow(clippy::cast_possible_truncation)]
        let whole = value.round() as i64;
        whole.to_string()
    } else {
        value.to_string()
    }
}

/// Write the dataset to any writer in CSV order.
///
/// # Errors
///
/// Returns error if the writer fails.
pub fn write_csv_to<W: Write>(dataset: &TelemetryDataset, writer: W) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(csv_header())?;

    let mut record: Vec<String> = Vec::with_capacity(Channel::COUNT + 2);
    for row in dataset.iter_rows() {
        record.clear();
        record.extend(
            Channel::ALL
                .iter()
                .map(|&c| format_value(c, row.value(c))),
        );
        record.push(row.lap().to_string());
        record.push(row.setup().label().to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the dataset to a CSV file, creating parent directories.
///
/// # Errors
///
/// Returns error if the file cannot be created or written.
pub fn write_csv<P: AsRef<Path>>(dataset: &TelemetryDataset, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_csv_to(dataset, BufWriter::new(file))?;
    debug!(path = %path.display(), rows = dataset.rows(), "csv written");
    Ok(())
}

/// Write serializable rows as a headed CSV table, creating parent
/// directories. Returns the path written.
///
/// # Errors
///
/// Returns error if the file cannot be created or a row fails to serialize.
pub fn write_rows<T: Serialize, P: AsRef<Path>>(path: P, rows: &[T]) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "table written");
    Ok(path.to_path_buf())
}

/// Serialize the dataset to CSV bytes in memory.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn csv_bytes(dataset: &TelemetryDataset) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv_to(dataset, &mut buf)?;
    Ok(buf)
}

/// Column builder for one setup while reading.
struct FrameBuilder {
    columns: Vec<Vec<f64>>,
    laps: Vec<u32>,
}

impl FrameBuilder {
    fn new() -> Self {
        Self {
            columns: vec![Vec::new(); Channel::COUNT],
            laps: Vec::new(),
        }
    }

    fn finish(self, setup: Setup) -> Result<TelemetryFrame> {
        TelemetryFrame::new(setup, self.columns, self.laps)
    }
}

/// Read a dataset written by [`write_csv`].
///
/// # Errors
///
/// - `SchemaMismatch` if a channel, `lap` or `setup` column is missing
/// - `StorageError` on an unknown setup label or a non-numeric cell
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<TelemetryDataset> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new().from_path(path)?;
    let headers = rdr.headers()?.clone();
    let positions: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

    let missing: Vec<&str> = csv_header()
        .into_iter()
        .filter(|name| !positions.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(Error::SchemaMismatch {
            expected: format!("{} columns", Channel::COUNT + 2),
            got: format!("missing {}", missing.join(", ")),
        });
    }

    let channel_pos: Vec<usize> = Channel::ALL.iter().map(|c| positions[c.name()]).collect();
    let lap_pos = positions[LAP_COLUMN];
    let setup_pos = positions[SETUP_COLUMN];

    let mut baseline = FrameBuilder::new();
    let mut optimized = FrameBuilder::new();

    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let cell = |pos: usize| record.get(pos).unwrap_or("");
        let setup: Setup = cell(setup_pos).parse().map_err(|_| {
            Error::StorageError(format!(
                "row {}: unknown setup label '{}'",
                line + 2,
                cell(setup_pos)
            ))
        })?;
        let builder = match setup {
            Setup::Baseline => &mut baseline,
            Setup::Optimized => &mut optimized,
        };
        for (channel, &pos) in Channel::ALL.iter().zip(&channel_pos) {
            let v: f64 = cell(pos).trim().parse().map_err(|_| {
                Error::StorageError(format!(
                    "row {}: non-numeric value '{}' in column '{channel}'",
                    line + 2,
                    cell(pos)
                ))
            })?;
            builder.columns[channel.index()].push(v);
        }
        let lap: u32 = cell(lap_pos).trim().parse().map_err(|_| {
            Error::StorageError(format!(
                "row {}: invalid lap index '{}'",
                line + 2,
                cell(lap_pos)
            ))
        })?;
        builder.laps.push(lap);
    }

    let dataset = TelemetryDataset::new(
        baseline.finish(Setup::Baseline)?,
        optimized.finish(Setup::Optimized)?,
    )?;
    debug!(path = %path.display(), rows = dataset.rows(), "csv loaded");
    Ok(dataset)
}

/// Raw CSV contents for lenient inspection.
#[derive(Debug, Clone)]
pub struct RawTable {
    headers: Vec<String>,
    records: Vec<StringRecord>,
}

/// Read a CSV file without interpreting it.
///
/// Ragged rows are accepted; short rows count as missing cells.
///
/// # Errors
///
/// Returns error if the file cannot be opened or is not CSV at all.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path.as_ref())?;
    let headers = rdr.headers()?.iter().map(str::to_string).collect();
    let records = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RawTable { headers, records })
}

fn is_nan_cell(cell: &str) -> bool {
    matches!(cell.trim(), "nan" | "NaN" | "NAN")
}

impl RawTable {
    /// Column names
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.records.len()
    }

    /// Number of columns
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.headers.len()
    }

    /// Position of a column
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Raw cells of one column (empty string for missing cells)
    #[must_use]
    pub fn cells(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.records.iter().map(|r| r.get(idx).unwrap_or("")).collect())
    }

    /// Empty or absent cells across the table
    #[must_use]
    pub fn missing_cells(&self) -> usize {
        let width = self.num_columns();
        self.records
            .iter()
            .map(|r| {
                let empty = r.iter().take(width).filter(|c| c.trim().is_empty()).count();
                empty + width.saturating_sub(r.len())
            })
            .sum()
    }

    /// Cells spelling NaN across the table
    #[must_use]
    pub fn nan_cells(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.iter().filter(|c| is_nan_cell(c)).count())
            .sum()
    }

    /// Columns whose every cell parses as a number (NaN included)
    #[must_use]
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !self.records.is_empty()
                    && self
                        .records
                        .iter()
                        .all(|r| r.get(*i).is_some_and(|c| c.trim().parse::<f64>().is_ok()))
            })
            .map(|(_, h)| h.as_str())
            .collect()
    }

    /// Parse one column as numbers.
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` if the column is absent
    /// - `StorageError` on a non-numeric cell
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let cells = self.cells(name).ok_or_else(|| Error::SchemaMismatch {
            expected: format!("column '{name}'"),
            got: format!("{} columns without it", self.num_columns()),
        })?;
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| {
                c.trim().parse::<f64>().map_err(|_| {
                    Error::StorageError(format!(
                        "row {}: non-numeric value '{c}' in column '{name}'",
                        i + 2
                    ))
                })
            })
            .collect()
    }

    /// Parse a numeric column split by the values of a label column.
    ///
    /// # Errors
    ///
    /// Same as [`numeric_column`](Self::numeric_column).
    pub fn numeric_column_where(
        &self,
        name: &str,
        label_column: &str,
        label: &str,
    ) -> Result<Vec<f64>> {
        let values = self.numeric_column(name)?;
        let labels = self.cells(label_column).ok_or_else(|| Error::SchemaMismatch {
            expected: format!("column '{label_column}'"),
            got: format!("{} columns without it", self.num_columns()),
        })?;
        Ok(values
            .into_iter()
            .zip(labels)
            .filter_map(|(v, l)| (l.trim() == label).then_some(v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StudyConfig;
    use crate::telemetry::generate_dataset;
    use tempfile::TempDir;

    fn tiny_dataset() -> TelemetryDataset {
        let config = StudyConfig::builder().seed(3).laps_per_setup(1).build();
        generate_dataset(&config).unwrap()
    }

    #[test]
    fn test_write_rows_headed_table() {
        #[derive(Serialize)]
        struct Row {
            name: &'static str,
            value: f64,
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("rows.csv");
        let rows = [
            Row { name: "a", value: 1.5 },
            Row { name: "b", value: -2.0 },
        ];
        assert_eq!(write_rows(&path, &rows).unwrap(), path);
        let table = read_table(&path).unwrap();
        assert_eq!(table.headers(), ["name", "value"]);
        assert_eq!(table.numeric_column("value").unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Channel::Gear, 4.0), "4");
        assert_eq!(format_value(Channel::Speed, 0.1), "0.1");
        assert_eq!(format_value(Channel::Speed, 95.0), "95");
    }

    #[test]
    fn test_csv_round_trip_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/data.csv");
        let dataset = tiny_dataset();
        write_csv(&dataset, &path).unwrap();
        let loaded = read_csv(&path).unwrap();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_csv_bytes_deterministic() {
        let dataset = tiny_dataset();
        assert_eq!(csv_bytes(&dataset).unwrap(), csv_bytes(&dataset).unwrap());
    }

    #[test]
    fn test_read_csv_missing_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "time,engine_rpm\n0,3000\n").unwrap();
        assert!(matches!(read_csv(&path), Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_read_csv_unknown_setup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad_setup.csv");
        let dataset = tiny_dataset();
        let text = String::from_utf8(csv_bytes(&dataset).unwrap()).unwrap();
        std::fs::write(&path, text.replacen(",baseline\n", ",tuned\n", 1)).unwrap();
        let err = read_csv(&path).unwrap_err();
        assert!(err.to_string().contains("tuned"));
    }

    #[test]
    fn test_raw_table_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw.csv");
        std::fs::write(&path, "a,b,setup\n1,,baseline\nNaN,2,optimized\n3\n").unwrap();
        let table = read_table(&path).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.missing_cells(), 3);
        assert_eq!(table.nan_cells(), 1);
        assert!(table.numeric_column("b").is_err());
        // NaN parses as a float, so `a` still counts as numeric
        assert_eq!(table.numeric_columns(), vec!["a"]);
    }

    #[test]
    fn test_numeric_column_where() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("split.csv");
        std::fs::write(&path, "x,setup\n1,baseline\n2,optimized\n3,baseline\n").unwrap();
        let table = read_table(&path).unwrap();
        assert_eq!(table.numeric_columns(), vec!["x"]);
        assert_eq!(
            table.numeric_column_where("x", "setup", "baseline").unwrap(),
            vec![1.0, 3.0]
        );
    }
}
