//! Storage backend (CSV, Arrow, Parquet)
//!
//! **Append-only design**:
//! - A dataset is written once per run and read many times (tables,
//!   verifier, figures, MDF4 export)
//! - Write pattern: whole record batches, validated against the first
//!   batch's schema
//! - No row-level updates: regenerate instead
//!
//! CSV is the interchange format the downstream tools consume; Parquet is
//! an optional columnar copy for analysis tooling.
//!
//! Toyota Way Principles:
//! - Poka-Yoke: schema validated on every append and every load
//! - Jidoka: a dataset that does not convert back cleanly is rejected

pub mod csv_io;

pub use csv_io::{csv_bytes, read_csv, read_table, write_csv, write_rows, RawTable};

use crate::telemetry::channels::{LAP_COLUMN, SETUP_COLUMN};
use crate::telemetry::{Channel, Setup, TelemetryDataset, TelemetryFrame};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Arrow schema of a telemetry table.
///
/// Channels are `Float64` except gear (`Int64`); `lap` is `Int64` and
/// `setup` is `Utf8`.
#[must_use]
pub fn telemetry_schema() -> SchemaRef {
    let mut fields: Vec<Field> = Channel::ALL
        .iter()
        .map(|c| {
            let dt = if c.is_integral() {
                DataType::Int64
            } else {
                DataType::Float64
            };
            Field::new(c.name(), dt, false)
        })
        .collect();
    fields.push(Field::new(LAP_COLUMN, DataType::Int64, false));
    fields.push(Field::new(SETUP_COLUMN, DataType::Utf8, false));
    Arc::new(Schema::new(fields))
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(v: f64) -> i64 {
    v.round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn from_int(v: i64) -> f64 {
    v as f64
}

impl TelemetryFrame {
    /// Convert one frame to an Arrow record batch.
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut arrays: Vec<ArrayRef> = Channel::ALL
            .iter()
            .map(|&c| -> ArrayRef {
                let col = self.column(c);
                if c.is_integral() {
                    Arc::new(Int64Array::from_iter_values(col.iter().copied().map(to_int)))
                } else {
                    Arc::new(Float64Array::from(col.to_vec()))
                }
            })
            .collect();
        arrays.push(Arc::new(Int64Array::from_iter_values(
            self.laps().iter().map(|&l| i64::from(l)),
        )));
        arrays.push(Arc::new(StringArray::from_iter_values(
            std::iter::repeat(self.setup().label()).take(self.len()),
        )));
        Ok(RecordBatch::try_new(telemetry_schema(), arrays)?)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::SchemaMismatch {
            expected: format!("column '{name}'"),
            got: format!("{} columns without it", batch.num_columns()),
        })?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::StorageError(format!("column '{name}' has an unexpected type")))
}

impl TelemetryDataset {
    /// Convert the whole dataset to one Arrow record batch, baseline first.
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let batches = self
            .frames()
            .iter()
            .map(|f| f.to_record_batch())
            .collect::<Result<Vec<_>>>()?;
        Ok(concat_batches(&telemetry_schema(), &batches)?)
    }

    /// Rebuild a dataset from a record batch produced by
    /// [`to_record_batch`](Self::to_record_batch).
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` if a column is missing
    /// - `StorageError` on wrong column types, nulls or unknown setup labels
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let setups = column::<StringArray>(batch, SETUP_COLUMN)?;
        let laps = column::<Int64Array>(batch, LAP_COLUMN)?;

        let mut channel_values: Vec<Vec<f64>> = Vec::with_capacity(Channel::COUNT);
        for c in Channel::ALL {
            let values = if c.is_integral() {
                column::<Int64Array>(batch, c.name())?
                    .values()
                    .iter()
                    .map(|&v| from_int(v))
                    .collect()
            } else {
                column::<Float64Array>(batch, c.name())?.values().to_vec()
            };
            channel_values.push(values);
        }
        if setups.null_count() > 0 {
            return Err(Error::StorageError("null setup label".to_string()));
        }

        let mut split: [(Vec<Vec<f64>>, Vec<u32>); 2] = [
            (vec![Vec::new(); Channel::COUNT], Vec::new()),
            (vec![Vec::new(); Channel::COUNT], Vec::new()),
        ];
        for row in 0..batch.num_rows() {
            let setup: Setup = setups.value(row).parse()?;
            let (cols, lap_out) = &mut split[setup as usize];
            for (out, values) in cols.iter_mut().zip(&channel_values) {
                out.push(values[row]);
            }
            let lap = u32::try_from(laps.value(row))
                .map_err(|_| Error::StorageError(format!("row {row}: negative lap index")))?;
            lap_out.push(lap);
        }

        let [(base_cols, base_laps), (opt_cols, opt_laps)] = split;
        Self::new(
            TelemetryFrame::new(Setup::Baseline, base_cols, base_laps)?,
            TelemetryFrame::new(Setup::Optimized, opt_cols, opt_laps)?,
        )
    }
}

/// Append-only store of telemetry record batches.
pub struct TelemetryStore {
    batches: Vec<RecordBatch>,
}

impl TelemetryStore {
    /// Create a store from existing batches
    ///
    /// Useful for testing and benchmarking
    #[must_use]
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    /// Create a store holding one batch per setup of a dataset.
    ///
    /// # Errors
    ///
    /// Returns error if conversion to Arrow fails.
    pub fn from_dataset(dataset: &TelemetryDataset) -> Result<Self> {
        let mut store = Self::new(Vec::new());
        for frame in dataset.frames() {
            store.append_batch(frame.to_record_batch()?)?;
        }
        Ok(store)
    }

    /// Load a table from a Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;

        let reader = builder
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

        let mut store = Self::new(Vec::new());
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
            store.append_batch(batch)?;
        }
        debug!(path = %path.as_ref().display(), rows = store.num_rows(), "parquet loaded");
        Ok(store)
    }

    /// Write every batch to a Parquet file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns error if the store is empty or the file cannot be written.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;
        use parquet::file::properties::WriterProperties;

        let schema = self
            .schema()
            .ok_or_else(|| Error::StorageError("cannot write an empty store".to_string()))?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_max_row_group_size(10_000)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        for batch in &self.batches {
            writer.write(batch)?;
        }
        writer.close()?;
        debug!(path = %path.display(), rows = self.num_rows(), "parquet written");
        Ok(())
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Schema of the stored batches, if any
    #[must_use]
    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(RecordBatch::schema)
    }

    /// Total row count across batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Append a batch (the only supported write).
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the batch schema differs from the stored batches
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(existing_schema) = self.schema() {
            if batch.schema() != existing_schema {
                return Err(Error::SchemaMismatch {
                    expected: format!("{existing_schema:?}"),
                    got: format!("{:?}", batch.schema()),
                });
            }
        }

        self.batches.push(batch);
        Ok(())
    }

    /// Concatenate every batch into one.
    ///
    /// # Errors
    ///
    /// Returns error if the store is empty or concatenation fails.
    pub fn concat(&self) -> Result<RecordBatch> {
        let schema = self
            .schema()
            .ok_or_else(|| Error::StorageError("store holds no batches".to_string()))?;
        Ok(concat_batches(&schema, &self.batches)?)
    }

    /// Rebuild the telemetry dataset from the stored batches.
    ///
    /// # Errors
    ///
    /// Returns error if the store is empty or the batches are not telemetry.
    pub fn to_dataset(&self) -> Result<TelemetryDataset> {
        TelemetryDataset::from_record_batch(&self.concat()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StudyConfig;
    use crate::telemetry::generate_dataset;
    use tempfile::TempDir;

    fn tiny_dataset() -> TelemetryDataset {
        let config = StudyConfig::builder().seed(17).laps_per_setup(1).build();
        generate_dataset(&config).unwrap()
    }

    fn foreign_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap()
    }

    #[test]
    fn test_schema_layout() {
        let schema = telemetry_schema();
        assert_eq!(schema.fields().len(), 37);
        assert_eq!(schema.field(4).name(), "gear_position");
        assert_eq!(schema.field(4).data_type(), &DataType::Int64);
        assert_eq!(schema.field(36).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_record_batch_round_trip() {
        let dataset = tiny_dataset();
        let batch = dataset.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2_000);
        let back = TelemetryDataset::from_record_batch(&batch).unwrap();
        assert_eq!(back, dataset);
    }

    #[test]
    fn test_append_batch_schema_validation() {
        let dataset = tiny_dataset();
        let mut store = TelemetryStore::from_dataset(&dataset).unwrap();
        assert_eq!(store.batches().len(), 2);
        assert_eq!(store.num_rows(), 2_000);

        let result = store.append_batch(foreign_batch());
        assert!(matches!(result, Err(Error::SchemaMismatch { .. })));
        assert_eq!(store.batches().len(), 2);
    }

    #[test]
    fn test_parquet_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/telemetry.parquet");
        let dataset = tiny_dataset();
        TelemetryStore::from_dataset(&dataset)
            .unwrap()
            .write_parquet(&path)
            .unwrap();

        let loaded = TelemetryStore::load_parquet(&path).unwrap();
        assert_eq!(loaded.num_rows(), 2_000);
        assert_eq!(loaded.to_dataset().unwrap(), dataset);
    }

    #[test]
    fn test_empty_store() {
        let store = TelemetryStore::new(vec![]);
        assert_eq!(store.num_rows(), 0);
        assert!(store.concat().is_err());
        let dir = TempDir::new().unwrap();
        assert!(store.write_parquet(dir.path().join("x.parquet")).is_err());
    }

    #[test]
    fn test_load_missing_parquet() {
        let result = TelemetryStore::load_parquet("/nonexistent/telemetry.parquet");
        assert!(matches!(result, Err(Error::StorageError(_))));
    }
}
