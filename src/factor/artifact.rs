//! On-disk merged factor artifact (Parquet)
//!
//! The merged matrix is written as one Parquet file per experiment
//! workspace: a `datetime` timestamp column, an `instrument` column,
//! and a single `feature` struct column whose children are the factor
//! columns. Nesting every factor under one namespace lets downstream
//! consumers select "all features" as a single group.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, StructArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Fields, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::factor::FactorMatrix;
use crate::{Error, Result};

/// File name of the merged factor artifact inside a workspace.
pub const ARTIFACT_FILE_NAME: &str = "combined_factors.parquet";

/// Top-level namespace label the factor columns are nested under.
pub const FEATURE_NAMESPACE: &str = "feature";

/// Write the merged matrix to `<dir>/combined_factors.parquet`,
/// creating the directory as needed. Returns the artifact path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the Parquet
/// write fails.
pub fn write_artifact(matrix: &FactorMatrix, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(ARTIFACT_FILE_NAME);

    let batch = to_record_batch(matrix)?;
    let file = File::create(&path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(path)
}

/// Load a merged factor artifact back into a matrix.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not have the
/// artifact schema.
pub fn read_artifact(path: &Path) -> Result<FactorMatrix> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut matrix = FactorMatrix::new();
    for batch in reader {
        let batch = batch?;
        from_record_batch(&batch, &mut matrix)?;
    }
    Ok(matrix)
}

fn to_record_batch(matrix: &FactorMatrix) -> Result<RecordBatch> {
    let mut timestamps: Vec<i64> = Vec::with_capacity(matrix.num_rows());
    let mut instruments: Vec<String> = Vec::with_capacity(matrix.num_rows());
    let mut features: Vec<Vec<Option<f64>>> =
        vec![Vec::with_capacity(matrix.num_rows()); matrix.num_columns()];

    for ((ts, instrument), row) in matrix.rows() {
        timestamps.push(ts.timestamp_millis());
        instruments.push(instrument.clone());
        for (col, values) in features.iter_mut().enumerate() {
            values.push(FactorMatrix::cell(row, col));
        }
    }

    let feature_fields: Fields = matrix
        .columns()
        .iter()
        .map(|name| Field::new(name, DataType::Float64, true))
        .collect();
    let feature_arrays: Vec<ArrayRef> = features
        .into_iter()
        .map(|values| Arc::new(Float64Array::from(values)) as ArrayRef)
        .collect();
    let feature_struct = StructArray::try_new(feature_fields.clone(), feature_arrays, None)?;

    let schema = Arc::new(Schema::new(vec![
        Field::new(
            "datetime",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("instrument", DataType::Utf8, false),
        Field::new(FEATURE_NAMESPACE, DataType::Struct(feature_fields), false),
    ]));

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(TimestampMillisecondArray::from(timestamps)),
            Arc::new(StringArray::from(instruments)),
            Arc::new(feature_struct),
        ],
    )?)
}

fn from_record_batch(batch: &RecordBatch, matrix: &mut FactorMatrix) -> Result<()> {
    let timestamps = downcast::<TimestampMillisecondArray>(batch, "datetime")?;
    let instruments = downcast::<StringArray>(batch, "instrument")?;
    let features = downcast::<StructArray>(batch, FEATURE_NAMESPACE)?;

    for row in 0..batch.num_rows() {
        let millis = timestamps.value(row);
        let ts = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            Error::Storage(format!("artifact timestamp out of range: {millis}"))
        })?;
        let instrument = instruments.value(row);

        for (col, name) in features.column_names().iter().enumerate() {
            let values = features
                .column(col)
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| {
                    Error::Storage(format!("artifact feature column {name} is not Float64"))
                })?;
            if values.is_valid(row) {
                matrix.insert(ts, instrument, name, values.value(row));
            }
        }
    }
    Ok(())
}

fn downcast<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Storage(format!("artifact is missing the {name} column")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Storage(format!("artifact column {name} has an unexpected type")))
}
