// src/write.rs

use anyhow::{Context, Result};
use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use parquet::{
    arrow::ArrowWriter,
    basic::Compression,
    file::properties::WriterProperties,
};
use serde::Serialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

/// Write to `<dir>/<name>.tmp`, then rename over `<dir>/<name>`.
fn atomically<F>(dir: &Path, name: &str, body: F) -> Result<PathBuf>
where
    F: FnOnce(BufWriter<File>) -> Result<()>,
{
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let final_path = dir.join(name);
    let tmp_path = dir.join(format!("{}.tmp", name));
    let file = File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
    body(BufWriter::new(file))?;
    fs::rename(&tmp_path, &final_path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), final_path.display()))?;
    Ok(final_path)
}

/// Header row plus one line per record, in schema order.
pub fn write_csv(batch: &RecordBatch, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = atomically(dir, name, |out| {
        let mut writer = WriterBuilder::new().with_header(true).build(out);
        writer.write(batch).context("writing CSV batch")?;
        writer.into_inner().flush().context("flushing CSV")?;
        Ok(())
    })?;
    debug!(path = %path.display(), rows = batch.num_rows(), "wrote CSV");
    Ok(path)
}

pub fn write_parquet(batch: &RecordBatch, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = atomically(dir, name, |out| {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props))
            .context("initializing Parquet writer")?;
        writer.write(batch).context("writing batch to Parquet")?;
        writer.close().context("closing Parquet writer")?;
        Ok(())
    })?;
    debug!(path = %path.display(), rows = batch.num_rows(), "wrote Parquet");
    Ok(path)
}

/// Pretty JSON with a trailing newline.
pub fn write_json<T: Serialize>(value: &T, dir: &Path, name: &str) -> Result<PathBuf> {
    atomically(dir, name, |mut out| {
        serde_json::to_writer_pretty(&mut out, value).context("serializing JSON")?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn batch() -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("State", DataType::Utf8, false),
            Field::new("Dwelling Units", DataType::Float64, true),
        ]));
        Ok(RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["Victoria", "Tasmania"])) as ArrayRef,
                Arc::new(Float64Array::from(vec![Some(1.5), None])) as ArrayRef,
            ],
        )?)
    }

    #[test]
    fn csv_has_header_and_no_tmp_left_behind() -> Result<()> {
        let dir = tempdir()?;
        let path = write_csv(&batch()?, dir.path(), "out.csv")?;
        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["State,Dwelling Units", "Victoria,1.5", "Tasmania,"]);
        assert!(!dir.path().join("out.csv.tmp").exists());
        Ok(())
    }

    #[test]
    fn parquet_reads_back() -> Result<()> {
        let dir = tempdir()?;
        let path = write_parquet(&batch()?, dir.path(), "out.parquet")?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
        let rows: usize = reader.map(|b| b.map(|b| b.num_rows())).sum::<Result<usize, _>>()?;
        assert_eq!(rows, 2);
        Ok(())
    }

    #[test]
    fn json_report_is_pretty() -> Result<()> {
        let dir = tempdir()?;
        let path = write_json(&serde_json::json!({"status": "ok"}), dir.path(), "r.json")?;
        assert_eq!(fs::read_to_string(path)?, "{\n  \"status\": \"ok\"\n}\n");
        Ok(())
    }
}
