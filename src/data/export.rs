use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value as JsonValue};

use super::model::TweetTable;
use crate::error::{DatasetError, Result};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write a table to a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one Utf8 column per required column
/// * `.json`    – `[{ "tweet_id": ..., "words": [...], ... }, ...]`
/// * `.csv`     – header row, list cells JSON-encoded
pub fn save_file(table: &TweetTable, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => save_parquet(table, path)?,
        "json" => save_json(table, path)?,
        "csv" => save_csv(table, path)?,
        other => {
            return Err(DatasetError::format(format!(
                "Unsupported export extension: .{other}"
            )))
        }
    }
    info!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the same layout as `df.to_json(orient='records')`.
pub fn to_json_records(table: &TweetTable) -> JsonValue {
    let records = table
        .rows()
        .iter()
        .map(|row| {
            let obj: Map<String, JsonValue> = table
                .columns()
                .iter()
                .zip(row)
                .map(|(col, cell)| (col.clone(), cell.to_json()))
                .collect();
            JsonValue::Object(obj)
        })
        .collect();
    JsonValue::Array(records)
}

fn save_json(table: &TweetTable, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &to_json_records(table))?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

pub fn write_csv<W: Write>(table: &TweetTable, w: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(w);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|c| c.to_field()))?;
    }
    writer.flush()?;
    Ok(())
}

fn save_csv(table: &TweetTable, path: &Path) -> Result<()> {
    write_csv(table, File::create(path)?)
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Arrow view of the table: every column as nullable Utf8.
pub fn to_record_batch(table: &TweetTable) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let arrays: Vec<ArrayRef> = (0..table.columns().len())
        .map(|col| {
            let values: StringArray = table
                .rows()
                .iter()
                .map(|row| {
                    let cell = &row[col];
                    (!cell.is_null()).then(|| cell.to_field())
                })
                .collect();
            Arc::new(values) as ArrayRef
        })
        .collect();

    Ok(RecordBatch::try_new(schema, arrays)?)
}

fn save_parquet(table: &TweetTable, path: &Path) -> Result<()> {
    let batch = to_record_batch(table)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::tests::sample_row;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn table() -> TweetTable {
        TweetTable::from_rows(vec![sample_row(1, 5), sample_row(2, 6)]).unwrap()
    }

    #[test]
    fn test_json_records() {
        let json = to_json_records(&table());
        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["tweet_id"], 1);
        assert_eq!(records[1]["hashtags"], serde_json::json!(["news"]));
        assert!(records[0]["user_mentions"].is_null());
    }

    #[test]
    fn test_csv_layout() {
        let mut buf = Vec::new();
        write_csv(&table(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "tweet_id,text,event_id,words,filtered_words,entities,user_id,created_at,urls,hashtags,user_mentions"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("1,tweet number 1,5,"));
        assert!(first.contains(r#""[""tweet"",""number""]""#));
    }

    #[test]
    fn test_parquet_roundtrip_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        save_file(&table(), &path).unwrap();

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        assert_eq!(batches[0].num_columns(), 11);
        let mentions = batches[0].column(10);
        assert!(mentions.is_null(0));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_file(&table(), &dir.path().join("out.xlsx")).unwrap_err();
        assert!(matches!(err, DatasetError::Format(_)));
    }
}
