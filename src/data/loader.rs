use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, AsArray, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{SpectralDataset, Spectrum};

/// Tag given to data rows that appear before any header line.
pub const UNKNOWN_TAG: &str = "Unknown";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a spectral dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.txt` / `.asc` – instrument ASCII export (tag line, then `BE,intensity` rows)
/// * `.json`    – `[{ "tag": "C1s", "x": [...], "y": [...] }, ...]`
/// * `.parquet` – Parquet file with a `tag` column and `x` / `y` list columns
pub fn load_file(path: &Path) -> Result<SpectralDataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "csv" | "txt" | "asc" => load_instrument_export(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }?;

    log::info!(
        "Loaded {} spectra from {}: {:?}",
        dataset.len(),
        path.display(),
        dataset.tags()
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Instrument export loader
// ---------------------------------------------------------------------------

fn load_instrument_export(path: &Path) -> Result<SpectralDataset> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening export file {}", path.display()))?;
    parse_instrument_export(file)
}

/// Parse the instrument's multi-region ASCII export.
///
/// ```text
/// C1s
/// 295.0,1520.3
/// 294.9,1518.7
/// ...
/// O1s
/// 540.0,2210.0
/// ```
///
/// Two-field rows that parse as numbers are samples; other two-field rows are
/// dropped. A row with one or zero fields closes the current block, and a
/// single field other than the `1` sentinel names the next block.
pub fn parse_instrument_export<R: Read>(reader: R) -> Result<SpectralDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut spectra = Vec::new();
    let mut current_tag = UNKNOWN_TAG.to_string();
    let mut x = Vec::new();
    let mut y = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("export row {row_no}"))?;

        match record.len() {
            2 => {
                let parsed = (
                    record[0].trim().parse::<f64>(),
                    record[1].trim().parse::<f64>(),
                );
                if let (Ok(xi), Ok(yi)) = parsed {
                    x.push(xi);
                    y.push(yi);
                }
            }
            0 | 1 => {
                if !x.is_empty() {
                    spectra.push(Spectrum::new(
                        current_tag.clone(),
                        std::mem::take(&mut x),
                        std::mem::take(&mut y),
                    ));
                }
                let label = record.get(0).map(str::trim).unwrap_or("");
                if !label.is_empty() && label != "1" {
                    current_tag = label.to_string();
                }
            }
            _ => {}
        }
    }

    if !x.is_empty() {
        spectra.push(Spectrum::new(current_tag, x, y));
    }

    Ok(SpectralDataset::from_spectra(spectra))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "tag": "C1s", "x": [295.0, 294.9, ...], "y": [1520.3, 1518.7, ...] },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<SpectralDataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    parse_json(&text)
}

fn parse_json(text: &str) -> Result<SpectralDataset> {
    let root: JsonValue = serde_json::from_str(text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut spectra = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let tag = obj
            .get("tag")
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_TAG)
            .to_string();
        let x = json_array_to_f64(obj.get("x"), i, "x")?;
        let y = json_array_to_f64(obj.get("y"), i, "y")?;

        if x.len() != y.len() {
            bail!("Row {i}: x has {} values but y has {}", x.len(), y.len());
        }

        spectra.push(Spectrum::new(tag, x, y));
    }

    Ok(SpectralDataset::from_spectra(spectra))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing spectral data.
///
/// Expected schema:
/// - `tag`: Utf8 or LargeUtf8 – region label
/// - `x`: List<Float64> or LargeList<Float64> – binding energies
/// - `y`: List<Float64> or LargeList<Float64> – intensities
fn load_parquet(path: &Path) -> Result<SpectralDataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let tag_idx = schema
            .index_of("tag")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'tag' column"))?;
        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'y' column"))?;

        let tag_col = batch.column(tag_idx);
        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        for row in 0..batch.num_rows() {
            let tag = extract_tag(tag_col, row)
                .with_context(|| format!("Row {row}: failed to read 'tag'"))?;
            let x = extract_f64_list(x_col, row)
                .with_context(|| format!("Row {row}: failed to read 'x'"))?;
            let y = extract_f64_list(y_col, row)
                .with_context(|| format!("Row {row}: failed to read 'y'"))?;

            if x.len() != y.len() {
                bail!("Row {row}: x has {} values but y has {}", x.len(), y.len());
            }

            spectra.push(Spectrum::new(tag, x, y));
        }
    }

    Ok(SpectralDataset::from_spectra(spectra))
}

// -- Parquet / Arrow helpers --

fn extract_tag(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    if col.is_null(row) {
        return Ok(UNKNOWN_TAG.to_string());
    }
    match col.data_type() {
        DataType::Utf8 => Ok(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("Expected Utf8 tag column, got {other:?}"),
    }
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXPORT: &str = "\
1
C1s
290.0,120.0
289.0,180.0
bad,row
288.0,150.0
1
O1s
535.0,300.0
534.0,410.0
";

    #[test]
    fn export_splits_blocks_on_header_lines() {
        let ds = parse_instrument_export(EXPORT.as_bytes()).unwrap();
        assert_eq!(ds.tags(), vec!["C1s", "O1s"]);

        let c1s = ds.get("C1s").unwrap();
        assert_eq!(c1s.x, vec![290.0, 289.0, 288.0]);
        assert_eq!(c1s.y, vec![120.0, 180.0, 150.0]);
        assert_eq!(ds.get("O1s").unwrap().len(), 2);
    }

    #[test]
    fn rows_before_any_header_are_unknown() {
        let ds = parse_instrument_export("1.0,2.0\n3.0,4.0\n".as_bytes()).unwrap();
        assert_eq!(ds.tags(), vec![UNKNOWN_TAG]);
    }

    #[test]
    fn wide_rows_are_ignored() {
        let text = "Cu2p3\n935.0,10.0,extra\n934.0,12.0\n";
        let ds = parse_instrument_export(text.as_bytes()).unwrap();
        assert_eq!(ds.get("Cu2p3").unwrap().x, vec![934.0]);
    }

    #[test]
    fn json_rejects_length_mismatch() {
        let err = parse_json(r#"[{"tag": "C1s", "x": [1.0, 2.0], "y": [1.0]}]"#);
        assert!(err.is_err());

        let ok = parse_json(r#"[{"tag": "C1s", "x": [1.0], "y": [5.0]}]"#).unwrap();
        assert_eq!(ok.get("C1s").unwrap().y, vec![5.0]);
    }

    #[test]
    fn load_file_dispatches_on_extension() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();
        let ds = load_file(file.path()).unwrap();
        assert_eq!(ds.len(), 2);

        let other = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        assert!(load_file(other.path()).is_err());
    }

    #[test]
    fn parquet_rows_become_spectra() {
        use arrow::array::{Float64Builder, ListBuilder, StringArray};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let mut x = ListBuilder::new(Float64Builder::new());
        let mut y = ListBuilder::new(Float64Builder::new());
        for (xs, ys) in [(vec![290.0, 289.0], vec![5.0, 7.0]), (vec![531.0], vec![9.0])] {
            x.values().append_slice(&xs);
            x.append(true);
            y.values().append_slice(&ys);
            y.append(true);
        }
        let item = Arc::new(Field::new("item", DataType::Float64, true));
        let schema = Arc::new(Schema::new(vec![
            Field::new("tag", DataType::Utf8, false),
            Field::new("x", DataType::List(item.clone()), false),
            Field::new("y", DataType::List(item), false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["C1s", "O1s"])),
                Arc::new(x.finish()),
                Arc::new(y.finish()),
            ],
        )
        .unwrap();

        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = load_file(file.path()).unwrap();
        assert_eq!(ds.tags(), vec!["C1s", "O1s"]);
        assert_eq!(ds.get("C1s").unwrap().y, vec![5.0, 7.0]);
        assert_eq!(ds.get("O1s").unwrap().x, vec![531.0]);
    }
}
