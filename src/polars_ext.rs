use polars::prelude::{DataFrame, JsonFormat, JsonWriter, SerWriter};
use serde_json::Value;

use crate::error::{ChurnframeError, ChurnframeResult, DataError, IoError};

/// Maps a polars error into the crate error type, naming the pipeline stage
/// that produced it.
pub(crate) fn polars_to_churnframe_error(
    stage: &str,
    e: polars::error::PolarsError,
) -> ChurnframeError {
    ChurnframeError::Data(DataError::DataFrame(format!(
        "Error in {stage} stage: {e}"
    )))
}

pub trait DataFrameExt {
    fn to_json_rows(&self) -> ChurnframeResult<Vec<serde_json::Map<String, Value>>>;
}

impl DataFrameExt for DataFrame {
    fn to_json_rows(&self) -> ChurnframeResult<Vec<serde_json::Map<String, Value>>> {
        let height = self.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        // 1. Pre-allocate buffer (Heuristic: approx 2^6 bytes per row)
        let estimated_row_size = self.width() * (1 << 6);
        let mut buf = Vec::with_capacity(height * estimated_row_size);

        // 2. Serialize to memory
        JsonWriter::new(&mut buf)
            .with_json_format(JsonFormat::Json)
            .finish(&mut self.clone())
            .map_err(|e| DataError::DataFrame(e.to_string()))?;

        // 3. Parse back to Value
        let json_val: Value = serde_json::from_slice(&buf).map_err(IoError::Json)?;

        // 4. Transform to Vec<Map> with exact capacity
        match json_val {
            Value::Array(rows) => {
                let mut out_vec = Vec::with_capacity(rows.len());

                for v in rows {
                    if let Value::Object(map) = v {
                        out_vec.push(map);
                    }
                }
                Ok(out_vec)
            }
            _ => {
                Err(DataError::DataFrame("Polars JSON output was not an array".to_string()).into())
            }
        }
    }
}
