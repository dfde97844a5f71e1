//! Wire shapes for listings, query responses, and errors.
//!
//! These are the JSON forms outer wrappers (tools, HTTP handlers) return.
//! The large-result policy lives here, not in the dispatcher: results over
//! [`INLINE_ROW_LIMIT`] rows are summarized with a 5-row preview instead of
//! inlined.

use serde_json::{json, Map, Value as JsonValue};

use crate::error::FrameError;
use crate::query::QueryResult;
use crate::storage::DatasetMetadata;

/// Results above this row count are not inlined.
pub const INLINE_ROW_LIMIT: usize = 100;

/// Rows included in the preview of a large result.
const PREVIEW_ROWS: usize = 5;

/// Listing/detail wire form of dataset metadata.
#[must_use]
pub fn metadata_wire(metadata: &DatasetMetadata) -> JsonValue {
    let dtypes: Map<String, JsonValue> = metadata
        .dtypes
        .iter()
        .map(|(name, tag)| (name.clone(), json!(tag)))
        .collect();
    json!({
        "df_id": metadata.id,
        "created_at": metadata.created_at.to_rfc3339(),
        "expires_at": metadata.expires_at().map(|at| at.to_rfc3339()),
        "is_expired": metadata.is_expired(),
        "shape": [metadata.shape.0, metadata.shape.1],
        "size_bytes": metadata.size_bytes,
        "memory_usage": metadata.memory_bytes,
        "dtypes": dtypes,
        "tags": metadata.tags,
        "ttl_seconds": metadata.ttl_seconds,
    })
}

/// Success wire form of a query result.
///
/// Small results inline their records; large results carry a summary string,
/// a head preview under `sample_data`, and a guidance `note`.
#[must_use]
pub fn query_response(df_id: &str, result: &QueryResult) -> JsonValue {
    let (rows, cols) = result.data.shape();
    let mut response = Map::new();
    response.insert("success".into(), json!(true));
    response.insert("dataframe_id".into(), json!(df_id));
    response.insert("operation".into(), json!(result.operation));
    response.insert(
        "parameters".into(),
        JsonValue::Object(result.parameters.clone()),
    );
    response.insert("result_shape".into(), json!([rows, cols]));
    response.insert(
        "execution_time_ms".into(),
        json!(result.execution_time_ms),
    );
    response.insert(
        "metadata".into(),
        JsonValue::Object(result.provenance.clone()),
    );

    if result.data.is_empty() {
        response.insert("data".into(), json!("No data returned (empty result)"));
    } else if rows <= INLINE_ROW_LIMIT {
        response.insert("data".into(), JsonValue::Array(result.data.to_records()));
        response.insert("columns".into(), json!(result.data.column_names()));
    } else {
        response.insert(
            "data".into(),
            json!(format!("Large result with {rows} rows and {cols} columns")),
        );
        response.insert("columns".into(), json!(result.data.column_names()));
        response.insert(
            "sample_data".into(),
            JsonValue::Array(result.data.slice(0, PREVIEW_ROWS).to_records()),
        );
        response.insert(
            "note".into(),
            json!("Use smaller parameters or 'head'/'tail' operations for large results"),
        );
    }
    JsonValue::Object(response)
}

/// Flat error wire form.
#[must_use]
pub fn error_response(error: &FrameError) -> JsonValue {
    json!({
        "success": false,
        "error": error.to_string(),
    })
}

/// Rich error wire form with a stable code.
#[must_use]
pub fn api_error_response(error: &FrameError, details: Option<JsonValue>) -> JsonValue {
    json!({
        "success": false,
        "error": {
            "code": error.code(),
            "message": error.to_string(),
            "details": details.unwrap_or_else(|| json!({})),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use framecache_core::TableBuilder;

    fn result_with_rows(rows: usize) -> QueryResult {
        #[allow(clippy::cast_possible_wrap)]
        let data = TableBuilder::new()
            .int("id", (0..rows as i64).collect())
            .str("name", (0..rows).map(|_| "x").collect())
            .build()
            .unwrap();
        QueryResult {
            data,
            operation: "head",
            parameters: json!({"n": rows}).as_object().cloned().unwrap(),
            provenance: json!({"rows_returned": rows}).as_object().cloned().unwrap(),
            execution_time_ms: 0.25,
        }
    }

    #[test]
    fn small_results_inline_records() {
        let response = query_response("dataframe-abcd1234", &result_with_rows(3));
        assert_eq!(response["success"], json!(true));
        assert_eq!(response["dataframe_id"], json!("dataframe-abcd1234"));
        assert_eq!(response["result_shape"], json!([3, 2]));
        assert_eq!(response["data"].as_array().unwrap().len(), 3);
        assert_eq!(response["columns"], json!(["id", "name"]));
        assert!(response.get("note").is_none());
    }

    #[test]
    fn large_results_get_summary_and_preview() {
        let response = query_response("dataframe-abcd1234", &result_with_rows(150));
        assert_eq!(
            response["data"],
            json!("Large result with 150 rows and 2 columns")
        );
        assert_eq!(response["sample_data"].as_array().unwrap().len(), 5);
        assert!(response["note"].as_str().unwrap().contains("head"));
    }

    #[test]
    fn boundary_row_count_still_inlines() {
        let response = query_response("dataframe-abcd1234", &result_with_rows(100));
        assert!(response["data"].is_array());
        assert!(response.get("sample_data").is_none());
    }

    #[test]
    fn empty_results_are_described() {
        let mut result = result_with_rows(3);
        result.data = result.data.slice(0, 0);
        let response = query_response("dataframe-abcd1234", &result);
        assert_eq!(response["data"], json!("No data returned (empty result)"));
    }

    #[test]
    fn metadata_wire_shape() {
        let metadata = DatasetMetadata {
            id: "dataframe-abcd1234".into(),
            created_at: Utc::now(),
            shape: (10, 2),
            dtypes: vec![("id".into(), "int64".into()), ("name".into(), "str".into())],
            memory_bytes: 2048,
            size_bytes: 2048,
            ttl_seconds: Some(3600),
            tags: json!({"source": "upload"}).as_object().cloned().unwrap(),
        };
        let wire = metadata_wire(&metadata);
        assert_eq!(wire["df_id"], json!("dataframe-abcd1234"));
        assert_eq!(wire["shape"], json!([10, 2]));
        assert_eq!(wire["memory_usage"], json!(2048));
        assert_eq!(wire["dtypes"]["name"], json!("str"));
        assert_eq!(wire["is_expired"], json!(false));
        assert!(wire["expires_at"].is_string());
        assert_eq!(wire["tags"]["source"], json!("upload"));

        let eternal = DatasetMetadata {
            ttl_seconds: None,
            ..metadata
        };
        let wire = metadata_wire(&eternal);
        assert_eq!(wire["expires_at"], JsonValue::Null);
        assert_eq!(wire["ttl_seconds"], JsonValue::Null);
    }

    #[test]
    fn error_shapes_carry_codes() {
        let error = FrameError::invalid("'n' must be at least 1");
        let flat = error_response(&error);
        assert_eq!(flat["success"], json!(false));
        assert!(flat["error"].as_str().unwrap().contains("'n'"));

        let rich = api_error_response(&error, None);
        assert_eq!(rich["error"]["code"], json!("invalid_argument"));
        assert!(rich["error"]["message"].is_string());
        assert_eq!(rich["error"]["details"], json!({}));
    }
}
