use std::time::Duration;

use log::debug;
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder, Response},
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::Deserialize;
use serde_json::json;

use super::{Backend, BackendError, Filter, ObjectInfo, Row, RowQuery};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const LIST_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct RestBackend {
    base_url: String,
    create_table_rpc: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    created_at: Option<String>,
    #[serde(default)]
    metadata: Option<ListedMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ListedMetadata {
    #[serde(default)]
    size: u64,
    #[serde(default)]
    mimetype: Option<String>,
}

impl RestBackend {
    pub fn new(
        base_url: &str,
        api_key: &str,
        create_table_rpc: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|err| BackendError::Config(format!("API key is not a valid header value: {err}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|err| BackendError::Config(format!("API key is not a valid header value: {err}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::Config(format!("Building HTTP client: {err}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            create_table_rpc: create_table_rpc.to_string(),
            client,
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.base_url)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{path}", self.base_url)
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, BackendError> {
        debug!("Backend request: {what}");
        let response = request
            .send()
            .map_err(|err| BackendError::Transport(format!("{what}: {err}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify(status, format!("{what}: {}", error_message(&body))))
    }
}

fn classify(status: StatusCode, message: String) -> BackendError {
    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BackendError::Rejected(message),
        other => BackendError::Http {
            status: other.as_u16(),
            message,
        },
    }
}

/// Pulls the human-readable part out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error", "msg"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn query_params(query: &RowQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for filter in &query.filters {
        match filter {
            Filter::Eq { column, value } => params.push((column.clone(), format!("eq.{value}"))),
            Filter::ILike { column, pattern } => {
                params.push((column.clone(), format!("ilike.{pattern}")))
            }
        }
    }
    if let Some((column, ascending)) = &query.order_by {
        let direction = if *ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{column}.{direction}")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

impl Backend for RestBackend {
    fn execute_sql(&self, table_name: &str, sql_query: &str) -> Result<(), BackendError> {
        let url = self.rest_url(&format!("rpc/{}", self.create_table_rpc));
        let request = self.client.post(url).json(&json!({
            "table_name": table_name,
            "sql_query": sql_query,
        }));
        self.send(request, &format!("rpc {} for {table_name}", self.create_table_rpc))?;
        Ok(())
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<(), BackendError> {
        let request = self
            .client
            .post(self.rest_url(table))
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(request, &format!("insert {} row(s) into {table}", rows.len()))?;
        Ok(())
    }

    fn upsert_rows(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<(), BackendError> {
        let request = self
            .client
            .post(self.rest_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.send(request, &format!("upsert {} row(s) into {table}", rows.len()))?;
        Ok(())
    }

    fn select_rows(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>, BackendError> {
        let request = self.client.get(self.rest_url(table)).query(&query_params(query));
        let response = self.send(request, &format!("select from {table}"))?;
        response
            .json::<Vec<Row>>()
            .map_err(|err| BackendError::Transport(format!("decoding rows from {table}: {err}")))
    }

    fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        let request = self
            .client
            .post(self.storage_url(&format!("object/{bucket}/{path}")))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes.to_vec());
        self.send(request, &format!("upload {bucket}/{path}"))?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, BackendError> {
        let request = self
            .client
            .post(self.storage_url(&format!("object/list/{bucket}")))
            .json(&json!({
                "prefix": prefix,
                "limit": LIST_PAGE_SIZE,
                "offset": 0,
                "sortBy": { "column": "created_at", "order": "desc" },
            }));
        let response = self.send(request, &format!("list {bucket}/{prefix}"))?;
        let listed = response
            .json::<Vec<ListedObject>>()
            .map_err(|err| BackendError::Transport(format!("decoding object list: {err}")))?;
        Ok(listed
            .into_iter()
            .map(|object| {
                let metadata = object.metadata.unwrap_or_default();
                ObjectInfo {
                    name: object.name,
                    size: metadata.size,
                    content_type: metadata
                        .mimetype
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    created_at: object.created_at,
                }
            })
            .collect())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.storage_url(&format!("object/public/{bucket}/{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        RestBackend::new(
            "https://portal.example.co/",
            "service-key",
            "create_table",
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
        .expect("client builds")
    }

    #[test]
    fn urls_strip_trailing_slash() {
        let backend = backend();
        assert_eq!(
            backend.rest_url("rpc/create_table"),
            "https://portal.example.co/rest/v1/rpc/create_table"
        );
        assert_eq!(
            backend.public_url("results", "uploads/a.csv"),
            "https://portal.example.co/storage/v1/object/public/results/uploads/a.csv"
        );
    }

    #[test]
    fn query_params_encode_filters_order_and_limit() {
        let query = RowQuery::all()
            .ilike("table_name", "csit%")
            .eq("matriculation_number", "FPE/ND/CSIT/2021/001")
            .order("uploaded_at", false)
            .limit(5);
        let params = query_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("table_name".to_string(), "ilike.csit%".to_string()),
                (
                    "matriculation_number".to_string(),
                    "eq.FPE/ND/CSIT/2021/001".to_string()
                ),
                ("order".to_string(), "uploaded_at.desc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            classify(StatusCode::CONFLICT, "exists".to_string()),
            BackendError::Conflict(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "down".to_string()),
            BackendError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn error_message_prefers_json_message_field() {
        assert_eq!(
            error_message(r#"{"code":"42P07","message":"relation exists"}"#),
            "relation exists"
        );
        assert_eq!(error_message("  plain failure "), "plain failure");
    }

    #[test]
    fn invalid_api_key_is_a_config_error() {
        let err = RestBackend::new("https://x", "bad\nkey", "create_table", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }
}
