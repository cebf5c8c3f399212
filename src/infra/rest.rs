//! Record store speaking the PostgREST dialect of a hosted Postgres backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::application::repos::{Filter, ListQuery, RawRecord, RecordStore, StoreError};
use crate::domain::entities::RecordId;
use crate::domain::types::Table;

use super::error::InfraError;

const REST_PREFIX: &str = "rest/v1/";
const API_KEY_HEADER: &str = "apikey";
const PREFER_HEADER: &str = "prefer";
const RETURN_REPRESENTATION: &str = "return=representation";
const COUNT_EXACT: &str = "count=exact";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";
const NOT_NULL_VIOLATION: &str = "23502";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct BackendError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RestRecordStore {
    client: Client,
    base: Url,
}

impl RestRecordStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, InfraError> {
        let base = Url::parse(base_url)
            .and_then(|url| url.join("/"))
            .and_then(|url| url.join(REST_PREFIX))
            .map_err(|err| InfraError::configuration(format!("invalid backend url: {err}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, header_value(api_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);

        let client = Client::builder()
            .user_agent(Self::user_agent())
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("agenda/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, table: Table, params: &[(String, String)]) -> Result<Url, StoreError> {
        let mut url = self
            .base
            .join(table.as_str())
            .map_err(StoreError::from_persistence)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        table: Table,
        params: &[(String, String)],
    ) -> Result<RequestBuilder, StoreError> {
        let url = self.url(table, params)?;
        debug!(method = %method, url = %url, "Backend request");
        Ok(self.client.request(method, url))
    }

    async fn rows(response: Response) -> Result<Vec<RawRecord>, StoreError> {
        let response = check_status(response).await?;
        let body: Value = response.json().await.map_err(StoreError::from_persistence)?;
        rows_from(body)
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    #[instrument(skip(self, query), fields(table = %table))]
    async fn list(&self, table: Table, query: &ListQuery) -> Result<Vec<RawRecord>, StoreError> {
        let response = self
            .request(Method::GET, table, &list_params(query))?
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        Self::rows(response).await
    }

    #[instrument(skip(self, filters), fields(table = %table))]
    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        let mut params = vec![("select".to_string(), "id".to_string())];
        params.extend(filters.iter().map(filter_param));
        params.push(("limit".to_string(), "0".to_string()));

        let response = self
            .request(Method::GET, table, &params)?
            .header(PREFER_HEADER, COUNT_EXACT)
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        let response = check_status(response).await?;
        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| StoreError::decode("count response has no Content-Range header"))?;
        parse_content_range(range)
    }

    #[instrument(skip(self, record), fields(table = %table))]
    async fn insert(&self, table: Table, record: RawRecord) -> Result<RawRecord, StoreError> {
        let response = self
            .request(Method::POST, table, &[])?
            .header(PREFER_HEADER, RETURN_REPRESENTATION)
            .json(&record)
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::decode("insert returned no representation"))
    }

    #[instrument(skip(self, patch), fields(table = %table, id = %id))]
    async fn update(
        &self,
        table: Table,
        id: RecordId,
        patch: RawRecord,
    ) -> Result<RawRecord, StoreError> {
        let response = self
            .request(Method::PATCH, table, &[id_param(id)])?
            .header(PREFER_HEADER, RETURN_REPRESENTATION)
            .json(&patch)
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self), fields(table = %table, id = %id))]
    async fn delete(&self, table: Table, id: RecordId) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, table, &[id_param(id)])?
            .header(PREFER_HEADER, RETURN_REPRESENTATION)
            .send()
            .await
            .map_err(StoreError::from_persistence)?;
        let deleted = Self::rows(response).await?;
        if deleted.is_empty() {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, InfraError> {
    HeaderValue::from_str(value)
        .map_err(|err| InfraError::configuration(format!("invalid api key: {err}")))
}

/// Query-string pairs for a list request, in PostgREST syntax.
pub(crate) fn list_params(query: &ListQuery) -> Vec<(String, String)> {
    let select = match &query.embed {
        Some(embed) => format!("*,{}({})", embed.table.as_str(), embed.columns.join(",")),
        None => "*".to_string(),
    };
    let mut params = vec![("select".to_string(), select)];

    if !query.orders.is_empty() {
        let order = query
            .orders
            .iter()
            .map(|order| {
                let direction = if order.ascending { "asc" } else { "desc" };
                format!("{}.{direction}", order.column)
            })
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }

    params.extend(query.filters.iter().map(filter_param));

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn filter_param(filter: &Filter) -> (String, String) {
    (
        filter.column.to_string(),
        format!("{}.{}", filter.op.as_str(), filter.value),
    )
}

fn id_param(id: RecordId) -> (String, String) {
    ("id".to_string(), format!("eq.{id}"))
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
pub(crate) fn parse_content_range(value: &str) -> Result<u64, StoreError> {
    let total = value
        .rsplit_once('/')
        .map(|(_, total)| total.trim())
        .ok_or_else(|| StoreError::decode(format!("malformed Content-Range `{value}`")))?;
    total
        .parse()
        .map_err(|_| StoreError::decode(format!("Content-Range `{value}` carries no exact count")))
}

fn rows_from(body: Value) -> Result<Vec<RawRecord>, StoreError> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(StoreError::decode(format!("expected row object, got {other}"))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(StoreError::decode(format!("expected row array, got {other}"))),
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &text))
}

pub(crate) fn classify_failure(status: StatusCode, body: &str) -> StoreError {
    let parsed: BackendError = serde_json::from_str(body).unwrap_or_default();
    let message = match (&parsed.message, &parsed.details) {
        (Some(message), Some(details)) => format!("{message} ({details})"),
        (Some(message), None) => message.clone(),
        _ if body.is_empty() => format!("backend returned status {status}"),
        _ => format!("backend returned status {status}: {body}"),
    };

    match parsed.code.as_deref() {
        Some(FOREIGN_KEY_VIOLATION | UNIQUE_VIOLATION | NOT_NULL_VIOLATION) => {
            StoreError::Integrity { message }
        }
        Some(INVALID_TEXT_REPRESENTATION) => StoreError::InvalidInput { message },
        _ if status == StatusCode::NOT_FOUND => StoreError::NotFound,
        _ => StoreError::Persistence(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_follow_postgrest_syntax() {
        let query = ListQuery::new()
            .filter(Filter::gte("date", "2030-01-01"))
            .filter(Filter::eq("status", "pendiente"))
            .order_by("date", true)
            .order_by("time", true)
            .limit(5)
            .embed(Table::Clients, "client_id", &["name", "phone"]);

        let params = list_params(&query);
        let expected: Vec<(String, String)> = [
            ("select", "*,clients(name,phone)"),
            ("order", "date.asc,time.asc"),
            ("date", "gte.2030-01-01"),
            ("status", "eq.pendiente"),
            ("limit", "5"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        assert_eq!(params, expected);
    }

    #[test]
    fn descending_order_without_embed() {
        let params = list_params(&ListQuery::new().order_by("created_at", false));
        assert_eq!(params[0], ("select".to_string(), "*".to_string()));
        assert_eq!(
            params[1],
            ("order".to_string(), "created_at.desc".to_string())
        );
    }

    #[test]
    fn table_urls_live_under_the_rest_prefix() {
        let store = RestRecordStore::new(
            "https://project.example.co/some/path",
            "anon-key",
            Duration::from_secs(5),
        )
        .expect("store");
        let url = store
            .url(Table::Appointments, &[id_param(RecordId::new(9))])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/appointments?id=eq.9"
        );
    }

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range("0-24/3573"), Ok(3573));
        assert_eq!(parse_content_range("*/0"), Ok(0));
        assert!(parse_content_range("*/*").is_err());
        assert!(parse_content_range("garbage").is_err());
    }

    #[test]
    fn failures_are_classified_by_postgres_code() {
        let integrity = classify_failure(
            StatusCode::CONFLICT,
            r#"{"code":"23503","message":"violates foreign key constraint","details":"Key is not present"}"#,
        );
        assert_eq!(
            integrity,
            StoreError::Integrity {
                message: "violates foreign key constraint (Key is not present)".to_string()
            }
        );

        let invalid = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"code":"22P02","message":"invalid input syntax"}"#,
        );
        assert!(matches!(invalid, StoreError::InvalidInput { .. }));

        let outage = classify_failure(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(
            outage,
            StoreError::Persistence("backend returned status 503 Service Unavailable".to_string())
        );
    }

    #[test]
    fn rows_must_be_objects() {
        assert!(rows_from(serde_json::json!([{"id": 1}])).is_ok());
        assert!(rows_from(serde_json::json!([1, 2])).is_err());
    }
}
