use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{configuration::BackendConfig, health::Healthy};

pub const REST_PATH: &str = "/rest/v1";
pub const RPC_PATH: &str = "/rest/v1/rpc";

// Postgres unique_violation
const UNIQUE_VIOLATION_CODE: &str = "23505";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Duplicate row: {0}")]
    Duplicate(String),
    #[error("Backend responded with {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Couldn't reach the backend: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Couldn't decode the backend payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unexpected row: {0}")]
    InvalidRow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    In,
    IsNull,
}

/// A column condition. Encodes to the REST query syntax and can be checked against a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn neq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::Neq,
            value: value.into(),
        }
    }

    pub fn is_in<S: AsRef<str>>(column: &str, values: &[S]) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::In,
            value: Value::Array(
                values
                    .iter()
                    .map(|value| Value::String(value.as_ref().to_string()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::IsNull,
            value: Value::Null,
        }
    }

    /// `(column, "op.value")` as the REST API expects it in the query string.
    pub fn to_query_pair(&self) -> (String, String) {
        let condition = match self.op {
            FilterOp::Eq => format!("eq.{}", value_as_text(&self.value)),
            FilterOp::Neq => format!("neq.{}", value_as_text(&self.value)),
            FilterOp::In => {
                let values = match &self.value {
                    Value::Array(values) => values
                        .iter()
                        .map(value_as_text)
                        .collect::<Vec<String>>()
                        .join(","),
                    other => value_as_text(other),
                };
                format!("in.({values})")
            }
            FilterOp::IsNull => "is.null".to_string(),
        };
        (self.column.clone(), condition)
    }

    /// Evaluates the condition against a JSON row.
    pub fn matches(&self, row: &Value) -> bool {
        let cell = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => !cell.is_null() && value_as_text(cell) == value_as_text(&self.value),
            FilterOp::Neq => value_as_text(cell) != value_as_text(&self.value),
            FilterOp::In => match &self.value {
                Value::Array(values) => values
                    .iter()
                    .any(|value| value_as_text(value) == value_as_text(cell)),
                _ => false,
            },
            FilterOp::IsNull => cell.is_null(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowQuery {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(self.filters.iter().map(Filter::to_query_pair));
        if let Some(order) = &self.order {
            let direction = match order.direction {
                OrderDirection::Ascending => "asc",
                OrderDirection::Descending => "desc",
            };
            pairs.push(("order".to_string(), format!("{}.{direction}", order.column)));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Everything the crate needs from the hosted database.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn query_rows(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, BackendError>;

    /// Inserts a row and returns it as stored.
    async fn insert_row(&self, table: &str, fields: Value) -> Result<Value, BackendError>;

    /// Updates every row matching `filters` and returns the updated rows.
    async fn update_rows(
        &self,
        table: &str,
        filters: &[Filter],
        fields: Value,
    ) -> Result<Vec<Value>, BackendError>;

    async fn delete_rows(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError>;

    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, BackendError>;
}

/// Splits a REST response body into rows.
pub fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => vec![],
        other => vec![other],
    }
}

#[derive(Deserialize, Debug)]
struct RestErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct RestBackend {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .field("authorized", &self.access_token.is_some())
            .finish()
    }
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Self {
        if config.url.is_empty() {
            panic!("missing backend URL")
        }

        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Sends requests on behalf of a signed in user instead of the anonymous role.
    pub fn authorized(mut self, access_token: &str) -> Self {
        self.access_token = Some(access_token.to_string());
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.base_url, REST_PATH, table)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    fn returning_rows(request: RequestBuilder) -> RequestBuilder {
        request.header("Prefer", "return=representation")
    }

    async fn read_response(response: Response) -> Result<Value, BackendError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }

        let error_body = serde_json::from_str::<RestErrorBody>(&body).ok();
        let is_duplicate = status == StatusCode::CONFLICT
            || error_body
                .as_ref()
                .and_then(|error| error.code.as_deref())
                .map_or(false, |code| code == UNIQUE_VIOLATION_CODE);
        let message = error_body
            .and_then(|error| error.message)
            .unwrap_or(body);

        if is_duplicate {
            Err(BackendError::Duplicate(message))
        } else {
            log::debug!("Backend > Request failed with {status}: {message}");
            Err(BackendError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl Backend for RestBackend {
    #[tracing::instrument(name = "Query rows", skip(self))]
    async fn query_rows(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, BackendError> {
        let response = self
            .request(Method::GET, self.table_url(table))
            .query(&query.to_query_pairs())
            .send()
            .await?;

        Ok(into_rows(Self::read_response(response).await?))
    }

    #[tracing::instrument(name = "Insert row", skip(self, fields))]
    async fn insert_row(&self, table: &str, fields: Value) -> Result<Value, BackendError> {
        let request = self
            .request(Method::POST, self.table_url(table))
            .json(&fields);
        let response = Self::returning_rows(request).send().await?;

        let mut rows = into_rows(Self::read_response(response).await?);
        if rows.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(rows.swap_remove(0))
        }
    }

    #[tracing::instrument(name = "Update rows", skip(self, fields))]
    async fn update_rows(
        &self,
        table: &str,
        filters: &[Filter],
        fields: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let pairs: Vec<(String, String)> = filters.iter().map(Filter::to_query_pair).collect();
        let request = self
            .request(Method::PATCH, self.table_url(table))
            .query(&pairs)
            .json(&fields);
        let response = Self::returning_rows(request).send().await?;

        Ok(into_rows(Self::read_response(response).await?))
    }

    #[tracing::instrument(name = "Delete rows", skip(self))]
    async fn delete_rows(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        let pairs: Vec<(String, String)> = filters.iter().map(Filter::to_query_pair).collect();
        let response = self
            .request(Method::DELETE, self.table_url(table))
            .query(&pairs)
            .send()
            .await?;

        Self::read_response(response).await.map(|_| ())
    }

    #[tracing::instrument(name = "Call procedure", skip(self, args))]
    async fn call_procedure(&self, name: &str, args: Value) -> Result<Value, BackendError> {
        let url = format!("{}{}/{}", self.base_url, RPC_PATH, name);
        let response = self.request(Method::POST, url).json(&args).send().await?;

        Self::read_response(response).await
    }
}

#[async_trait]
impl Healthy for RestBackend {
    async fn is_healthy(&self) -> bool {
        let url = format!("{}{}/", self.base_url, REST_PATH);
        match self.request(Method::GET, url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                log::debug!("Backend health check failed: {err}");
                false
            }
        }
    }
}
