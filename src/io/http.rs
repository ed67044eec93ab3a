//! HTTP implementation of [`Transport`] against the `/api/todos` collection.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /api/todos?category=&done=&sort=&order=&includeArchived=` |
//! | create    | `POST /api/todos` |
//! | update    | `PATCH /api/todos/:id` |
//! | toggle    | `PATCH /api/todos/:id/:field` with `{"value"?: bool}` |
//! | remove    | `DELETE /api/todos/:id` |
//!
//! Any non-2xx response becomes [`TransportError::Status`] carrying the
//! response body verbatim.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::io::transport::{Operation, Reply, Transport, TransportError};
use crate::model::task::Ack;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    base: Url,
    http: Client,
}

#[derive(Serialize)]
struct ToggleBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<bool>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(format!("anytodo/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {}", e)))?;
        Self::with_client(base_url, http)
    }

    pub fn with_client(base_url: &str, http: Client) -> Result<Self, TransportError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base = Url::parse(trimmed)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }
        Ok(HttpTransport { base, http })
    }

    /// `<base>/api/todos/<segments...>`, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "todos"])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, op: &Operation) -> Result<reqwest::RequestBuilder, TransportError> {
        let builder = match op {
            Operation::List(params) => {
                let pairs = params.to_query_pairs();
                let builder = self.http.get(self.endpoint(&[])?);
                if pairs.is_empty() {
                    builder
                } else {
                    builder.query(&pairs)
                }
            }
            Operation::Create(payload) => self.http.post(self.endpoint(&[])?).json(payload),
            Operation::Update { id, patch } => self.http.patch(self.endpoint(&[id.as_str()])?).json(patch),
            Operation::Toggle { id, field, intent } => self
                .http
                .patch(self.endpoint(&[id.as_str(), field.as_str()])?)
                .json(&ToggleBody {
                    value: intent.value(),
                }),
            Operation::Remove { id } => self.http.delete(self.endpoint(&[id.as_str()])?),
        };
        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, op: Operation) -> Result<Reply, TransportError> {
        let request = self.request(&op)?;
        debug!(op = op.name(), "sending request");

        let response = request.send().await.map_err(|e| {
            warn!(op = op.name(), error = %e, "request failed");
            TransportError::Network(e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            warn!(op = op.name(), error = %e, "failed to read response body");
            TransportError::Network(e.to_string())
        })?;

        if !status.is_success() {
            warn!(op = op.name(), status = status.as_u16(), "server rejected request");
            let message = if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        match op {
            Operation::List(_) => decode(&body).map(Reply::Tasks),
            Operation::Create(_) | Operation::Update { .. } | Operation::Toggle { .. } => {
                decode(&body).map(Reply::Task)
            }
            Operation::Remove { .. } => {
                // An empty 204 counts as an ack
                if !body.trim().is_empty() {
                    decode::<Ack>(&body)?;
                }
                Ok(Reply::Ack)
            }
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))
}
