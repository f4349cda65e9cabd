//! # Open Service Broker HTTP Client
//!
//! Implements [`BrokerClient`] against the OSB API v2 binding endpoints.

use super::{
    BindRequest, BindResponse, BrokerClient, BrokerError, Credentials, UnbindRequest,
    UnbindResponse,
};
use crate::constants::OSB_API_VERSION;
use crate::observability::metrics;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use zeroize::Zeroizing;

const API_VERSION_HEADER: &str = "X-Broker-API-Version";

/// Credentials presented to the broker
pub enum BrokerAuth {
    Basic {
        username: String,
        password: Zeroizing<String>,
    },
    Bearer {
        token: Zeroizing<String>,
    },
}

impl fmt::Debug for BrokerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            BrokerAuth::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BindResponseBody {
    #[serde(default)]
    credentials: Option<Credentials>,
}

#[derive(Debug, Default, Deserialize)]
struct AsyncResponseBody {
    #[serde(default)]
    operation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponseBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// HTTP client for one broker
#[derive(Debug)]
pub struct OsbClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<BrokerAuth>,
}

impl OsbClient {
    pub fn new(
        base_url: &str,
        auth: Option<BrokerAuth>,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Configuration(format!("failed to build HTTP client: {e}")))?;
        let base_url = Url::parse(base_url).map_err(|e| {
            BrokerError::Configuration(format!("invalid broker URL {base_url:?}: {e}"))
        })?;
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    /// IDs are appended as escaped path segments
    fn binding_url(&self, instance_id: &str, binding_id: &str) -> Result<Url, BrokerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BrokerError::Configuration(format!(
                    "broker URL {} cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend([
                "v2",
                "service_instances",
                instance_id,
                "service_bindings",
                binding_id,
            ]);
        Ok(url)
    }

    fn prepare(&self, builder: RequestBuilder, accepts_incomplete: bool) -> RequestBuilder {
        let builder = builder.header(API_VERSION_HEADER, OSB_API_VERSION);
        let builder = if accepts_incomplete {
            builder.query(&[("accepts_incomplete", "true")])
        } else {
            builder
        };
        match &self.auth {
            Some(BrokerAuth::Basic { username, password }) => {
                builder.basic_auth(username, Some(password.as_str()))
            }
            Some(BrokerAuth::Bearer { token }) => builder.bearer_auth(token.as_str()),
            None => builder,
        }
    }
}

/// Decodes a JSON body, treating an empty body as the default value
async fn decode_body<T: DeserializeOwned + Default>(response: Response) -> Result<T, BrokerError> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| BrokerError::Decode(e.to_string()))
}

async fn error_from(status: StatusCode, response: Response) -> BrokerError {
    // Error bodies are advisory; an undecodable one still yields the status
    let body: ErrorResponseBody = decode_body(response).await.unwrap_or_default();
    BrokerError::Http {
        status: status.as_u16(),
        error: body.error,
        description: body.description,
    }
}

fn observe(operation: &str, started: Instant, result: &str) {
    metrics::observe_broker_request_duration(operation, started.elapsed().as_secs_f64());
    metrics::increment_broker_requests_total(operation, result);
}

#[async_trait]
impl BrokerClient for OsbClient {
    async fn bind(&self, request: &BindRequest) -> Result<BindResponse, BrokerError> {
        let started = Instant::now();
        let url = self.binding_url(&request.instance_id, &request.binding_id)?;
        debug!(url = %url, "Sending bind request");

        let response = match self
            .prepare(self.http.put(url).json(request), request.accepts_incomplete)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                observe("bind", started, "transport_error");
                return Err(e.into());
            }
        };

        let status = response.status();
        let result = match status {
            StatusCode::OK | StatusCode::CREATED => decode_body::<BindResponseBody>(response)
                .await
                .map(|body| BindResponse::Bound {
                    credentials: body.credentials.unwrap_or_default(),
                }),
            StatusCode::ACCEPTED => decode_body::<AsyncResponseBody>(response)
                .await
                .map(|body| BindResponse::Accepted {
                    operation: body.operation,
                }),
            _ => Err(error_from(status, response).await),
        };

        observe("bind", started, if result.is_ok() { "success" } else { "error" });
        result
    }

    async fn unbind(&self, request: &UnbindRequest) -> Result<UnbindResponse, BrokerError> {
        let started = Instant::now();
        let url = self.binding_url(&request.instance_id, &request.binding_id)?;
        debug!(url = %url, "Sending unbind request");

        let builder = self.http.delete(url).query(&[
            ("service_id", request.service_id.as_str()),
            ("plan_id", request.plan_id.as_str()),
        ]);
        let response = match self
            .prepare(builder, request.accepts_incomplete)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                observe("unbind", started, "transport_error");
                return Err(e.into());
            }
        };

        let status = response.status();
        let result = match status {
            StatusCode::OK => Ok(UnbindResponse::Completed),
            StatusCode::GONE => Ok(UnbindResponse::Gone),
            StatusCode::ACCEPTED => decode_body::<AsyncResponseBody>(response)
                .await
                .map(|body| UnbindResponse::Accepted {
                    operation: body.operation,
                }),
            _ => Err(error_from(status, response).await),
        };

        observe("unbind", started, if result.is_ok() { "success" } else { "error" });
        result
    }
}
