//! HTTP implementation of [`SchedulerClient`].
//!
//! Talks to the desired-state service (`PUT /v1/apps/{pg}`,
//! `DELETE /v1/apps/{pg}/index/{n}`) and the actual-state service
//! (`GET /v1/actual_lrps/{pg}/stats`). One pooled hyper client is shared by
//! every call, and each call is bounded by the configured timeout.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::client::{SchedulerClient, StopOutcome};
use crate::error::{SchedulerError, SchedulerResult};
use crate::guid::ProcessGuid;
use crate::payload::{ActualInstance, DesiredLrp};

const AGENT: &str = concat!("procgrid/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpSchedulerClient {
    client: Client<HttpConnector, Full<Bytes>>,
    desired_state_url: String,
    actual_state_url: String,
    timeout: Duration,
}

impl HttpSchedulerClient {
    pub fn new(desired_state_url: &str, actual_state_url: &str, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            desired_state_url: desired_state_url.trim_end_matches('/').to_string(),
            actual_state_url: actual_state_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Send one request and read the whole response body, within the timeout.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> SchedulerResult<(StatusCode, Bytes)> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url)
            .header(USER_AGENT, AGENT)
            .header(ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| SchedulerError::InvalidRequest {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let exchange = async {
            let resp = self
                .client
                .request(req)
                .await
                .map_err(|e| SchedulerError::Transport {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| SchedulerError::Transport {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?
                .to_bytes();
            Ok((status, bytes))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => {
                if let Ok((status, _)) = &result {
                    debug!(%method, %url, %status, "scheduler responded");
                }
                result
            }
            Err(_) => {
                warn!(%method, %url, timeout = ?self.timeout, "scheduler request timed out");
                Err(SchedulerError::Timeout {
                    url: url.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

impl SchedulerClient for HttpSchedulerClient {
    async fn desire_app(&self, desired: &DesiredLrp) -> SchedulerResult<()> {
        let url = format!("{}/v1/apps/{}", self.desired_state_url, desired.process_guid);
        let body = serde_json::to_vec(desired).map_err(|e| SchedulerError::InvalidRequest {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let (status, _) = self.send(Method::PUT, &url, Some(body)).await?;
        if !status.is_success() {
            return Err(SchedulerError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn actual_instances(&self, process_guid: &ProcessGuid) -> SchedulerResult<Vec<ActualInstance>> {
        let url = format!("{}/v1/actual_lrps/{process_guid}/stats", self.actual_state_url);
        let (status, body) = self.send(Method::GET, &url, None).await?;
        if !status.is_success() {
            return Err(SchedulerError::Status {
                url,
                status: status.as_u16(),
            });
        }
        serde_json::from_slice(&body).map_err(|e| SchedulerError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    async fn stop_index(&self, process_guid: &ProcessGuid, index: u32) -> SchedulerResult<StopOutcome> {
        let url = format!(
            "{}/v1/apps/{process_guid}/index/{index}",
            self.desired_state_url
        );
        let (status, _) = self.send(Method::DELETE, &url, None).await?;
        match status {
            s if s.is_success() => Ok(StopOutcome::Stopped),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(StopOutcome::AlreadyGone),
            s => Err(SchedulerError::Status {
                url,
                status: s.as_u16(),
            }),
        }
    }
}
