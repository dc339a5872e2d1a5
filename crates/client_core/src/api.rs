//! HTTP boundary to the run owner: run creation, the event stream, interaction
//! responses and cancellation.

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use shared::{
    domain::RunId,
    error::ApiError,
    protocol::{CreateRunRequest, CreateRunResponse, UiResponse},
};
use tracing::{debug, info};
use url::Url;

use crate::{error::RunClientError, stream::RunEventStream};

#[async_trait]
pub trait RunApi: Send + Sync {
    async fn create_run(&self, user_input: &str) -> Result<RunId, RunClientError>;
    async fn open_events(&self, run_id: &RunId) -> Result<RunEventStream, RunClientError>;
    async fn send_ui_response(
        &self,
        run_id: &RunId,
        response: &UiResponse,
    ) -> Result<(), RunClientError>;
    async fn cancel_run(&self, run_id: &RunId) -> Result<(), RunClientError>;
}

pub struct HttpRunApi {
    http: Client,
    server_url: Url,
}

impl HttpRunApi {
    pub fn new(server_url: &str) -> Result<Self, RunClientError> {
        let invalid = |reason: String| RunClientError::InvalidServerUrl {
            url: server_url.to_string(),
            reason,
        };
        let parsed = Url::parse(server_url).map_err(|err| invalid(err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("server_url must start with http:// or https://".into()));
        }
        Ok(Self {
            http: Client::new(),
            server_url: parsed,
        })
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.server_url.clone();
        // http(s) urls always have a path base.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        endpoint: &Url,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, RunClientError> {
        let res = request
            .send()
            .await
            .map_err(|err| RunClientError::http(endpoint, err))?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|err| err.message)
            .unwrap_or(body);
        Err(RunClientError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RunApi for HttpRunApi {
    async fn create_run(&self, user_input: &str) -> Result<RunId, RunClientError> {
        let endpoint = self.endpoint(&["runs"]);
        let request = self.http.post(endpoint.clone()).json(&CreateRunRequest {
            user_input: user_input.to_string(),
        });
        let body: CreateRunResponse = self
            .send(&endpoint, request)
            .await?
            .json()
            .await
            .map_err(|err| RunClientError::http(&endpoint, err))?;
        info!(run_id = %body.run_id, "run created");
        Ok(body.run_id)
    }

    async fn open_events(&self, run_id: &RunId) -> Result<RunEventStream, RunClientError> {
        let endpoint = self.endpoint(&["runs", run_id.as_str(), "events"]);
        let request = self
            .http
            .get(endpoint.clone())
            .header(header::ACCEPT, "text/event-stream");
        let res = self.send(&endpoint, request).await?;
        debug!(run_id = %run_id, %endpoint, "event stream opened");
        Ok(RunEventStream::from_bytes(run_id.clone(), res.bytes_stream()))
    }

    async fn send_ui_response(
        &self,
        run_id: &RunId,
        response: &UiResponse,
    ) -> Result<(), RunClientError> {
        let endpoint = self.endpoint(&["runs", run_id.as_str(), "ui-response"]);
        let request = self.http.post(endpoint.clone()).json(response);
        self.send(&endpoint, request).await?;
        Ok(())
    }

    async fn cancel_run(&self, run_id: &RunId) -> Result<(), RunClientError> {
        let endpoint = self.endpoint(&["runs", run_id.as_str(), "cancel"]);
        let request = self.http.post(endpoint.clone());
        self.send(&endpoint, request).await?;
        info!(run_id = %run_id, "run cancel requested");
        Ok(())
    }
}
