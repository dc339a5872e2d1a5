use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunClientError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("event stream transport failed: {0}")]
    Transport(String),
}

impl RunClientError {
    pub(crate) fn http(endpoint: &url::Url, source: reqwest::Error) -> Self {
        Self::Http {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}
