//! GraphQL implementation of the remote mutation client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use stagesync_core::MutationClient;
use stagesync_domain::{MutationError, MutationRequest, MutationResult, RemoteConfig, StageSyncError};
use tracing::{debug, instrument, warn};

use super::classify::{classify_status, classify_transport};
use super::graphql::{build_request, demultiplex, GraphqlResponse};
use crate::http::HttpClient;

const API_VERSION_HEADER: &str = "api-version";
/// Longest slice of an error body carried into a failure message.
const ERROR_BODY_PREVIEW: usize = 200;

/// Sends each [`MutationRequest`] as one aliased GraphQL mutation.
pub struct GraphqlMutationClient {
    http: HttpClient,
    endpoint: Url,
    board_id: String,
}

impl GraphqlMutationClient {
    /// Build a client for `config`. The token is required; the board id is
    /// only needed by `UPDATE_ITEM` operations.
    pub fn new(config: &RemoteConfig) -> Result<Self, StageSyncError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| StageSyncError::Config(format!("invalid remote endpoint: {e}")))?;
        if config.api_token.trim().is_empty() {
            return Err(StageSyncError::Config("remote api_token is not set".into()));
        }

        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(config.api_token.trim())
            .map_err(|_| StageSyncError::Config("api_token is not a valid header value".into()))?;
        token.set_sensitive(true);
        headers.insert(AUTHORIZATION, token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(version) = config.api_version.as_deref() {
            let value = HeaderValue::from_str(version)
                .map_err(|_| StageSyncError::Config("api_version is not a valid header value".into()))?;
            headers.insert(HeaderName::from_static(API_VERSION_HEADER), value);
        }

        let http = HttpClient::builder().timeout(config.timeout()).default_headers(headers).build()?;
        Ok(Self { http, endpoint, board_id: config.board_id.clone() })
    }
}

#[async_trait]
impl MutationClient for GraphqlMutationClient {
    #[instrument(skip_all, fields(operations = request.len()))]
    async fn submit(&self, request: &MutationRequest) -> Result<MutationResult, MutationError> {
        let body = build_request(request, &self.board_id).to_body();
        let builder = self.http.request(Method::POST, self.endpoint.clone()).json(&body);

        let response = self.http.send(builder).await.map_err(|err| {
            let classified = classify_transport(&err);
            warn!(kind = %classified.kind(), error = %err, "mutation request failed");
            classified
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let preview: String = detail.chars().take(ERROR_BODY_PREVIEW).collect();
            let err = classify_status(status, preview.trim());
            warn!(%status, kind = %err.kind(), "mutation request rejected");
            return Err(err);
        }

        let parsed: GraphqlResponse = response.json().await.map_err(|err| classify_transport(&err))?;
        if !parsed.errors.is_empty() {
            debug!(errors = parsed.errors.len(), "response carried GraphQL errors");
        }
        demultiplex(request, parsed)
    }
}
