//! HTTP implementation of the remote resource API.
//!
//! Every failure is classified here, once, into a [`RemoteError`] kind. The
//! synchronizers never see a raw transport error.

use crate::{
    error::Result, EngineConfig, Filters, Patch, Reachability, RecordId, RemoteApi, RemoteError,
    RemoteResult, Resource,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Error body returned by the server on non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Talks to `{base_url}/{resource}` for one resource kind.
pub struct HttpRemote<R> {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for HttpRemote<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R> fmt::Debug for HttpRemote<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

/// Build the shared HTTP client. The timeout applies to every request.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

impl<R: Resource> HttpRemote<R> {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(build_client(timeout)?, base_url, token))
    }

    /// Share one connection pool between several remotes.
    pub fn with_client(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            _resource: PhantomData,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.api_token.clone(),
            config.request_timeout,
        )
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, R::KIND)
    }

    fn record_url(&self, id: RecordId) -> String {
        format!("{}/{}/{}", self.base_url, R::KIND, id)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = send(self.authorize(request)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::terminal(format!("invalid response body: {e}")))
    }

    async fn send_empty(&self, request: RequestBuilder) -> RemoteResult<()> {
        send(self.authorize(request)).await.map(drop)
    }
}

impl<R> HttpRemote<R> {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn send(request: RequestBuilder) -> RemoteResult<Response> {
    let response = request.send().await.map_err(|e| classify_transport(&e))?;
    let status = response.status();
    if status.is_success() {
        tracing::trace!(status = status.as_u16(), url = %response.url(), "Remote call succeeded");
        return Ok(response);
    }

    let url = response.url().clone();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            error,
            details: Some(details),
        }) => format!("{error}: {details}"),
        Ok(ErrorBody { error, .. }) => error,
        Err(_) if text.is_empty() => status.to_string(),
        Err(_) => text,
    };
    tracing::debug!(status = status.as_u16(), %url, %message, "Remote call failed");
    Err(RemoteError::from_status(status.as_u16(), message))
}

/// Transport-level failures: anything that never produced a response.
fn classify_transport(err: &reqwest::Error) -> RemoteError {
    if err.is_builder() || err.is_redirect() || err.is_decode() {
        RemoteError::terminal(err.to_string())
    } else {
        RemoteError::retryable(err.to_string())
    }
}

#[async_trait]
impl<R: Resource> RemoteApi<R> for HttpRemote<R> {
    async fn list(&self, filters: &Filters) -> RemoteResult<Vec<R>> {
        let request = self.client.get(self.collection_url());
        let request = if filters.is_empty() {
            request
        } else {
            request.query(&filters.pairs())
        };
        self.send_json(request).await
    }

    async fn update(&self, id: RecordId, patch: &Patch) -> RemoteResult<R> {
        self.send_json(self.client.put(self.record_url(id)).json(patch))
            .await
    }

    async fn delete(&self, id: RecordId) -> RemoteResult<()> {
        self.send_empty(self.client.request(Method::DELETE, self.record_url(id)))
            .await
    }

    async fn create(&self, draft: &R::Draft) -> RemoteResult<R> {
        self.send_json(self.client.post(self.collection_url()).json(draft))
            .await
    }

    async fn bulk_delete(&self, read_only: bool) -> RemoteResult<()> {
        let request = self
            .client
            .delete(self.collection_url())
            .query(&[("readOnly", read_only)]);
        self.send_empty(request).await
    }
}

#[async_trait]
impl<R: Resource> Reachability for HttpRemote<R> {
    async fn is_reachable(&self) -> bool {
        let request = self.client.get(format!("{}/health", self.base_url));
        match send(request).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "Health check failed");
                false
            }
        }
    }
}
