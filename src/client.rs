use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::PerfError;
use crate::store::{access_token, SharedStore};

/// HTTP access to the performance backend. Cheap to clone; clones share the
/// connection pool, config and session store.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    store: SharedStore,
}

impl BackendClient {
    pub fn new(config: ClientConfig, store: SharedStore) -> Result<Self, PerfError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            store,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, PerfError> {
        self.config.endpoint(segments)
    }

    pub async fn get(&self, segments: &[&str]) -> Result<Response, PerfError> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);
        Ok(self.authorize(self.http.get(url)).send().await?)
    }

    /// GET with a tighter deadline than the client default.
    pub async fn get_with_timeout(
        &self,
        segments: &[&str],
        timeout: Duration,
    ) -> Result<Response, PerfError> {
        let url = self.endpoint(segments)?;
        debug!("GET {} (timeout {:?})", url, timeout);
        Ok(self
            .authorize(self.http.get(url))
            .timeout(timeout)
            .send()
            .await?)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> Result<Response, PerfError> {
        let url = self.endpoint(segments)?;
        debug!("POST {}", url);
        Ok(self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match access_token(self.store.as_ref()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}
