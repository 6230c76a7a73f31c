use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::{
    error::RemoteCallError,
    model,
    wire::DestinationWire,
};

/// Header that lets the API recognise a replayed create.
pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Response from the REST API: status plus the raw body text.
#[derive(Clone, Debug)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    /// Turn anything but `expected` into a [`RemoteCallError::Status`].
    pub fn expect(self, expected: u16) -> Result<Self, RemoteCallError> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(RemoteCallError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Client for the destination REST endpoints, every call bounded by a timeout.
#[derive(Clone, Debug)]
pub struct ApiClient {
    base: Url,
    inner: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { base, inner })
    }

    fn url(&self, path: &str) -> Result<Url, RemoteCallError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::RequestBuilder, RemoteCallError> {
        let url = self.url(path)?;
        tracing::debug!("{} {}", method, url);
        let mut request = self.inner.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request)
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RemoteResponse, RemoteCallError> {
        Self::dispatch(self.request(method, path, body)?).await
    }

    async fn dispatch(request: reqwest::RequestBuilder) -> Result<RemoteResponse, RemoteCallError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::trace!("api responded {}: {}", status, body);
        Ok(RemoteResponse { status, body })
    }

    /// Replay a queued call.
    pub async fn send_pending(&self, call: &model::PendingCall) -> Result<RemoteResponse, RemoteCallError> {
        let method = Method::from_bytes(call.method.as_bytes()).unwrap_or(Method::POST);
        let mut request = self.request(method, &call.path, call.body.as_ref())?;
        if let Some(key) = &call.idempotency_key {
            request = request.header(IDEMPOTENCY_KEY, key);
        }
        Self::dispatch(request).await
    }

    pub async fn detail(&self, id: i64) -> Result<DestinationWire, RemoteCallError> {
        let response = self.send(Method::GET, &format!("detail/{id}/"), None).await?.expect(200)?;
        Ok(serde_json::from_str(&response.body)?)
    }

    pub async fn list(&self) -> Result<Vec<DestinationWire>, RemoteCallError> {
        let response = self.send(Method::GET, "create/", None).await?.expect(200)?;
        Ok(serde_json::from_str(&response.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(Url::parse(base).unwrap(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_url_join() {
        let api = client("http://127.0.0.1:8000/");
        assert_eq!(api.url("create/").unwrap().as_str(), "http://127.0.0.1:8000/create/");
        assert_eq!(api.url("/detail/3/").unwrap().as_str(), "http://127.0.0.1:8000/detail/3/");
    }

    #[test]
    fn test_url_join_with_prefix() {
        let api = client("http://example.com/api/");
        assert_eq!(api.url("/update/3/").unwrap().as_str(), "http://example.com/api/update/3/");
    }

    #[test]
    fn test_expect() {
        let ok = RemoteResponse {
            status: 201,
            body: "{}".to_string(),
        };
        assert!(ok.expect(201).is_ok());

        let bad = RemoteResponse {
            status: 400,
            body: "nope".to_string(),
        };
        let e = bad.expect(201).unwrap_err();
        assert_eq!(e.to_string(), "Error: 400 - nope");
    }

    #[tokio::test]
    async fn test_unreachable() {
        // port 9 (discard) is not served locally
        let api = client("http://127.0.0.1:9/");
        let e = api.detail(1).await.unwrap_err();
        assert!(matches!(e, RemoteCallError::Transport(_)));
        assert!(e.to_string().starts_with("Error during API request"));
    }
}
