use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry rejected the call; `kind` is its error taxonomy name.
    #[error("registry returned {status} ({kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
}

impl ClientError {
    /// The registry error kind, e.g. `VersionConflict`.
    pub fn kind(&self) -> Option<&str> {
        match self {
            ClientError::Api { kind, .. } => Some(kind),
            ClientError::Http(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    error: Option<ErrorBody>,
}

#[derive(Serialize)]
struct OperationRequest<'a> {
    input: &'a Value,
}

/// The merged schema as served by `GET /api/v1/schema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedSdl {
    pub sequence: Option<u64>,
    pub sdl: String,
}

pub struct RegistryClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Bearer token sent with mutations and admin calls.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Run a named operation such as `updateSchemas` or `validatePolicies`.
    pub async fn execute(&self, operation: &str, input: &Value) -> Result<(), ClientError> {
        let request = self
            .client
            .post(format!("{}/api/v1/{}", self.base_url, operation))
            .json(&OperationRequest { input });
        check(self.authorized(request).send().await?).await?;
        Ok(())
    }

    /// Latest merged schema, or `None` before the first publication.
    pub async fn schema(&self) -> Result<Option<PublishedSdl>, ClientError> {
        let resp = self
            .client
            .get(format!("{}/api/v1/schema", self.base_url))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = check(resp).await?;
        let sequence = resp
            .headers()
            .get("x-schema-sequence")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        Ok(Some(PublishedSdl {
            sequence,
            sdl: resp.text().await?,
        }))
    }

    pub async fn status(&self) -> Result<Value, ClientError> {
        let request = self.client.get(format!("{}/admin/status", self.base_url));
        let resp = check(self.authorized(request).send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Trigger an attachment reconciliation sweep; returns its report.
    pub async fn reconcile(&self) -> Result<Value, ClientError> {
        let request = self.client.post(format!("{}/admin/reconcile", self.base_url));
        let resp = check(self.authorized(request).send().await?).await?;
        Ok(resp.json().await?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await?;
    let (kind, message) = match serde_json::from_str::<Envelope>(&text) {
        Ok(Envelope { error: Some(error) }) => (error.kind, error.message),
        _ => ("Unknown".to_string(), text),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        kind,
        message,
    })
}
