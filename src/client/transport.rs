//! Procedure transport over HTTP.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use chirp_api_types::{ProcedureKind, RpcEnvelope};
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::application::error::RpcError;
use crate::application::rpc::RpcTransport;

const RPC_PREFIX: &str = "api/rpc/";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status} for `{path}`")]
    Status { status: u16, path: String },
}

/// Calls procedures on a running server, optionally as a signed-in user.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    session: Option<String>,
}

impl HttpTransport {
    pub fn new(site: &str, session: Option<String>) -> Result<Self, TransportError> {
        let base = Url::parse(site)?.join("/")?;
        let client = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self {
            client,
            base,
            session,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("chirp-client/", env!("CARGO_PKG_VERSION"))
    }

    pub fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(TransportError::Url)
    }

    /// Wire URL of a procedure call. Queries carry their input in the query
    /// string; a `null` input is omitted.
    pub fn procedure_url(
        &self,
        kind: ProcedureKind,
        path: &str,
        input: &Value,
    ) -> Result<Url, TransportError> {
        let mut url = self.url(&format!("{RPC_PREFIX}{path}"))?;
        if kind == ProcedureKind::Query && !input.is_null() {
            url.query_pairs_mut()
                .append_pair("input", &input.to_string());
        }
        Ok(url)
    }

    /// Fetch the HTML of a page, as a browser would on navigation.
    pub async fn fetch_page(&self, path: &str) -> Result<(u16, String), TransportError> {
        let url = self.url(path)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if status >= 500 {
            return Err(TransportError::Status {
                status,
                path: path.to_string(),
            });
        }
        Ok((status, body))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn send(
        &self,
        kind: ProcedureKind,
        path: &str,
        input: Value,
    ) -> Result<Result<Value, RpcError>, TransportError> {
        let url = self.procedure_url(kind, path, &input)?;
        let request = match kind {
            ProcedureKind::Query => self.client.get(url),
            ProcedureKind::Mutation => self.client.post(url).json(&input),
        };

        let response = self.authorize(request).send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        debug!(path = %path, status, bytes = bytes.len(), "Procedure response");

        match serde_json::from_slice::<RpcEnvelope>(&bytes) {
            Ok(envelope) => Ok(envelope.into_result().map_err(RpcError::from)),
            Err(_) => Err(TransportError::Status {
                status,
                path: path.to_string(),
            }),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, kind: ProcedureKind, path: &str, input: Value) -> Result<Value, RpcError> {
        self.send(kind, path, input)
            .await
            .unwrap_or_else(|err| Err(RpcError::transport(err.to_string())))
    }
}
