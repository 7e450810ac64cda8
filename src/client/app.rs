//! Client session bootstrap.
//!
//! A page ships its query snapshot and props inside a JSON script element.
//! [`ClientApp::boot`] adopts that snapshot through the hydration bridge, so
//! the first reads of the session are served from the server's results.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::pages::PagePayload;
use crate::application::rpc::{RpcClient, RpcTransport};
use crate::cache::{HydrationBridge, HydrationReport, SnapshotError, extract_payload};

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("page payload is not valid: {0}")]
    Payload(#[from] serde_json::Error),
}

pub struct ClientApp {
    client: RpcClient,
    props: Value,
    hydration: HydrationReport,
}

impl ClientApp {
    /// Resume the session from `html`.
    ///
    /// A page without a payload boots with an empty cache; every query then
    /// loads over `transport`.
    pub fn boot(
        bridge: &HydrationBridge,
        transport: Arc<dyn RpcTransport>,
        html: &str,
    ) -> Result<Self, BootError> {
        let payload = match extract_payload(html)? {
            Some(raw) => Some(serde_json::from_str::<PagePayload<Value>>(raw)?),
            None => {
                warn!("Page carries no payload; starting with an empty cache");
                None
            }
        };

        if let Some(payload) = &payload {
            payload.snapshot.check_version()?;
        }

        let (cache, hydration) = bridge.install(payload.as_ref().map(|payload| &payload.snapshot));
        info!(
            inserted = hydration.inserted.len(),
            skipped = hydration.skipped.len(),
            "Client booted"
        );

        Ok(Self {
            client: RpcClient::new(transport, cache),
            props: payload.map(|payload| payload.props).unwrap_or(Value::Null),
            hydration,
        })
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn hydration(&self) -> &HydrationReport {
        &self.hydration
    }

    /// Page props, decoded into the page's props type.
    pub fn props<P: DeserializeOwned>(&self) -> Result<P, BootError> {
        Ok(P::deserialize(&self.props)?)
    }
}
