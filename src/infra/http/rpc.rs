//! Wire surface of the procedure router.
//!
//! Queries are `GET /api/rpc/{path}?input=<json>`, mutations are
//! `POST /api/rpc/{path}` with a JSON body. Every response is an
//! [`RpcEnvelope`] whose HTTP status follows the error code.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use chirp_api_types::{ProcedureKind, RpcEnvelope};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    application::{
        error::{ErrorReport, RpcError},
        identity::Identity,
    },
    cache::MutationEvent,
};

use super::HttpState;

pub(super) fn routes() -> Router<HttpState> {
    Router::new().route("/api/rpc/{procedure}", get(query).post(mutation))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryParams {
    input: Option<String>,
}

async fn query(
    State(state): State<HttpState>,
    Extension(identity): Extension<Identity>,
    Path(procedure): Path<String>,
    Query(params): Query<QueryParams>,
) -> Response {
    let input = match parse_input(params.input.as_deref().map(str::as_bytes)) {
        Ok(input) => input,
        Err(err) => return envelope_response(Err(err)),
    };

    let result = state
        .procedures
        .call(&identity, ProcedureKind::Query, &procedure, input)
        .await;
    envelope_response(result)
}

async fn mutation(
    State(state): State<HttpState>,
    Extension(identity): Extension<Identity>,
    Path(procedure): Path<String>,
    body: Bytes,
) -> Response {
    let input = match parse_input((!body.is_empty()).then_some(&body[..])) {
        Ok(input) => input,
        Err(err) => return envelope_response(Err(err)),
    };

    let result = state
        .procedures
        .call(&identity, ProcedureKind::Mutation, &procedure, input)
        .await;

    match &result {
        Ok(output) => {
            if let Some(event) = MutationEvent::from_output(&procedure, output) {
                state.coordinator.on_success(&event).await;
            }
        }
        Err(err) => {
            let path: Vec<&str> = procedure.split('.').collect();
            state.coordinator.on_failure(&path, err);
        }
    }
    envelope_response(result)
}

fn parse_input(raw: Option<&[u8]>) -> Result<Value, RpcError> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_slice(raw).map_err(|err| {
            debug!(error = %err, "Rejected malformed procedure input");
            RpcError::invalid_input("input", "input must be valid JSON")
        }),
    }
}

fn envelope_response(result: Result<Value, RpcError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(RpcEnvelope::ok(data))).into_response(),
        Err(err) => {
            let body = err.to_body();
            let status = StatusCode::from_u16(body.code.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = (status, Json(RpcEnvelope::Error(body))).into_response();
            ErrorReport::from_error("infra::http::rpc", status, &err).attach(&mut response);
            response
        }
    }
}
