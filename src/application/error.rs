use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chirp_api_types::{RpcErrorBody, RpcErrorCode};
use thiserror::Error;

use crate::{
    application::repos::RepoError,
    domain::{error::DomainError, validation::ValidationErrors},
    infra::error::InfraError,
};

/// Error chain attached to responses so the logging middleware can report it.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Plain-text HTTP failure with a public message and a private report.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Failure value of a remote procedure call.
///
/// Cached in error entries and carried across the wire as [`RpcErrorBody`],
/// so it is `Clone` and converts losslessly to and from the wire form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{message}")]
    NotFound { message: String },
    #[error("sign in required")]
    Unauthorized,
    #[error("too many posts; slow down")]
    TooManyRequests,
    #[error("transport failure: {message}")]
    Transport { message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl RpcError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }

    pub fn code(&self) -> RpcErrorCode {
        match self {
            RpcError::Validation(_) => RpcErrorCode::BadRequest,
            RpcError::NotFound { .. } => RpcErrorCode::NotFound,
            RpcError::Unauthorized => RpcErrorCode::Unauthorized,
            RpcError::TooManyRequests => RpcErrorCode::TooManyRequests,
            RpcError::Transport { .. } | RpcError::Internal { .. } => {
                RpcErrorCode::InternalServerError
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::NotFound { .. })
    }

    pub fn field_errors(&self) -> Option<&ValidationErrors> {
        match self {
            RpcError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    pub fn to_body(&self) -> RpcErrorBody {
        let field_errors = self
            .field_errors()
            .map(|errors| errors.fields().clone());
        let message = match self {
            RpcError::Validation(_) => "validation failed".to_string(),
            other => other.to_string(),
        };
        RpcErrorBody {
            code: self.code(),
            message,
            field_errors,
        }
    }
}

impl From<RpcErrorBody> for RpcError {
    fn from(body: RpcErrorBody) -> Self {
        match body.code {
            RpcErrorCode::BadRequest => {
                let errors = body
                    .field_errors
                    .map(ValidationErrors::from)
                    .unwrap_or_else(|| ValidationErrors::single("input", body.message));
                RpcError::Validation(errors)
            }
            RpcErrorCode::NotFound => RpcError::NotFound {
                message: body.message,
            },
            RpcErrorCode::Unauthorized => RpcError::Unauthorized,
            RpcErrorCode::TooManyRequests => RpcError::TooManyRequests,
            RpcErrorCode::InternalServerError => RpcError::Internal {
                message: body.message,
            },
        }
    }
}

impl From<RepoError> for RpcError {
    fn from(error: RepoError) -> Self {
        RpcError::internal(error.to_string())
    }
}

impl From<DomainError> for RpcError {
    fn from(error: DomainError) -> Self {
        RpcError::internal(error.to_string())
    }
}

/// Top-level failure of a server-side operation outside the procedure layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Rpc(error) => StatusCode::from_u16(error.code().http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AppError::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::BAD_REQUEST => "Request could not be processed",
            StatusCode::UNAUTHORIZED => "Sign in required",
            StatusCode::TOO_MANY_REQUESTS => "Too many requests",
            _ => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}
