use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::LoadError,
    infra::error::InfraError,
    purge::{compat::CompatError, error::PurgeError},
    updater::UpdateError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
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

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub code: &'static str,
    pub message: &'static str,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNKNOWN_EVENT: &str = "unknown_event";
    pub const BACKEND: &str = "backend_error";
    pub const INSTALL: &str = "install_error";
}

/// Handler error: a public code and message for the client plus a private
/// report for the response logger.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    code: &'static str,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            code,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            code,
            public_message,
            report,
        }
    }

    pub fn unauthorized(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Administrator privilege required",
            detail,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorMessage {
                code: self.code,
                message: self.public_message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<PurgeError> for HttpError {
    fn from(error: PurgeError) -> Self {
        HttpError::from_error(
            "application::error::purge_error_to_http_error",
            StatusCode::BAD_GATEWAY,
            codes::BACKEND,
            "Cache backend failed to purge",
            &error,
        )
    }
}

impl From<CompatError> for HttpError {
    fn from(error: CompatError) -> Self {
        match error {
            CompatError::Unknown(_) => HttpError::from_error(
                "application::error::compat_error_to_http_error",
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                "Unknown compatibility",
                &error,
            ),
            CompatError::Duplicate(_) => HttpError::from_error(
                "application::error::compat_error_to_http_error",
                StatusCode::CONFLICT,
                codes::BAD_REQUEST,
                "Compatibility already registered",
                &error,
            ),
            CompatError::Purge(err) => err.into(),
        }
    }
}

impl From<UpdateError> for HttpError {
    fn from(error: UpdateError) -> Self {
        HttpError::from_error(
            "application::error::update_error_to_http_error",
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INSTALL,
            "Package could not be installed",
            &error,
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Purge(#[from] PurgeError),
    #[error(transparent)]
    Compat(#[from] CompatError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
