// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error-to-response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use toil_wire::ErrorBody;

/// Wrapper turning a domain error into an HTTP response with the
/// taxonomy's status mapping and a JSON [`ErrorBody`].
pub struct AppError(pub toil_core::Error);

impl From<toil_core::Error> for AppError {
    fn from(e: toil_core::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = StatusCode::from_u16(code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = %code, error = %self.0, "request failed");
        }
        let body = ErrorBody { code, message: self.0.message().to_string() };
        (status, Json(body)).into_response()
    }
}
