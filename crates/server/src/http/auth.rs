// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication for every route.

use super::{AppError, SharedApp};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use toil_core::Clock;

pub async fn require_bearer<C: Clock>(
    State(app): State<SharedApp<C>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(toil_core::Error::unauthenticated("missing bearer token").into());
    };
    if token != app.api_key {
        return Err(toil_core::Error::unauthenticated("invalid api key").into());
    }
    Ok(next.run(request).await)
}
