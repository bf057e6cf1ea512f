//! # GET /api/csrf

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use reelkey_types::CsrfResponse;

use super::require_sid;
use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /api/csrf: 現在のセッションに紐づくCSRFトークンを発行する。
pub async fn handle_csrf(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<CsrfResponse>, GatewayError> {
    let sid = require_sid(&headers)?;
    let token = state.csrf.issue(&sid)?;
    Ok(Json(CsrfResponse { token }))
}
