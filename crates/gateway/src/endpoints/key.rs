//! # /api/key
//!
//! BYOKキーの登録と削除。キーは `key:<sid>` にセッションと同じTTLで保存する。

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use reelkey_types::*;

use super::{require_csrf, require_sid};
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::session::{clear_sid, get_sid, new_sid, set_sid};

/// POST /api/key: BYOKキー登録。
///
/// セッションがなければ新しい `sid` を発行する。CSRFトークンはまだ存在しえないため要求しない。
pub async fn handle_register_key(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterKeyRequest>,
) -> Result<(HeaderMap, Json<OkResponse>), GatewayError> {
    let api_key = body.api_key.trim();
    if api_key.is_empty() {
        return Err(GatewayError::BadRequest("api_keyが空です".to_string()));
    }

    let sid = get_sid(&headers).unwrap_or_else(new_sid);
    state
        .secrets
        .set_key(&sid, api_key, state.session_ttl_secs)
        .await?;

    let mut response_headers = HeaderMap::new();
    set_sid(&mut response_headers, &sid, &state.cookie)?;
    tracing::info!("BYOKキーを登録");
    Ok((response_headers, Json(OkResponse::ok())))
}

/// DELETE /api/key: BYOKキー削除。セッションCookieも消去する。
pub async fn handle_delete_key(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<DeleteKeyRequest>,
) -> Result<(HeaderMap, Json<DeleteKeyResponse>), GatewayError> {
    let sid = require_sid(&headers)?;
    require_csrf(&state, &sid, &body.csrf)?;

    let deleted = state.secrets.del_key(&sid).await?;

    let mut response_headers = HeaderMap::new();
    clear_sid(&mut response_headers, &state.cookie)?;
    tracing::info!(deleted, "BYOKキーを削除");
    Ok((response_headers, Json(DeleteKeyResponse { ok: true, deleted })))
}
