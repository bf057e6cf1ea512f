//! # /api/download-token
//!
//! ダウンロードトークンの発行と無効化。どちらもCSRFトークンを要求する。

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use reelkey_crypto::{random_page_id, IssueDownloadToken};
use reelkey_types::*;

use super::{require_csrf, require_sid};
use crate::config::GatewayState;
use crate::error::GatewayError;

/// POST /api/download-token: ダウンロードトークン発行。
///
/// `page_id` が省略された場合はランダムに生成する。
pub async fn handle_download_token(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<DownloadTokenRequest>,
) -> Result<Json<DownloadTokenResponse>, GatewayError> {
    let sid = require_sid(&headers)?;
    require_csrf(&state, &sid, &body.csrf)?;

    let page_id = body.page_id.unwrap_or_else(random_page_id);
    let issued = state.download.issue(IssueDownloadToken {
        sid: &sid,
        page_id: &page_id,
        handle: &body.handle,
        ttl_secs: state.download_token_ttl_secs,
    })?;

    tracing::info!(handle = %body.handle, page_id = %page_id, "ダウンロードトークンを発行");
    Ok(Json(DownloadTokenResponse {
        token: issued.token,
        page_id,
        expires_at_ms: issued.expires_at_ms,
    }))
}

/// POST /api/download-token/invalidate: ダウンロードトークン無効化。
///
/// 不正・期限切れのトークンに対しても成功を返す。KV障害のみ503。
pub async fn handle_invalidate(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<InvalidateRequest>,
) -> Result<Json<OkResponse>, GatewayError> {
    let sid = require_sid(&headers)?;
    require_csrf(&state, &sid, &body.csrf)?;

    state.ledger.invalidate(&sid, &body.token).await?;
    Ok(Json(OkResponse::ok()))
}
