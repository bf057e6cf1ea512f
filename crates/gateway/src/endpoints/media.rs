//! # GET /api/media
//!
//! ダウンロードトークンの引き換え。トークンそのものが認可となるため、CSRFトークンは要求しない。
//!
//! ## 判定順序
//! 1. セッション（なければ401）
//! 2. トークン検証と失効台帳の参照（拒否は403、台帳参照の失敗は503）
//! 3. BYOKキーの取得（なければ401）
//! 4. 動画APIからの取得

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use reelkey_types::MediaQuery;

use super::require_sid;
use crate::config::GatewayState;
use crate::error::GatewayError;

/// 上流が Content-Type を返さなかった場合の既定値
const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// GET /api/media?token=...: メディア取得。
pub async fn handle_media(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Query(query): Query<MediaQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let sid = require_sid(&headers)?;
    let verified = state.ledger.authorize_redemption(&sid, &query.token).await?;

    let api_key = state
        .secrets
        .get_key(&sid)
        .await?
        .ok_or_else(|| GatewayError::Unauthorized("APIキーが登録されていません".to_string()))?;

    let payload = state.media.fetch(&api_key, &verified.handle).await?;
    tracing::info!(handle = %verified.handle, bytes = payload.bytes.len(), "メディアを引き換え");

    let content_type = payload
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CONTENT_DISPOSITION, "attachment".to_string()),
            (CACHE_CONTROL, "no-store".to_string()),
        ],
        payload.bytes,
    ))
}
