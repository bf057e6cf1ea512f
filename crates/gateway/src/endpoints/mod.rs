//! # Gatewayエンドポイント
//!
//! - `POST /api/key` / `DELETE /api/key`: BYOKキーの登録・削除
//! - `GET /api/csrf`: CSRFトークン発行
//! - `POST /api/download-token`: ダウンロードトークン発行
//! - `POST /api/download-token/invalidate`: ダウンロードトークン無効化
//! - `GET /api/media`: ダウンロードトークンの引き換え

pub mod csrf;
pub mod download_token;
pub mod key;
pub mod media;

pub use csrf::handle_csrf;
pub use download_token::{handle_download_token, handle_invalidate};
pub use key::{handle_delete_key, handle_register_key};
pub use media::handle_media;

use axum::http::HeaderMap;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::session::get_sid;

/// Cookieの `sid` を必須とする。なければ401。
pub(crate) fn require_sid(headers: &HeaderMap) -> Result<String, GatewayError> {
    get_sid(headers).ok_or_else(|| GatewayError::Unauthorized("セッションがありません".to_string()))
}

/// CSRFトークンを検証する。失敗は403。
pub(crate) fn require_csrf(state: &GatewayState, sid: &str, csrf: &str) -> Result<(), GatewayError> {
    if state.csrf.verify(sid, csrf) {
        Ok(())
    } else {
        tracing::warn!("CSRFトークンの検証に失敗");
        Err(GatewayError::Forbidden)
    }
}
