//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型とHTTPステータスへの対応付け。

use axum::http::StatusCode;

use crate::config::ConfigError;
use crate::kv::KvError;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 設定不備（致命的）
    #[error("設定エラー: {0}")]
    Config(#[from] ConfigError),
    /// 不正なリクエスト（空の入力、不正なpageId等）
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// セッションまたはBYOKキーがない
    #[error("認証が必要です: {0}")]
    Unauthorized(String),
    /// CSRFトークン・ダウンロードトークンの検証失敗、または失効済み。失敗理由は区別しない。
    #[error("アクセスが拒否されました")]
    Forbidden,
    /// KVストアの障害。失効確認では「未失効」とみなしてはならない。
    #[error("KVストア操作に失敗: {0}")]
    Kv(#[from] KvError),
    /// 動画APIからのメディア取得に失敗
    #[error("メディア取得に失敗: {0}")]
    MediaFetch(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<reelkey_crypto::CryptoError> for GatewayError {
    fn from(e: reelkey_crypto::CryptoError) -> Self {
        use reelkey_crypto::CryptoError;
        match e {
            CryptoError::WeakSecret => GatewayError::Config(ConfigError::WeakSecret),
            CryptoError::EmptyInput(_) | CryptoError::InvalidTtl | CryptoError::InvalidPageId => {
                GatewayError::BadRequest(e.to_string())
            }
            CryptoError::Clock(_) => GatewayError::Internal(e.to_string()),
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::Config(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::Kv(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::MediaFetch(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}
