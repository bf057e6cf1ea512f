//! # reelkey 共有型定義
//!
//! gatewayのHTTPエンドポイントが送受信するリクエスト・レスポンス本文。
//!
//! ## トークンの受け渡し
//! - CSRFトークン: 状態を変更するリクエストの本文フィールド `csrf`
//! - ダウンロードトークン: メディア取得はクエリ `token`、無効化は本文フィールド `token`

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BYOKキー登録・削除
// ---------------------------------------------------------------------------

/// POST /api/key のリクエスト。
/// セッションを確立する呼び出しのため、CSRFトークンは要求しない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterKeyRequest {
    /// ユーザーが持ち込む動画生成APIのキー
    pub api_key: String,
}

/// DELETE /api/key のリクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteKeyRequest {
    pub csrf: String,
}

/// DELETE /api/key のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteKeyResponse {
    pub ok: bool,
    /// KVにキーが存在して削除されたか
    pub deleted: bool,
}

/// 成否のみを返すレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

// ---------------------------------------------------------------------------
// CSRF
// ---------------------------------------------------------------------------

/// GET /api/csrf のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfResponse {
    /// `<issuedAtMs>.<signature>`
    pub token: String,
}

// ---------------------------------------------------------------------------
// ダウンロードトークン
// ---------------------------------------------------------------------------

/// POST /api/download-token のリクエスト。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTokenRequest {
    pub csrf: String,
    /// 動画生成APIが返したメディアハンドル（不透明な文字列）
    pub handle: String,
    /// 省略時はgatewayがランダムに生成する
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

/// POST /api/download-token のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTokenResponse {
    /// `<expiresAtMs>.<pageId>.<base64url(handle)>.<signature>`
    pub token: String,
    pub page_id: String,
    /// 絶対有効期限（UNIXミリ秒）
    pub expires_at_ms: u64,
}

/// GET /api/media のクエリ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaQuery {
    pub token: String,
}

/// POST /api/download-token/invalidate のリクエスト。
/// ページ離脱時にクライアントが送信する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateRequest {
    pub token: String,
    pub csrf: String,
}
