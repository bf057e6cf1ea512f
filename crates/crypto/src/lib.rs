//! # reelkey トークン暗号処理
//!
//! CSRFトークンとダウンロードトークンの発行・検証を実装する。
//! ネットワーク通信は一切行わない（失効台帳はgateway側が担う）。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | 署名 | HMAC-SHA256 |
//! | 署名比較 | 定数時間比較（subtle） |
//! | エンコード | Base64url（パディングなし） |
//!
//! ## ワイヤーフォーマット
//! - CSRF: `<issuedAtMs>.<base64url-hmac>`
//! - ダウンロード: `<expiresAtMs>.<pageId>.<base64url(handle)>.<base64url-hmac>`

pub mod clock;
pub mod csrf;
pub mod download;
pub mod token;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub use clock::{Clock, ManualClock, SystemClock};
pub use csrf::{CsrfProtocol, CSRF_TOKEN_TTL_MS};
pub use download::{
    is_valid_page_id, random_page_id, DownloadRejection, DownloadTokenProtocol, IssueDownloadToken,
    IssuedDownloadToken, VerifiedDownload,
};
pub use token::{parse_token, CsrfFields, DownloadFields, ParseError, ParsedToken};

type HmacSha256 = Hmac<Sha256>;

/// セッション秘密鍵の最小長（文字数）
pub const MIN_SECRET_LEN: usize = 8;

/// 暗号処理のエラー型。
///
/// 検証失敗はこの型では表現しない（boolまたは `DownloadRejection` で返す）。
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// 秘密鍵が未設定または短すぎる（致命的な設定不備）
    #[error("SESSION_SECRETは{MIN_SECRET_LEN}文字以上である必要があります")]
    WeakSecret,
    /// 必須入力が空
    #[error("{0}が空です")]
    EmptyInput(&'static str),
    /// TTLが0以下
    #[error("TTLは1秒以上である必要があります")]
    InvalidTtl,
    /// pageIdにトークン区切りと衝突する文字が含まれる
    #[error("pageIdには英数字・'-'・'_'のみ使用できます")]
    InvalidPageId,
    /// システム時刻の取得に失敗
    #[error("時刻取得失敗: {0}")]
    Clock(String),
}

/// HMAC鍵として使うセッション秘密鍵。
///
/// 構築時に長さを検証するため、保持している時点で弱い鍵ではないことが保証される。
#[derive(Clone)]
pub struct SessionSecret(Vec<u8>);

impl SessionSecret {
    /// 秘密鍵を検証して構築する。8文字未満は `CryptoError::WeakSecret`。
    pub fn new(secret: impl Into<String>) -> Result<Self, CryptoError> {
        let secret = secret.into();
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(CryptoError::WeakSecret);
        }
        Ok(Self(secret.into_bytes()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionSecret(***)")
    }
}

/// Base64エンジン（URL-safe、パディングなし）
pub fn b64url() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
}

/// HMAC-SHA256で署名し、Base64urlで返す。
pub fn hmac_sign(secret: &SessionSecret, message: &str) -> String {
    // HMACは任意長の鍵を受け付けるため new_from_slice は失敗しない
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256は任意長の鍵を受け付ける"),
    };
    mac.update(message.as_bytes());
    b64url().encode(mac.finalize().into_bytes())
}

/// 定数時間の文字列比較。長さが異なる場合は即座にfalse。
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
