//! # CSRFトークン
//!
//! セッションIDに束縛された短命のHMACトークン。状態を持たず、
//! 失効手段は有効期限とセッション束縛のみ。

use std::sync::Arc;

use crate::token::{parse_csrf, CsrfFields};
use crate::{constant_time_eq, hmac_sign, Clock, CryptoError, SessionSecret};

/// CSRFトークンの有効期間（15分）
pub const CSRF_TOKEN_TTL_MS: u64 = 15 * 60 * 1000;

/// 署名対象のバージョンラベル。ダウンロードトークンとは別ドメインにする。
const CSRF_VERSION: &str = "csrf-v1";

/// CSRFトークンの発行・検証。
pub struct CsrfProtocol {
    secret: SessionSecret,
    clock: Arc<dyn Clock>,
}

impl CsrfProtocol {
    pub fn new(secret: SessionSecret, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    /// セッションIDに束縛したトークンを発行する。
    pub fn issue(&self, sid: &str) -> Result<String, CryptoError> {
        if sid.is_empty() {
            return Err(CryptoError::EmptyInput("sid"));
        }
        let issued_at_ms = self.clock.now_ms()?;
        let fields = CsrfFields {
            issued_at_ms,
            signature: self.sign(sid, issued_at_ms),
        };
        Ok(fields.to_string())
    }

    /// トークンを検証する。
    ///
    /// 失敗理由（期限切れ・改ざん・形式不正・セッション不一致）は区別せず、すべてfalseを返す。
    pub fn verify(&self, sid: &str, token: &str) -> bool {
        if sid.is_empty() || token.is_empty() {
            return false;
        }
        let Ok(fields) = parse_csrf(token) else {
            return false;
        };
        let Ok(now) = self.clock.now_ms() else {
            return false;
        };
        if fields.issued_at_ms > now || now - fields.issued_at_ms > CSRF_TOKEN_TTL_MS {
            return false;
        }
        let expected = self.sign(sid, fields.issued_at_ms);
        constant_time_eq(&expected, &fields.signature)
    }

    fn sign(&self, sid: &str, issued_at_ms: u64) -> String {
        hmac_sign(&self.secret, &format!("{CSRF_VERSION}:{sid}:{issued_at_ms}"))
    }
}
