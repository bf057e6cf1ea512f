//! # ダウンロードトークン
//!
//! セッションID・pageId・メディアハンドル・絶対有効期限をHMACで束縛するトークン。
//! 有効期限は発行時に絶対時刻として確定させ、トークン自体に埋め込む。
//! 検証側は元のTTLを知る必要がなく、現在時刻との比較だけで済む。
//!
//! 失効（ページ離脱時の無効化）は暗号的な検証とは別に、gatewayの失効台帳で判定する。

use std::sync::Arc;

use base64::Engine;
use rand::RngCore;

use crate::token::{parse_download, DownloadFields};
use crate::{b64url, constant_time_eq, hmac_sign, Clock, CryptoError, SessionSecret};

/// 署名対象のバージョンラベル
const DOWNLOAD_VERSION: &str = "dl-v1";

/// ランダムpageIdのバイト長（16進で32文字）
const PAGE_ID_BYTES: usize = 16;

/// ダウンロードトークンの発行パラメータ。
#[derive(Debug, Clone, Copy)]
pub struct IssueDownloadToken<'a> {
    pub sid: &'a str,
    pub page_id: &'a str,
    pub handle: &'a str,
    pub ttl_secs: u64,
}

/// 発行されたトークンとその絶対有効期限。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedDownloadToken {
    pub token: String,
    pub expires_at_ms: u64,
}

/// 検証に成功したトークンの内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDownload {
    /// デコード済みのメディアハンドル
    pub handle: String,
    pub page_id: String,
    pub expires_at_ms: u64,
    /// 失効台帳のキーになる署名セグメント
    pub signature: String,
}

impl VerifiedDownload {
    /// 残り有効期間（秒、切り上げ、最小1秒）。失効マーカーのTTLに使う。
    pub fn remaining_ttl_secs(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms).div_ceil(1000).max(1)
    }
}

/// 検証失敗の理由。
///
/// 形式不正・署名不一致・セッション不一致はすべて `Invalid` に畳み込む。
/// 期限切れだけは運用上有用なため区別する（HTTP層では同じ403に変換される）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DownloadRejection {
    #[error("ダウンロードトークンが不正です")]
    Invalid,
    #[error("ダウンロードトークンの有効期限が切れています")]
    Expired,
}

/// ダウンロードトークンの発行・検証。
pub struct DownloadTokenProtocol {
    secret: SessionSecret,
    clock: Arc<dyn Clock>,
}

impl DownloadTokenProtocol {
    pub fn new(secret: SessionSecret, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    /// トークンを発行する。
    ///
    /// `sid`・`page_id`・`handle` はいずれも空であってはならず、`ttl_secs` は1以上。
    pub fn issue(&self, req: IssueDownloadToken<'_>) -> Result<IssuedDownloadToken, CryptoError> {
        if req.sid.is_empty() {
            return Err(CryptoError::EmptyInput("sid"));
        }
        if req.page_id.is_empty() {
            return Err(CryptoError::EmptyInput("pageId"));
        }
        if req.handle.is_empty() {
            return Err(CryptoError::EmptyInput("handle"));
        }
        if !is_valid_page_id(req.page_id) {
            return Err(CryptoError::InvalidPageId);
        }
        if req.ttl_secs == 0 {
            return Err(CryptoError::InvalidTtl);
        }

        let now = self.clock.now_ms()?;
        let expires_at_ms = req
            .ttl_secs
            .checked_mul(1000)
            .and_then(|ttl_ms| now.checked_add(ttl_ms))
            .ok_or(CryptoError::InvalidTtl)?;

        let handle_b64 = b64url().encode(req.handle.as_bytes());
        let signature = self.sign(req.sid, req.page_id, &handle_b64, expires_at_ms);
        let fields = DownloadFields {
            expires_at_ms,
            page_id: req.page_id.to_string(),
            handle_b64,
            signature,
        };

        Ok(IssuedDownloadToken {
            token: fields.to_string(),
            expires_at_ms,
        })
    }

    /// トークンを検証する。失効台帳は参照しない。
    pub fn verify(&self, sid: &str, token: &str) -> Result<VerifiedDownload, DownloadRejection> {
        if sid.is_empty() || token.is_empty() {
            return Err(DownloadRejection::Invalid);
        }
        let fields = parse_download(token).map_err(|_| DownloadRejection::Invalid)?;

        let expected = self.sign(sid, &fields.page_id, &fields.handle_b64, fields.expires_at_ms);
        if !constant_time_eq(&expected, &fields.signature) {
            return Err(DownloadRejection::Invalid);
        }

        let now = self.clock.now_ms().map_err(|_| DownloadRejection::Invalid)?;
        if now > fields.expires_at_ms {
            return Err(DownloadRejection::Expired);
        }

        let handle_bytes = b64url()
            .decode(&fields.handle_b64)
            .map_err(|_| DownloadRejection::Invalid)?;
        let handle = String::from_utf8(handle_bytes).map_err(|_| DownloadRejection::Invalid)?;

        Ok(VerifiedDownload {
            handle,
            page_id: fields.page_id,
            expires_at_ms: fields.expires_at_ms,
            signature: fields.signature,
        })
    }

    /// 現在時刻（UNIXミリ秒）。失効TTLの計算に使う。
    pub fn now_ms(&self) -> Result<u64, CryptoError> {
        self.clock.now_ms()
    }

    fn sign(&self, sid: &str, page_id: &str, handle_b64: &str, expires_at_ms: u64) -> String {
        hmac_sign(
            &self.secret,
            &format!("{DOWNLOAD_VERSION}:{sid}:{page_id}:{handle_b64}:{expires_at_ms}"),
        )
    }
}

/// pageIdとして使える文字列か（英数字・'-'・'_'のみ）
pub fn is_valid_page_id(page_id: &str) -> bool {
    !page_id.is_empty()
        && page_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// ランダムなpageIdを生成する（16バイトの16進表現）。
pub fn random_page_id() -> String {
    let mut bytes = [0u8; PAGE_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    const T0: u64 = 1_700_000_000_000;

    fn protocol() -> (DownloadTokenProtocol, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let secret = SessionSecret::new("download-secret").unwrap();
        (DownloadTokenProtocol::new(secret, clock.clone()), clock)
    }

    fn issue(p: &DownloadTokenProtocol, sid: &str, handle: &str, ttl_secs: u64) -> String {
        p.issue(IssueDownloadToken {
            sid,
            page_id: "0123abcd",
            handle,
            ttl_secs,
        })
        .unwrap()
        .token
    }

    /// sid="s-dl-1", handle="file-xyz", ttl=120 のシナリオ
    #[test]
    fn test_download_scenario_valid_then_tampered() {
        let (p, _) = protocol();
        let token = issue(&p, "s-dl-1", "file-xyz", 120);

        let verified = p.verify("s-dl-1", &token).unwrap();
        assert_eq!(verified.handle, "file-xyz");
        assert_eq!(verified.page_id, "0123abcd");
        assert_eq!(verified.expires_at_ms, T0 + 120_000);

        // 末尾1文字を改ざん
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert_eq!(p.verify("s-dl-1", &tampered), Err(DownloadRejection::Invalid));
    }

    #[test]
    fn test_download_ttl_boundary() {
        let (p, clock) = protocol();
        let token = issue(&p, "sid", "file", 120);

        clock.set(T0 + 119_000);
        assert!(p.verify("sid", &token).is_ok());

        // ちょうど期限: 有効（now <= expiresAt）
        clock.set(T0 + 120_000);
        assert!(p.verify("sid", &token).is_ok());

        clock.set(T0 + 121_000);
        assert_eq!(p.verify("sid", &token), Err(DownloadRejection::Expired));
    }

    #[test]
    fn test_download_short_ttl_expires() {
        let (p, clock) = protocol();
        let token = issue(&p, "sid", "file", 1);
        clock.advance(5_000);
        assert_eq!(p.verify("sid", &token), Err(DownloadRejection::Expired));
    }

    #[test]
    fn test_download_session_binding() {
        let (p, _) = protocol();
        let token = issue(&p, "sid-one", "file", 60);
        assert_eq!(p.verify("sid-two", &token), Err(DownloadRejection::Invalid));
    }

    /// 有効期限を延長する改ざんは Invalid
    #[test]
    fn test_download_extended_expiry_is_invalid() {
        let (p, clock) = protocol();
        let token = issue(&p, "sid", "file", 1);
        clock.advance(5_000);
        let forged = token.replacen(&(T0 + 1_000).to_string(), &(T0 + 999_000).to_string(), 1);
        assert_eq!(p.verify("sid", &forged), Err(DownloadRejection::Invalid));
    }

    /// 期限切れかつ署名不正は Invalid（署名検証が先）
    #[test]
    fn test_download_expired_and_forged_is_invalid() {
        let (p, clock) = protocol();
        let token = issue(&p, "sid", "file", 1);
        clock.advance(5_000);
        assert_eq!(p.verify("other-sid", &token), Err(DownloadRejection::Invalid));
    }

    #[test]
    fn test_download_signature_tamper_every_position() {
        let (p, _) = protocol();
        let token = issue(&p, "sid", "file", 60);
        let (prefix, sig) = token.rsplit_once('.').unwrap();
        for i in 0..sig.len() {
            let mut bytes = sig.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'z' { b'y' } else { b'z' };
            let tampered = format!("{prefix}.{}", String::from_utf8(bytes).unwrap());
            assert_eq!(p.verify("sid", &tampered), Err(DownloadRejection::Invalid), "position {i}");
        }
    }

    #[test]
    fn test_download_handle_with_arbitrary_characters() {
        let (p, _) = protocol();
        let handle = "files/abc.def?x=1&y=動画";
        let token = issue(&p, "sid", handle, 60);
        assert_eq!(token.split('.').count(), 4);
        assert_eq!(p.verify("sid", &token).unwrap().handle, handle);
    }

    #[test]
    fn test_download_malformed_is_invalid() {
        let (p, _) = protocol();
        for bad in ["", "x", "1.2", "abc.p.h.s", "1.p.h", "1.p.h.s.e"] {
            assert_eq!(p.verify("sid", bad), Err(DownloadRejection::Invalid), "{bad}");
        }
    }

    #[test]
    fn test_download_issue_rejects_bad_input() {
        let (p, _) = protocol();
        let base = IssueDownloadToken {
            sid: "sid",
            page_id: "page",
            handle: "file",
            ttl_secs: 60,
        };
        assert!(matches!(
            p.issue(IssueDownloadToken { sid: "", ..base }),
            Err(CryptoError::EmptyInput("sid"))
        ));
        assert!(matches!(
            p.issue(IssueDownloadToken { page_id: "", ..base }),
            Err(CryptoError::EmptyInput("pageId"))
        ));
        assert!(matches!(
            p.issue(IssueDownloadToken { handle: "", ..base }),
            Err(CryptoError::EmptyInput("handle"))
        ));
        assert!(matches!(
            p.issue(IssueDownloadToken { ttl_secs: 0, ..base }),
            Err(CryptoError::InvalidTtl)
        ));
        assert!(matches!(
            p.issue(IssueDownloadToken { ttl_secs: u64::MAX, ..base }),
            Err(CryptoError::InvalidTtl)
        ));
        assert!(matches!(
            p.issue(IssueDownloadToken { page_id: "a.b", ..base }),
            Err(CryptoError::InvalidPageId)
        ));
    }

    #[test]
    fn test_reissue_yields_distinct_signature() {
        let (p, clock) = protocol();
        let first = p.verify("sid", &issue(&p, "sid", "file", 60)).unwrap();
        clock.advance(1);
        let second = p.verify("sid", &issue(&p, "sid", "file", 60)).unwrap();
        assert_ne!(first.signature, second.signature);
    }

    #[test]
    fn test_remaining_ttl_rounds_up() {
        let verified = VerifiedDownload {
            handle: "h".to_string(),
            page_id: "p".to_string(),
            expires_at_ms: 10_000,
            signature: "s".to_string(),
        };
        assert_eq!(verified.remaining_ttl_secs(0), 10);
        assert_eq!(verified.remaining_ttl_secs(8_999), 2);
        assert_eq!(verified.remaining_ttl_secs(9_500), 1);
        assert_eq!(verified.remaining_ttl_secs(10_000), 1);
    }

    #[test]
    fn test_random_page_id() {
        let a = random_page_id();
        assert_eq!(a.len(), 32);
        assert!(is_valid_page_id(&a));
        assert_ne!(a, random_page_id());
    }
}
