//! # 失効台帳
//!
//! ダウンロードトークンの署名を、トークン本来の残り有効期間だけKVに記録する。
//! ページ離脱時の「無効化」を実現し、記録は自然失効で消える（明示的な削除はしない）。
//!
//! ## トークンの状態
//! - Issued → (検証成功・未失効) → Redeemable
//! - Redeemable → (invalidate) → Blocked
//! - Issued/Redeemable → (expiresAtMs 経過) → Expired
//!
//! 引き換えは Redeemable からのみ許可する。キーは署名なので、同じハンドルに対して
//! 後から発行したトークンには影響しない。

use std::sync::Arc;

use reelkey_crypto::{DownloadRejection, DownloadTokenProtocol, VerifiedDownload};

use crate::error::GatewayError;
use crate::kv::{KvError, KvStore};
use crate::store::{BlockedTokens, TtlKeyValueStore};

/// invalidate の結果。どちらも呼び出し側には成功として返す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateOutcome {
    /// 失効マーカーを記録した
    Revoked { ttl_secs: u64 },
    /// 既に不正または期限切れのため何もしなかった
    AlreadyInvalid,
}

/// 失効台帳。
pub struct RevocationLedger {
    blocked: TtlKeyValueStore<BlockedTokens>,
    download: Arc<DownloadTokenProtocol>,
}

impl RevocationLedger {
    pub fn new(kv: Arc<dyn KvStore>, download: Arc<DownloadTokenProtocol>) -> Self {
        Self {
            blocked: TtlKeyValueStore::new(kv),
            download,
        }
    }

    /// トークンを無効化する。
    ///
    /// 検証に失敗するトークンは何もせず成功を返す（有効性を応答の差で漏らさない）。
    /// KVへの書き込み失敗だけはインフラ障害としてエラーを返す。
    pub async fn invalidate(&self, sid: &str, token: &str) -> Result<InvalidateOutcome, GatewayError> {
        let verified = match self.download.verify(sid, token) {
            Ok(verified) => verified,
            Err(_) => return Ok(InvalidateOutcome::AlreadyInvalid),
        };

        let now = self.download.now_ms()?;
        let ttl_secs = verified.remaining_ttl_secs(now);
        self.blocked
            .set_token_blocked(&verified.signature, ttl_secs)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "失効マーカーの記録に失敗"))?;

        tracing::info!(page_id = %verified.page_id, ttl_secs, "ダウンロードトークンを失効");
        Ok(InvalidateOutcome::Revoked { ttl_secs })
    }

    /// 署名が失効済みか。
    pub async fn is_revoked(&self, signature: &str) -> Result<bool, KvError> {
        self.blocked.is_token_blocked(signature).await
    }

    /// 引き換え可否を判定する。
    ///
    /// 署名・期限の検証に通り、かつ失効台帳に載っていない場合のみ成功する。
    /// 台帳の参照に失敗した場合は許可せずエラーを返す（fail-closed）。
    pub async fn authorize_redemption(
        &self,
        sid: &str,
        token: &str,
    ) -> Result<VerifiedDownload, GatewayError> {
        let verified = self.download.verify(sid, token).map_err(|reason| {
            match reason {
                DownloadRejection::Expired => tracing::warn!("期限切れのダウンロードトークン"),
                DownloadRejection::Invalid => tracing::warn!("不正なダウンロードトークン"),
            }
            GatewayError::Forbidden
        })?;

        match self.is_revoked(&verified.signature).await {
            Ok(false) => Ok(verified),
            Ok(true) => {
                tracing::warn!(page_id = %verified.page_id, "失効済みのダウンロードトークン");
                Err(GatewayError::Forbidden)
            }
            Err(e) => {
                tracing::error!(error = %e, "失効台帳の参照に失敗。引き換えを拒否します");
                Err(GatewayError::Kv(e))
            }
        }
    }
}
