//! # 時刻ソース
//!
//! トークンの発行時刻・有効期限の計算に使う時計を抽象化する。
//! 本番は `SystemClock`、TTL境界のテストは `ManualClock` を使う。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::CryptoError;

/// UNIXエポックからのミリ秒を返す時計。
pub trait Clock: Send + Sync {
    /// 現在時刻（UNIXミリ秒）
    fn now_ms(&self) -> Result<u64, CryptoError>;
}

/// システム時刻を返す時計。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Result<u64, CryptoError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CryptoError::Clock(e.to_string()))?;
        Ok(elapsed.as_millis() as u64)
    }
}

/// 手動で進める時計。
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Result<u64, CryptoError> {
        Ok(self.now_ms.load(Ordering::SeqCst))
    }
}
