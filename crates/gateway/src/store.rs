//! # 名前空間付きTTLストア
//!
//! 1つのKVクライアントの上に、キー接頭辞で分離した名前空間を載せる。
//! - `ByokSecrets` (`key:<sid>`): ユーザーが持ち込んだAPIキー
//! - `BlockedTokens` (`dlblk:<signature>`): 失効済みダウンロードトークン
//!
//! 接頭辞が異なるため、2つの名前空間のキーが衝突することはない。

use std::marker::PhantomData;
use std::sync::Arc;

use crate::kv::{KvCommand, KvError, KvReply, KvStore};

/// 失効マーカーの値
const BLOCKED_SENTINEL: &str = "1";

/// キー接頭辞で区別される名前空間。
pub trait Namespace: Send + Sync + 'static {
    const PREFIX: &'static str;
}

/// BYOK秘密鍵の名前空間
pub struct ByokSecrets;

impl Namespace for ByokSecrets {
    const PREFIX: &'static str = "key:";
}

/// 失効済みトークンの名前空間
pub struct BlockedTokens;

impl Namespace for BlockedTokens {
    const PREFIX: &'static str = "dlblk:";
}

/// 名前空間 `N` に閉じたTTL付きKVストア。
pub struct TtlKeyValueStore<N: Namespace> {
    kv: Arc<dyn KvStore>,
    _namespace: PhantomData<fn() -> N>,
}

impl<N: Namespace> TtlKeyValueStore<N> {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            _namespace: PhantomData,
        }
    }

    fn key(id: &str) -> String {
        format!("{}{id}", N::PREFIX)
    }

    /// TTL付きで値を保存する。TTLが0ならネットワーク呼び出し前に失敗する。
    pub async fn set(&self, id: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let cmd = KvCommand::setex(Self::key(id), ttl_secs, value)?;
        match self.single(cmd).await? {
            KvReply::Setex(_) => Ok(()),
            other => Err(unexpected("SETEX", &other)),
        }
    }

    /// 値を取得する。存在しない場合は `None`。
    pub async fn get(&self, id: &str) -> Result<Option<String>, KvError> {
        match self.single(KvCommand::get(Self::key(id))).await? {
            KvReply::Get(result) => Ok(result.value),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// 値を削除する。削除されたキーがあればtrue。
    pub async fn del(&self, id: &str) -> Result<bool, KvError> {
        match self.single(KvCommand::del(Self::key(id))).await? {
            KvReply::Del(result) => Ok(result.count > 0),
            other => Err(unexpected("DEL", &other)),
        }
    }

    async fn single(&self, cmd: KvCommand) -> Result<KvReply, KvError> {
        self.kv
            .pipeline(vec![cmd])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KvError::UnexpectedReply("結果が空です".to_string()))
    }
}

fn unexpected(command: &str, reply: &KvReply) -> KvError {
    KvError::UnexpectedReply(format!("{command}に対して {reply:?}"))
}

impl TtlKeyValueStore<ByokSecrets> {
    pub async fn set_key(&self, sid: &str, api_key: &str, ttl_secs: u64) -> Result<(), KvError> {
        self.set(sid, api_key, ttl_secs).await
    }

    pub async fn get_key(&self, sid: &str) -> Result<Option<String>, KvError> {
        self.get(sid).await
    }

    pub async fn del_key(&self, sid: &str) -> Result<bool, KvError> {
        self.del(sid).await
    }
}

impl TtlKeyValueStore<BlockedTokens> {
    /// トークン署名を失効済みとして記録する。
    pub async fn set_token_blocked(&self, signature: &str, ttl_secs: u64) -> Result<(), KvError> {
        self.set(signature, BLOCKED_SENTINEL, ttl_secs).await
    }

    /// トークン署名が失効済みか。KV障害はエラーとして返す（呼び出し側で拒否すること）。
    pub async fn is_token_blocked(&self, signature: &str) -> Result<bool, KvError> {
        match self.single(KvCommand::get(Self::key(signature))).await? {
            KvReply::Get(result) => Ok(result.is_present()),
            other => Err(unexpected("GET", &other)),
        }
    }
}
