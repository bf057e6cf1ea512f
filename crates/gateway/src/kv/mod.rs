//! # 揮発性KVストア
//!
//! 外部KVサービスのRESTパイプラインAPIを抽象化する。
//! BYOK秘密鍵の保存と、ダウンロードトークンの失効マーカーの両方に使う。
//!
//! ## 実装
//! - `RestKvClient`: `POST <base>/pipeline` にBearer認証で送信する本番実装
//!
//! レスポンスはこの境界で `KvReply` に型付けし、上位のコードが生のJSONを扱うことはない。

pub mod rest;

pub use rest::RestKvClient;

use serde::Deserialize;

/// KV操作のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// TTLが0（ネットワーク呼び出し前に拒否）
    #[error("TTLは1秒以上である必要があります")]
    InvalidTtl,
    /// KVサービスが2xx以外を返した
    #[error("KV request failed: HTTP {status} - {body}")]
    RequestFailed { status: u16, body: String },
    /// 接続失敗・シリアライズ失敗
    #[error("KVへの送信に失敗: {0}")]
    Transport(String),
    /// パイプライン中の個別コマンドがエラーを返した
    #[error("KVコマンドがエラーを返しました: {0}")]
    Command(String),
    /// 結果の数や型がコマンドと一致しない
    #[error("KVレスポンスが不正です: {0}")]
    UnexpectedReply(String),
}

/// パイプラインで送信するコマンド。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCommand {
    /// `SETEX key ttl value`
    Setex {
        key: String,
        ttl_secs: u64,
        value: String,
    },
    /// `GET key`
    Get { key: String },
    /// `DEL key`
    Del { key: String },
}

impl KvCommand {
    /// TTL付きでSETEXコマンドを構築する。TTLが0なら `KvError::InvalidTtl`。
    pub fn setex(
        key: impl Into<String>,
        ttl_secs: u64,
        value: impl Into<String>,
    ) -> Result<Self, KvError> {
        let cmd = KvCommand::Setex {
            key: key.into(),
            ttl_secs,
            value: value.into(),
        };
        cmd.validate()?;
        Ok(cmd)
    }

    pub fn get(key: impl Into<String>) -> Self {
        KvCommand::Get { key: key.into() }
    }

    pub fn del(key: impl Into<String>) -> Self {
        KvCommand::Del { key: key.into() }
    }

    /// 送信前の検証。
    pub fn validate(&self) -> Result<(), KvError> {
        match self {
            KvCommand::Setex { ttl_secs: 0, .. } => Err(KvError::InvalidTtl),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            KvCommand::Setex { .. } => "SETEX",
            KvCommand::Get { .. } => "GET",
            KvCommand::Del { .. } => "DEL",
        }
    }

    /// ワイヤー表現 `["SETEX", key, ttl, value]` 等に変換する。
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            KvCommand::Setex {
                key,
                ttl_secs,
                value,
            } => serde_json::json!(["SETEX", key, ttl_secs.to_string(), value]),
            KvCommand::Get { key } => serde_json::json!(["GET", key]),
            KvCommand::Del { key } => serde_json::json!(["DEL", key]),
        }
    }
}

/// SETEXの結果（成功時 `"OK"`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetexResult;

/// GETの結果。`null` は「存在しない」であってエラーではない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    pub value: Option<String>,
}

impl GetResult {
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// DELの結果（削除されたキー数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelResult {
    pub count: u64,
}

/// コマンド種別ごとに型付けされたパイプライン結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvReply {
    Setex(SetexResult),
    Get(GetResult),
    Del(DelResult),
}

/// パイプラインの生レスポンス1件分。 `{"result": ...}` または `{"error": "..."}`
#[derive(Debug, Deserialize)]
pub(crate) struct RawReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// 生レスポンスをコマンド順に型付けする。
pub(crate) fn decode_replies(
    commands: &[KvCommand],
    raw: Vec<RawReply>,
) -> Result<Vec<KvReply>, KvError> {
    if commands.len() != raw.len() {
        return Err(KvError::UnexpectedReply(format!(
            "コマンド数 {} に対して結果が {} 件",
            commands.len(),
            raw.len()
        )));
    }

    commands
        .iter()
        .zip(raw)
        .map(|(cmd, reply)| {
            if let Some(error) = reply.error {
                return Err(KvError::Command(error));
            }
            let result = reply.result.unwrap_or(serde_json::Value::Null);
            decode_one(cmd, result)
        })
        .collect()
}

fn decode_one(cmd: &KvCommand, result: serde_json::Value) -> Result<KvReply, KvError> {
    use serde_json::Value;

    match (cmd, result) {
        (KvCommand::Setex { .. }, Value::String(s)) if s == "OK" => Ok(KvReply::Setex(SetexResult)),
        (KvCommand::Get { .. }, Value::Null) => Ok(KvReply::Get(GetResult { value: None })),
        (KvCommand::Get { .. }, Value::String(s)) => Ok(KvReply::Get(GetResult { value: Some(s) })),
        // 数値として保存された値もそのまま文字列で扱う
        (KvCommand::Get { .. }, Value::Number(n)) => Ok(KvReply::Get(GetResult {
            value: Some(n.to_string()),
        })),
        (KvCommand::Del { .. }, Value::Number(n)) => n
            .as_u64()
            .map(|count| KvReply::Del(DelResult { count }))
            .ok_or_else(|| KvError::UnexpectedReply(format!("DELの結果が不正: {n}"))),
        (cmd, other) => Err(KvError::UnexpectedReply(format!(
            "{}の結果が不正: {other}",
            cmd.name()
        ))),
    }
}

/// KVストアの抽象インターフェース。
///
/// 呼び出しごとに1回のラウンドトリップを行い、クライアント側でキャッシュはしない。
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// コマンド列を1回のパイプラインリクエストで実行し、コマンド順に結果を返す。
    async fn pipeline(&self, commands: Vec<KvCommand>) -> Result<Vec<KvReply>, KvError>;
}
