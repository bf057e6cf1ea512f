//! # REST パイプライン KV クライアント
//!
//! `POST <base>/pipeline` に `{"commands": [[...], ...]}` を送り、
//! `[{"result": ...}, ...]` をコマンド順に受け取る。

use serde::Serialize;

use super::{decode_replies, KvCommand, KvError, KvReply, KvStore, RawReply};

/// RESTパイプラインAPIを使うKVクライアント。状態を持たない。
pub struct RestKvClient {
    /// KVサービスのベースURL（末尾の `/` なし）
    base_url: String,
    /// Bearerトークン
    token: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct PipelineRequest {
    commands: Vec<serde_json::Value>,
}

impl RestKvClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, http_client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            token: token.into(),
            http_client,
        }
    }
}

#[async_trait::async_trait]
impl KvStore for RestKvClient {
    async fn pipeline(&self, commands: Vec<KvCommand>) -> Result<Vec<KvReply>, KvError> {
        // TTL違反はネットワーク呼び出し前に拒否する
        for cmd in &commands {
            cmd.validate()?;
        }
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let body = PipelineRequest {
            commands: commands.iter().map(KvCommand::to_wire).collect(),
        };

        let url = format!("{}/pipeline", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| KvError::Transport(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| KvError::Transport(format!("レスポンス読み取り失敗: {e}")))?;

        if !status.is_success() {
            return Err(KvError::RequestFailed {
                status: status.as_u16(),
                body: response_body,
            });
        }

        let raw: Vec<RawReply> = serde_json::from_str(&response_body)
            .map_err(|e| KvError::UnexpectedReply(format!("レスポンスのパースに失敗: {e}")))?;

        decode_replies(&commands, raw)
    }
}
