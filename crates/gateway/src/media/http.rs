//! # HTTP メディア取得
//!
//! URL形式: `{base_url}/{percent-encoded handle}`、認証ヘッダー `x-api-key`

use axum::http::header::CONTENT_TYPE;

use super::{MediaPayload, MediaSource};
use crate::error::GatewayError;

/// APIキーを渡すヘッダー名
const API_KEY_HEADER: &str = "x-api-key";

/// 動画APIからHTTPでメディアを取得する。
pub struct HttpMediaSource {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpMediaSource {
    pub fn new(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }
}

#[async_trait::async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch(&self, api_key: &str, handle: &str) -> Result<MediaPayload, GatewayError> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(handle));
        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map_err(|e| GatewayError::MediaFetch(format!("HTTP送信失敗: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::MediaFetch(format!(
                "動画APIがエラーを返しました: HTTP {status}"
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::MediaFetch(format!("レスポンス読み取り失敗: {e}")))?;

        Ok(MediaPayload {
            content_type,
            bytes,
        })
    }
}
