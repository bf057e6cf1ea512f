//! # メディア取得
//!
//! 生成済み動画を外部の動画APIから取得する処理を抽象化する。
//! 動画生成リクエストの組み立てやリトライは対象外で、完成したファイルの取得のみを扱う。
//!
//! ## 実装
//! - `HttpMediaSource`: `GET <base>/<handle>` にユーザーのAPIキーを付けて取得する

pub mod http;

pub use http::HttpMediaSource;

use axum::body::Bytes;

use crate::error::GatewayError;

/// 取得したメディア。
pub struct MediaPayload {
    /// 上流が返した Content-Type（なければ `None`）
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// メディア取得の抽象インターフェース。
#[async_trait::async_trait]
pub trait MediaSource: Send + Sync {
    /// ユーザーのAPIキーでハンドルに対応するメディアを取得する。
    async fn fetch(&self, api_key: &str, handle: &str) -> Result<MediaPayload, GatewayError>;
}
