//! # reelkey Gateway
//!
//! BYOK動画ツールのトークン認可層。
//!
//! ## 役割
//! - ユーザーが持ち込んだAPIキーをセッション単位で揮発性KVに保持
//! - セッションに紐づくCSRFトークンの発行・検証
//! - 短命のダウンロードトークンの発行・引き換え・無効化
//!
//! ## API エンドポイント
//! - `POST /api/key`: BYOKキー登録（セッション確立）
//! - `DELETE /api/key`: BYOKキー削除
//! - `GET /api/csrf`: CSRFトークン発行
//! - `POST /api/download-token`: ダウンロードトークン発行
//! - `POST /api/download-token/invalidate`: ダウンロードトークン無効化
//! - `GET /api/media`: ダウンロードトークンの引き換え
//! - `GET /healthz`: 死活確認

mod config;
mod endpoints;
mod error;
mod kv;
mod media;
mod revocation;
mod session;
mod store;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use reelkey_crypto::SystemClock;

use config::{GatewayConfig, GatewayState};
use endpoints::{
    handle_csrf, handle_delete_key, handle_download_token, handle_invalidate, handle_media,
    handle_register_key,
};
use kv::{KvStore, RestKvClient};
use media::HttpMediaSource;

/// ルーターを構築する。
pub(crate) fn build_router(state: Arc<GatewayState>) -> axum::Router {
    axum::Router::new()
        .route(
            "/api/key",
            axum::routing::post(handle_register_key).delete(handle_delete_key),
        )
        .route("/api/csrf", axum::routing::get(handle_csrf))
        .route("/api/download-token", axum::routing::post(handle_download_token))
        .route(
            "/api/download-token/invalidate",
            axum::routing::post(handle_invalidate),
        )
        .route("/api/media", axum::routing::get(handle_media))
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        kv_url = %config.kv_url,
        media_api_url = %config.media_api_url,
        session_ttl_secs = config.session_ttl_secs,
        download_token_ttl_secs = config.download_token_ttl_secs,
        cookie_secure = config.cookie_secure,
        "設定を読み込みました"
    );
    if !config.cookie_secure {
        tracing::warn!("COOKIE_SECURE=false です。ローカル開発以外では使用しないでください");
    }

    let http_client = reqwest::Client::new();
    let kv: Arc<dyn KvStore> = Arc::new(RestKvClient::new(
        config.kv_url.clone(),
        config.kv_token.clone(),
        http_client.clone(),
    ));
    let media = Box::new(HttpMediaSource::new(
        config.media_api_url.clone(),
        http_client,
    ));
    let state = Arc::new(GatewayState::new(&config, kv, media, Arc::new(SystemClock)));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Gateway起動: {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
