//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に1回だけ読み込んで検証し、以後は読み取り専用で各コンポーネントに渡す。

use std::sync::Arc;

use reelkey_crypto::{Clock, CsrfProtocol, DownloadTokenProtocol, SessionSecret};

use crate::kv::KvStore;
use crate::media::MediaSource;
use crate::revocation::RevocationLedger;
use crate::session::CookieOptions;
use crate::store::{ByokSecrets, TtlKeyValueStore};

/// 設定エラー。いずれも致命的で、起動を中止する。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("{0}が設定されていません")]
    Missing(&'static str),
    /// 値の形式が不正
    #[error("{var}の値が不正です: {reason}")]
    Invalid { var: &'static str, reason: String },
    /// SESSION_SECRETが短すぎる
    #[error("SESSION_SECRETは8文字以上である必要があります")]
    WeakSecret,
}

/// 環境変数から読み込んだGateway設定。
pub struct GatewayConfig {
    /// HMAC鍵（SESSION_SECRET）
    pub session_secret: SessionSecret,
    /// KVサービスのベースURL（KV_URL）
    pub kv_url: String,
    /// KVサービスのBearerトークン（KV_TOKEN）
    pub kv_token: String,
    /// 動画APIのファイル取得エンドポイント（MEDIA_API_URL）
    pub media_api_url: String,
    /// 待ち受けアドレス（BIND_ADDR）
    pub bind_addr: String,
    /// セッションCookieとBYOKキーのTTL（SESSION_TTL_SECS）
    pub session_ttl_secs: u64,
    /// ダウンロードトークンのTTL（DOWNLOAD_TOKEN_TTL_SECS）
    pub download_token_ttl_secs: u64,
    /// CookieにSecure属性を付けるか（COOKIE_SECURE）
    pub cookie_secure: bool,
    /// CookieのDomain属性（COOKIE_DOMAIN）
    pub cookie_domain: Option<String>,
}

impl GatewayConfig {
    /// プロセス環境変数から構築する。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から構築する。空文字列は未設定とみなす。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let session_secret = get("SESSION_SECRET")
            .ok_or(ConfigError::Missing("SESSION_SECRET"))
            .and_then(|s| SessionSecret::new(s).map_err(|_| ConfigError::WeakSecret))?;
        let kv_url = get("KV_URL")
            .ok_or(ConfigError::Missing("KV_URL"))?
            .trim_end_matches('/')
            .to_string();
        let kv_token = get("KV_TOKEN").ok_or(ConfigError::Missing("KV_TOKEN"))?;

        let media_api_url = get("MEDIA_API_URL").unwrap_or_else(|| "http://localhost:8080".to_string());
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let session_ttl_secs = parse_positive("SESSION_TTL_SECS", get("SESSION_TTL_SECS"), 3600)?;
        let download_token_ttl_secs = parse_positive(
            "DOWNLOAD_TOKEN_TTL_SECS",
            get("DOWNLOAD_TOKEN_TTL_SECS"),
            120,
        )?;
        let cookie_secure = parse_bool("COOKIE_SECURE", get("COOKIE_SECURE"), true)?;
        let cookie_domain = get("COOKIE_DOMAIN");

        Ok(Self {
            session_secret,
            kv_url,
            kv_token,
            media_api_url,
            bind_addr,
            session_ttl_secs,
            download_token_ttl_secs,
            cookie_secure,
            cookie_domain,
        })
    }

    /// セッションCookieの属性。
    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            ttl_secs: self.session_ttl_secs,
            domain: self.cookie_domain.clone(),
            secure: self.cookie_secure,
            ..CookieOptions::default()
        }
    }
}

fn parse_positive(var: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("1以上の整数である必要があります: {value}"),
        }),
    }
}

fn parse_bool(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            reason: format!("true/falseである必要があります: {value}"),
        }),
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    pub csrf: CsrfProtocol,
    pub download: Arc<DownloadTokenProtocol>,
    /// BYOKキー（`key:<sid>`）
    pub secrets: TtlKeyValueStore<ByokSecrets>,
    /// 失効台帳（`dlblk:<signature>`）
    pub ledger: RevocationLedger,
    /// 動画APIからのメディア取得（トレイトで抽象化）
    pub media: Box<dyn MediaSource>,
    pub cookie: CookieOptions,
    pub session_ttl_secs: u64,
    pub download_token_ttl_secs: u64,
}

impl GatewayState {
    pub fn new(
        config: &GatewayConfig,
        kv: Arc<dyn KvStore>,
        media: Box<dyn MediaSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let download = Arc::new(DownloadTokenProtocol::new(
            config.session_secret.clone(),
            clock.clone(),
        ));
        Self {
            csrf: CsrfProtocol::new(config.session_secret.clone(), clock),
            download: download.clone(),
            secrets: TtlKeyValueStore::new(kv.clone()),
            ledger: RevocationLedger::new(kv, download),
            media,
            cookie: config.cookie_options(),
            session_ttl_secs: config.session_ttl_secs,
            download_token_ttl_secs: config.download_token_ttl_secs,
        }
    }
}
