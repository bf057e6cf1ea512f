//! # セッションID（Cookie）
//!
//! 不透明なランダム文字列 `sid` をHttpOnly Cookieで受け渡す。
//! `sid` 自体は署名されておらず、全トークン署名の入力として使われる。

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use base64::Engine;
use rand::RngCore;

use crate::error::GatewayError;

/// セッションCookie名
pub const SID_COOKIE: &str = "sid";

/// セッションIDのバイト長（Base64urlで43文字）
const SID_BYTES: usize = 32;

/// Cookieの SameSite 属性。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Set-Cookie の属性。
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Max-Age（秒）
    pub ttl_secs: u64,
    pub path: String,
    pub domain: Option<String>,
    pub same_site: SameSite,
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            path: "/".to_string(),
            domain: None,
            same_site: SameSite::Lax,
            secure: true,
        }
    }
}

/// 新しいセッションIDを生成する。
pub fn new_sid() -> String {
    let mut bytes = [0u8; SID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    reelkey_crypto::b64url().encode(bytes)
}

/// Cookieヘッダーから `sid` を取り出す。
///
/// 値はパーセントデコードするが、デコードに失敗した場合は生の値をそのまま返す。
pub fn get_sid(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookie| cookie.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == SID_COOKIE)
        .map(|(_, value)| decode_cookie_value(value.trim()))
        .filter(|sid| !sid.is_empty())
}

fn decode_cookie_value(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// `sid` を設定する Set-Cookie を追加する。
pub fn set_sid(headers: &mut HeaderMap, sid: &str, opts: &CookieOptions) -> Result<(), GatewayError> {
    append_cookie(headers, &build_cookie(sid, opts.ttl_secs, opts))
}

/// `sid` を削除する Set-Cookie（空値・Max-Age=0）を追加する。
pub fn clear_sid(headers: &mut HeaderMap, opts: &CookieOptions) -> Result<(), GatewayError> {
    append_cookie(headers, &build_cookie("", 0, opts))
}

fn build_cookie(sid: &str, max_age: u64, opts: &CookieOptions) -> String {
    let mut cookie = format!("{SID_COOKIE}={}; Path={}", urlencoding::encode(sid), opts.path);
    if let Some(domain) = &opts.domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    cookie.push_str("; HttpOnly");
    if opts.secure {
        cookie.push_str("; Secure");
    }
    cookie.push_str(&format!(
        "; SameSite={}; Max-Age={max_age}",
        opts.same_site.as_str()
    ));
    cookie
}

fn append_cookie(headers: &mut HeaderMap, cookie: &str) -> Result<(), GatewayError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| GatewayError::Internal(format!("Set-Cookieの構築に失敗: {e}")))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}
