//! # トークンのワイヤーフォーマット
//!
//! ドット区切りトークンのパースとシリアライズ。
//! 構造上の不正（セグメント数・数値でないタイムスタンプ・空セグメント）は
//! すべてここで `ParseError` に畳み込まれ、呼び出し側では「不正」として扱われる。

use std::fmt;

/// CSRFトークンのフィールド。`<issuedAtMs>.<signature>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfFields {
    pub issued_at_ms: u64,
    pub signature: String,
}

/// ダウンロードトークンのフィールド。`<expiresAtMs>.<pageId>.<handleB64>.<signature>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFields {
    pub expires_at_ms: u64,
    pub page_id: String,
    /// Base64urlエンコード済みのメディアハンドル
    pub handle_b64: String,
    pub signature: String,
}

/// パース結果。セグメント数で種別を判定する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedToken {
    Csrf(CsrfFields),
    Download(DownloadFields),
}

/// トークンのパースエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// 空文字列
    #[error("トークンが空です")]
    Empty,
    /// セグメント数が2でも4でもない
    #[error("セグメント数が不正です: {0}")]
    SegmentCount(usize),
    /// タイムスタンプが10進数でない、またはu64に収まらない
    #[error("タイムスタンプが不正です")]
    Timestamp,
    /// 空のセグメントがある
    #[error("空のセグメント: {0}")]
    EmptySegment(&'static str),
    /// 期待した種別と異なる
    #[error("トークン種別が一致しません")]
    KindMismatch,
}

/// トークン文字列をパースする。
pub fn parse_token(token: &str) -> Result<ParsedToken, ParseError> {
    if token.is_empty() {
        return Err(ParseError::Empty);
    }

    let parts: Vec<&str> = token.split('.').collect();
    match parts.as_slice() {
        [issued_at, signature] => Ok(ParsedToken::Csrf(CsrfFields {
            issued_at_ms: parse_millis(issued_at)?,
            signature: non_empty(signature, "signature")?,
        })),
        [expires_at, page_id, handle_b64, signature] => Ok(ParsedToken::Download(DownloadFields {
            expires_at_ms: parse_millis(expires_at)?,
            page_id: non_empty(page_id, "pageId")?,
            handle_b64: non_empty(handle_b64, "handle")?,
            signature: non_empty(signature, "signature")?,
        })),
        other => Err(ParseError::SegmentCount(other.len())),
    }
}

/// CSRFトークンとしてパースする。
pub fn parse_csrf(token: &str) -> Result<CsrfFields, ParseError> {
    match parse_token(token)? {
        ParsedToken::Csrf(fields) => Ok(fields),
        ParsedToken::Download(_) => Err(ParseError::KindMismatch),
    }
}

/// ダウンロードトークンとしてパースする。
pub fn parse_download(token: &str) -> Result<DownloadFields, ParseError> {
    match parse_token(token)? {
        ParsedToken::Download(fields) => Ok(fields),
        ParsedToken::Csrf(_) => Err(ParseError::KindMismatch),
    }
}

/// `u64::from_str` は先頭の `+` を受け付けるため、数字のみであることを先に確認する。
fn parse_millis(segment: &str) -> Result<u64, ParseError> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::Timestamp);
    }
    segment.parse().map_err(|_| ParseError::Timestamp)
}

fn non_empty(segment: &str, name: &'static str) -> Result<String, ParseError> {
    if segment.is_empty() {
        return Err(ParseError::EmptySegment(name));
    }
    Ok(segment.to_string())
}

impl fmt::Display for CsrfFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.issued_at_ms, self.signature)
    }
}

impl fmt::Display for DownloadFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.expires_at_ms, self.page_id, self.handle_b64, self.signature
        )
    }
}
