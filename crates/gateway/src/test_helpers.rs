//! # テスト用共通ヘルパー
//!
//! KVサービス・動画API・Gateway本体をローカルポートで起動するモックサーバー群。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reelkey_crypto::{ManualClock, SessionSecret};
use serde_json::{json, Value};

use crate::config::{GatewayConfig, GatewayState};
use crate::kv::{KvStore, RestKvClient};
use crate::media::HttpMediaSource;

/// モックKVが受け付けるBearerトークン
pub const MOCK_KV_TOKEN: &str = "mock-kv-token";
/// モック動画APIが受け付けるAPIキー
pub const MOCK_API_KEY: &str = "byok-api-key";
/// テスト用のHMAC鍵
pub const TEST_SECRET: &str = "gateway-test-secret";
/// テスト開始時刻
pub const T0: u64 = 1_700_000_000_000;

struct Entry {
    value: String,
    ttl_secs: u64,
    expires_at: Instant,
}

/// インメモリのKVサービス。障害モードを切り替えられる。
#[derive(Default)]
pub struct MockKv {
    entries: Mutex<HashMap<String, Entry>>,
    requests: Mutex<Vec<Value>>,
    last_authorization: Mutex<Option<String>>,
    outage: AtomicBool,
}

impl MockKv {
    /// 処理したパイプラインリクエストのボディ（障害中・認証失敗は含まない）
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }

    /// trueの間、全リクエストに503を返す
    pub fn set_outage(&self, outage: bool) {
        self.outage.store(outage, Ordering::SeqCst);
    }

    pub fn raw_get(&self, key: &str) -> Option<String> {
        self.live_entry(key, |e| e.value.clone())
    }

    /// SETEXで指定されたTTL
    pub fn raw_ttl(&self, key: &str) -> Option<u64> {
        self.live_entry(key, |e| e.ttl_secs)
    }

    fn live_entry<T>(&self, key: &str, f: impl Fn(&Entry) -> T) -> Option<T> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(f)
    }

    fn execute(&self, command: &[Value]) -> Value {
        let args: Vec<&str> = command.iter().filter_map(Value::as_str).collect();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, e| e.expires_at > Instant::now());

        match args.as_slice() {
            ["SETEX", key, ttl, value] => match ttl.parse::<u64>() {
                Ok(ttl_secs) if ttl_secs > 0 => {
                    entries.insert(
                        key.to_string(),
                        Entry {
                            value: value.to_string(),
                            ttl_secs,
                            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
                        },
                    );
                    json!({"result": "OK"})
                }
                _ => json!({"error": "ERR invalid expire time in 'setex' command"}),
            },
            ["GET", key] => json!({"result": entries.get(*key).map(|e| e.value.clone())}),
            ["DEL", key] => json!({"result": u64::from(entries.remove(*key).is_some())}),
            _ => json!({"error": "ERR unknown command"}),
        }
    }
}

async fn handle_pipeline(
    State(mock): State<Arc<MockKv>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *mock.last_authorization.lock().unwrap() = authorization.clone();

    if mock.outage.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "service unavailable").into_response();
    }
    if authorization.as_deref() != Some(format!("Bearer {MOCK_KV_TOKEN}").as_str()) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    mock.requests.lock().unwrap().push(body.clone());
    let replies: Vec<Value> = body["commands"]
        .as_array()
        .map(|commands| {
            commands
                .iter()
                .map(|cmd| mock.execute(cmd.as_array().map(Vec::as_slice).unwrap_or(&[])))
                .collect()
        })
        .unwrap_or_default();
    Json(replies).into_response()
}

async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}

/// モックKVサービスを起動し、ベースURLとハンドルを返す。
pub async fn start_mock_kv() -> (String, Arc<MockKv>) {
    let mock = Arc::new(MockKv::default());
    let app = axum::Router::new()
        .route("/pipeline", axum::routing::post(handle_pipeline))
        .with_state(mock.clone());
    (serve(app).await, mock)
}

/// モック動画APIを起動する。
///
/// `x-api-key` が `MOCK_API_KEY` なら `video:<handle>` を返す。
/// ハンドル `no-type` は Content-Type なしで返す。
pub async fn start_mock_media() -> String {
    async fn handle_file(Path(handle): Path<String>, headers: HeaderMap) -> Response {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(MOCK_API_KEY) {
            return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
        }
        let body = format!("video:{handle}");
        if handle == "no-type" {
            return Response::new(axum::body::Body::from(body));
        }
        ([(CONTENT_TYPE, "video/mp4")], body).into_response()
    }

    let app = axum::Router::new().route("/{handle}", axum::routing::get(handle_file));
    serve(app).await
}

/// 起動済みのテスト用Gateway。
pub struct TestGateway {
    pub base_url: String,
    pub kv: Arc<MockKv>,
    pub clock: Arc<ManualClock>,
    pub state: Arc<GatewayState>,
    pub client: reqwest::Client,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

pub fn test_config(kv_url: &str, media_api_url: &str) -> GatewayConfig {
    GatewayConfig {
        session_secret: SessionSecret::new(TEST_SECRET).unwrap(),
        kv_url: kv_url.to_string(),
        kv_token: MOCK_KV_TOKEN.to_string(),
        media_api_url: media_api_url.to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        session_ttl_secs: 3600,
        download_token_ttl_secs: 120,
        cookie_secure: false,
        cookie_domain: None,
    }
}

/// モックKV・モック動画APIに接続したGatewayを起動する。
pub async fn start_gateway() -> TestGateway {
    let (kv_url, kv) = start_mock_kv().await;
    let media_url = start_mock_media().await;
    let config = test_config(&kv_url, &media_url);

    let http_client = reqwest::Client::new();
    let kv_client: Arc<dyn KvStore> = Arc::new(RestKvClient::new(
        config.kv_url.clone(),
        config.kv_token.clone(),
        http_client.clone(),
    ));
    let media = Box::new(HttpMediaSource::new(config.media_api_url.clone(), http_client));
    let clock = Arc::new(ManualClock::new(T0));
    let state = Arc::new(GatewayState::new(&config, kv_client, media, clock.clone()));

    let base_url = serve(crate::build_router(state.clone())).await;
    TestGateway {
        base_url,
        kv,
        clock,
        state,
        client: reqwest::Client::new(),
    }
}

/// `sid=<sid>` のCookieヘッダー値
pub fn sid_cookie(sid: &str) -> String {
    format!("sid={sid}")
}

/// Set-Cookie から `sid` の値を取り出す
pub fn sid_from_set_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| cookie.split(';').next()?.strip_prefix("sid=").map(str::to_string))
}
