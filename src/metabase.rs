//! Binding to the Metabase REST API: session login and single-value card
//! queries.

use crate::errors::FetchError;
use crate::models::CardId;
use crate::resolver::MetricFetcher;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

const SESSION_HEADER: &str = "X-Metabase-Session";

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
}

#[derive(Clone)]
pub struct MetabaseConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub session_ttl: Duration,
    /// After a failed login chain, further logins are refused for this long so
    /// one outage does not cost every pending fetch its own retry chain.
    pub login_cooldown: Duration,
    pub login_retry: RetryPolicy,
    pub query_retry: RetryPolicy,
}

impl MetabaseConfig {
    pub fn new(base_url: String, username: String, password: String) -> Self {
        Self {
            base_url,
            username,
            password,
            timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(30 * 60),
            login_cooldown: Duration::from_secs(30),
            login_retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_secs(2),
            },
            query_retry: RetryPolicy {
                max_attempts: 2,
                backoff: Duration::from_secs(1),
            },
        }
    }

    /// Builds the shared HTTP client with the configured request timeout.
    pub fn http_client(&self) -> reqwest::Result<Client> {
        Client::builder().timeout(self.timeout).build()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl fmt::Debug for MetabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetabaseConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("session_ttl", &self.session_ttl)
            .field("login_cooldown", &self.login_cooldown)
            .field("login_retry", &self.login_retry)
            .field("query_retry", &self.query_retry)
            .finish()
    }
}

#[derive(Debug)]
struct Session {
    id: String,
    obtained_at: Instant,
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    failed_at: Option<Instant>,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
}

/// Cached, refreshable Metabase session.
///
/// Callers share one cached id. Refreshes run under the lock, so concurrent
/// callers that find the cache stale wait for a single login chain instead of
/// each starting their own.
pub struct SessionCredential {
    client: Client,
    config: MetabaseConfig,
    state: Mutex<SessionState>,
}

impl SessionCredential {
    pub fn new(client: Client, config: MetabaseConfig) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub async fn current(&self) -> Result<String, FetchError> {
        let mut state = self.state.lock().await;
        if let Some(session) = &state.session {
            if session.obtained_at.elapsed() < self.config.session_ttl {
                return Ok(session.id.clone());
            }
        }
        if state
            .failed_at
            .is_some_and(|at| at.elapsed() < self.config.login_cooldown)
        {
            return Err(FetchError::Auth);
        }

        match self.login().await {
            Ok(id) => {
                state.session = Some(Session {
                    id: id.clone(),
                    obtained_at: Instant::now(),
                });
                state.failed_at = None;
                Ok(id)
            }
            Err(err) => {
                state.session = None;
                state.failed_at = Some(Instant::now());
                Err(err)
            }
        }
    }

    /// Forgets `stale` if it is still the cached session. A newer session
    /// obtained by another caller is left alone.
    pub async fn invalidate(&self, stale: &str) {
        let mut state = self.state.lock().await;
        if state.session.as_ref().is_some_and(|s| s.id == stale) {
            state.session = None;
        }
    }

    async fn login(&self) -> Result<String, FetchError> {
        let policy = self.config.login_retry;
        let mut last_err = FetchError::Auth;
        for attempt in 1..=policy.max_attempts {
            match self.try_login().await {
                Ok(id) => {
                    info!(attempt, "metabase session established");
                    return Ok(id);
                }
                Err(err) => {
                    warn!(attempt, "metabase login failed: {err}");
                    last_err = err;
                }
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.backoff).await;
            }
        }
        Err(last_err)
    }

    async fn try_login(&self) -> Result<String, FetchError> {
        let response = self
            .client
            .post(self.config.url("/api/session"))
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: SessionResponse = response
                    .json()
                    .await
                    .map_err(|err| FetchError::Malformed(err.to_string()))?;
                Ok(body.id)
            }
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => Err(FetchError::Auth),
            other => Err(FetchError::Status(other.as_u16())),
        }
    }
}

pub struct MetabaseClient {
    client: Client,
    config: MetabaseConfig,
    credential: SessionCredential,
}

impl MetabaseClient {
    pub fn new(client: Client, config: MetabaseConfig) -> Self {
        let credential = SessionCredential::new(client.clone(), config.clone());
        Self {
            client,
            config,
            credential,
        }
    }

    pub fn credential(&self) -> &SessionCredential {
        &self.credential
    }

    /// Runs a card and returns the first column of its first row.
    pub async fn query_card(&self, card: CardId) -> Result<f64, FetchError> {
        let policy = self.config.query_retry;
        let mut last_err = FetchError::Auth;
        for attempt in 1..=policy.max_attempts {
            let session = self.credential.current().await?;
            match self.try_query(card, &session).await {
                Ok(value) => return Ok(value),
                Err(FetchError::Auth) => {
                    self.credential.invalidate(&session).await;
                    last_err = FetchError::Auth;
                }
                Err(err @ FetchError::Malformed(_)) => return Err(err),
                Err(err) => last_err = err,
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.backoff).await;
            }
        }
        Err(last_err)
    }

    async fn try_query(&self, card: CardId, session: &str) -> Result<f64, FetchError> {
        let response = self
            .client
            .post(self.config.url(&format!("/api/card/{card}/query/json")))
            .header(SESSION_HEADER, session)
            .json(&json!({ "parameters": [] }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|err| FetchError::Malformed(err.to_string()))?;
                parse_scalar_row(&body)
            }
            StatusCode::UNAUTHORIZED => Err(FetchError::Auth),
            other => Err(FetchError::Status(other.as_u16())),
        }
    }
}

impl MetricFetcher for MetabaseClient {
    async fn fetch(&self, card: CardId) -> Result<f64, FetchError> {
        self.query_card(card).await
    }
}

/// Extracts the scalar a single-value card returns. Rows come back either as
/// objects keyed by column name or as bare values; an empty result or a null
/// cell means zero.
pub fn parse_scalar_row(body: &Value) -> Result<f64, FetchError> {
    let Value::Array(rows) = body else {
        return Err(FetchError::Malformed("expected a list of rows".to_string()));
    };
    let cell = match rows.first() {
        None => return Ok(0.0),
        Some(Value::Object(columns)) => columns.values().next().unwrap_or(&Value::Null),
        Some(Value::Array(columns)) => columns.first().unwrap_or(&Value::Null),
        Some(other) => other,
    };

    match cell {
        Value::Null => Ok(0.0),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| FetchError::Malformed(format!("unrepresentable number {number}"))),
        Value::String(text) => text
            .trim()
            .trim_end_matches('%')
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| FetchError::Malformed(format!("non-numeric value {text:?}"))),
        other => Err(FetchError::Malformed(format!("unexpected cell {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn object_rows_use_first_column_in_response_order() {
        let body = json!([{ "sum": 1234.5, "count": 3 }]);
        assert_eq!(parse_scalar_row(&body), Ok(1234.5));
    }

    #[test]
    fn bare_and_nested_rows() {
        assert_eq!(parse_scalar_row(&json!([42])), Ok(42.0));
        assert_eq!(parse_scalar_row(&json!([[7, 8]])), Ok(7.0));
        assert_eq!(parse_scalar_row(&json!(["83.5%"])), Ok(83.5));
        assert_eq!(parse_scalar_row(&json!([{ "v": "1,200" }])), Ok(1200.0));
    }

    #[test]
    fn empty_and_null_mean_zero() {
        assert_eq!(parse_scalar_row(&json!([])), Ok(0.0));
        assert_eq!(parse_scalar_row(&json!([{ "sum": null }])), Ok(0.0));
        assert_eq!(parse_scalar_row(&json!([{}])), Ok(0.0));
    }

    #[test]
    fn unexpected_shapes_are_malformed() {
        assert!(matches!(parse_scalar_row(&json!({ "rows": [] })), Err(FetchError::Malformed(_))));
        assert!(matches!(parse_scalar_row(&json!(["n/a"])), Err(FetchError::Malformed(_))));
        assert!(matches!(parse_scalar_row(&json!([true])), Err(FetchError::Malformed(_))));
    }

    /// Fake Metabase that hands out numbered sessions and rejects the first
    /// one, forcing a refresh.
    #[derive(Clone, Default)]
    struct FakeMetabase {
        logins: Arc<AtomicUsize>,
    }

    async fn fake_login(State(fake): State<FakeMetabase>) -> Json<Value> {
        let n = fake.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Json(json!({ "id": format!("session-{n}") }))
    }

    async fn fake_query(
        State(_fake): State<FakeMetabase>,
        Path(card): Path<u32>,
        headers: HeaderMap,
    ) -> Result<Json<Value>, StatusCode> {
        let session = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if session == "session-1" || session.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }
        match card {
            1 => Ok(Json(json!([{ "sum": 2500000.0 }]))),
            2 => Ok(Json(json!([]))),
            3 => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(Json(json!([1])))
            }
            _ => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    async fn spawn_fake() -> (String, FakeMetabase) {
        let fake = FakeMetabase::default();
        let app = Router::new()
            .route("/api/session", post(fake_login))
            .route("/api/card/:card/query/json", post(fake_query))
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), fake)
    }

    fn quick_config(base_url: String) -> MetabaseConfig {
        let mut config = MetabaseConfig::new(base_url, "user".into(), "pass".into());
        config.timeout = Duration::from_secs(5);
        config.login_retry.backoff = Duration::ZERO;
        config.query_retry.backoff = Duration::ZERO;
        config
    }

    fn quick_client(config: MetabaseConfig) -> MetabaseClient {
        let http = config.http_client().unwrap();
        MetabaseClient::new(http, config)
    }

    #[tokio::test]
    async fn unauthorized_query_refreshes_session_once() {
        let (base_url, fake) = spawn_fake().await;
        let client = quick_client(quick_config(base_url));

        assert_eq!(client.query_card(1).await, Ok(2_500_000.0));
        assert_eq!(fake.logins.load(Ordering::SeqCst), 2);

        // the refreshed session is cached
        assert_eq!(client.query_card(2).await, Ok(0.0));
        assert_eq!(fake.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_errors_surface_after_retries() {
        let (base_url, _fake) = spawn_fake().await;
        let client = quick_client(quick_config(base_url));
        client.credential().current().await.unwrap();
        client.credential().invalidate("session-1").await;

        assert_eq!(client.query_card(99).await, Err(FetchError::Status(500)));
    }

    #[tokio::test]
    async fn slow_cards_hit_the_configured_timeout() {
        let (base_url, _fake) = spawn_fake().await;
        let mut config = quick_config(base_url);
        config.timeout = Duration::from_millis(200);
        let client = quick_client(config);
        client.credential().current().await.unwrap();
        client.credential().invalidate("session-1").await;

        assert_eq!(client.query_card(3).await, Err(FetchError::Timeout));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let config = MetabaseConfig::new(
            "http://metabase.local".into(),
            "bot@example.com".into(),
            "hunter2".into(),
        );
        let rendered = format!("{config:?}");
        assert!(rendered.contains("bot@example.com"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn unreachable_server_fails_fast_during_cooldown() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = quick_client(quick_config(format!("http://{addr}")));
        assert!(client.query_card(1).await.is_err());
        assert_eq!(client.credential().current().await, Err(FetchError::Auth));
    }
}
