use crate::errors::AppError;
use crate::models::TokenRecord;
use crate::storage::{load_json, persist_json};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How long an issued token stays valid.
pub const TOKEN_VALIDITY_DAYS: i64 = 10;

/// On-disk shape: token string to RFC 3339 expiry.
type TokenFile = BTreeMap<String, String>;

/// File-backed store of expiring bearer tokens.
///
/// Every operation reads the file, and rewrites it when something changed.
/// The mutex serializes those read-modify-write cycles within the process.
pub struct TokenStore {
    path: PathBuf,
    validity: Duration,
    lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self::with_validity(path, Duration::days(TOKEN_VALIDITY_DAYS))
    }

    pub fn with_validity(path: PathBuf, validity: Duration) -> Self {
        Self {
            path,
            validity,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn issue(&self) -> Result<TokenRecord, AppError> {
        self.issue_at(Utc::now()).await
    }

    pub async fn issue_at(&self, now: DateTime<Utc>) -> Result<TokenRecord, AppError> {
        let _guard = self.lock.lock().await;
        let mut tokens: TokenFile = load_json(&self.path).await;
        tokens.retain(|_, expiry| is_live(expiry, now));

        let record = TokenRecord {
            token: generate_token(now),
            expires_at: now + self.validity,
        };
        tokens.insert(record.token.clone(), record.expires_at.to_rfc3339());
        persist_json(&self.path, &tokens).await?;

        Ok(record)
    }

    pub async fn validate(&self, token: Option<&str>) -> bool {
        self.validate_at(token, Utc::now()).await
    }

    /// Returns whether `token` is stored and unexpired. An expired entry is
    /// dropped from the file as a side effect; failing to rewrite the file
    /// does not change the answer.
    pub async fn validate_at(&self, token: Option<&str>, now: DateTime<Utc>) -> bool {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return false;
        };

        let _guard = self.lock.lock().await;
        let mut tokens: TokenFile = load_json(&self.path).await;
        let Some(expiry) = tokens.get(token) else {
            return false;
        };
        let Some(expiry) = parse_expiry(expiry) else {
            return false;
        };
        if now < expiry {
            return true;
        }

        tokens.remove(token);
        if let Err(err) = persist_json(&self.path, &tokens).await {
            warn!("failed to drop expired token: {}", err.message);
        }
        false
    }

    pub async fn sweep(&self) -> Result<usize, AppError> {
        self.sweep_at(Utc::now()).await
    }

    /// Drops every expired or unreadable entry and reports how many went.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let _guard = self.lock.lock().await;
        let mut tokens: TokenFile = load_json(&self.path).await;
        let before = tokens.len();
        tokens.retain(|_, expiry| is_live(expiry, now));
        let removed = before - tokens.len();

        if removed > 0 {
            persist_json(&self.path, &tokens).await?;
            info!(removed, "swept expired auth tokens");
        }
        Ok(removed)
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|expiry| expiry.with_timezone(&Utc))
}

fn is_live(raw: &str, now: DateTime<Utc>) -> bool {
    parse_expiry(raw).is_some_and(|expiry| now < expiry)
}

fn generate_token(now: DateTime<Utc>) -> String {
    let mut random = [0u8; 16];
    OsRng.fill_bytes(&mut random);

    let mut hasher = Sha256::new();
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    hasher.update(random);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> TokenStore {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("dashboard_tokens_{}_{nanos}.json", std::process::id()));
        TokenStore::new(path)
    }

    fn at(day: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2025-06-{day:02}T09:00:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn issued_token_validates_until_expiry() {
        let store = scratch_store();
        let record = store.issue_at(at(1)).await.unwrap();

        assert_eq!(record.token.len(), 64);
        assert_eq!(record.expires_at, at(11));
        assert!(store.validate_at(Some(record.token.as_str()), at(1)).await);
        assert!(store.validate_at(Some(record.token.as_str()), at(10)).await);
        assert!(!store.validate_at(Some(record.token.as_str()), at(11)).await);

        // the expired entry was removed, so even an earlier clock rejects it now
        assert!(!store.validate_at(Some(record.token.as_str()), at(2)).await);
        let _ = tokio::fs::remove_file(store.path()).await;
    }

    #[tokio::test]
    async fn missing_store_rejects_everything() {
        let store = scratch_store();
        assert!(!store.validate_at(None, at(1)).await);
        assert!(!store.validate_at(Some(""), at(1)).await);
        assert!(!store.validate_at(Some("   "), at(1)).await);
        assert!(!store.validate_at(Some("deadbeef"), at(1)).await);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn unparsable_expiry_is_rejected_and_swept() {
        let store = scratch_store();
        let mut file = TokenFile::new();
        file.insert("broken".to_string(), "next tuesday".to_string());
        persist_json(store.path(), &file).await.unwrap();

        assert!(!store.validate_at(Some("broken"), at(1)).await);
        assert_eq!(store.sweep_at(at(1)).await.unwrap(), 1);
        let _ = tokio::fs::remove_file(store.path()).await;
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_tokens() {
        let store = scratch_store();
        let old = store.issue_at(at(1)).await.unwrap();
        let fresh = store.issue_at(at(8)).await.unwrap();

        assert_eq!(store.sweep_at(at(12)).await.unwrap(), 1);
        assert_eq!(store.sweep_at(at(12)).await.unwrap(), 0);

        let remaining: TokenFile = load_json(store.path()).await;
        assert!(!remaining.contains_key(&old.token));
        assert!(remaining.contains_key(&fresh.token));
        assert!(store.validate_at(Some(fresh.token.as_str()), at(12)).await);
        let _ = tokio::fs::remove_file(store.path()).await;
    }

    #[tokio::test]
    async fn issue_drops_expired_records() {
        let store = scratch_store();
        let old = store.issue_at(at(1)).await.unwrap();
        let newer = store.issue_at(at(20)).await.unwrap();

        let stored: TokenFile = load_json(store.path()).await;
        assert_eq!(stored.len(), 1);
        assert!(stored.contains_key(&newer.token));
        assert_ne!(old.token, newer.token);
        let _ = tokio::fs::remove_file(store.path()).await;
    }
}
