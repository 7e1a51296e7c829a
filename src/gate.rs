use crate::errors::AppError;
use crate::tokens::TokenStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// What a visitor presented on this request.
#[derive(Debug, Default)]
pub struct Credentials<'a> {
    pub token: Option<&'a str>,
    pub secret: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Access granted. `issued_token` is set when the shared secret was used,
    /// so the caller can hand out a link that skips the prompt next time.
    Unlocked { issued_token: Option<String> },
    Locked(LockReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// Nothing usable was presented.
    Prompt,
    /// The secret was wrong. Deliberately says nothing about tokens.
    IncorrectCredential,
    Throttled,
}

/// Failed-attempt budget for the shared secret.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPolicy {
    pub capacity: f64,
    pub refill_every: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_every: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct AccessGate {
    secret: String,
    store: Arc<TokenStore>,
    policy: AttemptPolicy,
    failures: Mutex<Bucket>,
}

impl AccessGate {
    pub fn new(secret: String, store: Arc<TokenStore>) -> Self {
        Self::with_policy(secret, store, AttemptPolicy::default())
    }

    pub fn with_policy(secret: String, store: Arc<TokenStore>, policy: AttemptPolicy) -> Self {
        Self {
            secret,
            store,
            policy,
            failures: Mutex::new(Bucket {
                tokens: policy.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn check(&self, credentials: Credentials<'_>) -> Result<GateOutcome, AppError> {
        if self.store.validate(credentials.token).await {
            return Ok(GateOutcome::Unlocked { issued_token: None });
        }

        let Some(secret) = credentials.secret.filter(|s| !s.is_empty()) else {
            return Ok(GateOutcome::Locked(LockReason::Prompt));
        };

        if !self.take_attempt().await {
            warn!("secret attempt rejected: too many recent failures");
            return Ok(GateOutcome::Locked(LockReason::Throttled));
        }

        if !bool::from(secret.as_bytes().ct_eq(self.secret.as_bytes())) {
            warn!("secret attempt rejected: incorrect credential");
            return Ok(GateOutcome::Locked(LockReason::IncorrectCredential));
        }
        self.refund_attempt().await;

        let record = self.store.issue().await?;
        info!(expires_at = %record.expires_at, "issued auth token");
        Ok(GateOutcome::Unlocked {
            issued_token: Some(record.token),
        })
    }

    /// Debits one attempt up front. A correct secret gets it back through
    /// [`Self::refund_attempt`], so only failures drain the budget.
    async fn take_attempt(&self) -> bool {
        let mut bucket = self.failures.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    async fn refund_attempt(&self) {
        let mut bucket = self.failures.lock().await;
        self.refill(&mut bucket);
        bucket.tokens = (bucket.tokens + 1.0).min(self.policy.capacity);
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let per_sec = 1.0 / self.policy.refill_every.as_secs_f64().max(f64::EPSILON);
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * per_sec).min(self.policy.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_gate(policy: AttemptPolicy) -> AccessGate {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("dashboard_gate_{}_{nanos}.json", std::process::id()));
        AccessGate::with_policy("open sesame".to_string(), Arc::new(TokenStore::new(path)), policy)
    }

    fn secret(value: &str) -> Credentials<'_> {
        Credentials {
            token: None,
            secret: Some(value),
        }
    }

    #[tokio::test]
    async fn nothing_presented_prompts() {
        let gate = scratch_gate(AttemptPolicy::default());
        let outcome = gate.check(Credentials::default()).await.unwrap();
        assert_eq!(outcome, GateOutcome::Locked(LockReason::Prompt));

        let outcome = gate.check(secret("")).await.unwrap();
        assert_eq!(outcome, GateOutcome::Locked(LockReason::Prompt));
    }

    #[tokio::test]
    async fn correct_secret_issues_reusable_token() {
        let gate = scratch_gate(AttemptPolicy::default());
        let outcome = gate.check(secret("open sesame")).await.unwrap();
        let token = match outcome {
            GateOutcome::Unlocked {
                issued_token: Some(token),
            } => token,
            other => panic!("expected a fresh token, got {other:?}"),
        };

        let revisit = gate
            .check(Credentials {
                token: Some(token.as_str()),
                secret: None,
            })
            .await
            .unwrap();
        assert_eq!(revisit, GateOutcome::Unlocked { issued_token: None });
        let _ = tokio::fs::remove_file(gate.store.path()).await;
    }

    #[tokio::test]
    async fn unknown_token_and_wrong_secret_look_the_same() {
        let gate = scratch_gate(AttemptPolicy::default());
        let outcome = gate
            .check(Credentials {
                token: Some("not-a-token"),
                secret: Some("guess"),
            })
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Locked(LockReason::IncorrectCredential));

        let outcome = gate.check(secret("open sesame!")).await.unwrap();
        assert_eq!(outcome, GateOutcome::Locked(LockReason::IncorrectCredential));
    }

    #[tokio::test]
    async fn repeated_failures_throttle_even_the_right_secret() {
        let gate = scratch_gate(AttemptPolicy {
            capacity: 2.0,
            refill_every: Duration::from_secs(3600),
        });
        for _ in 0..2 {
            let outcome = gate.check(secret("wrong")).await.unwrap();
            assert_eq!(outcome, GateOutcome::Locked(LockReason::IncorrectCredential));
        }

        let outcome = gate.check(secret("open sesame")).await.unwrap();
        assert_eq!(outcome, GateOutcome::Locked(LockReason::Throttled));
    }

    #[tokio::test]
    async fn near_miss_secrets_are_rejected() {
        let gate = scratch_gate(AttemptPolicy::default());
        for guess in ["open sesam", "open sesame ", "Open sesame"] {
            let outcome = gate.check(secret(guess)).await.unwrap();
            assert_eq!(outcome, GateOutcome::Locked(LockReason::IncorrectCredential));
        }
    }

    #[tokio::test]
    async fn successful_logins_do_not_spend_the_budget() {
        let gate = scratch_gate(AttemptPolicy {
            capacity: 1.0,
            refill_every: Duration::from_secs(3600),
        });
        for _ in 0..3 {
            let outcome = gate.check(secret("open sesame")).await.unwrap();
            assert!(matches!(outcome, GateOutcome::Unlocked { issued_token: Some(_) }));
        }
        let _ = tokio::fs::remove_file(gate.store.path()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_never_exceed_the_budget() {
        let gate = Arc::new(scratch_gate(AttemptPolicy {
            capacity: 2.0,
            refill_every: Duration::from_secs(3600),
        }));
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..200 {
            let gate = Arc::clone(&gate);
            set.spawn(async move { gate.check(secret("wrong")).await.unwrap() });
        }

        let mut compared = 0;
        while let Some(outcome) = set.join_next().await {
            match outcome.unwrap() {
                GateOutcome::Locked(LockReason::IncorrectCredential) => compared += 1,
                GateOutcome::Locked(LockReason::Throttled) => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(compared, 2);
    }
}
