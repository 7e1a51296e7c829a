use crate::errors::ConfigError;
use crate::metabase::MetabaseConfig;
use crate::models::PartnerDefinition;
use crate::resolver::{DEFAULT_CONCURRENCY, FetchStrategy};
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::HashSet;
use std::{env, fmt, path::Path, path::PathBuf, time::Duration};
use tokio::fs;

const IST_OFFSET_MINUTES: i32 = 5 * 60 + 30;

#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    pub secret: String,
    pub token_path: PathBuf,
    pub partners_path: PathBuf,
    pub fetch_strategy: FetchStrategy,
    pub utc_offset: FixedOffset,
    pub metabase: MetabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartnerFile {
    #[serde(default)]
    pub month_end_projection: Option<f64>,
    pub partners: Vec<PartnerDefinition>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };

        let port = parse_or(&lookup, "PORT", 8080)?;
        let concurrency = parse_or(&lookup, "DASHBOARD_FETCH_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        let fetch_strategy = match lookup("DASHBOARD_FETCH_MODE").as_deref() {
            None | Some("parallel") => FetchStrategy::Bounded(concurrency.max(1)),
            Some("sequential") => FetchStrategy::Sequential,
            Some(other) => {
                return Err(ConfigError::InvalidVar {
                    name: "DASHBOARD_FETCH_MODE",
                    value: other.to_string(),
                });
            }
        };

        let offset_minutes: i32 =
            parse_or(&lookup, "DASHBOARD_UTC_OFFSET_MINUTES", IST_OFFSET_MINUTES)?;
        let utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidVar {
                name: "DASHBOARD_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
            })?;

        let mut metabase = MetabaseConfig::new(
            required("METABASE_URL")?,
            required("METABASE_USERNAME")?,
            required("METABASE_PASSWORD")?,
        );
        metabase.timeout = Duration::from_secs(parse_or(&lookup, "METABASE_TIMEOUT_SECS", 30)?);
        let backoff_ms: u64 = parse_or(&lookup, "METABASE_RETRY_BACKOFF_MS", 1000)?;
        metabase.query_retry.backoff = Duration::from_millis(backoff_ms);
        metabase.login_retry.backoff = Duration::from_millis(backoff_ms.saturating_mul(2));

        Ok(Self {
            port,
            secret: required("DASHBOARD_SECRET")?,
            token_path: lookup("DASHBOARD_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/auth_tokens.json")),
            partners_path: lookup("DASHBOARD_PARTNERS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/partners.json")),
            fetch_strategy,
            utc_offset,
            metabase,
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("secret", &"<redacted>")
            .field("token_path", &self.token_path)
            .field("partners_path", &self.partners_path)
            .field("fetch_strategy", &self.fetch_strategy)
            .field("utc_offset", &self.utc_offset)
            .field("metabase", &self.metabase)
            .finish()
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value }),
    }
}

pub async fn load_partners(path: &Path) -> Result<PartnerFile, ConfigError> {
    let file_error = |reason: String| ConfigError::PartnersFile {
        path: path.display().to_string(),
        reason,
    };
    let bytes = fs::read(path).await.map_err(|err| file_error(err.to_string()))?;
    let file: PartnerFile =
        serde_json::from_slice(&bytes).map_err(|err| file_error(err.to_string()))?;
    validate_partners(&file.partners)?;
    Ok(file)
}

pub fn validate_partners(partners: &[PartnerDefinition]) -> Result<(), ConfigError> {
    if partners.is_empty() {
        return Err(ConfigError::InvalidPartners("no partners configured".to_string()));
    }
    let mut seen = HashSet::new();
    for partner in partners {
        let name = partner.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidPartners("partner with empty name".to_string()));
        }
        if !seen.insert(name) {
            return Err(ConfigError::InvalidPartners(format!("duplicate partner {name:?}")));
        }
        if partner.target_amount.is_nan() || partner.target_amount <= 0.0 {
            return Err(ConfigError::InvalidPartners(format!(
                "partner {name:?} needs a positive target_amount"
            )));
        }
    }
    Ok(())
}
