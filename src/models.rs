use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a saved Metabase question ("card").
pub type CardId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartnerDefinition {
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    pub target_amount: f64,
    pub metrics: MetricSource,
}

fn default_color() -> String {
    "blue".to_string()
}

/// Where a partner's figures come from. A partner is either backed by
/// Metabase cards or carries hand-entered numbers, never both.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MetricSource {
    Fetched {
        #[serde(default)]
        current_cards: Vec<CardId>,
        #[serde(default)]
        prior_cards: Vec<CardId>,
        #[serde(default)]
        collection_card: Option<CardId>,
    },
    Manual {
        current: f64,
        #[serde(default)]
        prior: Option<f64>,
        #[serde(default)]
        collection_rate: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum CollectionRate {
    Known(f64),
    Unavailable,
}

/// One partner reduced to the numbers the aggregator needs.
///
/// `current` and `prior` are `None` only when the partner has no source for
/// that period at all; failed fetches have already been folded into zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartnerFigures {
    pub current: Option<f64>,
    pub prior: Option<f64>,
    pub collection_rate: CollectionRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetStatus {
    Achieved,
    Remaining { amount: f64, pct_of_target: f64 },
    NotTracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingDirection {
    Ahead,
    Behind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartnerSummary {
    pub name: String,
    pub target: f64,
    pub current: Option<f64>,
    pub prior: Option<f64>,
    pub collection_rate: CollectionRate,
    pub target_status: TargetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub per_partner: Vec<PartnerSummary>,
    pub total_current: f64,
    pub total_prior: f64,
    pub total_target: f64,
    pub goal_progress_pct: f64,
    pub mom_growth: f64,
    pub mom_growth_pct: f64,
    pub pacing_target: f64,
    pub pacing_shortfall: f64,
    pub pacing_shortfall_pct: f64,
    pub pacing_direction: PacingDirection,
    pub day_of_month: u32,
    pub days_in_month: u32,
    pub days_left: u32,
}

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub password: String,
}
