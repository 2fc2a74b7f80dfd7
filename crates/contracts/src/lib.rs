//! Cross-boundary contracts for the ad ledger core, API, persistence, and CLI.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder identity for visitors arriving without a stable channel id.
pub const ANONYMOUS_USER_ID: &str = "guest_user";

/// Query parameter appended to redirect targets so the on-page snippet can
/// correlate later signals back to the click that brought the visitor.
pub const CLICK_ID_PARAM: &str = "vai_click_id";

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_DWELL_THRESHOLD_MS: i64 = 10_000;
pub const DEFAULT_PUBLIC_ORIGIN: &str = "http://127.0.0.1:8080";

/// Coarse user classification influencing reward odds. Tiers only move
/// upward: a promoted user is never demoted back to base.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    #[default]
    Base,
    Promoted,
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Promoted => write!(f, "promoted"),
        }
    }
}

/// An advertiser listing with its prepaid spend pool. Monetary fields are
/// integer minor units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Advertiser {
    pub id: String,
    pub name: String,
    pub url: String,
    pub cpc_bid: i64,
    pub ad_balance: i64,
}

impl Advertiser {
    /// Eligible for auction only while the balance covers at least one click.
    pub fn is_eligible(&self) -> bool {
        self.ad_balance >= self.cpc_bid
    }
}

/// The attribution artifact joining a ranked impression to later real-world
/// action. Append-only: rows are flag-mutated, never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClickEvent {
    pub id: String,
    pub advertiser_id: String,
    pub user_id: String,
    pub clicked_at_ms: i64,
    pub has_conversion: bool,
    pub reward_claimed: bool,
}

impl ClickEvent {
    pub fn new(
        id: impl Into<String>,
        advertiser_id: impl Into<String>,
        user_id: impl Into<String>,
        clicked_at_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            advertiser_id: advertiser_id.into(),
            user_id: user_id.into(),
            clicked_at_ms,
            has_conversion: false,
            reward_claimed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub tier: TrustTier,
    pub points: i64,
}

impl UserProfile {
    pub fn base(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tier: TrustTier::Base,
            points: 0,
        }
    }
}

/// Service-wide tunables. Click-id reuse on redirect and the starting
/// balance for fresh registrations are deployment policy, so they live here
/// rather than as hard-coded constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_dwell_threshold_ms")]
    pub dwell_threshold_ms: i64,
    /// When true, a caller-supplied click id on the redirect route is reused
    /// idempotently; a redirect followed twice does not double-debit.
    #[serde(default = "default_true")]
    pub reuse_caller_click_id: bool,
    /// Balance granted to a newly registered advertiser.
    #[serde(default)]
    pub starting_balance: i64,
    /// Origin used when composing booking urls for search results.
    #[serde(default = "default_public_origin")]
    pub public_origin: String,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_dwell_threshold_ms() -> i64 {
    DEFAULT_DWELL_THRESHOLD_MS
}

fn default_true() -> bool {
    true
}

fn default_public_origin() -> String {
    DEFAULT_PUBLIC_ORIGIN.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            dwell_threshold_ms: DEFAULT_DWELL_THRESHOLD_MS,
            reuse_caller_click_id: true,
            starting_balance: 0,
            public_origin: DEFAULT_PUBLIC_ORIGIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    InvalidClick,
    DwellNotMet,
    UpstreamError,
    StorageError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_is_base_then_promoted() {
        assert!(TrustTier::Base < TrustTier::Promoted);
        assert_eq!(TrustTier::default(), TrustTier::Base);
    }

    #[test]
    fn config_defaults_are_the_shipped_tunables() {
        let config = ServiceConfig::default();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.dwell_threshold_ms, 10_000);
        assert!(config.reuse_caller_click_id);
        assert_eq!(config.starting_balance, 0);
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"starting_balance": 5000}"#).expect("partial config");
        assert_eq!(config.starting_balance, 5000);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn error_codes_serialize_screaming_snake() {
        let raw = serde_json::to_string(&ErrorCode::DwellNotMet).expect("serialize");
        assert_eq!(raw, r#""DWELL_NOT_MET""#);
    }

    #[test]
    fn fresh_click_has_no_flags_set() {
        let click = ClickEvent::new("c1", "shop_1", "user_1", 42);
        assert!(!click.has_conversion);
        assert!(!click.reward_claimed);
    }
}
