//! HTTP shell and persistence for the click-attribution and incentive
//! ledger. `LedgerApi` is the façade the server (and the CLI) drive; it wires
//! the core engines over a shared storage backend and owns the injectable
//! seams for randomness and time.

pub mod persistence;
pub mod reply;
pub mod server;

use std::sync::Arc;

use contracts::{Advertiser, ClickEvent, ServiceConfig, UserProfile};
use ledger_core::{
    AttributionEngine, AuctionEngine, Clock, ConversionOutcome, IssuedClick, LedgerError,
    LedgerStores, MemoryLedger, PayoutOutcome, RandomSampler, RankedPlacement, RelevanceModel,
    RewardEngine, StorageError, SystemClock, UniformRelevance, UnitSampler,
};
use uuid::Uuid;

pub use persistence::{PersistenceError, SqliteLedgerStore};
pub use reply::{LogOnlyReplyTransport, ReplyTransport, UpstreamError};
pub use server::{serve, ServerError};

pub struct LedgerApi {
    auction: AuctionEngine,
    attribution: AttributionEngine,
    rewards: RewardEngine,
    stores: LedgerStores,
    config: ServiceConfig,
}

impl LedgerApi {
    /// In-memory instance with entropy-backed seams; used by tests and the
    /// server when no sqlite path is configured.
    pub fn in_memory(config: ServiceConfig) -> Self {
        let stores = MemoryLedger::new().stores();
        Self::with_stores(
            config,
            stores,
            Box::new(UniformRelevance::new(Box::new(RandomSampler::from_entropy()))),
            Box::new(RandomSampler::from_entropy()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_sqlite(config: ServiceConfig, path: &str) -> Result<Self, PersistenceError> {
        let stores = SqliteLedgerStore::open(path)?.stores();
        Ok(Self::with_stores(
            config,
            stores,
            Box::new(UniformRelevance::new(Box::new(RandomSampler::from_entropy()))),
            Box::new(RandomSampler::from_entropy()),
            Arc::new(SystemClock),
        ))
    }

    /// Full wiring with caller-chosen seams. Deterministic tests inject fixed
    /// samplers and a manual clock here.
    pub fn with_stores(
        config: ServiceConfig,
        stores: LedgerStores,
        relevance: Box<dyn RelevanceModel>,
        sampler: Box<dyn UnitSampler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auction = AuctionEngine::new(stores.balances.clone(), relevance, config.top_k);
        let attribution = AttributionEngine::new(
            stores.balances.clone(),
            stores.clicks.clone(),
            stores.users.clone(),
            clock.clone(),
            config.reuse_caller_click_id,
        );
        let rewards = RewardEngine::new(
            stores.clicks.clone(),
            stores.users.clone(),
            stores.settlement.clone(),
            sampler,
            clock,
            config.dwell_threshold_ms,
        );

        Self {
            auction,
            attribution,
            rewards,
            stores,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn search(&mut self, query: &str) -> Result<Vec<RankedPlacement>, StorageError> {
        self.auction.rank(query)
    }

    pub fn issue_click(
        &self,
        advertiser_id: &str,
        user_id: Option<&str>,
        supplied_click_id: Option<&str>,
    ) -> Result<IssuedClick, StorageError> {
        self.attribution
            .issue_click(advertiser_id, user_id, supplied_click_id)
    }

    pub fn record_conversion(&self, click_id: &str) -> Result<ConversionOutcome, StorageError> {
        self.attribution.record_conversion(click_id)
    }

    pub fn spin_reward(
        &mut self,
        click_id: &str,
        user_id: &str,
    ) -> Result<PayoutOutcome, LedgerError> {
        self.rewards.spin(click_id, user_id)
    }

    /// Register or update an advertiser listing. A missing id mints one; a
    /// fresh registration starts at the configured balance and an update
    /// never touches the balance.
    pub fn upsert_advertiser(
        &self,
        id: Option<String>,
        name: String,
        url: String,
        cpc_bid: i64,
    ) -> Result<String, StorageError> {
        let id = id
            .filter(|candidate| !candidate.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let advertiser = Advertiser {
            id: id.clone(),
            name,
            url,
            cpc_bid,
            ad_balance: self.config.starting_balance,
        };
        self.stores.balances.upsert_listing(&advertiser)?;
        Ok(id)
    }

    /// Top up an advertiser balance. Returns false when the id is unknown.
    pub fn credit_balance(&self, advertiser_id: &str, amount: i64) -> Result<bool, StorageError> {
        self.stores.balances.credit(advertiser_id, amount)
    }

    pub fn advertiser(&self, advertiser_id: &str) -> Result<Option<Advertiser>, StorageError> {
        self.stores.balances.get(advertiser_id)
    }

    pub fn click(&self, click_id: &str) -> Result<Option<ClickEvent>, StorageError> {
        self.stores.clicks.get(click_id)
    }

    pub fn user(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        self.stores.users.get(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TrustTier;
    use ledger_core::{DebitOutcome, ManualClock, SequenceSampler};

    fn deterministic_api(draws: Vec<f64>, clock: Arc<ManualClock>) -> LedgerApi {
        let stores = MemoryLedger::new().stores();
        LedgerApi::with_stores(
            ServiceConfig::default(),
            stores,
            Box::new(UniformRelevance::new(Box::new(SequenceSampler::new([0.5])))),
            Box::new(SequenceSampler::new(draws)),
            clock,
        )
    }

    #[test]
    fn registration_starts_fresh_and_update_keeps_balance() {
        let api = LedgerApi::in_memory(ServiceConfig {
            starting_balance: 100,
            ..ServiceConfig::default()
        });

        let id = api
            .upsert_advertiser(None, "cafe".into(), "https://cafe.example".into(), 10)
            .expect("register");
        assert!(api.credit_balance(&id, 40).expect("credit"));

        api.upsert_advertiser(
            Some(id.clone()),
            "cafe deluxe".into(),
            "https://cafe.example".into(),
            25,
        )
        .expect("update");

        let row = api.advertiser(&id).expect("get").expect("present");
        assert_eq!(row.name, "cafe deluxe");
        assert_eq!(row.cpc_bid, 25);
        assert_eq!(row.ad_balance, 140);
    }

    #[test]
    fn full_click_to_reward_scenario() {
        let clock = Arc::new(ManualClock::at(1_000));
        // First draw lands in the promoted jackpot band after the conversion.
        let mut api = deterministic_api(vec![0.03], clock.clone());

        let id = api
            .upsert_advertiser(None, "inn".into(), "https://inn.example".into(), 50)
            .expect("register");
        assert!(api.credit_balance(&id, 100).expect("credit"));

        let ranked = api.search("inn").expect("search");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].advertiser.id, id);

        let issued = api.issue_click(&id, Some("u1"), None).expect("click");
        assert_eq!(
            issued.debit,
            Some(DebitOutcome::Applied { new_balance: 50 })
        );

        let outcome = api.record_conversion(&issued.click.id).expect("micro-cv");
        assert_eq!(
            outcome,
            ConversionOutcome::Recorded {
                user_id: "u1".to_string()
            }
        );
        assert_eq!(
            api.user("u1").expect("user").expect("present").tier,
            TrustTier::Promoted
        );

        // Too early: the dwell gate rejects without consuming the claim.
        let early = api.spin_reward(&issued.click.id, "u1");
        assert!(matches!(early, Err(LedgerError::DwellNotMet { .. })));

        clock.advance(10_000);
        let payout = api.spin_reward(&issued.click.id, "u1").expect("spin");
        assert_eq!(payout.points_won, 500);
        assert_eq!(payout.total_points, 500);
        assert_eq!(payout.tier, TrustTier::Promoted);

        // The claim is consumed; a replay is invalid.
        assert_eq!(
            api.spin_reward(&issued.click.id, "u1"),
            Err(LedgerError::InvalidClick)
        );
    }

    #[test]
    fn dwell_gate_reports_elapsed_and_required() {
        let clock = Arc::new(ManualClock::at(0));
        let mut api = deterministic_api(vec![0.5], clock.clone());

        let id = api
            .upsert_advertiser(None, "shop".into(), "https://s.example".into(), 1)
            .expect("register");
        api.credit_balance(&id, 10).expect("credit");
        let issued = api.issue_click(&id, Some("u1"), None).expect("click");

        clock.set(9_999);
        assert_eq!(
            api.spin_reward(&issued.click.id, "u1"),
            Err(LedgerError::DwellNotMet {
                elapsed_ms: 9_999,
                required_ms: 10_000,
            })
        );
    }

    #[test]
    fn sqlite_backed_api_round_trips() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("vai_ledger_api_{nanos}.sqlite"));
        let path_str = path.to_string_lossy().to_string();

        let api = LedgerApi::with_sqlite(ServiceConfig::default(), &path_str).expect("open");
        let id = api
            .upsert_advertiser(None, "shop".into(), "https://s.example".into(), 5)
            .expect("register");
        api.credit_balance(&id, 50).expect("credit");

        let reopened = LedgerApi::with_sqlite(ServiceConfig::default(), &path_str).expect("reopen");
        let row = reopened.advertiser(&id).expect("get").expect("present");
        assert_eq!(row.ad_balance, 50);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
    }
}
