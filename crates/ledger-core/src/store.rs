//! Capability-scoped storage seams and the in-memory reference ledger.
//!
//! Each engine receives only the repositories it needs; backends supply all
//! of them from one handle. Conditional mutations (`debit_bid`,
//! `claim_reward`, `settle`) are the serialization points the request
//! handlers rely on, so backends must make them atomic rather than
//! read-then-write in two round trips.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{Advertiser, ClickEvent, TrustTier, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    Backend(String),
}

impl StorageError {
    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(message) => write!(f, "storage backend error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied { new_balance: i64 },
    InsufficientBalance,
    UnknownAdvertiser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled { total_points: i64 },
    AlreadyClaimed,
    UnknownClick,
}

/// Durable per-advertiser spend pool and bid price.
pub trait BalanceStore: Send + Sync {
    /// Insert a new listing, or update name/url/bid of an existing one.
    /// An existing row keeps its balance; `ad_balance` on the passed record
    /// is only honored at first insert.
    fn upsert_listing(&self, advertiser: &Advertiser) -> Result<(), StorageError>;

    fn get(&self, advertiser_id: &str) -> Result<Option<Advertiser>, StorageError>;

    /// Advertisers with `ad_balance >= cpc_bid`, in stable registration
    /// order. Balance gating happens here, before any scoring.
    fn eligible(&self) -> Result<Vec<Advertiser>, StorageError>;

    /// Trusted-source credit. Returns whether the advertiser row existed.
    fn credit(&self, advertiser_id: &str, amount: i64) -> Result<bool, StorageError>;

    /// Atomically decrement the balance by the advertiser's own stored bid,
    /// only while the balance still covers it. Never takes a caller-supplied
    /// amount.
    fn debit_bid(&self, advertiser_id: &str) -> Result<DebitOutcome, StorageError>;
}

/// Durable record of issued click identities and their lifecycle flags.
pub trait ClickLedger: Send + Sync {
    /// Returns `false` when the id already exists; the existing row is left
    /// untouched so a replayed insert is a harmless no-op.
    fn insert(&self, click: &ClickEvent) -> Result<bool, StorageError>;

    fn get(&self, click_id: &str) -> Result<Option<ClickEvent>, StorageError>;

    /// Set the conversion flag and return the owning user id when the click
    /// exists. Idempotent; unknown ids yield `None`.
    fn flag_conversion(&self, click_id: &str) -> Result<Option<String>, StorageError>;

    /// Conditional claim: returns `true` only when the flag was newly set.
    fn claim_reward(&self, click_id: &str) -> Result<bool, StorageError>;
}

/// Durable per-user trust tier and accumulated points.
pub trait UserTrustStore: Send + Sync {
    fn get(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError>;

    /// Upsert the user at the promoted tier. Points are untouched.
    fn promote(&self, user_id: &str) -> Result<(), StorageError>;

    /// Add points, creating a base-tier row when absent. Returns the new
    /// total.
    fn credit_points(&self, user_id: &str, amount: i64) -> Result<i64, StorageError>;
}

/// The claim-flag write and the point credit applied as one atomic unit; if
/// either side cannot persist, neither does.
pub trait RewardSettlement: Send + Sync {
    fn settle(
        &self,
        click_id: &str,
        user_id: &str,
        amount: i64,
    ) -> Result<SettleOutcome, StorageError>;
}

/// Bundle handed to the engines. Cloning shares the underlying backend.
#[derive(Clone)]
pub struct LedgerStores {
    pub balances: Arc<dyn BalanceStore>,
    pub clicks: Arc<dyn ClickLedger>,
    pub users: Arc<dyn UserTrustStore>,
    pub settlement: Arc<dyn RewardSettlement>,
}

/// In-memory backend for tests and local runs. A single mutex over the whole
/// state makes every trait method atomic.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    advertisers: BTreeMap<String, Advertiser>,
    registration_order: Vec<String>,
    clicks: BTreeMap<String, ClickEvent>,
    users: BTreeMap<String, UserProfile>,
}

impl MemoryLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stores(self: &Arc<Self>) -> LedgerStores {
        LedgerStores {
            balances: self.clone(),
            clicks: self.clone(),
            users: self.clone(),
            settlement: self.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BalanceStore for MemoryLedger {
    fn upsert_listing(&self, advertiser: &Advertiser) -> Result<(), StorageError> {
        let mut state = self.state();
        match state.advertisers.get_mut(&advertiser.id) {
            Some(existing) => {
                existing.name = advertiser.name.clone();
                existing.url = advertiser.url.clone();
                existing.cpc_bid = advertiser.cpc_bid;
            }
            None => {
                state
                    .advertisers
                    .insert(advertiser.id.clone(), advertiser.clone());
                state.registration_order.push(advertiser.id.clone());
            }
        }
        Ok(())
    }

    fn get(&self, advertiser_id: &str) -> Result<Option<Advertiser>, StorageError> {
        Ok(self.state().advertisers.get(advertiser_id).cloned())
    }

    fn eligible(&self) -> Result<Vec<Advertiser>, StorageError> {
        let state = self.state();
        Ok(state
            .registration_order
            .iter()
            .filter_map(|id| state.advertisers.get(id))
            .filter(|advertiser| advertiser.is_eligible())
            .cloned()
            .collect())
    }

    fn credit(&self, advertiser_id: &str, amount: i64) -> Result<bool, StorageError> {
        let mut state = self.state();
        match state.advertisers.get_mut(advertiser_id) {
            Some(advertiser) => {
                advertiser.ad_balance += amount;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn debit_bid(&self, advertiser_id: &str) -> Result<DebitOutcome, StorageError> {
        let mut state = self.state();
        let Some(advertiser) = state.advertisers.get_mut(advertiser_id) else {
            return Ok(DebitOutcome::UnknownAdvertiser);
        };
        if advertiser.ad_balance < advertiser.cpc_bid {
            return Ok(DebitOutcome::InsufficientBalance);
        }
        advertiser.ad_balance -= advertiser.cpc_bid;
        Ok(DebitOutcome::Applied {
            new_balance: advertiser.ad_balance,
        })
    }
}

impl ClickLedger for MemoryLedger {
    fn insert(&self, click: &ClickEvent) -> Result<bool, StorageError> {
        let mut state = self.state();
        if state.clicks.contains_key(&click.id) {
            return Ok(false);
        }
        state.clicks.insert(click.id.clone(), click.clone());
        Ok(true)
    }

    fn get(&self, click_id: &str) -> Result<Option<ClickEvent>, StorageError> {
        Ok(self.state().clicks.get(click_id).cloned())
    }

    fn flag_conversion(&self, click_id: &str) -> Result<Option<String>, StorageError> {
        let mut state = self.state();
        match state.clicks.get_mut(click_id) {
            Some(click) => {
                click.has_conversion = true;
                Ok(Some(click.user_id.clone()))
            }
            None => Ok(None),
        }
    }

    fn claim_reward(&self, click_id: &str) -> Result<bool, StorageError> {
        let mut state = self.state();
        match state.clicks.get_mut(click_id) {
            Some(click) if !click.reward_claimed => {
                click.reward_claimed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl UserTrustStore for MemoryLedger {
    fn get(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        Ok(self.state().users.get(user_id).cloned())
    }

    fn promote(&self, user_id: &str) -> Result<(), StorageError> {
        let mut state = self.state();
        state
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::base(user_id))
            .tier = TrustTier::Promoted;
        Ok(())
    }

    fn credit_points(&self, user_id: &str, amount: i64) -> Result<i64, StorageError> {
        let mut state = self.state();
        let user = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::base(user_id));
        user.points += amount;
        Ok(user.points)
    }
}

impl RewardSettlement for MemoryLedger {
    fn settle(
        &self,
        click_id: &str,
        user_id: &str,
        amount: i64,
    ) -> Result<SettleOutcome, StorageError> {
        let mut state = self.state();
        let Some(click) = state.clicks.get_mut(click_id) else {
            return Ok(SettleOutcome::UnknownClick);
        };
        if click.reward_claimed {
            return Ok(SettleOutcome::AlreadyClaimed);
        }
        click.reward_claimed = true;

        let user = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::base(user_id));
        user.points += amount;
        Ok(SettleOutcome::Settled {
            total_points: user.points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, bid: i64, balance: i64) -> Advertiser {
        Advertiser {
            id: id.to_string(),
            name: format!("shop {id}"),
            url: format!("https://{id}.example"),
            cpc_bid: bid,
            ad_balance: balance,
        }
    }

    #[test]
    fn upsert_preserves_balance_of_existing_row() {
        let ledger = MemoryLedger::new();
        ledger.upsert_listing(&listing("a", 50, 100)).expect("insert");
        ledger.credit("a", 25).expect("credit");

        let mut updated = listing("a", 80, 0);
        updated.name = "renamed".to_string();
        ledger.upsert_listing(&updated).expect("update");

        let row = BalanceStore::get(&*ledger, "a")
            .expect("get")
            .expect("present");
        assert_eq!(row.name, "renamed");
        assert_eq!(row.cpc_bid, 80);
        assert_eq!(row.ad_balance, 125);
    }

    #[test]
    fn eligible_keeps_registration_order_and_gates_on_balance() {
        let ledger = MemoryLedger::new();
        ledger.upsert_listing(&listing("z", 50, 100)).expect("z");
        ledger.upsert_listing(&listing("a", 50, 49)).expect("a");
        ledger.upsert_listing(&listing("m", 10, 10)).expect("m");

        let eligible = ledger.eligible().expect("eligible");
        let ids: Vec<&str> = eligible.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "m"]);
    }

    #[test]
    fn debit_is_conditional_on_covering_balance() {
        let ledger = MemoryLedger::new();
        ledger.upsert_listing(&listing("a", 50, 120)).expect("insert");

        assert_eq!(
            ledger.debit_bid("a").expect("first"),
            DebitOutcome::Applied { new_balance: 70 }
        );
        assert_eq!(
            ledger.debit_bid("a").expect("second"),
            DebitOutcome::Applied { new_balance: 20 }
        );
        assert_eq!(
            ledger.debit_bid("a").expect("third"),
            DebitOutcome::InsufficientBalance
        );
        assert_eq!(
            ledger.debit_bid("missing").expect("missing"),
            DebitOutcome::UnknownAdvertiser
        );
    }

    #[test]
    fn claim_is_at_most_once() {
        let ledger = MemoryLedger::new();
        ledger
            .insert(&ClickEvent::new("c1", "a", "u1", 0))
            .expect("insert");

        assert!(ledger.claim_reward("c1").expect("first claim"));
        assert!(!ledger.claim_reward("c1").expect("second claim"));
        assert!(!ledger.claim_reward("missing").expect("missing"));
    }

    #[test]
    fn settle_claims_and_credits_as_one_unit() {
        let ledger = MemoryLedger::new();
        ledger
            .insert(&ClickEvent::new("c1", "a", "u1", 0))
            .expect("insert");

        let outcome = ledger.settle("c1", "u1", 500).expect("settle");
        assert_eq!(outcome, SettleOutcome::Settled { total_points: 500 });

        let user = UserTrustStore::get(&*ledger, "u1")
            .expect("get user")
            .expect("present");
        assert_eq!(user.tier, TrustTier::Base);
        assert_eq!(user.points, 500);

        assert_eq!(
            ledger.settle("c1", "u1", 500).expect("replay"),
            SettleOutcome::AlreadyClaimed
        );
        assert_eq!(
            ledger.settle("missing", "u1", 500).expect("unknown"),
            SettleOutcome::UnknownClick
        );
    }

    #[test]
    fn promote_upserts_and_never_loses_points() {
        let ledger = MemoryLedger::new();
        ledger.promote("u1").expect("promote absent");
        let user = UserTrustStore::get(&*ledger, "u1")
            .expect("get")
            .expect("created");
        assert_eq!(user.tier, TrustTier::Promoted);
        assert_eq!(user.points, 0);

        ledger.credit_points("u1", 7).expect("credit");
        ledger.promote("u1").expect("promote again");
        let user = UserTrustStore::get(&*ledger, "u1")
            .expect("get")
            .expect("present");
        assert_eq!(user.points, 7);
        assert_eq!(user.tier, TrustTier::Promoted);
    }

    #[test]
    fn insert_is_idempotent_per_click_id() {
        let ledger = MemoryLedger::new();
        let click = ClickEvent::new("c1", "a", "u1", 10);
        assert!(ledger.insert(&click).expect("first"));

        let mut replay = click.clone();
        replay.user_id = "someone_else".to_string();
        assert!(!ledger.insert(&replay).expect("replay"));

        let stored = ClickLedger::get(&*ledger, "c1")
            .expect("get")
            .expect("present");
        assert_eq!(stored.user_id, "u1");
    }
}
