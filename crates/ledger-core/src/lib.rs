//! Core engines and storage seams for the click-attribution and incentive
//! ledger: balance-gated ad auctions, click issuance with per-click billing,
//! conversion attribution, and dwell-gated reward settlement.

use std::fmt;

pub mod attribution;
pub mod auction;
pub mod reward;
pub mod sampler;
pub mod store;

pub use attribution::{AttributionEngine, ConversionOutcome, IssuedClick};
pub use auction::{AuctionEngine, RankedPlacement, RelevanceModel, UniformRelevance};
pub use reward::{payout_for, PayoutOutcome, RewardEngine};
pub use sampler::{Clock, ManualClock, RandomSampler, SequenceSampler, SystemClock, UnitSampler};
pub use store::{
    BalanceStore, ClickLedger, DebitOutcome, LedgerStores, MemoryLedger, RewardSettlement,
    SettleOutcome, StorageError, UserTrustStore,
};

/// Failure modes of ledger operations reachable from untrusted input.
/// `InvalidClick` deliberately covers missing, foreign, and already-claimed
/// clicks alike so callers cannot probe which ids exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InvalidClick,
    DwellNotMet { elapsed_ms: i64, required_ms: i64 },
    Storage(StorageError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidClick => write!(f, "click is invalid or already claimed"),
            Self::DwellNotMet {
                elapsed_ms,
                required_ms,
            } => write!(
                f,
                "dwell time not met: {elapsed_ms}ms elapsed of {required_ms}ms required"
            ),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}
