//! Dwell-gated, tier-weighted reward settlement.

use std::sync::Arc;

use contracts::TrustTier;
use serde::Serialize;

use crate::sampler::{Clock, UnitSampler};
use crate::store::{ClickLedger, RewardSettlement, SettleOutcome, UserTrustStore};
use crate::LedgerError;

// Payout table. Bands are cumulative over one draw in [0, 100); the non-zero
// floor at both tiers is a business invariant, not an incidental constant.
const PROMOTED_JACKPOT_BAND: f64 = 5.0;
const PROMOTED_JACKPOT: i64 = 500;
const PROMOTED_MID_BAND: f64 = 20.0;
const PROMOTED_MID: i64 = 50;
const PROMOTED_FLOOR: i64 = 2;
const BASE_JACKPOT_BAND: f64 = 0.1;
const BASE_JACKPOT: i64 = 1_000;
const BASE_FLOOR: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayoutOutcome {
    pub points_won: i64,
    pub total_points: i64,
    pub tier: TrustTier,
}

/// The payout for one draw in `[0, 100)` at the given tier.
pub fn payout_for(tier: TrustTier, draw: f64) -> i64 {
    match tier {
        TrustTier::Promoted if draw < PROMOTED_JACKPOT_BAND => PROMOTED_JACKPOT,
        TrustTier::Promoted if draw < PROMOTED_MID_BAND => PROMOTED_MID,
        TrustTier::Promoted => PROMOTED_FLOOR,
        TrustTier::Base if draw < BASE_JACKPOT_BAND => BASE_JACKPOT,
        TrustTier::Base => BASE_FLOOR,
    }
}

pub struct RewardEngine {
    clicks: Arc<dyn ClickLedger>,
    users: Arc<dyn UserTrustStore>,
    settlement: Arc<dyn RewardSettlement>,
    sampler: Box<dyn UnitSampler>,
    clock: Arc<dyn Clock>,
    dwell_threshold_ms: i64,
}

impl RewardEngine {
    pub fn new(
        clicks: Arc<dyn ClickLedger>,
        users: Arc<dyn UserTrustStore>,
        settlement: Arc<dyn RewardSettlement>,
        sampler: Box<dyn UnitSampler>,
        clock: Arc<dyn Clock>,
        dwell_threshold_ms: i64,
    ) -> Self {
        Self {
            clicks,
            users,
            settlement,
            sampler,
            clock,
            dwell_threshold_ms,
        }
    }

    /// Spin the reward for a click. Preconditions are checked in order and
    /// the first failure wins: click validity (exists, owned by the caller,
    /// unclaimed), then the dwell gate.
    pub fn spin(&mut self, click_id: &str, user_id: &str) -> Result<PayoutOutcome, LedgerError> {
        let Some(click) = self.clicks.get(click_id)? else {
            return Err(LedgerError::InvalidClick);
        };
        if click.user_id != user_id || click.reward_claimed {
            return Err(LedgerError::InvalidClick);
        }

        let elapsed_ms = self.clock.now_ms().saturating_sub(click.clicked_at_ms);
        if elapsed_ms < self.dwell_threshold_ms {
            return Err(LedgerError::DwellNotMet {
                elapsed_ms,
                required_ms: self.dwell_threshold_ms,
            });
        }

        // Absent trust record defaults to base, independent of any later
        // promotion.
        let tier = self
            .users
            .get(user_id)?
            .map(|user| user.tier)
            .unwrap_or(TrustTier::Base);

        let draw = self.sampler.unit() * 100.0;
        let points_won = payout_for(tier, draw);

        match self.settlement.settle(click_id, user_id, points_won)? {
            SettleOutcome::Settled { total_points } => Ok(PayoutOutcome {
                points_won,
                total_points,
                tier,
            }),
            // A concurrent spin won the claim race after our precondition
            // read; it got the payout, we did not.
            SettleOutcome::AlreadyClaimed | SettleOutcome::UnknownClick => {
                Err(LedgerError::InvalidClick)
            }
        }
    }
}
