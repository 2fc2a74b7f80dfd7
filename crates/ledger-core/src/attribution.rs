//! Click issuance, per-click billing, and conversion attribution.

use std::sync::Arc;

use contracts::{ClickEvent, ANONYMOUS_USER_ID};
use uuid::Uuid;

use crate::sampler::Clock;
use crate::store::{BalanceStore, ClickLedger, DebitOutcome, StorageError, UserTrustStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Recorded { user_id: String },
    UnknownClick,
}

/// The click handed back to the redirect path. `debit` is `None` when an
/// existing click id was reused, because the first issuance already billed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedClick {
    pub click: ClickEvent,
    pub debit: Option<DebitOutcome>,
    pub reused: bool,
}

pub struct AttributionEngine {
    balances: Arc<dyn BalanceStore>,
    clicks: Arc<dyn ClickLedger>,
    users: Arc<dyn UserTrustStore>,
    clock: Arc<dyn Clock>,
    reuse_caller_click_id: bool,
}

impl AttributionEngine {
    pub fn new(
        balances: Arc<dyn BalanceStore>,
        clicks: Arc<dyn ClickLedger>,
        users: Arc<dyn UserTrustStore>,
        clock: Arc<dyn Clock>,
        reuse_caller_click_id: bool,
    ) -> Self {
        Self {
            balances,
            clicks,
            users,
            clock,
            reuse_caller_click_id,
        }
    }

    /// Mint (or reuse) a click identity, persist it, and bill the advertiser
    /// its stored bid. An unknown advertiser or an uncovered balance skips
    /// the debit silently: the redirect must still succeed for the visitor.
    pub fn issue_click(
        &self,
        advertiser_id: &str,
        user_id: Option<&str>,
        supplied_click_id: Option<&str>,
    ) -> Result<IssuedClick, StorageError> {
        let user_id = user_id
            .map(str::trim)
            .filter(|candidate| !candidate.is_empty())
            .unwrap_or(ANONYMOUS_USER_ID);

        let click_id = supplied_click_id
            .filter(|_| self.reuse_caller_click_id)
            .map(str::trim)
            .filter(|candidate| !candidate.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(existing) = self.clicks.get(&click_id)? {
            return Ok(IssuedClick {
                click: existing,
                debit: None,
                reused: true,
            });
        }

        let click = ClickEvent::new(click_id, advertiser_id, user_id, self.clock.now_ms());
        if !self.clicks.insert(&click)? {
            // Lost an insert race on the same id; the first writer billed it.
            let existing = self.clicks.get(&click.id)?.unwrap_or(click);
            return Ok(IssuedClick {
                click: existing,
                debit: None,
                reused: true,
            });
        }

        let debit = self.balances.debit_bid(advertiser_id)?;
        Ok(IssuedClick {
            click,
            debit: Some(debit),
            reused: false,
        })
    }

    /// Flag the click as converted and promote its owner. Best-effort: the
    /// signal channel is untrusted, so unknown ids are no-ops, and repeats
    /// after the first are harmless.
    pub fn record_conversion(&self, click_id: &str) -> Result<ConversionOutcome, StorageError> {
        match self.clicks.flag_conversion(click_id)? {
            Some(user_id) => {
                self.users.promote(&user_id)?;
                Ok(ConversionOutcome::Recorded { user_id })
            }
            None => Ok(ConversionOutcome::UnknownClick),
        }
    }
}
