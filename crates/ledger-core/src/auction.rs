//! Balance-gated top-K selection over eligible advertisers.

use std::cmp::Ordering;
use std::sync::Arc;

use contracts::Advertiser;

use crate::sampler::UnitSampler;
use crate::store::{BalanceStore, StorageError};

/// Pluggable relevance scoring in `[0, 1)`.
pub trait RelevanceModel: Send {
    fn relevance(&mut self, query: &str, advertiser: &Advertiser) -> f64;
}

/// Reference model: an independent uniform draw per candidate per call, no
/// caching and no determinism across calls.
pub struct UniformRelevance {
    sampler: Box<dyn UnitSampler>,
}

impl UniformRelevance {
    pub fn new(sampler: Box<dyn UnitSampler>) -> Self {
        Self { sampler }
    }
}

impl RelevanceModel for UniformRelevance {
    fn relevance(&mut self, _query: &str, _advertiser: &Advertiser) -> f64 {
        self.sampler.unit()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedPlacement {
    pub advertiser: Advertiser,
    pub score: f64,
}

pub struct AuctionEngine {
    balances: Arc<dyn BalanceStore>,
    relevance: Box<dyn RelevanceModel>,
    top_k: usize,
}

impl AuctionEngine {
    pub fn new(
        balances: Arc<dyn BalanceStore>,
        relevance: Box<dyn RelevanceModel>,
        top_k: usize,
    ) -> Self {
        Self {
            balances,
            relevance,
            top_k,
        }
    }

    /// Rank the eligible advertisers for a query. Read-only; an exhausted
    /// advertiser never occupies a slot because gating happens at the store.
    /// An empty eligible set yields an empty list, not an error.
    pub fn rank(&mut self, query: &str) -> Result<Vec<RankedPlacement>, StorageError> {
        let mut ranked: Vec<RankedPlacement> = self
            .balances
            .eligible()?
            .into_iter()
            .map(|advertiser| {
                let relevance = self.relevance.relevance(query, &advertiser);
                let score = relevance * advertiser.cpc_bid as f64;
                RankedPlacement { advertiser, score }
            })
            .collect();

        // Stable sort keeps retrieval order for tied scores.
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(self.top_k);
        Ok(ranked)
    }
}
