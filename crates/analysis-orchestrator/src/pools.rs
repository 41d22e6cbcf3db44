//! AMM pool resolution.
//!
//! Nodes differ in which lookups they support and in which asset order they
//! index a pool under, so resolution walks a fixed cascade and stops at the
//! first lookup that yields a pool.

use analysis_core::{
    AnalysisError, AnalysisResult, Asset, LedgerApi, PoolInfo, PoolResolution, PoolSource,
};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLookup {
    AmmInfo,
    AmmInfoReversed,
    LedgerEntry,
    LedgerEntryReversed,
}

pub const CASCADE: [PoolLookup; 4] = [
    PoolLookup::AmmInfo,
    PoolLookup::AmmInfoReversed,
    PoolLookup::LedgerEntry,
    PoolLookup::LedgerEntryReversed,
];

impl PoolLookup {
    pub fn source(self) -> PoolSource {
        match self {
            PoolLookup::AmmInfo | PoolLookup::AmmInfoReversed => PoolSource::AmmInfo,
            PoolLookup::LedgerEntry | PoolLookup::LedgerEntryReversed => PoolSource::LedgerEntry,
        }
    }

    pub fn reversed(self) -> bool {
        matches!(self, PoolLookup::AmmInfoReversed | PoolLookup::LedgerEntryReversed)
    }
}

#[derive(Clone)]
pub struct PoolResolver {
    ledger: Arc<dyn LedgerApi>,
}

impl PoolResolver {
    pub fn new(ledger: Arc<dyn LedgerApi>) -> Self {
        Self { ledger }
    }

    /// First pool found by the cascade, or `NoPool` carrying every lookup
    /// failure, whether the node answered or not.
    pub async fn resolve_pool(&self, asset: &Asset, counter: &Asset) -> PoolResolution {
        let mut failures = Vec::with_capacity(CASCADE.len());

        for lookup in CASCADE {
            match self.lookup(lookup, asset, counter).await {
                Ok(info) => {
                    tracing::info!(lookup = ?lookup, account = ?info.account, "amm.resolved");
                    return PoolResolution::Found(info);
                }
                Err(e) => {
                    tracing::debug!(lookup = ?lookup, error = %e, "amm.lookup.miss");
                    failures.push(format!("{:?}: {}", lookup, e));
                }
            }
        }

        tracing::info!(attempts = failures.len(), "amm.no_pool");
        PoolResolution::NoPool {
            message: failures.join("; "),
        }
    }

    async fn lookup(&self, lookup: PoolLookup, asset: &Asset, counter: &Asset) -> AnalysisResult<PoolInfo> {
        let reversed = lookup.reversed();
        let (first, second) = if reversed { (counter, asset) } else { (asset, counter) };

        match lookup.source() {
            PoolSource::AmmInfo => {
                let result = self.ledger.amm_info(first, second).await?;
                parse_amm_info(&result, reversed)
            }
            PoolSource::LedgerEntry => {
                let result = self.ledger.amm_ledger_entry(first, second).await?;
                parse_ledger_entry(&result, reversed)
            }
        }
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn field(value: &Value, key: &str) -> Option<Value> {
    value.get(key).filter(|v| !v.is_null()).cloned()
}

fn fee(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|f| u32::try_from(f).ok())
}

fn slots(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// `amm_info` answers with `{"amm": {...}}` in lower snake case.
pub fn parse_amm_info(result: &Value, reversed: bool) -> AnalysisResult<PoolInfo> {
    let amm = result
        .get("amm")
        .filter(|a| a.is_object())
        .ok_or_else(|| AnalysisError::InvalidData("amm_info result carries no amm object".into()))?;

    Ok(PoolInfo {
        source: PoolSource::AmmInfo,
        reversed,
        account: text(amm, "account"),
        amount: field(amm, "amount"),
        amount2: field(amm, "amount2"),
        lp_token: field(amm, "lp_token"),
        trading_fee: fee(amm, "trading_fee"),
        vote_slots: slots(amm, "vote_slots"),
    })
}

/// `ledger_entry` answers with the raw ledger object under `node`.
pub fn parse_ledger_entry(result: &Value, reversed: bool) -> AnalysisResult<PoolInfo> {
    let node = result
        .get("node")
        .filter(|n| n.is_object())
        .ok_or_else(|| AnalysisError::InvalidData("ledger_entry result carries no node".into()))?;

    Ok(PoolInfo {
        source: PoolSource::LedgerEntry,
        reversed,
        account: text(node, "Account"),
        amount: field(node, "Amount"),
        amount2: field(node, "Amount2"),
        lp_token: field(node, "LPTokenBalance"),
        trading_fee: fee(node, "TradingFee"),
        vote_slots: slots(node, "VoteSlots"),
    })
}
