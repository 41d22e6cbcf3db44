//! Holder distribution from the issuer's trust lines.
//!
//! From the issuer's side a holder's line carries a negative balance; the
//! magnitude is what the holder owns. Lines at zero or in the issuer's favour
//! are ignored.

use analysis_core::{
    currency, AnalysisResult, Concentration, HolderCountSource, HolderRecord, HolderReport,
    LedgerApi, MarketDataProvider, TokenId, TrustLine,
};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Trust lines requested per `account_lines` page
pub const PAGE_SIZE: u32 = 400;

#[derive(Clone)]
pub struct HolderScanner {
    ledger: Arc<dyn LedgerApi>,
    /// Consulted for an estimated count when the scan finds nobody
    estimator: Option<Arc<dyn MarketDataProvider>>,
}

impl HolderScanner {
    pub fn new(ledger: Arc<dyn LedgerApi>, estimator: Option<Arc<dyn MarketDataProvider>>) -> Self {
        Self { ledger, estimator }
    }

    /// Page through the issuer's trust lines until `limit` holders have been
    /// seen or the ledger runs out of pages.
    pub async fn scan_holders(
        &self,
        issuer: &str,
        currency_code: &str,
        limit: usize,
    ) -> AnalysisResult<HolderReport> {
        let started = Instant::now();
        let code = currency_code.to_uppercase();
        let symbol = currency::display_symbol(&code);

        let mut holders = Vec::new();
        let mut marker = None;
        let mut pages = 0u32;

        loop {
            let page = self.ledger.account_lines(issuer, PAGE_SIZE, marker).await?;
            pages += 1;
            holders.extend(
                page.lines
                    .iter()
                    .filter_map(|line| holder_from_line(line, &symbol, &code)),
            );

            marker = page.marker.filter(|m| !m.is_null());
            if holders.len() >= limit || marker.is_none() {
                break;
            }
        }

        let mut report = build_report(holders, limit, pages);
        if report.total_holders == 0 {
            if let Some(estimate) = self.estimate(issuer, currency_code).await {
                report.total_holders = estimate;
                report.holder_count_source = HolderCountSource::Estimated;
            }
        }

        tracing::info!(
            issuer = %issuer,
            holders = report.total_holders,
            source = ?report.holder_count_source,
            pages,
            duration_ms = started.elapsed().as_millis() as u64,
            "holders.ok"
        );
        Ok(report)
    }

    async fn estimate(&self, issuer: &str, currency_code: &str) -> Option<u64> {
        let provider = self.estimator.as_ref()?;
        match provider.token_info(&TokenId::new(issuer, currency_code)).await {
            Ok(info) => info.and_then(|i| i.holders),
            Err(e) => {
                tracing::debug!(provider = provider.name(), error = %e, "holders.estimate.error");
                None
            }
        }
    }
}

/// The holder behind a trust line, when the line is for this token and the
/// holder's side is positive.
pub fn holder_from_line(line: &TrustLine, symbol: &str, code: &str) -> Option<HolderRecord> {
    let same_token = (!symbol.is_empty() && line.currency == symbol)
        || line.currency.eq_ignore_ascii_case(code);
    if !same_token {
        return None;
    }

    let balance: f64 = line.balance.trim().parse().ok()?;
    if balance < 0.0 {
        Some(HolderRecord {
            account: line.account.clone(),
            balance: balance.abs(),
        })
    } else {
        None
    }
}

/// Rank holders, compute concentration over every scanned holder and keep
/// the top `limit`.
pub fn build_report(mut holders: Vec<HolderRecord>, limit: usize, pages: u32) -> HolderReport {
    holders.sort_by(|a, b| b.balance.partial_cmp(&a.balance).unwrap_or(Ordering::Equal));

    let total_balance: f64 = holders.iter().map(|h| h.balance).sum();
    let share = |n: usize| {
        if total_balance > 0.0 {
            holders.iter().take(n).map(|h| h.balance).sum::<f64>() / total_balance * 100.0
        } else {
            0.0
        }
    };
    let concentration = Concentration {
        top10_pct: share(10),
        top50_pct: share(50),
    };

    let total_holders = holders.len() as u64;
    holders.truncate(limit);

    HolderReport {
        total_holders,
        total_balance,
        concentration,
        top: holders,
        holder_count_source: HolderCountSource::Exact,
        pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use analysis_core::{AnalysisError, DataSource};

    fn scanner(ledger: FakeLedger, estimator: Option<FakeProvider>) -> (Arc<FakeLedger>, HolderScanner) {
        let ledger = Arc::new(ledger);
        let estimator = estimator.map(|p| Arc::new(p) as Arc<dyn MarketDataProvider>);
        (ledger.clone(), HolderScanner::new(ledger, estimator))
    }

    #[test]
    fn test_holder_from_line_filters() {
        assert_eq!(
            holder_from_line(&line("rA", "-12.5", "USD"), "USD", USD_HEX),
            Some(HolderRecord {
                account: "rA".into(),
                balance: 12.5
            })
        );
        // hex match is case-insensitive
        assert!(holder_from_line(&line("rA", "-1", &USD_HEX.to_lowercase()), "USD", USD_HEX).is_some());
        // issuer-favour and empty lines
        assert!(holder_from_line(&line("rA", "3", "USD"), "USD", USD_HEX).is_none());
        assert!(holder_from_line(&line("rA", "0", "USD"), "USD", USD_HEX).is_none());
        assert!(holder_from_line(&line("rA", "-0", "USD"), "USD", USD_HEX).is_none());
        // other tokens of the same issuer
        assert!(holder_from_line(&line("rA", "-5", "EUR"), "USD", USD_HEX).is_none());
        assert!(holder_from_line(&line("rA", "junk", "USD"), "USD", USD_HEX).is_none());
    }

    #[test]
    fn test_build_report_concentration() {
        let holders: Vec<HolderRecord> = (1..=20)
            .map(|i| HolderRecord {
                account: format!("r{}", i),
                balance: i as f64,
            })
            .collect();

        let report = build_report(holders, 5, 1);
        assert_eq!(report.total_holders, 20);
        assert_eq!(report.total_balance, 210.0);
        assert_eq!(report.top.len(), 5);
        assert_eq!(report.top[0].balance, 20.0);
        assert!(report.top.windows(2).all(|w| w[0].balance >= w[1].balance));

        // top 10 are 11..=20
        let expected = 155.0 / 210.0 * 100.0;
        assert!((report.concentration.top10_pct - expected).abs() < 1e-9);
        assert!((report.concentration.top50_pct - 100.0).abs() < 1e-9);
        assert!(report.concentration.top10_pct <= report.concentration.top50_pct);
    }

    #[test]
    fn test_build_report_empty() {
        let report = build_report(Vec::new(), 50, 1);
        assert_eq!(report.total_holders, 0);
        assert_eq!(report.concentration, Concentration::default());
        assert!(report.top.is_empty());
    }

    #[tokio::test]
    async fn test_scan_follows_markers() {
        let (ledger, scanner) = scanner(
            FakeLedger {
                pages: vec![
                    vec![line("rA", "-10", "USD"), line("rB", "5", "USD")],
                    vec![line("rC", "-30", USD_HEX)],
                    vec![line("rD", "-20", "USD"), line("rE", "-1", "EUR")],
                ],
                ..Default::default()
            },
            None,
        );

        let report = scanner.scan_holders(ISSUER, USD_HEX, 50).await.unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(ledger.count("account_lines"), 3);
        assert_eq!(report.total_holders, 3);
        assert_eq!(report.total_balance, 60.0);
        let ranked: Vec<&str> = report.top.iter().map(|h| h.account.as_str()).collect();
        assert_eq!(ranked, vec!["rC", "rD", "rA"]);
        assert_eq!(report.holder_count_source, HolderCountSource::Exact);
    }

    #[tokio::test]
    async fn test_scan_stops_once_limit_reached() {
        let (ledger, scanner) = scanner(
            FakeLedger {
                pages: vec![
                    vec![line("rA", "-1", "USD"), line("rB", "-2", "USD")],
                    vec![line("rC", "-3", "USD")],
                ],
                ..Default::default()
            },
            None,
        );

        let report = scanner.scan_holders(ISSUER, "USD", 2).await.unwrap();
        assert_eq!(ledger.count("account_lines"), 1);
        assert_eq!(report.pages, 1);
        assert_eq!(report.top.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_scan_uses_estimate() {
        let (_, scanner) = scanner(
            FakeLedger {
                pages: vec![vec![line("rA", "4", "USD")]],
                ..Default::default()
            },
            Some(FakeProvider::returning(
                "primary",
                Ok(Some(token_info(DataSource::Primary, Some(987), None))),
            )),
        );

        let report = scanner.scan_holders(ISSUER, USD_HEX, 50).await.unwrap();
        assert_eq!(report.total_holders, 987);
        assert_eq!(report.holder_count_source, HolderCountSource::Estimated);
        assert!(report.top.is_empty());
    }

    #[tokio::test]
    async fn test_empty_scan_without_estimate_stays_exact() {
        let (_, scanner) = scanner(
            FakeLedger {
                pages: vec![vec![]],
                ..Default::default()
            },
            Some(FakeProvider::returning(
                "primary",
                Err(AnalysisError::Upstream("xrplto.token HTTP 503".into())),
            )),
        );

        let report = scanner.scan_holders(ISSUER, USD_HEX, 50).await.unwrap();
        assert_eq!(report.total_holders, 0);
        assert_eq!(report.holder_count_source, HolderCountSource::Exact);
    }

    #[tokio::test]
    async fn test_unreachable_ledger_escalates() {
        let (_, scanner) = scanner(FakeLedger::offline(), None);
        let err = scanner.scan_holders(ISSUER, "USD", 50).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Connection(_)));
    }
}
