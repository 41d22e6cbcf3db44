use analysis_core::{AnalysisResult, Asset, LedgerApi, OrderBookEntry, OrderBookSnapshot};
use std::time::Instant;

/// Offers requested per side
pub const BOOK_LIMIT: u32 = 50;

/// Both sides of the token/counter book, fetched concurrently.
///
/// Bids are offers giving the token for the counter asset, asks the reverse.
/// Either side failing fails the snapshot.
pub async fn fetch_order_book(
    ledger: &dyn LedgerApi,
    token: &Asset,
    counter: &Asset,
    limit: u32,
) -> AnalysisResult<OrderBookSnapshot> {
    let started = Instant::now();
    let (bids, asks) = tokio::try_join!(
        ledger.book_offers(token, counter, limit),
        ledger.book_offers(counter, token, limit),
    )?;

    let snapshot = OrderBookSnapshot {
        bids: bids.into_iter().map(OrderBookEntry::from).collect(),
        asks: asks.into_iter().map(OrderBookEntry::from).collect(),
    };

    tracing::info!(
        bids = snapshot.bids.len(),
        asks = snapshot.asks.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "orderbook.ok"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use analysis_core::AnalysisError;

    #[tokio::test]
    async fn test_sides_are_fetched_separately() {
        let ledger = FakeLedger {
            bids: vec![offer("0.5"), offer("0.6")],
            asks: vec![offer("2")],
            ..Default::default()
        };

        let snapshot = fetch_order_book(&ledger, &Asset::issued("USD", ISSUER), &Asset::xrp(), BOOK_LIMIT)
            .await
            .unwrap();
        assert_eq!(snapshot.bids.len(), 2);
        assert_eq!(snapshot.asks.len(), 1);
        assert_eq!(snapshot.bids[0].price, Some(0.5));
        assert_eq!(snapshot.asks[0].price, Some(2.0));
        assert_eq!(ledger.count("book_offers"), 2);
    }

    #[tokio::test]
    async fn test_empty_book() {
        let ledger = FakeLedger::default();
        let snapshot = fetch_order_book(&ledger, &Asset::issued("USD", ISSUER), &Asset::xrp(), BOOK_LIMIT)
            .await
            .unwrap();
        assert_eq!(snapshot, OrderBookSnapshot::default());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_fails_snapshot() {
        let ledger = FakeLedger::offline();
        let err = fetch_order_book(&ledger, &Asset::issued("USD", ISSUER), &Asset::xrp(), BOOK_LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Connection(_)));
    }
}
