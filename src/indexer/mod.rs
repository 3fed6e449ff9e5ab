//! Event-log replay indexer.
//!
//! Pulls all transaction events of a given subtype from a remote node's
//! paginated event log and applies them through a visitor, rebuilding the
//! local mapping between a send identifier and its inbound/outbound
//! transaction hashes. The indexer itself keeps no checkpoint; resumability
//! comes from the sink's primary-key idempotent inserts.

use async_trait::async_trait;

use crate::error::{QueryError, SinkError, VisitError};

pub mod query;
pub mod sink;

pub use query::HttpEventQuery;
pub use sink::EventSink;

/// Fixed page size for event-log fetches.
pub const PAGE_LIMIT: u64 = 50;

/// Event subtype emitted when an inbound send is finalized on the appchain.
pub const EVENT_SEND_FINALIZED: &str = "SendFinalized";
/// Event subtype emitted when the outbound settlement transaction is mined.
pub const EVENT_SEND_MINED: &str = "SendMined";

/// One transaction event from the remote log.
#[derive(Debug, Clone)]
pub struct TxEvent {
    pub tx_hash: String,
    pub height: u64,
    pub attributes: Vec<(String, String)>,
}

impl TxEvent {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One page of events plus the total count across all pages.
#[derive(Debug, Clone)]
pub struct TxEventPage {
    pub events: Vec<TxEvent>,
    pub total: u64,
}

/// The remote transaction-event query boundary.
#[async_trait]
pub trait TxEventQuery: Send + Sync {
    async fn tx_events(
        &self,
        subtype: &str,
        offset: u64,
        limit: u64,
    ) -> Result<TxEventPage, QueryError>;
}

/// Applies one event; an error aborts the visitation.
#[async_trait]
pub trait EventVisitor: Send {
    async fn visit(&mut self, event: &TxEvent) -> Result<(), SinkError>;
}

/// Visit every event of `subtype` from `start_offset` onward, in the remote
/// service's ascending order, fetching pages until `offset >= total`.
///
/// Returns the number of events processed. On failure the count processed
/// so far travels inside the error; the caller decides whether to resume.
pub async fn visit_all<Q, V>(
    query: &Q,
    subtype: &str,
    start_offset: u64,
    visitor: &mut V,
) -> Result<u64, VisitError>
where
    Q: TxEventQuery + ?Sized,
    V: EventVisitor + ?Sized,
{
    let mut offset = start_offset;
    let mut processed = 0u64;

    loop {
        let page = query
            .tx_events(subtype, offset, PAGE_LIMIT)
            .await
            .map_err(|source| VisitError::Pagination { processed, source })?;

        let fetched = page.events.len() as u64;
        for event in &page.events {
            visitor
                .visit(event)
                .await
                .map_err(|source| VisitError::Process { processed, source })?;
            processed += 1;
        }

        offset += fetched;
        if offset >= page.total || fetched == 0 {
            break;
        }
    }

    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves `total` synthetic events in pages of `page_size`, counting
    /// fetches.
    struct MockQuery {
        total: u64,
        page_size: u64,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl TxEventQuery for MockQuery {
        async fn tx_events(
            &self,
            _subtype: &str,
            offset: u64,
            _limit: u64,
        ) -> Result<TxEventPage, QueryError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let end = (offset + self.page_size).min(self.total);
            let events = (offset..end)
                .map(|i| TxEvent {
                    tx_hash: format!("tx-{i}"),
                    height: i,
                    attributes: vec![],
                })
                .collect();
            Ok(TxEventPage {
                events,
                total: self.total,
            })
        }
    }

    struct Collector {
        seen: Vec<String>,
    }

    #[async_trait]
    impl EventVisitor for Collector {
        async fn visit(&mut self, event: &TxEvent) -> Result<(), SinkError> {
            self.seen.push(event.tx_hash.clone());
            Ok(())
        }
    }

    struct FailAfter {
        remaining: u32,
    }

    #[async_trait]
    impl EventVisitor for FailAfter {
        async fn visit(&mut self, _event: &TxEvent) -> Result<(), SinkError> {
            if self.remaining == 0 {
                return Err(SinkError::MissingAttribute {
                    tx_hash: "tx".to_string(),
                    attribute: "send_hash".to_string(),
                });
            }
            self.remaining -= 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_five_events_page_two_is_three_fetches() {
        let query = MockQuery {
            total: 5,
            page_size: 2,
            fetches: AtomicU32::new(0),
        };
        let mut collector = Collector { seen: vec![] };

        let processed = visit_all(&query, EVENT_SEND_FINALIZED, 0, &mut collector)
            .await
            .unwrap();
        assert_eq!(processed, 5);
        assert_eq!(query.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(
            collector.seen,
            vec!["tx-0", "tx-1", "tx-2", "tx-3", "tx-4"],
            "events must arrive in ascending remote order"
        );
    }

    #[tokio::test]
    async fn test_completeness_across_page_sizes() {
        for page_size in [1u64, 3, 7, 50] {
            let query = MockQuery {
                total: 23,
                page_size,
                fetches: AtomicU32::new(0),
            };
            let mut collector = Collector { seen: vec![] };
            let processed = visit_all(&query, EVENT_SEND_MINED, 0, &mut collector)
                .await
                .unwrap();
            assert_eq!(processed, 23, "page size {page_size}");
        }
    }

    #[tokio::test]
    async fn test_start_offset_skips_prefix() {
        let query = MockQuery {
            total: 10,
            page_size: 4,
            fetches: AtomicU32::new(0),
        };
        let mut collector = Collector { seen: vec![] };
        let processed = visit_all(&query, EVENT_SEND_FINALIZED, 6, &mut collector)
            .await
            .unwrap();
        assert_eq!(processed, 4);
        assert_eq!(collector.seen.first().map(String::as_str), Some("tx-6"));
    }

    #[tokio::test]
    async fn test_empty_log() {
        let query = MockQuery {
            total: 0,
            page_size: 2,
            fetches: AtomicU32::new(0),
        };
        let mut collector = Collector { seen: vec![] };
        let processed = visit_all(&query, EVENT_SEND_FINALIZED, 0, &mut collector)
            .await
            .unwrap();
        assert_eq!(processed, 0);
        assert_eq!(query.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_visitor_error_reports_partial_progress() {
        let query = MockQuery {
            total: 10,
            page_size: 4,
            fetches: AtomicU32::new(0),
        };
        let mut visitor = FailAfter { remaining: 6 };
        let err = visit_all(&query, EVENT_SEND_FINALIZED, 0, &mut visitor)
            .await
            .unwrap_err();
        assert_eq!(err.processed(), 6);
        assert!(matches!(err, VisitError::Process { .. }));
    }
}
