use async_trait::async_trait;

use crate::errors::StoreError;
use crate::query::{AppendCondition, DcbEvent, Query, SequencedEvent};
use crate::types::StoreStream;

/// Storage backends implement this to provide the DCB recorder contract:
/// an append/read algebra over a single globally-ordered event log, with
/// consistency enforced per-append by a predicate over types and tags.
///
/// Both the in-memory backend and the durable Postgres backend (in either
/// of its TS/TT index-encoding variants) implement this trait and must be
/// behaviorally indistinguishable to callers.
#[async_trait]
pub trait DcbRecorder: Send + Sync + 'static {
    /// Append `events` (must be non-empty), optionally failing if
    /// `condition.fail_if_events_match` matches any event with position
    /// greater than `condition.after` (or position > 0 if unset). Returns
    /// the greatest position assigned to this batch.
    async fn append(
        &self,
        events: Vec<DcbEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<i64, StoreError>;

    /// Read events with position greater than `after` (0 if unset) that
    /// match `query` (match-all if unset), ascending by position,
    /// truncated to `limit` if given. Returns the matching events plus the
    /// store's head position (see [`crate::query`] module docs on how
    /// `head` is defined when `limit` is set).
    async fn read(
        &self,
        query: Option<Query>,
        after: Option<i64>,
        limit: Option<i64>,
    ) -> Result<(Vec<SequencedEvent>, Option<i64>), StoreError>;

    /// Best-effort notification stream: yields every [`SequencedEvent`]
    /// whose position is greater than `after` and which matches `query`,
    /// first by replaying committed history, then live as new events
    /// commit. Not required for correctness — polling `read` with an
    /// advancing `after` is always sufficient.
    fn subscribe(&self, query: Option<Query>, after: i64) -> StoreStream<SequencedEvent>;
}
