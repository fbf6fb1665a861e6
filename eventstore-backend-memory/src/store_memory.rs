use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::{self as ts, StreamExt};

use eventstore_core::{
    query::{AppendCondition, DcbEvent, Query, SequencedEvent},
    DcbRecorder, StoreError, StoreStream,
};

/// Reference in-memory implementation of the DCB recorder contract.
///
/// Positions are assigned from a single monotonically increasing counter
/// guarded by the same write lock used to evaluate the append condition, so
/// the fail-fast existence check and the insert are serialized against
/// other appends in one critical section — the in-process analogue of the
/// table-level exclusive lock the durable backend takes.
pub struct InMemoryStore {
    events: RwLock<Vec<SequencedEvent>>,
    tx: broadcast::Sender<SequencedEvent>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(1024);
        Arc::new(Self {
            events: RwLock::new(Vec::new()),
            tx,
        })
    }

    fn matching<'a>(
        events: &'a [SequencedEvent],
        query: &'a Query,
        after: i64,
    ) -> impl Iterator<Item = &'a SequencedEvent> {
        events
            .iter()
            .filter(move |se| se.position > after && query.matches(&se.event))
    }
}

#[async_trait]
impl DcbRecorder for InMemoryStore {
    async fn append(
        &self,
        events: Vec<DcbEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<i64, StoreError> {
        if events.is_empty() {
            return Err(StoreError::programming(
                "append requires at least one event",
            ));
        }

        let mut store = self.events.write();

        if let Some(condition) = &condition {
            let after = condition.floor();
            if let Some(hit) =
                Self::matching(&store, &condition.fail_if_events_match, after).next()
            {
                return Err(StoreError::integrity_at(
                    "append condition matched an existing event",
                    hit.position,
                ));
            }
        }

        let mut next_position = store.last().map(|e| e.position).unwrap_or(0) + 1;
        let mut last_position = next_position - 1;
        for event in events {
            let sequenced = SequencedEvent {
                event,
                position: next_position,
            };
            store.push(sequenced.clone());
            last_position = next_position;
            next_position += 1;
            let _ = self.tx.send(sequenced);
        }

        Ok(last_position)
    }

    async fn read(
        &self,
        query: Option<Query>,
        after: Option<i64>,
        limit: Option<i64>,
    ) -> Result<(Vec<SequencedEvent>, Option<i64>), StoreError> {
        let query = query.unwrap_or_default();
        let after = after.unwrap_or(0);
        let store = self.events.read();

        let mut matched: Vec<SequencedEvent> =
            Self::matching(&store, &query, after).cloned().collect();

        if let Some(limit) = limit {
            let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
            matched.truncate(limit);
            let head = matched.last().map(|e| e.position);
            Ok((matched, head))
        } else {
            let head = store.last().map(|e| e.position);
            Ok((matched, head))
        }
    }

    fn subscribe(&self, query: Option<Query>, after: i64) -> StoreStream<SequencedEvent> {
        let query = Arc::new(query.unwrap_or_default());

        let replay: Vec<Result<SequencedEvent, StoreError>> = {
            let store = self.events.read();
            Self::matching(&store, &query, after)
                .cloned()
                .map(Ok)
                .collect()
        };
        let replay_stream = ts::iter(replay);

        let rx = self.tx.subscribe();
        let live_query = query.clone();
        let live = ts::wrappers::BroadcastStream::new(rx).filter_map(move |res| match res {
            Ok(event) if event.position > after && live_query.matches(&event.event) => {
                Some(Ok(event))
            }
            Ok(_) => None,
            Err(_) => None,
        });

        Box::pin(replay_stream.chain(live))
    }
}
