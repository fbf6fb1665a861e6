//! Thin facade over a [`DcbRecorder`] + [`Mapper`] pair, giving typed
//! `put`/`get` in terms of caller-level consistency-boundary selectors
//! instead of raw [`Query`]/[`AppendCondition`] values (spec §4.4).
//! Repository/perspective projection machinery sits above and outside this
//! module — it only specifies the core-facing contract those layers call.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::errors::StoreError;
use crate::mapper::Mapper;
use crate::query::{AppendCondition, Query, QueryItem, SequencedEvent};
use crate::trait_event_store::DcbRecorder;

/// A consistency-boundary selector: one [`QueryItem`] expressed in the
/// facade's vocabulary. A list of selectors is ORed together, exactly like
/// a [`Query`]'s items.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    pub types: Vec<String>,
    pub tags: Vec<String>,
}

impl Selector {
    pub fn new(
        types: impl IntoIterator<Item = impl Into<String>>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_tags(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(Vec::<String>::new(), tags)
    }
}

impl From<Selector> for QueryItem {
    fn from(s: Selector) -> Self {
        QueryItem::new(s.types, s.tags)
    }
}

fn cb_to_query(cb: Option<Vec<Selector>>) -> Query {
    Query::new(cb.unwrap_or_default().into_iter().map(Into::into))
}

/// `put`/`get` over domain events of type `E`, delegating serialization to
/// `M` and storage to any [`DcbRecorder`].
pub struct EventStoreFacade<E, M> {
    recorder: Arc<dyn DcbRecorder>,
    mapper: M,
    _marker: PhantomData<fn() -> E>,
}

impl<E, M> EventStoreFacade<E, M>
where
    M: Mapper<E>,
{
    pub fn new(recorder: Arc<dyn DcbRecorder>, mapper: M) -> Self {
        Self {
            recorder,
            mapper,
            _marker: PhantomData,
        }
    }

    /// Append `events`. With neither `cb` nor `after`, appends
    /// unconditionally. With only `after`, the fail-condition is "any event
    /// after that position" (match-all query). With `cb`, each selector
    /// compiles to a [`QueryItem`] and the selectors combine into the
    /// fail-condition query.
    pub async fn put(
        &self,
        events: Vec<E>,
        cb: Option<Vec<Selector>>,
        after: Option<i64>,
    ) -> Result<i64, StoreError> {
        let condition = if cb.is_none() && after.is_none() {
            None
        } else {
            Some(AppendCondition::new(cb_to_query(cb), after))
        };

        let dcb_events = events
            .iter()
            .map(|e| self.mapper.to_store(e))
            .collect::<Result<Vec<_>, _>>()?;

        self.recorder.append(dcb_events, condition).await
    }

    /// Read domain events matching `cb` (match-all if `None`), decoded
    /// through the mapper, plus the store's head position.
    pub async fn get(
        &self,
        cb: Option<Vec<Selector>>,
        after: Option<i64>,
    ) -> Result<(Vec<E>, Option<i64>), StoreError> {
        let query = cb_to_query(cb);
        let (events, head) = self.recorder.read(Some(query), after, None).await?;
        let decoded = events
            .iter()
            .map(|s| self.mapper.to_domain(&s.event))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((decoded, head))
    }

    /// Like [`Self::get`], but pairs each decoded event with the position
    /// it was recorded at, for callers that need to track last-seen
    /// position per event rather than only the head.
    pub async fn get_with_positions(
        &self,
        cb: Option<Vec<Selector>>,
        after: Option<i64>,
    ) -> Result<Vec<(E, i64)>, StoreError> {
        let query = cb_to_query(cb);
        let (events, _head) = self.recorder.read(Some(query), after, None).await?;
        events
            .iter()
            .map(|s: &SequencedEvent| Ok((self.mapper.to_domain(&s.event)?, s.position)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{DomainEvent, JsonMapper};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct StudentRegistered {
        tags: Vec<String>,
    }

    impl DomainEvent for StudentRegistered {
        fn event_type(&self) -> &str {
            "StudentRegistered"
        }

        fn tags(&self) -> Vec<String> {
            self.tags.clone()
        }
    }

    struct NoopRecorder {
        inner: tokio::sync::Mutex<Vec<SequencedEvent>>,
    }

    #[async_trait::async_trait]
    impl DcbRecorder for NoopRecorder {
        async fn append(
            &self,
            events: Vec<crate::query::DcbEvent>,
            condition: Option<AppendCondition>,
        ) -> Result<i64, StoreError> {
            let mut guard = self.inner.lock().await;
            if events.is_empty() {
                return Err(StoreError::programming("empty batch"));
            }
            if let Some(cond) = condition {
                let after = cond.floor();
                if guard
                    .iter()
                    .any(|s| s.position > after && cond.fail_if_events_match.matches(&s.event))
                {
                    return Err(StoreError::integrity("condition matched"));
                }
            }
            let mut pos = guard.last().map(|s| s.position).unwrap_or(0);
            for event in events {
                pos += 1;
                guard.push(SequencedEvent {
                    event,
                    position: pos,
                });
            }
            Ok(pos)
        }

        async fn read(
            &self,
            query: Option<Query>,
            after: Option<i64>,
            _limit: Option<i64>,
        ) -> Result<(Vec<SequencedEvent>, Option<i64>), StoreError> {
            let guard = self.inner.lock().await;
            let query = query.unwrap_or_default();
            let after = after.unwrap_or(0);
            let matched: Vec<_> = guard
                .iter()
                .filter(|s| s.position > after && query.matches(&s.event))
                .cloned()
                .collect();
            let head = guard.last().map(|s| s.position);
            Ok((matched, head))
        }

        fn subscribe(&self, _query: Option<Query>, _after: i64) -> crate::types::StoreStream<SequencedEvent> {
            Box::pin(tokio_stream::empty::<Result<SequencedEvent, StoreError>>())
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_the_mapper() {
        let recorder: Arc<dyn DcbRecorder> = Arc::new(NoopRecorder {
            inner: tokio::sync::Mutex::new(Vec::new()),
        });
        let facade = EventStoreFacade::new(recorder, JsonMapper::<StudentRegistered>::new());

        let event = StudentRegistered {
            tags: vec!["student-S".into()],
        };
        let pos = facade.put(vec![event.clone()], None, None).await.unwrap();
        assert_eq!(pos, 1);

        let (events, head) = facade
            .get(Some(vec![Selector::with_tags(["student-S"])]), None)
            .await
            .unwrap();
        assert_eq!(events, vec![event]);
        assert_eq!(head, Some(1));
    }

    #[tokio::test]
    async fn put_with_after_sets_a_match_all_fail_condition() {
        let recorder: Arc<dyn DcbRecorder> = Arc::new(NoopRecorder {
            inner: tokio::sync::Mutex::new(Vec::new()),
        });
        let facade = EventStoreFacade::new(recorder, JsonMapper::<StudentRegistered>::new());

        let seed = StudentRegistered {
            tags: vec!["student-S".into()],
        };
        facade.put(vec![seed], None, None).await.unwrap();

        let other = StudentRegistered {
            tags: vec!["student-T".into()],
        };
        let err = facade
            .put(vec![other], None, Some(0))
            .await
            .expect_err("any event after position 0 should trip the condition");
        assert!(matches!(err, StoreError::Integrity { .. }));
    }
}
