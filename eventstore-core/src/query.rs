//! The DCB data model and query algebra: the single source of truth for
//! both `read` and append-condition matching.

use eventstore_proto::gen as proto;

/// An immutable unit written to and read from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DcbEvent {
    pub r#type: String,
    pub data: Vec<u8>,
    pub tags: Vec<String>,
}

impl DcbEvent {
    pub fn new(
        r#type: impl Into<String>,
        data: impl Into<Vec<u8>>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            data: data.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

/// A [`DcbEvent`] plus the position assigned to it by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencedEvent {
    pub event: DcbEvent,
    pub position: i64,
}

/// One disjunct of a [`Query`]. Either list may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryItem {
    pub types: Vec<String>,
    pub tags: Vec<String>,
}

impl QueryItem {
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

    /// An event E matches this item iff `types` is empty or contains
    /// `E.type`, AND every tag in `tags` is present on `E`.
    pub fn matches(&self, event: &DcbEvent) -> bool {
        let type_ok = self.types.is_empty() || self.types.iter().any(|t| t == &event.r#type);
        let tags_ok = self
            .tags
            .iter()
            .all(|required| event.tags.iter().any(|t| t == required));
        type_ok && tags_ok
    }
}

/// A disjunction of [`QueryItem`]s. An empty item list matches every event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query {
    pub items: Vec<QueryItem>,
}

impl Query {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn new(items: impl IntoIterator<Item = QueryItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// An event matches a Query iff it matches at least one item, or the
    /// item list is empty.
    pub fn matches(&self, event: &DcbEvent) -> bool {
        self.items.is_empty() || self.items.iter().any(|item| item.matches(event))
    }
}

/// The condition under which an append is rejected. `after = None` means
/// "match from the beginning"; the absence of an `AppendCondition`
/// altogether (not a field on this struct) means "append unconditionally".
/// This resolves the Open Question in spec.md §9 about the two `after`
/// sentinels with a proper sum type (`Option<AppendCondition>`) rather than
/// a magic `-1`: the gRPC boundary mirrors the same choice by making
/// `AppendRequest.condition` itself optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppendCondition {
    pub fail_if_events_match: Query,
    pub after: Option<i64>,
}

impl AppendCondition {
    pub fn new(fail_if_events_match: Query, after: Option<i64>) -> Self {
        Self {
            fail_if_events_match,
            after,
        }
    }

    /// `after` treated as 0 when unset, per spec.md §3.
    pub fn floor(&self) -> i64 {
        self.after.unwrap_or(0)
    }
}

// ---------------------------------------------------------------------
// Wire conversions
// ---------------------------------------------------------------------

impl From<DcbEvent> for proto::Event {
    fn from(e: DcbEvent) -> Self {
        proto::Event {
            r#type: e.r#type,
            data: e.data,
            tags: e.tags,
        }
    }
}

impl From<proto::Event> for DcbEvent {
    fn from(e: proto::Event) -> Self {
        DcbEvent {
            r#type: e.r#type,
            data: e.data,
            tags: e.tags,
        }
    }
}

impl From<SequencedEvent> for proto::SequencedEvent {
    fn from(e: SequencedEvent) -> Self {
        proto::SequencedEvent {
            event: Some(e.event.into()),
            position: e.position,
        }
    }
}

impl TryFrom<proto::SequencedEvent> for SequencedEvent {
    type Error = crate::StoreError;

    fn try_from(e: proto::SequencedEvent) -> Result<Self, Self::Error> {
        let event = e
            .event
            .ok_or_else(|| crate::StoreError::Data("SequencedEvent.event is required".into()))?;
        Ok(SequencedEvent {
            event: event.into(),
            position: e.position,
        })
    }
}

impl From<QueryItem> for proto::QueryItem {
    fn from(q: QueryItem) -> Self {
        proto::QueryItem {
            types: q.types,
            tags: q.tags,
        }
    }
}

impl From<proto::QueryItem> for QueryItem {
    fn from(q: proto::QueryItem) -> Self {
        QueryItem {
            types: q.types,
            tags: q.tags,
        }
    }
}

impl From<Query> for proto::Query {
    fn from(q: Query) -> Self {
        proto::Query {
            items: q.items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<proto::Query> for Query {
    fn from(q: proto::Query) -> Self {
        Query {
            items: q.items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<AppendCondition> for proto::AppendCondition {
    fn from(c: AppendCondition) -> Self {
        proto::AppendCondition {
            fail_if_events_match: Some(c.fail_if_events_match.into()),
            after: c.after,
        }
    }
}

impl From<proto::AppendCondition> for AppendCondition {
    fn from(c: proto::AppendCondition) -> Self {
        AppendCondition {
            fail_if_events_match: c.fail_if_events_match.map(Into::into).unwrap_or_default(),
            after: c.after,
        }
    }
}
