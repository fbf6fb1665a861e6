//! Thin Rust client for the DCB event store's gRPC service. Wraps
//! `DcbEventStoreClient` with a typed `put`/`get` surface expressed in
//! terms of type/tag selectors (spec §4.4) instead of raw protobuf
//! messages, mirroring the facade shape in `eventstore_core::facade` on
//! the client side of the wire.

use anyhow::Result;
use eventstore_proto::gen::dcb_event_store_client::DcbEventStoreClient;
use eventstore_proto::gen::{
    AppendCondition as ProtoAppendCondition, AppendRequest, Event as ProtoEvent,
    Query as ProtoQuery, QueryItem as ProtoQueryItem, ReadRequest, ReadResponse, SubscribeRequest,
    SubscribeResponse,
};
use thiserror::Error;
use tonic::transport::Channel;
use tonic::Code;

/// One event to append: type, opaque payload bytes, tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventInput {
    pub r#type: String,
    pub data: Vec<u8>,
    pub tags: Vec<String>,
}

impl EventInput {
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

impl From<EventInput> for ProtoEvent {
    fn from(e: EventInput) -> Self {
        ProtoEvent {
            r#type: e.r#type,
            data: e.data,
            tags: e.tags,
        }
    }
}

/// A recorded event as returned by `get`/`read`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub r#type: String,
    pub data: Vec<u8>,
    pub tags: Vec<String>,
    pub position: i64,
}

/// A consistency-boundary selector: matches events whose type is in
/// `types` (or `types` is empty) and whose tags are a superset of `tags`.
/// A list of selectors is ORed together.
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

impl From<Selector> for ProtoQueryItem {
    fn from(s: Selector) -> Self {
        ProtoQueryItem {
            types: s.types,
            tags: s.tags,
        }
    }
}

fn selectors_to_query(selectors: Vec<Selector>) -> ProtoQuery {
    ProtoQuery {
        items: selectors.into_iter().map(Into::into).collect(),
    }
}

/// Client-side classification of a failed RPC, mirroring the kinds in
/// `eventstore_core::StoreError` that are meaningful across the wire.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("append condition matched an existing event")]
    Integrity,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid request: {0}")]
    InvalidArgument(String),
    #[error("backend does not support this query shape: {0}")]
    NotSupported(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::Aborted => ClientError::Integrity,
            Code::Unavailable => ClientError::Unavailable(status.message().to_string()),
            Code::InvalidArgument => ClientError::InvalidArgument(status.message().to_string()),
            Code::Unimplemented => ClientError::NotSupported(status.message().to_string()),
            _ => ClientError::Other(anyhow::anyhow!(status)),
        }
    }
}

pub struct EventStore {
    inner: DcbEventStoreClient<Channel>,
}

impl EventStore {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let inner = DcbEventStoreClient::connect(addr.into()).await?;
        Ok(Self { inner })
    }

    /// Append `events` unconditionally.
    pub async fn put(&mut self, events: Vec<EventInput>) -> Result<i64, ClientError> {
        let req = AppendRequest {
            events: events.into_iter().map(Into::into).collect(),
            condition: None,
        };
        let resp = self.inner.append(req).await?.into_inner();
        Ok(resp.position)
    }

    /// Append `events`, failing if any event matching `cb` has a position
    /// greater than `after` (0/`None` meaning "from the beginning").
    pub async fn put_if(
        &mut self,
        events: Vec<EventInput>,
        cb: Vec<Selector>,
        after: Option<i64>,
    ) -> Result<i64, ClientError> {
        let req = AppendRequest {
            events: events.into_iter().map(Into::into).collect(),
            condition: Some(ProtoAppendCondition {
                fail_if_events_match: Some(selectors_to_query(cb)),
                after,
            }),
        };
        let resp = self.inner.append(req).await?.into_inner();
        Ok(resp.position)
    }

    /// Read events matching `cb` (match-all if empty), with position
    /// greater than `after`, truncated to `limit` if given.
    pub async fn get(
        &mut self,
        cb: Vec<Selector>,
        after: Option<i64>,
        limit: Option<i64>,
    ) -> Result<(Vec<RecordedEvent>, Option<i64>), ClientError> {
        let req = ReadRequest {
            query: Some(selectors_to_query(cb)),
            after,
            limit,
        };
        let ReadResponse { events, head } = self.inner.read(req).await?.into_inner();
        let events = events
            .into_iter()
            .filter_map(|se| {
                let event = se.event?;
                Some(RecordedEvent {
                    r#type: event.r#type,
                    data: event.data,
                    tags: event.tags,
                    position: se.position,
                })
            })
            .collect();
        Ok((events, head))
    }

    /// Best-effort replay-then-live stream of events matching `cb` with
    /// position greater than `after`.
    pub async fn subscribe(
        &mut self,
        cb: Vec<Selector>,
        after: i64,
    ) -> Result<tonic::Streaming<SubscribeResponse>, ClientError> {
        let req = SubscribeRequest {
            query: Some(selectors_to_query(cb)),
            after,
        };
        let stream = self.inner.subscribe(req).await?.into_inner();
        Ok(stream)
    }
}
