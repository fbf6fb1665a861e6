use std::pin::Pin;
use std::sync::Arc;

use eventstore_core::query::{AppendCondition, DcbEvent, Query, QueryItem, SequencedEvent};
use eventstore_core::{proto, DcbRecorder};
use eventstore_proto::gen::dcb_event_store_server::DcbEventStore;
use eventstore_proto::gen::{AppendRequest, ReadRequest, SubscribeRequest};
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::{error, info, instrument, warn};

pub use eventstore_proto::gen::dcb_event_store_server::DcbEventStoreServer;
pub use eventstore_proto::gen::SubscribeResponse;

pub struct Service {
    pub store: Arc<dyn DcbRecorder>,
}

#[tonic::async_trait]
impl DcbEventStore for Service {
    #[instrument(name = "rpc.append", skip(self, request), fields(events = request.get_ref().events.len()))]
    async fn append(
        &self,
        request: Request<AppendRequest>,
    ) -> Result<Response<proto::AppendResponse>, Status> {
        let req = request.into_inner();
        let events: Vec<DcbEvent> = req.events.into_iter().map(Into::into).collect();
        let condition: Option<AppendCondition> = req.condition.map(Into::into);

        match self.store.append(events, condition).await {
            Ok(position) => {
                info!(position, "append ok");
                Ok(Response::new(proto::AppendResponse { position }))
            }
            Err(e) => {
                warn!(error = %e, "append failed");
                Err(e.to_status())
            }
        }
    }

    #[instrument(name = "rpc.read", skip(self, request), fields(after = request.get_ref().after, limit = request.get_ref().limit))]
    async fn read(
        &self,
        request: Request<ReadRequest>,
    ) -> Result<Response<proto::ReadResponse>, Status> {
        let req = request.into_inner();
        let query: Option<Query> = req.query.map(Into::into);

        match self.store.read(query, req.after, req.limit).await {
            Ok((events, head)) => {
                info!(events = events.len(), ?head, "read ok");
                Ok(Response::new(proto::ReadResponse {
                    events: events.into_iter().map(Into::into).collect(),
                    head,
                }))
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                Err(e.to_status())
            }
        }
    }

    type SubscribeStream =
        Pin<Box<dyn Stream<Item = Result<SubscribeResponse, Status>> + Send + 'static>>;

    #[instrument(name = "rpc.subscribe", skip(self, request), fields(after = request.get_ref().after))]
    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let req = request.into_inner();
        let query: Option<Query> = req.query.map(Into::into);

        let stream = self.store.subscribe(query, req.after).map(|res| {
            res.map(|event: SequencedEvent| SubscribeResponse {
                event: Some(event.into()),
            })
            .map_err(|e| {
                error!(error = %e, "subscribe stream error");
                e.to_status()
            })
        });
        Ok(Response::new(Box::pin(stream)))
    }
}

/// Resolves a recorder implementation from the `BACKEND` environment
/// variable. `memory` needs nothing else; `postgres` reads the connection
/// and index-strategy knobs documented on [`eventstore_backend_postgres::PgConfig`].
pub async fn resolve_backend() -> anyhow::Result<Arc<dyn DcbRecorder>> {
    let backend = std::env::var("BACKEND").unwrap_or_else(|_| "memory".to_string());
    match backend.as_str() {
        "memory" => Ok(eventstore_backend_memory::InMemoryStore::new()),
        "postgres" => {
            let config = eventstore_backend_postgres::PgConfig::from_env()?;
            let store = eventstore_backend_postgres::PostgresStore::connect(&config).await?;
            Ok(store)
        }
        other => anyhow::bail!(
            "unsupported BACKEND '{}'. Supported: memory, postgres",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_env_and_get_prev<K: AsRef<str>, V: AsRef<str>>(
        key: K,
        val: Option<V>,
    ) -> Option<String> {
        let key = key.as_ref().to_string();
        let prev = std::env::var(&key).ok();
        match val {
            Some(v) => std::env::set_var(&key, v.as_ref()),
            None => std::env::remove_var(&key),
        }
        prev
    }

    #[tokio::test]
    #[serial]
    async fn resolve_backend_defaults_to_memory() {
        let prev = set_env_and_get_prev("BACKEND", None::<&str>);
        let store = resolve_backend()
            .await
            .expect("memory backend should be supported");
        assert!(Arc::strong_count(&store) >= 1);
        match prev {
            Some(v) => std::env::set_var("BACKEND", v),
            None => std::env::remove_var("BACKEND"),
        }
    }

    #[tokio::test]
    #[serial]
    async fn resolve_backend_memory_explicit() {
        let prev = set_env_and_get_prev("BACKEND", Some("memory"));
        let store = resolve_backend()
            .await
            .expect("explicit memory should work");
        assert!(Arc::strong_count(&store) >= 1);
        match prev {
            Some(v) => std::env::set_var("BACKEND", v),
            None => std::env::remove_var("BACKEND"),
        }
    }

    #[tokio::test]
    #[serial]
    async fn resolve_backend_unsupported_errors() {
        let prev = set_env_and_get_prev("BACKEND", Some("nope"));
        let res = resolve_backend().await;
        assert!(res.is_err(), "unsupported backend should error");
        let msg = format!("{:#}", res.err().unwrap());
        assert!(msg.contains("unsupported BACKEND"));
        match prev {
            Some(v) => std::env::set_var("BACKEND", v),
            None => std::env::remove_var("BACKEND"),
        }
    }
}
