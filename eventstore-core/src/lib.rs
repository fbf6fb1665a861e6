pub mod errors;
pub mod facade;
pub mod mapper;
pub mod query;
pub mod trait_event_store;
pub mod types;

pub use errors::StoreError;
pub use facade::{EventStoreFacade, Selector};
pub use mapper::{DomainEvent, JsonMapper, Mapper};
pub use query::{AppendCondition, DcbEvent, Query, QueryItem, SequencedEvent};
pub use trait_event_store::DcbRecorder;
pub use types::{proto, StoreStream};
