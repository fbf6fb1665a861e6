use bytes::Bytes;
use prost::Message;
use prost_types::Any;
use thiserror::Error;

use eventstore_proto::gen as proto;

/// Error kinds surfaced by a [`crate::DcbRecorder`].
///
/// Integrity means the append condition matched and nothing was written;
/// operational/interface are transient and retriable; data/internal are
/// backend-reported failures; programming is caller misuse and never
/// retriable; not-supported means the backend cannot execute this query
/// shape. None of these is ever silently swallowed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("append condition matched: {message}")]
    Integrity {
        message: String,
        detail: Option<proto::ConcurrencyErrorDetail>,
    },
    #[error("operational error: {0}")]
    Operational(String),
    #[error("interface error: {0}")]
    Interface(String),
    #[error("data error: {0}")]
    Data(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
    #[error("programming error: {0}")]
    Programming(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl StoreError {
    pub fn programming(msg: impl Into<String>) -> Self {
        StoreError::Programming(msg.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        StoreError::Integrity {
            message: message.into(),
            detail: None,
        }
    }

    pub fn integrity_at(message: impl Into<String>, matched_position: i64) -> Self {
        StoreError::Integrity {
            message: message.into(),
            detail: Some(proto::ConcurrencyErrorDetail { matched_position }),
        }
    }

    fn encode_concurrency_detail(detail: &proto::ConcurrencyErrorDetail) -> Bytes {
        let any = Any {
            type_url: "type.googleapis.com/eventstore.v1.ConcurrencyErrorDetail".to_string(),
            value: detail.encode_to_vec(),
        };
        Bytes::from(any.encode_to_vec())
    }

    /// Map to a `tonic::Status` for the gRPC transport layer.
    pub fn to_status(&self) -> tonic::Status {
        use tonic::Code;
        match self {
            StoreError::Integrity { message, detail } => {
                if let Some(detail) = detail {
                    tonic::Status::with_details(
                        Code::Aborted,
                        message.clone(),
                        Self::encode_concurrency_detail(detail),
                    )
                } else {
                    tonic::Status::new(Code::Aborted, message.clone())
                }
            }
            StoreError::Operational(msg) => tonic::Status::new(Code::Unavailable, msg.clone()),
            StoreError::Interface(msg) => tonic::Status::new(Code::Unavailable, msg.clone()),
            StoreError::Data(msg) => tonic::Status::new(Code::InvalidArgument, msg.clone()),
            StoreError::Internal(err) => tonic::Status::new(Code::Internal, err.to_string()),
            StoreError::Programming(msg) => tonic::Status::new(Code::InvalidArgument, msg.clone()),
            StoreError::NotSupported(msg) => tonic::Status::new(Code::Unimplemented, msg.clone()),
        }
    }
}
