//! Generated gRPC/protobuf types for the DCB event store wire protocol.
//!
//! The actual message and service definitions live in
//! `proto/eventstore/v1/eventstore.proto` and are compiled by `build.rs`
//! via `tonic-build`. This crate only re-exports the generated module so
//! downstream crates have a single, stable import path.

pub mod gen {
    tonic::include_proto!("eventstore.v1");
}
