//! Data Transfer Objects for REST request/response serialization.
//!
//! Job and bid records are serialized directly from the domain types, whose
//! camelCase field names are the wire contract. The types here cover the
//! remaining request and response shapes.

pub mod common_dto;
pub mod job_dto;

pub use common_dto::*;
pub use job_dto::*;
