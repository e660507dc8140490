//! Data Transfer Objects for REST request/response serialization.
//!
//! All money amounts are serialized as JSON strings so that no decimal
//! digit is lost to floating point on the client side.

pub mod account_dto;
pub mod common_dto;
pub mod integrity_dto;
pub mod transfer_dto;

pub use account_dto::*;
pub use common_dto::*;
pub use integrity_dto::*;
pub use transfer_dto::*;
