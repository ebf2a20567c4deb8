//! Domain logic shared between historical and realtime sync: wire-to-store
//! conversion, log filter resolution, and block-range arithmetic. Neither
//! `ethrpc` nor `event-store` depend on each other; this crate is the layer
//! that understands both.

pub mod conversion;
pub mod error;
pub mod filter;
pub mod hex_codec;
pub mod ranges;

pub use error::ConversionError;
