//! Emitting events and local diagnostics
//!
//! - `emitter` - POSTs JSON records to `<base_url>/<tag>`
//! - `diagnostics` - leveled local log output, optionally forwarded to a sink

pub mod diagnostics;
pub mod emitter;

pub use emitter::Emitter;
