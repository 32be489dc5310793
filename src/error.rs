//! Error handling (ambient stack): this crate reports errors with
//! `anyhow` end to end rather than a parallel `thiserror` enum. There are
//! only two error categories the optimizer ever surfaces (input errors
//! caught at construction time, and invariant violations that should
//! panic rather than propagate), neither of which benefits from a typed
//! hierarchy a caller would match on — `anyhow::Error` plus a clear
//! message is what every fallible boundary in this crate returns.

pub use anyhow::{Error, Result};
