//! Script-facing bridge for docquery
//!
//! Extension scripts run in a sandbox and cannot own Rust values. This crate
//! keeps the `Query` collections on the Rust side and exposes them as
//! integer handles driven by `(handle, method, args)` calls.
//!
//! # Architecture Philosophy
//!
//! 1. **Data structures first**: one registry map, handles are plain `u32`
//! 2. **Zero special cases**: every method goes through one dispatch table
//! 3. **Practical**: JSON in, tagged `ScriptValue` out, any host can marshal it

pub mod bridge;
pub mod error;
pub mod value;

pub use bridge::{Bridge, BridgeConfig, METHODS};
pub use error::{BridgeError, Result};
pub use value::{HandleId, ScriptValue};
