//! proctor.input_record.v1 schema
//!
//! This module defines the host-facing input records and the adapter that
//! replays them into a session aggregator.

mod adapter;
mod record;

pub use adapter::*;
pub use record::*;
