//! # Contracts
//!
//! Shared interface contracts between the shipper crates: the event model,
//! request/response envelopes, the sink adapter trait and configuration types.
//! Business crates depend on this crate only, never the other way around.
//!
//! ## Identity model
//! - An event's identity is its position in the batch it was submitted with
//!   (`EventId`), which stays stable while retry requests shrink.

mod adapter;
mod blueprint;
mod error;
mod event;
mod request;
mod template;

pub use adapter::*;
pub use blueprint::*;
pub use error::*;
pub use event::{Batch, Event, EventId};
pub use request::*;
pub use template::StringTemplate;
