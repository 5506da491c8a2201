//! Wire formats of the two backend families
//!
//! Plain serde structs matching each provider's JSON API. They are built by
//! [`crate::assemble`] and decoded by the transports in [`crate::provider`].

pub mod anthropic;
pub mod google;
