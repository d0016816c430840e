//! Shared building blocks for the Twitch recorder: configuration,
//! output naming and the platform API payload types.

pub mod config;
pub mod naming;
pub mod output;
pub mod protocol;
