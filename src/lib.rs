//! Blackholio Server Library
//!
//! Authoritative world for an agar.io-style arena: players steer circles
//! that eat food and smaller rivals, all driven by a single-writer world
//! actor and a set of recurring triggers.
//!
//! # Features
//!
//! - `bots` - Simulated players that join alongside real ones (enabled by default)

pub mod config;
pub mod util;
pub mod game;
pub mod runtime;
pub mod metrics;

#[cfg(feature = "bots")]
pub mod bots;
