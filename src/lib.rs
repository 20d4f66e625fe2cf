//! StoryForge: local pass-the-device session manager for a party board game.
//!
//! Coordinates turn order, dice, movement, event resolution and karma for
//! players sharing one device. Every mutation is persisted wholesale to a
//! string key-value store, and board layouts and end-of-game stories come
//! from a pluggable [`core::storyteller::Storyteller`].

pub mod config;
pub mod core;
pub mod schema;
