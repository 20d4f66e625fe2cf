//! Plain data records shared by the game manager, the store and the storyteller.

pub mod board;
pub mod game;
pub mod player;
