//! Game logic: dice, the game manager, persistence, generation and the
//! per-device session that ties them together.

pub mod dice;
pub mod grammar;
pub mod manager;
pub mod palette;
pub mod session;
pub mod store;
pub mod storyteller;
