mod common;
mod event;
mod matches;
mod player;
mod team;

pub use common::*;
pub use event::*;
pub use matches::*;
pub use player::*;
pub use team::*;
