//! Headless Orbis driver: platform directories, the fixed-timestep loop, the
//! combined GPU backend and the session that runs a planet frame by frame.

pub mod backend;
pub mod game_loop;
pub mod platform;
pub mod session;
