pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod state;
pub mod systems;
