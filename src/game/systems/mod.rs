pub mod collision;
pub mod movement;
pub mod spawner;
pub mod split;
