pub mod output;
pub mod spawner;
