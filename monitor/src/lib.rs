pub mod registry;
pub mod supervisor;
