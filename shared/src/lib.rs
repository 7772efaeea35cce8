pub mod app;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod restart;

pub use app::*;
pub use config::*;
pub use error::*;
pub use lifecycle::*;
pub use restart::*;
