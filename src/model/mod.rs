pub mod config;
pub mod query;
pub mod task;

pub use config::*;
pub use query::*;
pub use task::*;
