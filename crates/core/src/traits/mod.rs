pub mod broker;
pub mod fabric_repository;
pub mod process;
pub mod stats_store;

pub use broker::*;
pub use fabric_repository::*;
pub use process::*;
pub use stats_store::*;
