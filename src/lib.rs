pub mod config;
pub mod engine;
pub mod list;
pub mod store;
pub mod utils;
