pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod join;
pub mod logging;
pub mod pipeline;
pub mod sink;
pub mod transform;
pub mod types;
