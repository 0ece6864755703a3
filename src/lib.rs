pub mod config;
pub mod constants;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod storage;
pub mod types;
pub mod upsert;
