pub mod cli;
pub mod config;
pub mod error;
pub mod fab;
pub mod mirror;
pub mod scheduler;
pub mod storage;
