pub mod config;
pub mod service;
pub mod sync;
