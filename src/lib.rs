pub mod assistant;
pub mod config;
pub mod error;
pub mod meeting;
pub mod models;
pub mod proxy;
pub mod storage;
