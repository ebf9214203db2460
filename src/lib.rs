pub mod api;
pub mod auth;
pub mod config;
pub mod ids;
pub mod metrics;
pub mod models;
pub mod pixel;
pub mod storage;
pub mod visits;
