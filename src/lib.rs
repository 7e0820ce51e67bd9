pub mod app;
pub mod catalog;
pub mod config;
pub mod executor;
pub mod mutation;
pub mod orchestration;
pub mod shared;
