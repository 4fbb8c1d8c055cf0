//! Blood Cell Classification Service Library

pub mod api;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod service;
pub mod utils;

pub use config::Config;
