//! Service layer module

pub mod classifier_service;
pub mod trainer;
pub mod types;

pub use classifier_service::ClassifierService;
pub use trainer::Trainer;
pub use types::*;
