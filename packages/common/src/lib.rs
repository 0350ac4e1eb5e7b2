pub mod config;
#[cfg(feature = "sea-orm")]
pub mod db;
#[cfg(feature = "sea-orm")]
pub mod entity;
pub mod jobs;
pub mod mq;
pub mod policy;
pub mod retry;

pub use policy::{DependencyStructure, SubmissionPolicy};
