pub mod export;
pub mod scoring;
pub mod submission;
