// Download pipeline: argument building, output parsing, job supervision.

pub mod args;
pub mod models;
pub mod progress;
pub mod supervisor;

pub use models::{AudioFormat, JobRequest};
pub use supervisor::Supervisor;
