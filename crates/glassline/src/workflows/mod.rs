pub mod jobs;
pub mod pricing;
pub mod stream;
