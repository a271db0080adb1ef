pub mod classifier;
pub mod engine;
pub mod preprocess;
