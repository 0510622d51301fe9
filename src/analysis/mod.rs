pub mod client;
pub mod transform;

pub use client::{AnalysisError, AnalysisGateway, HttpAnalysisClient, RawAnalysis};
