//! Feed ingestion: detect, extract, normalize, store.

pub mod detector;
pub mod extractor;
pub mod ingest;
pub mod normalizer;
