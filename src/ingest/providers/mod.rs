// src/ingest/providers/mod.rs
pub mod serpapi;
pub mod fixture;

pub use fixture::StaticSearch;
pub use serpapi::{BingNews, GoogleNews, SerpApi};
