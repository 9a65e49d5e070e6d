mod client;
mod weaviate_url;

pub mod domain;

pub(crate) use weaviate_url::*;

pub use client::*;
