use serde::{Deserialize, Serialize};

pub mod cache;
pub mod codec;
pub mod html;
pub mod ingest;
pub mod markup;
pub mod query;
pub mod rank;
pub mod store;
pub mod tokenizer;

pub use query::{Encyclopedia, SearchResult};

/// Internal document identifier, assigned by the store's monotonic sequence
/// starting at 1. Stable for the lifetime of the database.
pub type DocId = u32;

/// A Wikipedia article as stored in the `pages` bucket. `id` is the page id
/// from the dump; it is preserved but never used as a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub id: u64,
    pub text: String,
}

impl Article {
    /// Render the wiki markup body to HTML.
    pub fn html(&self) -> String {
        html::render(&self.text)
    }
}
