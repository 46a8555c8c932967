//! Lookup and search over a built database.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use redb::ReadableTable;
use regex::Regex;

use crate::codec::{self, postings};
use crate::store::{self, Store};
use crate::{Article, DocId};

pub struct Encyclopedia {
    store: Store,
}

/// One search hit. `count` is how many distinct query terms listed the
/// document; `matches` is the raw substring match count across all parts.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub docid: DocId,
    pub count: usize,
    pub rank: f32,
    pub matches: usize,
    pub article: Article,
}

impl Encyclopedia {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Encyclopedia {
            store: Store::open(path)?,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fetch an article by exact title. `None` when the title is unknown.
    pub fn lookup(&self, title: &str) -> Result<Option<Article>> {
        let tx = self.store.begin_read()?;
        let wiki = tx.open_table(store::WIKI)?;
        let pages = tx.open_table(store::PAGES)?;
        let Some(docid) = wiki.get(store::truncate_key(title.as_bytes()))? else {
            return Ok(None);
        };
        let Some(value) = pages.get(docid.value())? else {
            return Ok(None);
        };
        Ok(Some(codec::decode_article(value.value())?))
    }

    /// Disjunctive search: every document listed by at least one query term,
    /// ordered by term coverage, ties broken by rank times substring matches.
    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let parts: Vec<String> = query
            .split_whitespace()
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .collect();

        let tx = self.store.begin_read()?;
        let index = tx.open_table(store::INDEX)?;
        let pages = tx.open_table(store::PAGES)?;
        let ranks = tx.open_table(store::RANKS)?;

        let mut hits: HashMap<DocId, usize> = HashMap::new();
        for part in &parts {
            let Some(value) = index.get(store::truncate_key(part.as_bytes()))? else {
                continue;
            };
            let deltas = postings::decode_frame(value.value())?;
            for docid in postings::decode(&deltas)? {
                *hits.entry(docid).or_insert(0) += 1;
            }
        }

        let matchers: Vec<Regex> = parts
            .iter()
            .map(|part| Regex::new(&regex::escape(part)))
            .collect::<Result<_, _>>()?;

        let mut results = Vec::with_capacity(hits.len());
        for (docid, count) in hits {
            let rank = match ranks.get(store::docid_key(docid).as_slice())? {
                Some(bits) => rank_from_value(bits.value()),
                None => 0.0,
            };
            let Some(value) = pages.get(store::docid_key(docid).as_slice())? else {
                continue;
            };
            let article = codec::decode_article(value.value())?;
            let haystack = article.text.to_lowercase();
            let matches = matchers
                .iter()
                .map(|matcher| matcher.find_iter(&haystack).count())
                .sum();
            results.push(SearchResult {
                docid,
                count,
                rank,
                matches,
                article,
            });
        }

        // Non-stable sort; full ties keep no particular order.
        results.sort_unstable_by(|a, b| {
            b.count.cmp(&a.count).then_with(|| {
                let a_score = a.rank * a.matches as f32;
                let b_score = b.rank * b.matches as f32;
                b_score
                    .partial_cmp(&a_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        Ok(results)
    }
}

fn rank_from_value(value: &[u8]) -> f32 {
    match value.try_into() {
        Ok(bytes) => f32::from_bits(u32::from_le_bytes(bytes)),
        Err(_) => 0.0,
    }
}
