//! Link graph construction and PageRank over the stored articles.
//!
//! Stage A walks the `pages` bucket with a pool of parsers and merges the
//! extracted links into a weighted graph, resolving titles through the
//! `wiki` bucket. Stage B runs power iteration. Stage C rewrites the `ranks`
//! bucket wholesale, in bounded batches.

use std::collections::HashMap;
use std::thread;

use anyhow::Result;
use crossbeam::channel::bounded;
use redb::ReadableTable;

use crate::ingest::{resident_bytes, GIB};
use crate::store::{self, Store};
use crate::{codec, markup, DocId};

const DAMPING: f64 = 0.85;
const TOLERANCE: f64 = 1e-5;
const MAX_ITERATIONS: usize = 1_000;
const RANK_BATCH: usize = 1024;
const RESULTS_BACKLOG: usize = 8;

/// A directed link graph. Duplicate edges are retained: a page linking to
/// the same target twice gives that target twice the weight.
#[derive(Default)]
pub struct Graph {
    nodes: HashMap<DocId, usize>,
    edges: Vec<(DocId, DocId, f64)>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn link(&mut self, source: DocId, target: DocId, weight: f32) {
        self.intern(source);
        self.intern(target);
        self.edges.push((source, target, f64::from(weight)));
    }

    fn intern(&mut self, id: DocId) -> usize {
        let next = self.nodes.len();
        *self.nodes.entry(id).or_insert(next)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Power iteration until the L1 delta between successive rank vectors
    /// falls below `tolerance`. Emits `(docid, rank)` in ascending docid
    /// order.
    pub fn rank(&self, damping: f64, tolerance: f64, mut emit: impl FnMut(DocId, f32)) {
        let n = self.nodes.len();
        if n == 0 {
            return;
        }

        let mut out_weight = vec![0f64; n];
        let mut edges = Vec::with_capacity(self.edges.len());
        for &(source, target, weight) in &self.edges {
            let s = self.nodes[&source];
            let t = self.nodes[&target];
            out_weight[s] += weight;
            edges.push((s, t, weight));
        }

        let mut rank = vec![1.0 / n as f64; n];
        let mut next = vec![0f64; n];
        for _ in 0..MAX_ITERATIONS {
            let dangling: f64 = rank
                .iter()
                .zip(&out_weight)
                .filter(|(_, &w)| w == 0.0)
                .map(|(r, _)| r)
                .sum();
            let base = (1.0 - damping) / n as f64 + damping * dangling / n as f64;
            next.fill(base);
            for &(s, t, w) in &edges {
                next[t] += damping * rank[s] * w / out_weight[s];
            }
            let delta: f64 = rank
                .iter()
                .zip(&next)
                .map(|(old, new)| (old - new).abs())
                .sum();
            std::mem::swap(&mut rank, &mut next);
            if delta < tolerance {
                break;
            }
        }

        let mut ids: Vec<(DocId, usize)> = self.nodes.iter().map(|(&id, &i)| (id, i)).collect();
        ids.sort_unstable_by_key(|&(id, _)| id);
        for (id, i) in ids {
            emit(id, rank[i] as f32);
        }
    }
}

/// Build the link graph, rank it, and persist the result.
pub fn build(store: &Store) -> Result<()> {
    let graph = build_graph(store)?;
    let mut ranks = Vec::new();
    graph.rank(DAMPING, TOLERANCE, |docid, rank| ranks.push((docid, rank)));
    tracing::info!(nodes = ranks.len(), "ranked link graph");
    persist(store, &ranks)
}

fn build_graph(store: &Store) -> Result<Graph> {
    let workers = thread::available_parallelism().map_or(1, |n| n.get());
    let rtx = store.begin_read()?;
    let pages = rtx.open_table(store::PAGES)?;
    let wiki = rtx.open_table(store::WIKI)?;

    let mut graph = Graph::new();
    thread::scope(|scope| -> Result<()> {
        let (job_tx, job_rx) = bounded::<(DocId, Vec<u8>)>(workers);
        let (out_tx, out_rx) = bounded::<Result<(DocId, Vec<String>)>>(RESULTS_BACKLOG);

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            scope.spawn(move || {
                for (docid, value) in job_rx.iter() {
                    let links = codec::decode_article(&value)
                        .map(|article| markup::extract_links(&article.text));
                    if out_tx.send(links.map(|l| (docid, l))).is_err() {
                        return;
                    }
                }
            });
        }
        drop(job_rx);
        drop(out_tx);

        let mut merge = |graph: &mut Graph, parsed: Result<(DocId, Vec<String>)>| -> Result<()> {
            let (source, links) = parsed?;
            for link in links {
                if let Some(value) = wiki.get(store::truncate_key(link.as_bytes()))? {
                    let target = store::docid_from_key(value.value())?;
                    graph.link(source, target, 1.0);
                }
            }
            Ok(())
        };

        let mut in_flight = 0usize;
        let mut scanned = 0u64;
        for entry in pages.iter()? {
            let (key, value) = entry?;
            let docid = store::docid_from_key(key.value())?;
            if in_flight >= workers {
                merge(&mut graph, out_rx.recv()?)?;
                in_flight -= 1;
            }
            job_tx.send((docid, value.value().to_vec()))?;
            in_flight += 1;
            scanned += 1;
            let rss_gib = resident_bytes() as f64 / GIB as f64;
            tracing::debug!(docid, rss_gib, "page scanned for links");
            if scanned % 10_000 == 0 {
                tracing::info!(scanned, rss_gib, "scanning pages for links");
            }
        }
        drop(job_tx);
        for parsed in out_rx.iter() {
            merge(&mut graph, parsed)?;
        }
        Ok(())
    })?;
    Ok(graph)
}

fn persist(store: &Store, ranks: &[(DocId, f32)]) -> Result<()> {
    // Drop the old bucket in its own transaction, then write in bounded
    // batches so a huge graph cannot blow up a single transaction.
    let tx = store.begin_write()?;
    tx.delete_table(store::RANKS)?;
    {
        tx.open_table(store::RANKS)?;
    }
    tx.commit()?;

    let mut written = 0usize;
    for chunk in ranks.chunks(RANK_BATCH) {
        let tx = store.begin_write()?;
        {
            let mut table = tx.open_table(store::RANKS)?;
            for &(docid, rank) in chunk {
                table.insert(
                    store::docid_key(docid).as_slice(),
                    rank.to_bits().to_le_bytes().as_slice(),
                )?;
            }
        }
        tx.commit()?;
        written += chunk.len();
        tracing::debug!(written, total = ranks.len(), "rank batch committed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranks_of(graph: &Graph) -> HashMap<DocId, f32> {
        let mut out = HashMap::new();
        graph.rank(DAMPING, TOLERANCE, |id, r| {
            out.insert(id, r);
        });
        out
    }

    #[test]
    fn linked_page_outranks_its_source() {
        let mut graph = Graph::new();
        graph.link(1, 2, 1.0);
        let ranks = ranks_of(&graph);
        assert!(ranks[&2] > ranks[&1]);
    }

    #[test]
    fn duplicate_edges_carry_more_weight() {
        let mut graph = Graph::new();
        graph.link(1, 2, 1.0);
        graph.link(1, 3, 1.0);
        graph.link(1, 3, 1.0);
        let ranks = ranks_of(&graph);
        assert!(ranks[&3] > ranks[&2]);
    }

    #[test]
    fn ranks_sum_to_one() {
        let mut graph = Graph::new();
        graph.link(1, 2, 1.0);
        graph.link(2, 3, 1.0);
        graph.link(3, 1, 1.0);
        graph.link(1, 3, 1.0);
        let total: f32 = ranks_of(&graph).values().sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn empty_graph_emits_nothing() {
        let graph = Graph::new();
        let ranks = ranks_of(&graph);
        assert!(ranks.is_empty());
    }
}
