//! Build pipeline: stream the compressed XML dump, fan pages out to a worker
//! pool for compression and tokenization, and drain the results through a
//! single writer that owns the write transaction and the posting cache.
//!
//! The writer commits whenever the cache evicts, then persists the evicted
//! posting lists in a follow-on transaction. Articles are therefore durable
//! before their postings; an interrupted build is rerun from scratch.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use crossbeam::channel::bounded;
use quick_xml::events::Event;
use redb::ReadableTable;

use crate::cache::{self, PostingCache};
use crate::codec::{self, postings};
use crate::store::{self, Store};
use crate::{tokenizer, Article, DocId};

pub(crate) const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// bz2-compressed XML dump to ingest.
    pub dump: PathBuf,
    /// Database file to create or extend.
    pub db: PathBuf,
    /// Worker threads for per-page compression and tokenization.
    pub workers: usize,
    /// Live posting lists kept in memory.
    pub lru_capacity: usize,
    /// Results channel depth; workers block when it is full.
    pub results_backlog: usize,
    /// Resident-memory brake: dispatch pauses above this many bytes while
    /// in-flight pages drain. The LRU capacity is the primary RAM control.
    pub ram_watermark: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            dump: PathBuf::from("enwiki-latest-pages-articles.xml.bz2"),
            db: PathBuf::from("wikipedia.db"),
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
            lru_capacity: cache::DEFAULT_CAPACITY,
            results_backlog: 8,
            ram_watermark: 127 * GIB,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub articles: u64,
}

/// A `<page>` element from the dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub title: String,
    pub id: u64,
    pub text: String,
}

/// What a worker hands back to the writer for one page.
struct PageResult {
    title: String,
    value: Vec<u8>,
    words: HashSet<String>,
}

/// Run the full build from the configured dump file.
pub fn build(opts: &BuildOptions) -> Result<BuildStats> {
    let store = Store::open(&opts.db)?;
    let file = File::open(&opts.dump)
        .with_context(|| format!("open dump {}", opts.dump.display()))?;
    let reader = BufReader::new(BzDecoder::new(file));
    build_from_xml(&store, reader, opts)
}

/// Ingest pages from an already-decompressed XML stream.
pub fn build_from_xml<R: BufRead>(store: &Store, xml: R, opts: &BuildOptions) -> Result<BuildStats> {
    let workers = opts.workers.max(1);
    let mut pages = PageReader::new(xml);
    let mut cache = PostingCache::new(opts.lru_capacity);
    let mut stats = BuildStats::default();

    thread::scope(|scope| -> Result<()> {
        let (page_tx, page_rx) = bounded::<Page>(workers);
        let (result_tx, result_rx) = bounded::<Result<PageResult>>(opts.results_backlog.max(1));
        for _ in 0..workers {
            let page_rx = page_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for page in page_rx.iter() {
                    if result_tx.send(process_page(page)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(page_rx);
        drop(result_tx);

        let mut page_tx = Some(page_tx);
        let mut in_flight = 0usize;
        loop {
            let tx = store.begin_write()?;
            let mut evicted: Vec<(String, Vec<DocId>)> = Vec::new();
            let done = {
                let mut wiki = tx.open_table(store::WIKI)?;
                let mut pages_table = tx.open_table(store::PAGES)?;
                let mut index = tx.open_table(store::INDEX)?;
                loop {
                    // Keep the pool full, unless memory pressure says to let
                    // the in-flight pages drain first.
                    while page_tx.is_some() && in_flight < workers {
                        if in_flight > 0 && resident_bytes() > opts.ram_watermark {
                            tracing::warn!("resident memory above watermark, draining workers");
                            break;
                        }
                        match pages.next_page()? {
                            Some(page) => {
                                if let Some(sender) = &page_tx {
                                    sender.send(page)?;
                                }
                                in_flight += 1;
                            }
                            None => page_tx = None,
                        }
                    }
                    if in_flight == 0 {
                        break true;
                    }

                    let result = result_rx.recv()??;
                    in_flight -= 1;
                    let docid = Store::next_docid(&tx)?;
                    wiki.insert(
                        store::truncate_key(result.title.as_bytes()),
                        store::docid_key(docid).as_slice(),
                    )?;
                    pages_table.insert(store::docid_key(docid).as_slice(), result.value.as_slice())?;

                    for token in &result.words {
                        let hit = cache.contains(token);
                        let loaded = if hit {
                            None
                        } else {
                            match index.get(store::truncate_key(token.as_bytes()))? {
                                Some(value) => Some(postings::decode_frame(value.value())?),
                                None => None,
                            }
                        };
                        let (deltas, _) = cache.get(token);
                        if let Some(loaded) = loaded {
                            *deltas = loaded;
                        }
                        postings::extend(deltas, docid);
                        while let Some(node) = cache.flush() {
                            evicted.push(node);
                        }
                    }

                    stats.articles += 1;
                    let rss_gib = resident_bytes() as f64 / GIB as f64;
                    tracing::debug!(docid, rss_gib, title = %result.title, "article written");
                    if stats.articles % 1_000 == 0 {
                        tracing::info!(articles = stats.articles, rss_gib, "ingest progress");
                    }
                    if !evicted.is_empty() {
                        break false;
                    }
                }
            };
            tx.commit()?;
            persist_postings(store, &evicted)?;
            if done {
                break;
            }
        }
        Ok(())
    })?;

    // Shutdown flush: everything still live in the cache, head first.
    let drained = cache.drain();
    persist_postings(store, &drained)?;
    tracing::info!(articles = stats.articles, "ingest complete");
    Ok(stats)
}

/// Worker side: serialize and compress the article, tokenize its body into a
/// distinct word set.
fn process_page(page: Page) -> Result<PageResult> {
    let words = tokenizer::word_set(&page.text);
    let article = Article {
        title: page.title,
        id: page.id,
        text: page.text,
    };
    let value = codec::encode_article(&article)?;
    Ok(PageResult {
        title: article.title,
        value,
        words,
    })
}

/// Persist evicted posting lists in their own transaction.
fn persist_postings(store: &Store, nodes: &[(String, Vec<DocId>)]) -> Result<()> {
    if nodes.is_empty() {
        return Ok(());
    }
    let tx = store.begin_write()?;
    {
        let mut index = tx.open_table(store::INDEX)?;
        for (token, deltas) in nodes {
            let value = postings::encode_frame(deltas)?;
            index.insert(store::truncate_key(token.as_bytes()), value.as_slice())?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(target_os = "linux")]
pub(crate) fn resident_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| statm.split_whitespace().nth(1)?.parse::<u64>().ok())
        .map_or(0, |pages| pages * 4096)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn resident_bytes() -> u64 {
    0
}

/// Streaming reader over the dump, yielding `<page>` elements one at a time.
/// Pages with empty text are skipped. The page id is the `<id>` directly
/// under `<page>`, not the revision id.
struct PageReader<R: BufRead> {
    reader: quick_xml::Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> PageReader<R> {
    fn new(xml: R) -> Self {
        PageReader {
            reader: quick_xml::Reader::from_reader(xml),
            buf: Vec::new(),
        }
    }

    fn next_page(&mut self) -> Result<Option<Page>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Field {
            Title,
            Id,
            Text,
        }

        let mut in_page = false;
        let mut in_revision = false;
        let mut field = None;
        let mut title = String::new();
        let mut id_text = String::new();
        let mut text = String::new();

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"page" => {
                        in_page = true;
                        in_revision = false;
                        field = None;
                        title.clear();
                        id_text.clear();
                        text.clear();
                    }
                    b"revision" if in_page => in_revision = true,
                    b"title" if in_page && !in_revision => field = Some(Field::Title),
                    b"id" if in_page && !in_revision && id_text.is_empty() => {
                        field = Some(Field::Id)
                    }
                    b"text" if in_page && in_revision => field = Some(Field::Text),
                    _ => field = None,
                },
                Event::Text(t) => {
                    if in_page {
                        let chunk = t.unescape()?;
                        match field {
                            Some(Field::Title) => title.push_str(&chunk),
                            Some(Field::Id) => id_text.push_str(&chunk),
                            Some(Field::Text) => text.push_str(&chunk),
                            None => {}
                        }
                    }
                }
                Event::CData(t) => {
                    if in_page {
                        let chunk = String::from_utf8_lossy(&t);
                        match field {
                            Some(Field::Title) => title.push_str(&chunk),
                            Some(Field::Id) => id_text.push_str(&chunk),
                            Some(Field::Text) => text.push_str(&chunk),
                            None => {}
                        }
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"page" => {
                        in_page = false;
                        if !text.is_empty() {
                            let id = id_text.trim().parse().unwrap_or_else(|_| {
                                tracing::warn!(title = %title, "unparseable page id");
                                0
                            });
                            return Ok(Some(Page {
                                title: std::mem::take(&mut title),
                                id,
                                text: std::mem::take(&mut text),
                            }));
                        }
                    }
                    b"revision" => {
                        in_revision = false;
                        field = None;
                    }
                    _ => field = None,
                },
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}
