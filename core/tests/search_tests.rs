use std::io::Cursor;

use encyclopedia::ingest::{build_from_xml, BuildOptions};
use encyclopedia::store;
use encyclopedia::{rank, Encyclopedia};
use redb::{ReadableTable, ReadableTableMetadata};

fn options() -> BuildOptions {
    BuildOptions {
        workers: 1,
        ..BuildOptions::default()
    }
}

fn page(title: &str, id: u64, text: &str) -> String {
    format!(
        "<page><title>{title}</title><id>{id}</id>\
         <revision><text>{text}</text></revision></page>"
    )
}

fn open_with(dir: &std::path::Path, body: &str) -> Encyclopedia {
    let enc = Encyclopedia::open(dir.join("wikipedia.db")).unwrap();
    let xml = format!("<mediawiki>{body}</mediawiki>");
    build_from_xml(enc.store(), Cursor::new(xml.into_bytes()), &options()).unwrap();
    enc
}

#[test]
fn lookup_by_exact_title() {
    let dir = tempfile::tempdir().unwrap();
    let enc = open_with(
        dir.path(),
        &(page("Alpha", 1, "hello world") + &page("Beta", 2, "world peace")),
    );
    let article = enc.lookup("Alpha").unwrap().expect("known title");
    assert_eq!(article.title, "Alpha");
    assert_eq!(article.text, "hello world");
    assert!(enc.lookup("alpha").unwrap().is_none());
    assert!(enc.lookup("Gamma").unwrap().is_none());
}

#[test]
fn single_term_search_covers_both_documents() {
    let dir = tempfile::tempdir().unwrap();
    let enc = open_with(
        dir.path(),
        &(page("Alpha", 1, "hello world") + &page("Beta", 2, "world peace")),
    );
    let results = enc.search("world").unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.count == 1));
    assert!(results.iter().all(|r| r.rank == 0.0));
    let titles: Vec<&str> = results.iter().map(|r| r.article.title.as_str()).collect();
    assert!(titles.contains(&"Alpha"));
    assert!(titles.contains(&"Beta"));
}

#[test]
fn coverage_orders_multi_term_search() {
    let dir = tempfile::tempdir().unwrap();
    let enc = open_with(
        dir.path(),
        &(page("Alpha", 1, "hello world") + &page("Beta", 2, "world peace")),
    );
    let results = enc.search("world peace").unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].article.title, "Beta");
    assert_eq!(results[0].count, 2);
    assert_eq!(results[1].article.title, "Alpha");
    assert_eq!(results[1].count, 1);
}

#[test]
fn unknown_terms_contribute_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let enc = open_with(dir.path(), &page("Alpha", 1, "hello world"));
    assert!(enc.search("zebra").unwrap().is_empty());
    assert!(enc.search("").unwrap().is_empty());
    let results = enc.search("zebra hello").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].count, 1);
}

#[test]
fn matches_count_raw_substrings() {
    let dir = tempfile::tempdir().unwrap();
    let enc = open_with(
        dir.path(),
        &page("Alpha", 1, "Echo echo ECHO in the echoing valley"),
    );
    let results = enc.search("echo").unwrap();
    assert_eq!(results.len(), 1);
    // "echo" occurs in all four words once lowercased.
    assert_eq!(results[0].matches, 4);
}

#[test]
fn rank_build_persists_decodable_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let enc = open_with(
        dir.path(),
        &(page("Alpha", 1, "[[Beta]] gets my vote") + &page("Beta", 2, "humble world peace")),
    );
    rank::build(enc.store()).unwrap();

    let tx = enc.store().begin_read().unwrap();
    let ranks = tx.open_table(store::RANKS).unwrap();
    let rank_of = |docid: u32| {
        let value = ranks.get(store::docid_key(docid).as_slice()).unwrap().unwrap();
        let bytes: [u8; 4] = value.value().try_into().unwrap();
        f32::from_bits(u32::from_le_bytes(bytes))
    };
    let alpha = rank_of(1);
    let beta = rank_of(2);
    assert!(alpha.is_finite() && beta.is_finite());
    assert!(beta > alpha, "linked article should outrank its source");
    drop(tx);

    // Ranks feed the tie-break: equal coverage, Beta first.
    let results = enc.search("world vote").unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.count == 1));
    assert_eq!(results[0].article.title, "Beta");
}

#[test]
fn rank_rebuild_replaces_the_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let enc = open_with(
        dir.path(),
        &(page("Alpha", 1, "[[Beta]] here") + &page("Beta", 2, "content")),
    );
    rank::build(enc.store()).unwrap();
    rank::build(enc.store()).unwrap();
    let tx = enc.store().begin_read().unwrap();
    let ranks = tx.open_table(store::RANKS).unwrap();
    assert_eq!(ranks.len().unwrap(), 2);
}
