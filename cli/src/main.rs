use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

use encyclopedia::ingest::{self, BuildOptions};
use encyclopedia::{rank, Encyclopedia};

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "encyclopedia")]
#[command(about = "Offline Wikipedia: build, rank, look up, search, serve", long_about = None)]
struct Args {
    /// Build the database from the dump file
    #[arg(long)]
    build: bool,
    /// Run PageRank over the existing database
    #[arg(long)]
    rank: bool,
    /// Print the article with this title as HTML
    #[arg(long)]
    lookup: Option<String>,
    /// Search the index for the given text
    #[arg(long)]
    search: Option<String>,
    /// Start the HTTP server on :8080
    #[arg(long)]
    server: bool,
    /// Database file
    #[arg(long, default_value = "wikipedia.db")]
    db: PathBuf,
    /// bz2-compressed XML dump to build from
    #[arg(long, default_value = "enwiki-latest-pages-articles.xml.bz2")]
    dump: PathBuf,
    /// Resident-memory watermark in GiB for the build
    #[arg(long, default_value_t = 127)]
    ram_watermark_gib: u64,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    if args.build {
        let opts = BuildOptions {
            dump: args.dump,
            db: args.db,
            ram_watermark: args.ram_watermark_gib * GIB,
            ..BuildOptions::default()
        };
        let stats = ingest::build(&opts)?;
        tracing::info!(articles = stats.articles, "build finished");
    } else if args.rank {
        let enc = Encyclopedia::open(&args.db)?;
        rank::build(enc.store())?;
    } else if let Some(title) = args.lookup {
        let enc = Encyclopedia::open(&args.db)?;
        if let Some(article) = enc.lookup(&title)? {
            println!("{}", article.title);
            println!("{}", article.html());
        }
    } else if let Some(query) = args.search {
        let enc = Encyclopedia::open(&args.db)?;
        let results = match enc.search(&query) {
            Ok(results) => results,
            Err(err) => {
                tracing::error!(query = %query, error = %err, "search failed");
                Vec::new()
            }
        };
        println!("results={}", results.len());
        for result in results {
            println!("{} {}", result.rank, result.count);
            println!("{}", result.article.title);
        }
    } else if args.server {
        let app = encyclopedia_server::build_app(&args.db)?;
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let addr: SocketAddr = "0.0.0.0:8080".parse().expect("valid bind address");
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(%addr, "server listening");
            axum::serve(listener, app).await?;
            Ok::<_, anyhow::Error>(())
        })?;
    }
    Ok(())
}
