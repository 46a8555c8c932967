//! HTTP surface for the encyclopedia: a search form, article pages, and a
//! results page. All logic lives in the `encyclopedia` crate; handlers only
//! shape HTML.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Form, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use encyclopedia::{html, Article, Encyclopedia, SearchResult};

const INDEX_PAGE: &str = r#"<html>
  <head><title>Encyclopedia</title></head>
  <body>
    <h3>Encyclopedia</h3>
    <form action="/wiki/search" method="post">
      <input type="text" id="query" name="query">
      <input type="submit" value="Submit">
    </form>
  </body>
</html>
"#;

const TOOLTIP_STYLE: &str = r#"  <style>
   .tooltip {
    position: relative;
    display: inline-block;
    border-bottom: 1px dotted black;
   }
   .tooltip .tooltiptext {
    visibility: hidden;
    width: 256px;
    background-color: black;
    color: #fff;
    text-align: center;
    padding: 5px 0;
    border-radius: 6px;
    position: absolute;
    z-index: 1;
   }
   .tooltip:hover .tooltiptext {
    visibility: visible;
   }
  </style>
"#;

#[derive(Deserialize)]
pub struct SearchForm {
    pub query: String,
}

/// Build the router over a database file.
pub fn build_app<P: AsRef<Path>>(db: P) -> Result<Router> {
    let encyclopedia = Arc::new(Encyclopedia::open(db)?);
    Ok(Router::new()
        .route("/wiki", get(interface))
        .route("/wiki/article/:article", get(article))
        .route("/wiki/search", post(search))
        .with_state(encyclopedia))
}

async fn interface() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn article(
    State(enc): State<Arc<Encyclopedia>>,
    UrlPath(article): UrlPath<String>,
) -> Result<Html<String>, StatusCode> {
    let title = upper_first(&article);
    match enc.lookup(&title) {
        Ok(Some(article)) => Ok(Html(entry_page(&article))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            tracing::error!(title = %title, error = %err, "article lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn search(
    State(enc): State<Arc<Encyclopedia>>,
    Form(form): Form<SearchForm>,
) -> Html<String> {
    let results = match enc.search(&form.query) {
        Ok(results) => results,
        Err(err) => {
            tracing::error!(query = %form.query, error = %err, "search failed");
            Vec::new()
        }
    };
    Html(results_page(&form.query, &results))
}

/// Article paths are looked up with their first character upper-cased, so
/// `/wiki/article/rust` finds "Rust".
fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn entry_page(article: &Article) -> String {
    format!(
        "<html>\n <head>\n  <title>{title}</title>\n </head>\n <body>\n{style}{body}\n </body>\n</html>\n",
        title = html_escape::encode_text(&article.title),
        style = TOOLTIP_STYLE,
        body = article.html(),
    )
}

fn results_page(query: &str, results: &[SearchResult]) -> String {
    let mut items = String::new();
    for result in results {
        items.push_str(&format!(
            "   <li><a href=\"/wiki/article/{}\">{}</a></li>\n",
            html::escape_title(&result.article.title),
            html_escape::encode_text(&result.article.title),
        ));
    }
    format!(
        "<html>\n <head>\n  <title>Search results for {query}</title>\n </head>\n <body>\n  <ul>\n{items}  </ul>\n </body>\n</html>\n",
        query = html_escape::encode_text(query),
    )
}
