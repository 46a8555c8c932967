//! Wiki markup parser.
//!
//! Produces a flat list of elements, one per source line, each holding the
//! inline nodes the renderer and the link extractor consume: headings, rules,
//! breaks, internal links with optional display text, references, and wild
//! text that passes through untouched.

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `= Title =` through `====== Title ======`.
    Heading { level: u8, text: String },
    /// A horizontal rule line (`----`).
    Hr,
    /// A blank source line.
    Br,
    /// `[[Target]]` or the target half of `[[Target|text]]`.
    Link { target: String },
    /// The display text half of `[[Target|text]]`, following its link.
    Text(String),
    /// `<ref>...</ref>` contents.
    Ref(String),
    /// Anything else, verbatim.
    Wild(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub nodes: Vec<Node>,
}

/// Parse a whole article body, one element per line.
pub fn parse(text: &str) -> Vec<Element> {
    text.lines().map(parse_line).collect()
}

/// The link targets of every element whose first node is a link, trimmed.
/// This is the edge source for the link graph.
pub fn extract_links(text: &str) -> Vec<String> {
    parse(text)
        .into_iter()
        .filter_map(|element| match element.nodes.first() {
            Some(Node::Link { target }) => {
                let target = target.trim();
                (!target.is_empty()).then(|| target.to_string())
            }
            _ => None,
        })
        .collect()
}

/// Parse a single source line into an element.
pub fn parse_line(line: &str) -> Element {
    if line.trim().is_empty() {
        return Element {
            nodes: vec![Node::Br],
        };
    }
    if line.len() >= 4 && line.bytes().all(|b| b == b'-') {
        return Element {
            nodes: vec![Node::Hr],
        };
    }
    if let Some(heading) = parse_heading(line) {
        return Element {
            nodes: vec![heading],
        };
    }
    Element {
        nodes: parse_inline(line),
    }
}

fn parse_heading(line: &str) -> Option<Node> {
    let level = line.bytes().take_while(|&b| b == b'=').count();
    if level == 0 || level > 6 || line.len() < level * 2 {
        return None;
    }
    let rest = &line[level..];
    if !rest.ends_with(&"=".repeat(level)) {
        return None;
    }
    let inner = &rest[..rest.len() - level];
    if inner.starts_with('=') || inner.ends_with('=') {
        return None;
    }
    Some(Node::Heading {
        level: level as u8,
        text: inner.trim().to_string(),
    })
}

/// Scan a line for `[[...]]` links and `<ref>...</ref>` references; anything
/// between them is wild text. Unterminated constructs fall through as wild.
pub fn parse_inline(line: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut rest = line;
    loop {
        let link_at = rest.find("[[");
        let ref_at = rest.find("<ref>");
        let (at, is_link) = match (link_at, ref_at) {
            (Some(l), Some(r)) if l < r => (l, true),
            (Some(l), None) => (l, true),
            (_, Some(r)) => (r, false),
            (None, None) => break,
        };

        let (closed, open_len, close) = if is_link {
            (rest[at..].find("]]"), 2, "]]")
        } else {
            (rest[at..].find("</ref>"), 5, "</ref>")
        };
        let Some(end) = closed else { break };

        if at > 0 {
            nodes.push(Node::Wild(rest[..at].to_string()));
        }
        let inner = &rest[at + open_len..at + end];
        if is_link {
            match inner.split_once('|') {
                Some((target, text)) => {
                    nodes.push(Node::Link {
                        target: target.to_string(),
                    });
                    nodes.push(Node::Text(text.to_string()));
                }
                None => nodes.push(Node::Link {
                    target: inner.to_string(),
                }),
            }
        } else {
            nodes.push(Node::Ref(inner.to_string()));
        }
        rest = &rest[at + end + close.len()..];
    }
    if !rest.is_empty() {
        nodes.push(Node::Wild(rest.to_string()));
    }
    nodes
}
