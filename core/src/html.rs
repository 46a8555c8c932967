//! Wiki markup to HTML.
//!
//! Line oriented: headings, rules and breaks map one line to one output
//! line; `*` and `#` prefixes build nested lists with the indentation scheme
//! fixed by the tests below; everything else is rendered inline (links,
//! references, wild text).

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::markup::{self, Node};

/// Escape set for a URL path segment: keeps unreserved characters and the
/// sub-delimiters that are safe inside a segment, everything else (spaces,
/// slashes, parentheses, quotes) is percent-encoded.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Percent-encode an article title for use in a `/wiki/article/` href.
pub fn escape_title(title: &str) -> String {
    utf8_percent_encode(title, PATH_SEGMENT).to_string()
}

/// Render a full wiki markup body to HTML.
pub fn render(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut open: Vec<&'static str> = Vec::new();
    let mut refs = 0usize;

    for (i, line) in lines.iter().enumerate() {
        match list_item(line) {
            Some((level, tag, content)) => {
                let next_level = lines
                    .get(i + 1)
                    .and_then(|next| list_item(next))
                    .map_or(0, |(lv, _, _)| lv);
                close_lists(&mut out, &mut open, level);
                while open.len() < level {
                    out.push(format!("{}<{}>", indent(open.len()), tag));
                    open.push(tag);
                }
                let body = render_nodes(&markup::parse_inline(content), &mut refs);
                let close = if next_level <= level { "</li>" } else { "" };
                out.push(format!("{}<li>{}{}", indent(level), body, close));
            }
            None => {
                close_lists(&mut out, &mut open, 0);
                render_line(line, &mut out, &mut refs);
            }
        }
    }
    close_lists(&mut out, &mut open, 0);
    out.join("\n")
}

fn render_line(line: &str, out: &mut Vec<String>, refs: &mut usize) {
    let element = markup::parse_line(line);
    match element.nodes.first() {
        Some(Node::Br) => {
            out.push("<br/>".to_string());
            out.push(String::new());
        }
        Some(Node::Hr) => out.push("<hr/>".to_string()),
        Some(Node::Heading { level, text }) => {
            out.push(format!("<h{level}>{text}</h{level}>"));
        }
        _ => out.push(render_nodes(&element.nodes, refs)),
    }
}

/// Render inline nodes. A link consumes its following display text and ends
/// the line: markup after a link on the same line is dropped.
fn render_nodes(nodes: &[Node], refs: &mut usize) -> String {
    let mut out = String::new();
    let mut iter = nodes.iter().peekable();
    while let Some(node) = iter.next() {
        match node {
            Node::Link { target } => {
                let text = match iter.peek() {
                    Some(Node::Text(text)) => text.as_str(),
                    _ => target.as_str(),
                };
                out.push_str(&format!(
                    "<a href=\"/wiki/article/{}\">{}</a>",
                    escape_title(target),
                    text
                ));
                break;
            }
            Node::Ref(content) => {
                out.push_str(&format!(
                    "<sup class=\"tooltip\">{refs}<span class=\"tooltiptext\">{content}</span></sup>"
                ));
                *refs += 1;
            }
            Node::Text(text) | Node::Wild(text) => out.push_str(text),
            Node::Heading { .. } | Node::Hr | Node::Br => {}
        }
    }
    out
}

/// A `*`/`#` list line: nesting level, list tag, and the item content.
fn list_item(line: &str) -> Option<(usize, &'static str, &str)> {
    let tag = match line.bytes().next() {
        Some(b'*') => "ul",
        Some(b'#') => "ol",
        _ => return None,
    };
    let marker = line.as_bytes()[0];
    let level = line.bytes().take_while(|&b| b == marker).count();
    Some((level, tag, line[level..].trim()))
}

fn close_lists(out: &mut Vec<String>, open: &mut Vec<&'static str>, target: usize) {
    while open.len() > target {
        let level = open.len();
        let tag = open.pop().expect("list open");
        out.push(format!("{}</{}>", indent(level - 1), tag));
        if level - 1 > target {
            out.push(format!("{}</li>", indent(level - 2)));
        }
    }
}

fn indent(n: usize) -> String {
    " ".repeat(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_lists_nest() {
        let text = "This is a test\n\
                    * Test 1\n\
                    ** Test 2\n\
                    *** Test 3\n\
                    **** Test 4\n\
                    *** Test 3 Again\n\
                    * Test 1 Again\n\
                    End Test";
        let target = "This is a test\n\
                      <ul>\n \
                      <li>Test 1\n \
                      <ul>\n  \
                      <li>Test 2\n  \
                      <ul>\n   \
                      <li>Test 3\n   \
                      <ul>\n    \
                      <li>Test 4</li>\n   \
                      </ul>\n   \
                      <li>Test 3 Again</li>\n  \
                      </ul>\n \
                      </li>\n \
                      </ul>\n \
                      <li>Test 1 Again</li>\n\
                      </ul>\n\
                      End Test";
        assert_eq!(render(text), target);
    }

    #[test]
    fn ordered_lists_nest() {
        let text = "This is a test\n\
                    # Test 1\n\
                    ## Test 2\n\
                    ### Test 3\n\
                    #### Test 4\n\
                    ### Test 3 Again\n\
                    # Test 1 Again\n\
                    End Test";
        let target = "This is a test\n\
                      <ol>\n \
                      <li>Test 1\n \
                      <ol>\n  \
                      <li>Test 2\n  \
                      <ol>\n   \
                      <li>Test 3\n   \
                      <ol>\n    \
                      <li>Test 4</li>\n   \
                      </ol>\n   \
                      <li>Test 3 Again</li>\n  \
                      </ol>\n \
                      </li>\n \
                      </ol>\n \
                      <li>Test 1 Again</li>\n\
                      </ol>\n\
                      End Test";
        assert_eq!(render(text), target);
    }

    #[test]
    fn small_list() {
        let text = "* Test 1\n** Test 2\n* Test 1 Again";
        let target = "<ul>\n \
                      <li>Test 1\n \
                      <ul>\n  \
                      <li>Test 2</li>\n \
                      </ul>\n \
                      <li>Test 1 Again</li>\n\
                      </ul>";
        assert_eq!(render(text), target);
    }

    #[test]
    fn headings_and_rules() {
        assert_eq!(render("== History =="), "<h2>History</h2>");
        assert_eq!(render("----"), "<hr/>");
        assert_eq!(render("a\n\nb"), "a\n<br/>\n\nb");
    }

    #[test]
    fn link_with_display_text() {
        assert_eq!(
            render("[[Rust (programming language)|Rust]]"),
            "<a href=\"/wiki/article/Rust%20%28programming%20language%29\">Rust</a>"
        );
    }

    #[test]
    fn link_text_defaults_to_target() {
        assert_eq!(
            render("see [[Albert Einstein]] trailing text"),
            "see <a href=\"/wiki/article/Albert%20Einstein\">Albert Einstein</a>"
        );
    }

    #[test]
    fn references_become_tooltips() {
        let html = render("Fact<ref>Source A</ref> and<ref>Source B</ref>");
        assert_eq!(
            html,
            "Fact<sup class=\"tooltip\">0<span class=\"tooltiptext\">Source A</span></sup> \
             and<sup class=\"tooltip\">1<span class=\"tooltiptext\">Source B</span></sup>"
        );
    }

    #[test]
    fn wild_text_passes_through() {
        assert_eq!(render("plain text with <b>markup</b>"), "plain text with <b>markup</b>");
    }
}
