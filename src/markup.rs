//! Lenient markup-to-tree builder.
//!
//! Drives a `quick-xml` reader over HTML-ish input and feeds a
//! [`DocumentBuilder`]. This is not an HTML5 parser; it only relaxes what
//! XML parsing would reject in ordinary pages:
//!
//! - void elements (`<br>`, `<img ...>`) close themselves,
//! - end tags need not match (`</p>` closes up to the nearest open `<p>`,
//!   stray end tags are ignored),
//! - attributes may be unquoted or valueless,
//! - entities that fail to unescape are kept verbatim,
//! - `<script>` and `<style>` bodies are skipped unparsed up to their end
//!   tag, so `<` inside inline code does not open elements.
//!
//! Comments, processing instructions, and the doctype are skipped.

use adaptive_locator_core::dom::{Document, DocumentBuilder};
use anyhow::{bail, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Parse `text` into a [`Document`]. `url`, when given, sets the
/// document host used as the default domain key.
pub fn parse_document(text: &str, url: Option<&str>) -> Result<Document> {
    let mut builder = DocumentBuilder::new();
    if let Some(host) = url.and_then(host_from_url) {
        builder.set_host(host);
    }

    // offset of the current reader's input within `text`
    let mut base = 0usize;
    let mut reader = lenient_reader(text);
    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => bail!(
                "Failed to parse markup at byte {}: {}",
                base + reader.buffer_position() as usize,
                e
            ),
        };
        match event {
            Event::Start(e) => {
                let tag = tag_name(&e);
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    builder.open(&tag, attributes(&e));
                    builder.close();
                    continue;
                }
                builder.open(&tag, attributes(&e));
                if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    builder.close();
                    base = raw_text_end(text, base + reader.buffer_position() as usize, &tag);
                    reader = lenient_reader(&text[base..]);
                }
            }
            Event::Empty(e) => {
                let tag = tag_name(&e);
                builder.open(&tag, attributes(&e));
                builder.close();
            }
            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    continue;
                }
                builder.close_named(&tag);
            }
            Event::Text(t) => {
                let text = match t.unescape() {
                    Ok(s) => s,
                    Err(_) => Cow::Owned(String::from_utf8_lossy(&t).into_owned()),
                };
                builder.text(&text);
            }
            Event::CData(c) => {
                builder.text(&String::from_utf8_lossy(&c));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(builder.finish())
}

fn lenient_reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

/// Byte offset just past the `</tag>` closing a raw-text element whose body
/// starts at `from`, or the end of `text` when it is never closed.
fn raw_text_end(text: &str, from: usize, tag: &str) -> usize {
    let lower = text[from..].to_ascii_lowercase();
    let needle = format!("</{}", tag);
    let mut search = 0;
    while let Some(found) = lower[search..].find(&needle) {
        let after = search + found + needle.len();
        match lower.as_bytes().get(after) {
            Some(b'>') | Some(b'/') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => {
                return match lower[after..].find('>') {
                    Some(gt) => from + after + gt + 1,
                    None => text.len(),
                };
            }
            None => return text.len(),
            _ => search = after,
        }
    }
    text.len()
}

/// Host part of a URL, lower-cased, without userinfo or port.
///
/// Returns `None` when nothing host-like is present.
pub fn host_from_url(url: &str) -> Option<String> {
    let rest = match url.find("://") {
        Some(i) => &url[i + 3..],
        None => url.strip_prefix("//").unwrap_or(url),
    };
    let authority = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    let host = if host_port.starts_with('[') {
        // IPv6 literal
        host_port
            .find(']')
            .map(|end| &host_port[..=end])
            .unwrap_or(host_port)
    } else {
        host_port.split(':').next().unwrap_or(host_port)
    };
    let host = host.trim().to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.html_attributes()
        .with_checks(false)
        .filter_map(|a| a.ok())
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
            };
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(doc: &Document, tag: &str) -> Vec<usize> {
        doc.elements()
            .iter()
            .copied()
            .filter(|&id| doc.element(id).map(|e| e.tag()) == Some(tag))
            .collect()
    }

    #[test]
    fn test_parses_nested_elements() {
        let doc = parse_document(
            r#"<html><body><div class="card" data-id="101"><h2>Gaming Laptop</h2></div></body></html>"#,
            Some("https://shop.example/p/1"),
        )
        .unwrap();
        assert_eq!(doc.host(), Some("shop.example"));
        let div = find(&doc, "div")[0];
        let el = doc.element(div).unwrap();
        assert_eq!(el.attr("data-id"), Some("101"));
        assert_eq!(el.depth(), 2);
        assert_eq!(doc.text(div), "Gaming Laptop");
    }

    #[test]
    fn test_void_and_unclosed_elements() {
        let doc = parse_document(
            "<ul><li>one<br>two<li>three</ul><p>after<img src=x.png alt=pic></p>",
            None,
        )
        .unwrap();
        let lis = find(&doc, "li");
        assert_eq!(lis.len(), 2);
        // the second <li> nests inside the unclosed first one
        assert_eq!(doc.parent(lis[1]), Some(lis[0]));
        let p = find(&doc, "p")[0];
        assert_eq!(doc.parent(p), None);
        let img = find(&doc, "img")[0];
        assert_eq!(doc.element(img).unwrap().attr("alt"), Some("pic"));
        assert_eq!(doc.parent(img), Some(p));
    }

    #[test]
    fn test_stray_end_tags_are_ignored() {
        let doc = parse_document("<div><span>x</span></b></div>", None).unwrap();
        assert_eq!(find(&doc, "span").len(), 1);
        let div = find(&doc, "div")[0];
        assert_eq!(doc.text(div), "x");
    }

    #[test]
    fn test_script_text_is_skipped() {
        let doc = parse_document(
            "<div><script>var a = 1;</script><p>visible</p></div>",
            None,
        )
        .unwrap();
        let div = find(&doc, "div")[0];
        assert_eq!(doc.text(div), "visible");
    }

    #[test]
    fn test_angle_brackets_in_script_do_not_open_elements() {
        use crate::selector::CssSelector;
        use adaptive_locator_core::LocatorResolver;

        let doc = parse_document(
            "<body><script>if (a<b) { go(); }</script><div class=\"x\">Hi</div>\
             <style>p>a{color:red}</STYLE ><p>after</p></body>",
            None,
        )
        .unwrap();
        let body = find(&doc, "body")[0];
        let div = find(&doc, "div")[0];
        assert_eq!(doc.parent(div), Some(body));
        assert_eq!(doc.parent(find(&doc, "p")[0]), Some(body));
        assert_eq!(doc.len(), 5);
        assert_eq!(doc.text(body), "Hi after");
        assert_eq!(CssSelector.resolve(&doc, "body > .x").unwrap(), vec![div]);
    }

    #[test]
    fn test_unclosed_script_swallows_rest() {
        let doc = parse_document("<div>x</div><script>let y = 1 < 2;", None).unwrap();
        assert_eq!(find(&doc, "script").len(), 1);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_entities() {
        let doc = parse_document("<p>Fish &amp; Chips &nbsp;</p>", None).unwrap();
        let p = find(&doc, "p")[0];
        assert!(doc.text(p).starts_with("Fish"));
    }

    #[test]
    fn test_host_from_url() {
        assert_eq!(
            host_from_url("https://User@Shop.Example:8443/a?b#c").as_deref(),
            Some("shop.example")
        );
        assert_eq!(
            host_from_url("web.archive.org/web/1/x").as_deref(),
            Some("web.archive.org")
        );
        assert_eq!(host_from_url("http://[::1]:80/").as_deref(), Some("[::1]"));
        assert_eq!(host_from_url("file:///tmp/x.html"), None);
        assert_eq!(host_from_url(""), None);
    }
}
