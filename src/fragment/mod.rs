use std::ops::Range;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "title"];

/// Elements whose end tag may be left out.
const OPTIONAL_END_ELEMENTS: [&str; 12] = [
    "li", "option", "optgroup", "dt", "dd", "p", "tr", "td", "th", "thead", "tbody", "tfoot",
];

/// Start tags that end an open `<p>`.
const P_CLOSERS: [&str; 31] = [
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "ul",
];

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Whether a start tag named `incoming` ends an open `open` element.
fn closes_implicitly(open: &str, incoming: &str) -> bool {
    match open {
        "li" => incoming == "li",
        "option" => matches!(incoming, "option" | "optgroup"),
        "optgroup" => incoming == "optgroup",
        "dt" | "dd" => matches!(incoming, "dt" | "dd"),
        "p" => P_CLOSERS.contains(&incoming),
        "tr" => matches!(incoming, "tr" | "thead" | "tbody" | "tfoot"),
        "td" | "th" => matches!(incoming, "td" | "th" | "tr" | "thead" | "tbody" | "tfoot"),
        "thead" | "tbody" => matches!(incoming, "tbody" | "tfoot"),
        _ => false,
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("no element with id '{id}' in document")]
    Missing { id: String },

    #[error("element '{tag}' with id '{id}' is never closed")]
    Unterminated { id: String, tag: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Tag {
    Open {
        name: String,
        attrs: Range<usize>,
        self_closing: bool,
        span: Range<usize>,
    },
    Close {
        name: String,
        span: Range<usize>,
    },
}

/// Walks the tags of an HTML string in document order. Comments, doctypes and
/// the bodies of raw-text elements are skipped.
#[derive(Clone)]
pub(crate) struct TagScanner<'a> {
    html: &'a str,
    lower: Rc<str>,
    pos: usize,
    raw_text_until: Option<String>,
}

impl<'a> TagScanner<'a> {
    pub(crate) fn new(html: &'a str) -> Self {
        Self {
            html,
            lower: Rc::from(html.to_ascii_lowercase()),
            pos: 0,
            raw_text_until: None,
        }
    }

    fn skip_raw_text(&mut self, name: &str) {
        let needle = format!("</{name}");
        match self.lower[self.pos..].find(&needle) {
            Some(offset) => self.pos += offset,
            None => self.pos = self.html.len(),
        }
    }

    fn tag_name_end(&self, from: usize) -> usize {
        self.html[from..]
            .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
            .map(|offset| from + offset)
            .unwrap_or(self.html.len())
    }

    /// Position just past the `>` that closes the tag, honouring quoted values.
    fn tag_end(&self, from: usize) -> Option<usize> {
        let mut quote: Option<u8> = None;
        for (i, b) in self.html.as_bytes()[from..].iter().enumerate() {
            match (quote, *b) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, b'"') | (None, b'\'') => quote = Some(*b),
                (None, b'>') => return Some(from + i + 1),
                _ => {}
            }
        }
        None
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        if let Some(name) = self.raw_text_until.take() {
            self.skip_raw_text(&name);
        }
        loop {
            let start = self.pos + self.html.get(self.pos..)?.find('<')?;
            let rest = &self.html[start..];

            if rest.starts_with("<!--") {
                self.pos = match rest[4..].find("-->") {
                    Some(offset) => start + 4 + offset + 3,
                    None => self.html.len(),
                };
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                self.pos = match rest.find('>') {
                    Some(offset) => start + offset + 1,
                    None => self.html.len(),
                };
                continue;
            }

            let is_close = rest.starts_with("</");
            let name_start = if is_close { start + 2 } else { start + 1 };
            let starts_with_letter = self
                .html
                .get(name_start..)
                .and_then(|s| s.chars().next())
                .map(|c| c.is_ascii_alphabetic())
                .unwrap_or(false);
            if !starts_with_letter {
                self.pos = start + 1;
                continue;
            }

            let name_end = self.tag_name_end(name_start);
            let name = self.lower[name_start..name_end].to_string();
            let end = match self.tag_end(name_end) {
                Some(end) => end,
                None => {
                    self.pos = self.html.len();
                    return None;
                }
            };
            self.pos = end;

            if is_close {
                return Some(Tag::Close {
                    name,
                    span: start..end,
                });
            }

            // A trailing slash only closes void elements; elsewhere it is ignored.
            let has_slash = self.html[..end - 1].ends_with('/');
            let self_closing = has_slash && is_void(&name);
            let attrs_end = if has_slash { end - 2 } else { end - 1 };
            if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                self.raw_text_until = Some(name.clone());
            }
            return Some(Tag::Open {
                name,
                attrs: name_end..attrs_end.max(name_end),
                self_closing,
                span: start..end,
            });
        }
    }
}

/// An element located in a document: its tag, attributes and the byte range
/// of its inner markup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementSpan {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub outer: Range<usize>,
    pub inner: Range<usize>,
}

impl ElementSpan {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn inner_html<'a>(&self, html: &'a str) -> &'a str {
        &html[self.inner.clone()]
    }
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
            .expect("attribute regex is valid")
    })
}

pub fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    attribute_re()
        .captures_iter(raw)
        .map(|cap| {
            let name = cap[1].to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse::<u32>().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Finds where an open `name` element the scanner just passed ends. Returns the
/// span of its close tag, or an empty range where an omitted end tag is implied
/// (a sibling start tag, the parent's close tag, or the end of the document).
fn matching_close(scanner: &mut TagScanner<'_>, name: &str) -> Option<Range<usize>> {
    let doc_end = scanner.html.len();
    let optional_end = OPTIONAL_END_ELEMENTS.contains(&name);
    let mut open: Vec<String> = Vec::new();
    for tag in scanner {
        match tag {
            Tag::Open {
                name: n,
                self_closing,
                span,
                ..
            } => {
                while open.last().is_some_and(|top| closes_implicitly(top, &n)) {
                    open.pop();
                }
                if open.is_empty() && closes_implicitly(name, &n) {
                    return Some(span.start..span.start);
                }
                if !self_closing && !is_void(&n) {
                    open.push(n);
                }
            }
            Tag::Close { name: n, span } => {
                if let Some(at) = open.iter().rposition(|o| *o == n) {
                    open.truncate(at);
                } else if n == name {
                    return Some(span);
                } else if optional_end {
                    return Some(span.start..span.start);
                }
            }
        }
    }
    optional_end.then_some(doc_end..doc_end)
}

fn span_for(
    html: &str,
    scanner: &mut TagScanner<'_>,
    name: String,
    attrs: Range<usize>,
    self_closing: bool,
    span: Range<usize>,
) -> Option<ElementSpan> {
    let attributes = parse_attributes(&html[attrs]);
    if self_closing || is_void(&name) {
        return Some(ElementSpan {
            tag: name,
            attributes,
            outer: span.clone(),
            inner: span.end..span.end,
        });
    }
    let close = matching_close(scanner, &name)?;
    Some(ElementSpan {
        tag: name,
        attributes,
        outer: span.start..close.end,
        inner: span.end..close.start,
    })
}

pub fn find_element(html: &str, id: &str) -> Result<ElementSpan, FragmentError> {
    let mut scanner = TagScanner::new(html);
    while let Some(tag) = scanner.next() {
        let Tag::Open {
            name,
            attrs,
            self_closing,
            span,
        } = tag
        else {
            continue;
        };
        let matches_id = parse_attributes(&html[attrs.clone()])
            .iter()
            .any(|(k, v)| k == "id" && v == id);
        if !matches_id {
            continue;
        }
        let tag_name = name.clone();
        return span_for(html, &mut scanner, name, attrs, self_closing, span).ok_or(
            FragmentError::Unterminated {
                id: id.to_string(),
                tag: tag_name,
            },
        );
    }
    Err(FragmentError::Missing { id: id.to_string() })
}

/// Inner markup of the element with the given id, as a fragment swap consumes it.
pub fn extract_inner_html(html: &str, id: &str) -> Result<String, FragmentError> {
    let element = find_element(html, id)?;
    Ok(element.inner_html(html).to_string())
}

/// Every complete element with the given tag name, outermost first. Nested
/// elements of the same name are reported too.
pub fn elements_by_tag(html: &str, tag: &str) -> Vec<ElementSpan> {
    let tag = tag.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut scanner = TagScanner::new(html);
    while let Some(t) = scanner.next() {
        let Tag::Open {
            name,
            attrs,
            self_closing,
            span,
        } = t
        else {
            continue;
        };
        if name != tag {
            continue;
        }
        let mut inner_scanner = scanner.clone();
        if let Some(element) = span_for(html, &mut inner_scanner, name, attrs, self_closing, span) {
            out.push(element);
        }
    }
    out
}

pub fn text_content(html: &str) -> String {
    let mut text = String::new();
    let mut cursor = 0usize;
    let mut in_raw_text = false;
    for tag in TagScanner::new(html) {
        let span = match &tag {
            Tag::Open { span, .. } | Tag::Close { span, .. } => span.clone(),
        };
        if span.start > cursor && !in_raw_text {
            text.push_str(&html[cursor..span.start]);
        }
        text.push(' ');
        cursor = span.end;
        in_raw_text = matches!(
            &tag,
            Tag::Open { name, self_closing: false, .. } if RAW_TEXT_ELEMENTS.contains(&name.as_str())
        );
    }
    if cursor < html.len() && !in_raw_text {
        text.push_str(&html[cursor..]);
    }
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
