use serde::Serialize;

use crate::fragment;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Html,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// One entry per link in the fragment, or per list item when it has no links.
pub fn listing_entries(fragment_html: &str) -> Vec<ListingEntry> {
    let anchors = fragment::elements_by_tag(fragment_html, "a");
    if !anchors.is_empty() {
        return anchors
            .iter()
            .map(|a| ListingEntry {
                label: fragment::text_content(a.inner_html(fragment_html)),
                href: a.attr("href").map(str::to_string),
            })
            .collect();
    }
    fragment::elements_by_tag(fragment_html, "li")
        .iter()
        .map(|li| ListingEntry {
            label: fragment::text_content(li.inner_html(fragment_html)),
            href: None,
        })
        .filter(|entry| !entry.label.is_empty())
        .collect()
}

#[derive(Clone, Debug, Serialize)]
pub struct ListingReport<'a> {
    pub q: &'a str,
    pub client_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<&'a str>,
    pub entries: Vec<ListingEntry>,
}

pub fn render_text(report: &ListingReport<'_>) -> Vec<u8> {
    let mut out = String::new();
    for entry in &report.entries {
        out.push_str(&entry.label);
        if let Some(href) = entry.href.as_deref() {
            out.push_str("  ");
            out.push_str(href);
        }
        out.push('\n');
    }
    if let Some(notice) = report.notice {
        out.push_str("! ");
        out.push_str(notice);
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(report: &ListingReport<'_>) -> Vec<u8> {
    let mut out = serde_json::to_vec_pretty(report).unwrap_or_else(|_| b"{}".to_vec());
    out.push(b'\n');
    out
}

pub fn render_html(fragment_html: &str) -> Vec<u8> {
    let mut out = fragment_html.trim().to_string();
    out.push('\n');
    out.into_bytes()
}
