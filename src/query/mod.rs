use reqwest::Url;
use serde::Serialize;

pub const SEARCH_PARAM: &str = "q";
pub const CLIENT_PARAM: &str = "client_ref";
pub const CLIENT_ROUTE: &str = "client";

/// Filter state sent with every listing refresh. Both parameters are always
/// present, empty when the corresponding control is missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ListingQuery {
    pub q: String,
    pub client_ref: String,
}

impl ListingQuery {
    pub fn new(q: impl Into<String>, client_ref: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            client_ref: client_ref.into(),
        }
    }

    /// `{origin}/?q=..&client_ref=..` with both values form-encoded.
    pub fn listing_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.set_path("/");
        url.set_fragment(None);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair(SEARCH_PARAM, &self.q)
            .append_pair(CLIENT_PARAM, &self.client_ref);
        url
    }
}

/// `{origin}/client/{client_ref}`, the reference encoded as a single path
/// segment. `None` when the base URL cannot carry a path, or when the reference
/// is a dot segment that would be resolved away instead of pushed.
pub fn client_location(base: &Url, client_ref: &str) -> Option<Url> {
    if matches!(client_ref, "." | "..") {
        return None;
    }
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.clear();
        segments.push(CLIENT_ROUTE);
        segments.push(client_ref);
    }
    Some(url)
}

/// Display name for a client reference: underscores become spaces and every
/// run of letters is title-cased.
pub fn client_display_name(client_ref: &str) -> String {
    let spaced = client_ref.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut at_word_start = true;
    for ch in spaced.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}
