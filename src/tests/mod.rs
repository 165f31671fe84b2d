use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::controller::{
    ControllerOptions, PageController, PendingNavigation, RecoveryPolicy, SubmitError,
    SubmitEvent, SubmitOutcome, UpdateError, UpdateOutcome,
};
use crate::fragment::FragmentError;
use crate::page::{BoundElements, Container, ElementIds, Form, Select, SelectOption, TextInput};
use crate::query::ListingQuery;
use crate::source::{FetchError, HttpListingSource, ListingSource, SourceOptions};

fn page_with(listing: &str) -> String {
    format!(
        r#"<!doctype html><html><body><ul id="projects-list">{listing}</ul></body></html>"#
    )
}

enum Reply {
    Document(String),
    Status(u16),
}

/// Answers every query with a page listing `q|client_ref`, unless a reply was
/// scripted for that search text. Gated queries wait until released.
#[derive(Default)]
struct ScriptedSource {
    calls: Mutex<Vec<ListingQuery>>,
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl ScriptedSource {
    fn reply(&self, q: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(q.to_string(), reply);
    }

    fn gate(&self, q: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(q.to_string(), rx);
        tx
    }

    fn calls(&self) -> Vec<ListingQuery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for ScriptedSource {
    async fn fetch_listing(&self, query: &ListingQuery) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(query.clone());
        let gate = self.gates.lock().unwrap().remove(&query.q);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let replies = self.replies.lock().unwrap();
        match replies.get(&query.q) {
            Some(Reply::Document(body)) => Ok(body.clone()),
            Some(Reply::Status(status)) => Err(FetchError::Status {
                url: format!("http://dash.local:5001/?q={}", query.q),
                status: *status,
            }),
            None => Ok(page_with(&format!(
                "<li>{}|{}</li>",
                query.q, query.client_ref
            ))),
        }
    }
}

struct Fixture {
    controller: PageController,
    source: Arc<ScriptedSource>,
    navigation: Arc<PendingNavigation>,
    search: Arc<TextInput>,
    select: Arc<Select>,
    listing: Arc<Container>,
}

fn base() -> Url {
    Url::parse("http://dash.local:5001/").unwrap()
}

fn clients() -> Vec<SelectOption> {
    ["acme", "globex", "paris_2024_olympics"]
        .iter()
        .map(|v| SelectOption {
            value: v.to_string(),
            label: v.to_string(),
        })
        .collect()
}

fn fixture_with(options: ControllerOptions) -> Fixture {
    let search = Arc::new(TextInput::new("search-bar", ""));
    let select = Arc::new(Select::new("client-select", clients(), None));
    let listing = Arc::new(Container::new("projects-list", "<li>initial</li>"));
    let elements = BoundElements {
        search_bar: Some(search.clone()),
        client_select: Some(select.clone()),
        filter_form: Some(Arc::new(Form::new("filter-form"))),
        listing: Some(listing.clone()),
    };
    let source = Arc::new(ScriptedSource::default());
    let navigation = Arc::new(PendingNavigation::new());
    let controller = PageController::initialize(
        base(),
        elements,
        source.clone(),
        navigation.clone(),
        options,
    );
    Fixture {
        controller,
        source,
        navigation,
        search,
        select,
        listing,
    }
}

fn fixture() -> Fixture {
    fixture_with(ControllerOptions::default())
}

#[tokio::test]
async fn input_event_fetches_root_with_text_and_selection() {
    let f = fixture();
    f.search.set_value("olymp");
    let outcome = f.controller.on_search_input().await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Applied { seq: 1 });
    assert_eq!(f.source.calls(), vec![ListingQuery::new("olymp", "acme")]);
    assert_eq!(f.listing.inner_html(), "<li>olymp|acme</li>");
}

#[tokio::test]
async fn change_event_sends_new_selection_and_current_text() {
    let f = fixture();
    f.search.set_value("ab");
    assert!(f.select.select("globex"));
    f.controller.on_client_change().await.unwrap();
    assert_eq!(f.source.calls(), vec![ListingQuery::new("ab", "globex")]);
    assert_eq!(f.listing.inner_html(), "<li>ab|globex</li>");
}

#[tokio::test]
async fn fragment_content_is_swapped_in_exactly() {
    let f = fixture();
    f.source.reply(
        "x",
        Reply::Document(r#"<html><body><div id="projects-list">X</div></body></html>"#.into()),
    );
    f.search.set_value("x");
    f.controller.on_search_input().await.unwrap();
    assert_eq!(f.listing.inner_html(), "X");
    assert!(f.listing.notice().is_none());
}

#[tokio::test]
async fn response_without_listing_is_a_fault() {
    let f = fixture();
    f.source.reply(
        "x",
        Reply::Document("<html><body><p>maintenance</p></body></html>".into()),
    );
    f.search.set_value("x");
    let err = f.controller.on_search_input().await.unwrap_err();
    match err {
        UpdateError::Fragment { seq, source } => {
            assert_eq!(seq, 1);
            assert_eq!(
                source,
                FragmentError::Missing {
                    id: "projects-list".to_string()
                }
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(f.listing.inner_html(), "<li>initial</li>");
    assert!(f.listing.notice().unwrap().contains("projects-list"));
}

#[tokio::test]
async fn failed_fetch_keeps_content_silently_with_keep_policy() {
    let f = fixture_with(ControllerOptions {
        recovery: RecoveryPolicy::KeepContent,
        ..ControllerOptions::default()
    });
    f.source.reply("boom", Reply::Status(500));
    f.search.set_value("boom");
    let err = f.controller.on_search_input().await.unwrap_err();
    assert!(matches!(
        err,
        UpdateError::Fetch {
            source: FetchError::Status { status: 500, .. },
            ..
        }
    ));
    assert_eq!(f.listing.inner_html(), "<li>initial</li>");
    assert!(f.listing.notice().is_none());
}

#[tokio::test]
async fn successful_refresh_clears_previous_notice() {
    let f = fixture();
    f.source.reply("boom", Reply::Status(502));
    f.search.set_value("boom");
    assert!(f.controller.on_search_input().await.is_err());
    assert!(f.listing.notice().is_some());

    f.search.set_value("ok");
    f.controller.on_search_input().await.unwrap();
    assert!(f.listing.notice().is_none());
    assert_eq!(f.listing.inner_html(), "<li>ok|acme</li>");
}

#[tokio::test]
async fn late_response_to_older_keystroke_is_discarded() {
    let f = fixture();
    let release_ab = f.source.gate("ab");

    f.search.set_value("ab");
    let first = f.controller.on_search_input();
    f.search.set_value("abc");
    let second = f.controller.on_search_input();

    let (first, second) = tokio::join!(first, async {
        let outcome = second.await;
        let _ = release_ab.send(());
        outcome
    });

    assert_eq!(second.unwrap(), UpdateOutcome::Applied { seq: 2 });
    assert_eq!(
        first.unwrap(),
        UpdateOutcome::Superseded { seq: 1, latest: 2 }
    );
    assert_eq!(f.listing.inner_html(), "<li>abc|acme</li>");
    assert_eq!(
        f.source.calls(),
        vec![
            ListingQuery::new("ab", "acme"),
            ListingQuery::new("abc", "acme")
        ]
    );
}

#[tokio::test]
async fn superseded_failure_does_not_raise_notice() {
    let f = fixture();
    let release_ab = f.source.gate("ab");
    f.source.reply("ab", Reply::Status(500));

    f.search.set_value("ab");
    let first = f.controller.on_search_input();
    f.search.set_value("abc");
    let second = f.controller.on_search_input();

    let (first, second) = tokio::join!(first, async {
        let outcome = second.await;
        let _ = release_ab.send(());
        outcome
    });

    assert!(matches!(first, Ok(UpdateOutcome::Superseded { seq: 1, .. })));
    assert!(second.is_ok());
    assert!(f.listing.notice().is_none());
}

#[tokio::test]
async fn debounce_fetches_only_the_last_keystroke() {
    let f = fixture_with(ControllerOptions {
        debounce: Duration::from_millis(20),
        ..ControllerOptions::default()
    });
    let mut pending = Vec::new();
    for typed in ["a", "b", "c"] {
        f.search.push_str(typed);
        pending.push(f.controller.on_search_input());
    }
    let results = futures::future::join_all(pending).await;

    assert_eq!(f.source.calls(), vec![ListingQuery::new("abc", "acme")]);
    assert!(matches!(results[0], Ok(UpdateOutcome::Superseded { seq: 1, .. })));
    assert!(matches!(results[1], Ok(UpdateOutcome::Superseded { seq: 2, .. })));
    assert!(matches!(results[2], Ok(UpdateOutcome::Applied { seq: 3 })));
    assert_eq!(f.listing.inner_html(), "<li>abc|acme</li>");
}

#[tokio::test]
async fn submit_navigates_to_client_view_without_fetching() {
    let f = fixture();
    assert!(f.select.select("paris_2024_olympics"));
    let mut event = SubmitEvent::new();
    let outcome = f.controller.on_submit(&mut event).unwrap();

    let expected = Url::parse("http://dash.local:5001/client/paris_2024_olympics").unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Navigated {
            location: expected.clone()
        }
    );
    assert!(event.default_prevented());
    assert_eq!(f.navigation.take(), Some(expected));
    assert!(f.source.calls().is_empty());
}

#[test]
fn submit_rejects_dot_segment_client() {
    let options = vec![SelectOption {
        value: "..".to_string(),
        label: "up".to_string(),
    }];
    let elements = BoundElements {
        client_select: Some(Arc::new(Select::new("client-select", options, None))),
        filter_form: Some(Arc::new(Form::new("filter-form"))),
        ..BoundElements::default()
    };
    let navigation = Arc::new(PendingNavigation::new());
    let controller = PageController::initialize(
        base(),
        elements,
        Arc::new(ScriptedSource::default()),
        navigation.clone(),
        ControllerOptions::default(),
    );
    let mut event = SubmitEvent::new();
    assert_eq!(
        controller.on_submit(&mut event),
        Err(SubmitError::InvalidLocation {
            base: "http://dash.local:5001/".to_string(),
            client_ref: "..".to_string(),
        })
    );
    assert!(event.default_prevented());
    assert!(navigation.take().is_none());
}

#[test]
fn submit_without_selector_still_prevents_default() {
    let elements = BoundElements {
        filter_form: Some(Arc::new(Form::new("filter-form"))),
        ..BoundElements::default()
    };
    let navigation = Arc::new(PendingNavigation::new());
    let controller = PageController::initialize(
        base(),
        elements,
        Arc::new(ScriptedSource::default()),
        navigation.clone(),
        ControllerOptions::default(),
    );
    let mut event = SubmitEvent::new();
    assert_eq!(
        controller.on_submit(&mut event),
        Err(SubmitError::MissingClientSelect)
    );
    assert!(event.default_prevented());
    assert!(navigation.take().is_none());
}

#[tokio::test]
async fn absent_search_bar_leaves_input_unbound() {
    let source = Arc::new(ScriptedSource::default());
    let elements = BoundElements {
        search_bar: None,
        client_select: Some(Arc::new(Select::new("client-select", clients(), None))),
        filter_form: None,
        listing: Some(Arc::new(Container::new("projects-list", ""))),
    };
    let controller = PageController::initialize(
        base(),
        elements,
        source.clone(),
        Arc::new(PendingNavigation::new()),
        ControllerOptions::default(),
    );

    let bindings = controller.bindings();
    assert!(!bindings.search_input);
    assert!(bindings.client_change);
    assert!(!bindings.form_submit);

    assert_eq!(
        controller.on_search_input().await.unwrap(),
        UpdateOutcome::Unbound
    );
    let mut event = SubmitEvent::new();
    assert_eq!(
        controller.on_submit(&mut event),
        Ok(SubmitOutcome::Unbound)
    );
    assert!(!event.default_prevented());
    assert!(source.calls().is_empty());
    assert_eq!(controller.latest_issued(), 0);

    controller.on_client_change().await.unwrap();
    assert_eq!(source.calls(), vec![ListingQuery::new("", "acme")]);
}

#[tokio::test]
async fn absent_selector_sends_empty_client_ref() {
    let search = Arc::new(TextInput::new("search-bar", ""));
    let listing = Arc::new(Container::new("projects-list", "<li>initial</li>"));
    let elements = BoundElements {
        search_bar: Some(search.clone()),
        client_select: None,
        filter_form: None,
        listing: Some(listing.clone()),
    };
    let source = Arc::new(ScriptedSource::default());
    let controller = PageController::initialize(
        base(),
        elements,
        source.clone(),
        Arc::new(PendingNavigation::new()),
        ControllerOptions::default(),
    );
    assert!(controller.bindings().search_input);
    assert!(!controller.bindings().client_change);

    search.set_value("olymp");
    assert_eq!(
        controller.on_search_input().await.unwrap(),
        UpdateOutcome::Applied { seq: 1 }
    );
    assert_eq!(source.calls(), vec![ListingQuery::new("olymp", "")]);
    assert_eq!(listing.inner_html(), "<li>olymp|</li>");
}

#[test]
fn missing_listing_disables_live_filtering() {
    let elements = BoundElements {
        search_bar: Some(Arc::new(TextInput::new("search-bar", ""))),
        client_select: Some(Arc::new(Select::new("client-select", clients(), None))),
        filter_form: Some(Arc::new(Form::new("filter-form"))),
        listing: None,
    };
    let controller = PageController::initialize(
        base(),
        elements,
        Arc::new(ScriptedSource::default()),
        Arc::new(PendingNavigation::new()),
        ControllerOptions::default(),
    );
    let bindings = controller.bindings();
    assert!(!bindings.search_input);
    assert!(!bindings.client_change);
    assert!(bindings.form_submit);
}

#[tokio::test]
async fn elements_bound_from_served_page_drive_refresh() {
    let page = r#"<html><body>
<form id="filter-form" action="/filter" method="post">
  <select id="client-select" name="client_ref">
    <option value="acme">Acme</option>
    <option value="globex" selected>Globex</option>
  </select>
</form>
<input id="search-bar" type="text" value="">
<div id="projects-list"><ul><li>stale</li></ul></div>
</body></html>"#;
    let elements = BoundElements::from_document(page, &ElementIds::default());
    let search = elements.search_bar.clone().unwrap();
    let listing = elements.listing.clone().unwrap();
    let source = Arc::new(ScriptedSource::default());
    let controller = PageController::initialize(
        base(),
        elements,
        source.clone(),
        Arc::new(PendingNavigation::new()),
        ControllerOptions::default(),
    );

    search.set_value("glo");
    controller.on_search_input().await.unwrap();
    assert_eq!(source.calls(), vec![ListingQuery::new("glo", "globex")]);
    assert_eq!(listing.inner_html(), "<li>glo|globex</li>");
}

async fn serve_once(listener: TcpListener, status_line: &'static str, body: String) -> String {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    let _ = socket.shutdown().await;
    String::from_utf8_lossy(&request).to_string()
}

fn local_source(addr: std::net::SocketAddr) -> HttpListingSource {
    HttpListingSource::new(&SourceOptions {
        base_url: format!("http://{addr}/projects"),
        timeout_seconds: 5,
        use_env_proxy: false,
        ..SourceOptions::default()
    })
    .unwrap()
}

#[tokio::test]
async fn http_source_encodes_query_on_root_path() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_once(listener, "200 OK", page_with("<li>hit</li>")));

    let source = local_source(addr);
    let body = source
        .fetch_listing(&ListingQuery::new("a b&c", "paris_2024_olympics"))
        .await
        .unwrap();
    let request = server.await.unwrap();

    assert!(body.contains("<li>hit</li>"));
    assert!(
        request.starts_with("GET /?q=a+b%26c&client_ref=paris_2024_olympics HTTP/1.1\r\n"),
        "unexpected request: {request}"
    );
    assert!(request.to_lowercase().contains("user-agent: listsync/"));
}

#[tokio::test]
async fn http_source_reports_error_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_once(
        listener,
        "500 Internal Server Error",
        "oops".to_string(),
    ));

    let source = local_source(addr);
    let err = source
        .fetch_listing(&ListingQuery::default())
        .await
        .unwrap_err();
    let _ = server.await;
    assert!(matches!(err, FetchError::Status { status: 500, .. }));
}
