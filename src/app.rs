use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::controller::{
    ControllerOptions, PageController, PendingNavigation, RecoveryPolicy, SubmitEvent,
    SubmitOutcome, UpdateOutcome, UpdateResult,
};
use crate::fragment;
use crate::output::{self, ListingReport, OutputFormat};
use crate::page::{BoundElements, ElementIds, Form};
use crate::query;
use crate::source::{HttpListingSource, SourceOptions};

const INTERACTIVE_HELP: &str = "commands:
  type <text>    replace the search text (one input event)
  key <chars>    type characters, one input event each
  clear          empty the search box (one input event)
  client <ref>   choose a client (one change event)
  submit         submit the filter form and load the client page
  show           print the current listing
  help           this list
  quit           leave";

fn format_kv_line(label: &str, value: &str) {
    eprintln!(":: {:<10}: {}", label, value);
}

fn status(tag: &str, message: &str) {
    let tag = match tag {
        "ERR" => tag.bold().red(),
        "WRN" => tag.bold().yellow(),
        _ => tag.bold().green(),
    };
    eprintln!("{}{}{} {}", "[".bold().white(), tag, "]".bold().white(), message);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn form_label(form: Option<&Form>) -> String {
    match form {
        Some(form) => format!(
            "yes ({} {})",
            form.method.to_ascii_uppercase(),
            form.action.as_deref().unwrap_or("<none>")
        ),
        None => "no".to_string(),
    }
}

fn recovery_label(policy: RecoveryPolicy) -> &'static str {
    match policy {
        RecoveryPolicy::KeepContent => "keep",
        RecoveryPolicy::InlineNotice => "notice",
    }
}

#[derive(Clone, Debug)]
struct RunConfig {
    source: SourceOptions,
    ids: ElementIds,
    controller: ControllerOptions,
    output_format: OutputFormat,
    no_color: bool,
    verbose: u8,
    query: Option<String>,
    client: Option<String>,
    submit: bool,
    interactive: bool,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let base_url = args
        .url
        .clone()
        .or(cfg.base_url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            "no site URL given, use --url or set base_url in the config".to_string()
        })?;
    reqwest::Url::parse(&base_url).map_err(|e| format!("invalid url '{base_url}': {e}"))?;

    let timeout_seconds = validation::timeout(args.timeout.or(cfg.timeout).unwrap_or(10))?;
    let header = args.header.or(cfg.header).filter(|h| !h.trim().is_empty());
    if let Some(h) = header.as_deref() {
        validation::header(h)?;
    }
    let follow_redirects = !args.no_follow_redirects && cfg.follow_redirects.unwrap_or(true);

    let recovery = match args.recovery.or(cfg.recovery) {
        Some(raw) => validation::recovery(&raw)?,
        None => RecoveryPolicy::default(),
    };
    let debounce = Duration::from_millis(args.debounce_ms.or(cfg.debounce_ms).unwrap_or(0));

    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => validation::output_format(&raw)?,
        None => OutputFormat::Text,
    };

    let mut ids = ElementIds::default();
    if let Some(overrides) = cfg.ids {
        let pick = |value: Option<String>, fallback: String| {
            value.filter(|v| !v.trim().is_empty()).unwrap_or(fallback)
        };
        ids = ElementIds {
            search_bar: pick(overrides.search_bar, ids.search_bar),
            client_select: pick(overrides.client_select, ids.client_select),
            filter_form: pick(overrides.filter_form, ids.filter_form),
            listing: pick(overrides.listing, ids.listing),
        };
    }

    Ok(RunConfig {
        source: SourceOptions {
            base_url,
            timeout_seconds,
            proxy: args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty()),
            header,
            follow_redirects,
            use_env_proxy: cfg.use_env_proxy.unwrap_or(true),
        },
        ids,
        controller: ControllerOptions { debounce, recovery },
        output_format,
        no_color: args.no_color || cfg.no_color.unwrap_or(false),
        verbose: args.verbose,
        query: args.query,
        client: args.client,
        submit: args.submit,
        interactive: args.interactive,
    })
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,listsync={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .compact()
        .try_init();
}

struct Session {
    controller: PageController,
    source: Arc<HttpListingSource>,
    navigation: Arc<PendingNavigation>,
    output_format: OutputFormat,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct DispatchSummary {
    applied: usize,
    superseded: usize,
    failed: usize,
}

fn summarize(results: Vec<UpdateResult>) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for result in results {
        match result {
            Ok(UpdateOutcome::Applied { .. }) => summary.applied += 1,
            Ok(UpdateOutcome::Superseded { .. }) => summary.superseded += 1,
            Ok(UpdateOutcome::Unbound) => {}
            Err(e) => {
                summary.failed += 1;
                status("ERR", &e.to_string());
            }
        }
    }
    summary
}

impl Session {
    async fn type_chars(&self, typed: &str) -> Result<(), String> {
        let Some(input) = self.controller.elements().search_bar.clone() else {
            status("WRN", "page has no search box");
            return Ok(());
        };
        let mut pending = FuturesUnordered::new();
        let mut buf = [0u8; 4];
        for ch in typed.chars() {
            input.push_str(ch.encode_utf8(&mut buf));
            pending.push(self.controller.on_search_input());
        }
        let mut results = Vec::with_capacity(pending.len());
        while let Some(result) = pending.next().await {
            results.push(result);
        }
        self.report(summarize(results))
    }

    async fn replace_text(&self, text: &str) -> Result<(), String> {
        let Some(input) = self.controller.elements().search_bar.clone() else {
            status("WRN", "page has no search box");
            return Ok(());
        };
        input.set_value(text);
        let result = self.controller.on_search_input().await;
        self.report(summarize(vec![result]))
    }

    async fn choose_client(&self, client_ref: &str) -> Result<(), String> {
        let Some(select) = self.controller.elements().client_select.clone() else {
            status("WRN", "page has no client selector");
            return Ok(());
        };
        if !select.select(client_ref) {
            let known: Vec<&str> = select.options().iter().map(|o| o.value.as_str()).collect();
            status(
                "WRN",
                &format!("unknown client '{client_ref}' (known: {})", known.join(", ")),
            );
            return Ok(());
        }
        let result = self.controller.on_client_change().await;
        self.report(summarize(vec![result]))
    }

    fn report(&self, summary: DispatchSummary) -> Result<(), String> {
        if summary.superseded > 0 || summary.failed > 0 {
            tracing::info!(
                applied = summary.applied,
                superseded = summary.superseded,
                failed = summary.failed,
                "refreshes settled"
            );
        }
        self.print_listing()
    }

    fn print_listing(&self) -> Result<(), String> {
        let Some(listing) = self.controller.elements().listing.as_ref() else {
            status("WRN", "page has no listing container");
            return Ok(());
        };
        let html = listing.inner_html();
        let notice = listing.notice();
        let query = self.controller.current_query();
        let bytes = match self.output_format {
            OutputFormat::Html => output::render_html(&html),
            format => {
                let report = ListingReport {
                    q: &query.q,
                    client_ref: &query.client_ref,
                    notice: notice.as_deref(),
                    entries: output::listing_entries(&html),
                };
                if format == OutputFormat::Json {
                    output::render_json(&report)
                } else {
                    output::render_text(&report)
                }
            }
        };
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&bytes)
            .and_then(|_| stdout.flush())
            .map_err(|e| format!("failed to write listing: {e}"))
    }

    async fn submit(&self) -> Result<(), String> {
        let mut event = SubmitEvent::new();
        match self.controller.on_submit(&mut event) {
            Ok(SubmitOutcome::Navigated { .. }) => {}
            Ok(SubmitOutcome::Unbound) => {
                status("WRN", "page has no filter form");
                return Ok(());
            }
            Err(e) => return Err(e.to_string()),
        }
        let Some(location) = self.navigation.take() else {
            return Ok(());
        };
        let client_ref = self.controller.current_query().client_ref;
        format_kv_line("Location", location.as_str());
        format_kv_line("Client", &query::client_display_name(&client_ref));
        let page = self
            .source
            .fetch_document(&location)
            .await
            .map_err(|e| e.to_string())?;
        let title = fragment::elements_by_tag(&page, "title")
            .first()
            .map(|t| fragment::text_content(t.inner_html(&page)))
            .unwrap_or_default();
        format_kv_line("Title", &title);
        status("INF", &format!("loaded {} ({} bytes)", location, page.len()));
        Ok(())
    }

    async fn handle_command(&self, line: &str) -> Result<bool, String> {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => {}
            "type" => self.replace_text(rest).await?,
            "key" => self.type_chars(rest).await?,
            "clear" => self.replace_text("").await?,
            "client" => self.choose_client(rest.trim()).await?,
            "submit" => self.submit().await?,
            "show" => self.print_listing()?,
            "help" => eprintln!("{INTERACTIVE_HELP}"),
            "quit" | "exit" => return Ok(false),
            other => status("WRN", &format!("unknown command '{other}', try 'help'")),
        }
        Ok(true)
    }

    async fn interactive(&self) -> Result<(), String> {
        eprintln!("{INTERACTIVE_HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match self.handle_command(&line).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => status("ERR", &e),
                },
                Ok(None) => break,
                Err(e) => return Err(format!("failed to read stdin: {e}")),
            }
        }
        Ok(())
    }
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    let source = Arc::new(HttpListingSource::new(&run.source).map_err(|e| e.to_string())?);
    let page_url = source.base().clone();
    let page = source
        .fetch_document(&page_url)
        .await
        .map_err(|e| e.to_string())?;

    let elements = BoundElements::from_document(&page, &run.ids);
    let navigation = Arc::new(PendingNavigation::new());
    let controller = PageController::initialize(
        page_url.clone(),
        elements,
        source.clone(),
        navigation.clone(),
        run.controller.clone(),
    );

    let bindings = controller.bindings();
    format_kv_line("Page", page_url.as_str());
    format_kv_line("Search", format_bool(bindings.search_input));
    format_kv_line("Clients", format_bool(bindings.client_change));
    format_kv_line(
        "Form",
        &form_label(controller.elements().filter_form.as_deref()),
    );
    format_kv_line(
        "Debounce",
        &format!("{}ms", run.controller.debounce.as_millis()),
    );
    format_kv_line("Recovery", recovery_label(run.controller.recovery));
    if run.verbose > 0 {
        if let Some(select) = controller.elements().client_select.as_ref() {
            for option in select.options() {
                format_kv_line("Option", &format!("{} ({})", option.label, option.value));
            }
        }
    }
    eprintln!();

    let session = Session {
        controller,
        source,
        navigation,
        output_format: run.output_format,
    };

    if let Some(client) = run.client.as_deref() {
        session.choose_client(client).await?;
    }
    if let Some(typed) = run.query.as_deref() {
        session.type_chars(typed).await?;
    }
    if run.client.is_none() && run.query.is_none() && !run.interactive {
        session.print_listing()?;
    }
    if run.submit {
        session.submit().await?;
    }
    if run.interactive {
        session.interactive().await?;
    }
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = e.print();
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));

    if args.init_config {
        let path = user_config_path
            .or_else(config::default_config_path)
            .ok_or_else(|| "cannot determine a config path, use --config".to_string())?;
        config::ensure_default_config_file(&path)?;
        println!("config written to {}", path.display());
        return Ok(());
    }

    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    if run.no_color {
        colored::control::set_override(false);
    }
    init_tracing(run.verbose);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
