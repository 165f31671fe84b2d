pub mod navigation;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fragment::{self, FragmentError};
use crate::page::{BoundElements, Container};
use crate::query::{self, ListingQuery};
use crate::source::{FetchError, ListingSource};

pub use navigation::{Navigator, PendingNavigation};

/// What happens to the listing when the latest refresh fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Leave the previous content as it is.
    KeepContent,
    /// Leave the previous content and attach an inline notice to the container.
    #[default]
    InlineNotice,
}

impl RecoveryPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "keep" | "keep_content" | "keep-content" => Some(Self::KeepContent),
            "notice" | "inline_notice" | "inline-notice" => Some(Self::InlineNotice),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ControllerOptions {
    /// Zero disables debouncing; every event fetches.
    pub debounce: Duration,
    pub recovery: RecoveryPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    SearchInput,
    ClientChange,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SearchInput => f.write_str("input"),
            Self::ClientChange => f.write_str("change"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Bindings {
    pub search_input: bool,
    pub client_change: bool,
    pub form_submit: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied { seq: u64 },
    /// A newer refresh was issued while this one was pending; nothing was written.
    Superseded { seq: u64, latest: u64 },
    Unbound,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("listing refresh #{seq} failed: {source}")]
    Fetch {
        seq: u64,
        #[source]
        source: FetchError,
    },

    #[error("listing refresh #{seq} returned no usable fragment: {source}")]
    Fragment {
        seq: u64,
        #[source]
        source: FragmentError,
    },
}

impl UpdateError {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Fetch { seq, .. } | Self::Fragment { seq, .. } => *seq,
        }
    }
}

pub type UpdateResult = Result<UpdateOutcome, UpdateError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("filter form submitted without a client selector")]
    MissingClientSelect,

    #[error("cannot build client location for '{client_ref}' from {base}")]
    InvalidLocation { base: String, client_ref: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Navigated { location: Url },
    Unbound,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SubmitEvent {
    default_prevented: bool,
}

impl SubmitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

struct Ticket {
    seq: u64,
    trigger: Trigger,
    query: ListingQuery,
}

pub struct PageController {
    base: Url,
    elements: BoundElements,
    bindings: Bindings,
    source: Arc<dyn ListingSource>,
    navigator: Arc<dyn Navigator>,
    options: ControllerOptions,
    issued: AtomicU64,
}

impl PageController {
    /// Binds to whatever elements are present. Missing elements disable the
    /// behaviour that depends on them and are otherwise ignored.
    pub fn initialize(
        base: Url,
        elements: BoundElements,
        source: Arc<dyn ListingSource>,
        navigator: Arc<dyn Navigator>,
        options: ControllerOptions,
    ) -> Self {
        let has_listing = elements.listing.is_some();
        let bindings = Bindings {
            search_input: elements.search_bar.is_some() && has_listing,
            client_change: elements.client_select.is_some() && has_listing,
            form_submit: elements.filter_form.is_some(),
        };
        if !has_listing {
            debug!("listing container not found, live filtering disabled");
        }
        if !bindings.search_input {
            debug!("search input handler not bound");
        }
        if !bindings.client_change {
            debug!("client change handler not bound");
        }
        if !bindings.form_submit {
            debug!("filter form handler not bound");
        }
        Self {
            base,
            elements,
            bindings,
            source,
            navigator,
            options,
            issued: AtomicU64::new(0),
        }
    }

    pub fn bindings(&self) -> Bindings {
        self.bindings
    }

    pub fn elements(&self) -> &BoundElements {
        &self.elements
    }

    /// Sequence number of the most recently issued refresh (0 before any).
    pub fn latest_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn current_query(&self) -> ListingQuery {
        let q = self
            .elements
            .search_bar
            .as_ref()
            .map(|input| input.value())
            .unwrap_or_default();
        let client_ref = self
            .elements
            .client_select
            .as_ref()
            .map(|select| select.value())
            .unwrap_or_default();
        ListingQuery { q, client_ref }
    }

    /// Input event on the search box. The query is captured when this is
    /// called, not when the returned future is first polled.
    pub fn on_search_input(&self) -> impl Future<Output = UpdateResult> + '_ {
        let ticket = self
            .bindings
            .search_input
            .then(|| self.issue(Trigger::SearchInput));
        self.settle(ticket)
    }

    /// Change event on the client selector.
    pub fn on_client_change(&self) -> impl Future<Output = UpdateResult> + '_ {
        let ticket = self
            .bindings
            .client_change
            .then(|| self.issue(Trigger::ClientChange));
        self.settle(ticket)
    }

    pub fn on_submit(&self, event: &mut SubmitEvent) -> Result<SubmitOutcome, SubmitError> {
        if !self.bindings.form_submit {
            return Ok(SubmitOutcome::Unbound);
        }
        event.prevent_default();
        let select = self
            .elements
            .client_select
            .as_ref()
            .ok_or(SubmitError::MissingClientSelect)?;
        let client_ref = select.value();
        let location = query::client_location(&self.base, &client_ref).ok_or_else(|| {
            SubmitError::InvalidLocation {
                base: self.base.to_string(),
                client_ref: client_ref.clone(),
            }
        })?;
        info!(%location, client_ref = %client_ref, "navigating to client view");
        self.navigator.assign(&location);
        Ok(SubmitOutcome::Navigated { location })
    }

    fn issue(&self, trigger: Trigger) -> Ticket {
        let query = self.current_query();
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, %trigger, q = %query.q, client_ref = %query.client_ref, "refresh issued");
        Ticket {
            seq,
            trigger,
            query,
        }
    }

    fn superseded(&self, ticket: &Ticket) -> Option<UpdateOutcome> {
        let latest = self.latest_issued();
        if latest == ticket.seq {
            return None;
        }
        debug!(seq = ticket.seq, latest, trigger = %ticket.trigger, "refresh superseded");
        Some(UpdateOutcome::Superseded {
            seq: ticket.seq,
            latest,
        })
    }

    async fn settle(&self, ticket: Option<Ticket>) -> UpdateResult {
        let (Some(ticket), Some(listing)) = (ticket, self.elements.listing.as_ref()) else {
            return Ok(UpdateOutcome::Unbound);
        };

        if !self.options.debounce.is_zero() {
            tokio::time::sleep(self.options.debounce).await;
            if let Some(outcome) = self.superseded(&ticket) {
                return Ok(outcome);
            }
        }

        let fetched = self.source.fetch_listing(&ticket.query).await;
        if let Some(outcome) = self.superseded(&ticket) {
            return Ok(outcome);
        }

        let document = match fetched {
            Ok(document) => document,
            Err(source) => {
                let err = UpdateError::Fetch {
                    seq: ticket.seq,
                    source,
                };
                self.recover(listing, &err);
                return Err(err);
            }
        };

        match fragment::extract_inner_html(&document, listing.id()) {
            Ok(inner) => {
                listing.replace_inner_html(inner);
                debug!(seq = ticket.seq, trigger = %ticket.trigger, "listing updated");
                Ok(UpdateOutcome::Applied { seq: ticket.seq })
            }
            Err(source) => {
                let err = UpdateError::Fragment {
                    seq: ticket.seq,
                    source,
                };
                self.recover(listing, &err);
                Err(err)
            }
        }
    }

    fn recover(&self, listing: &Container, err: &UpdateError) {
        warn!(seq = err.seq(), error = %err, "keeping previous listing");
        if self.options.recovery == RecoveryPolicy::InlineNotice {
            listing.show_notice(format!("Listing could not be refreshed: {err}"));
        }
    }
}
