use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::fragment::{self, ElementSpan};

pub const SEARCH_BAR_ID: &str = "search-bar";
pub const CLIENT_SELECT_ID: &str = "client-select";
pub const FILTER_FORM_ID: &str = "filter-form";
pub const LISTING_ID: &str = "projects-list";

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ElementIds {
    pub search_bar: String,
    pub client_select: String,
    pub filter_form: String,
    pub listing: String,
}

impl Default for ElementIds {
    fn default() -> Self {
        Self {
            search_bar: SEARCH_BAR_ID.to_string(),
            client_select: CLIENT_SELECT_ID.to_string(),
            filter_form: FILTER_FORM_ID.to_string(),
            listing: LISTING_ID.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct TextInput {
    id: String,
    value: RwLock<String>,
}

impl TextInput {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: RwLock::new(value.into()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> String {
        read(&self.value).clone()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        *write(&self.value) = value.into();
    }

    /// Appends typed characters, as one keystroke would.
    pub fn push_str(&self, typed: &str) {
        write(&self.value).push_str(typed);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug)]
pub struct Select {
    id: String,
    options: Vec<SelectOption>,
    value: RwLock<String>,
}

impl Select {
    /// Starts on `selected`, or on the first option when no explicit
    /// selection is given.
    pub fn new(id: impl Into<String>, options: Vec<SelectOption>, selected: Option<&str>) -> Self {
        let initial = selected
            .filter(|s| options.is_empty() || options.iter().any(|o| o.value == *s))
            .map(str::to_string)
            .or_else(|| options.first().map(|o| o.value.clone()))
            .unwrap_or_default();
        Self {
            id: id.into(),
            options,
            value: RwLock::new(initial),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &[SelectOption] {
        &self.options
    }

    pub fn value(&self) -> String {
        read(&self.value).clone()
    }

    /// Returns false, leaving the selection unchanged, when the select has
    /// options and none of them carries `value`.
    pub fn select(&self, value: &str) -> bool {
        if !self.options.is_empty() && !self.options.iter().any(|o| o.value == value) {
            return false;
        }
        *write(&self.value) = value.to_string();
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Form {
    pub id: String,
    pub action: Option<String>,
    pub method: String,
}

impl Form {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: None,
            method: "get".to_string(),
        }
    }
}

/// The results container whose inner markup is swapped on refresh.
#[derive(Debug)]
pub struct Container {
    id: String,
    inner_html: RwLock<String>,
    notice: RwLock<Option<String>>,
}

impl Container {
    pub fn new(id: impl Into<String>, inner_html: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner_html: RwLock::new(inner_html.into()),
            notice: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn inner_html(&self) -> String {
        read(&self.inner_html).clone()
    }

    pub fn replace_inner_html(&self, html: impl Into<String>) {
        *write(&self.inner_html) = html.into();
        *write(&self.notice) = None;
    }

    pub fn notice(&self) -> Option<String> {
        read(&self.notice).clone()
    }

    pub fn show_notice(&self, message: impl Into<String>) {
        *write(&self.notice) = Some(message.into());
    }
}

/// Element handles the controller works against. Each one is optional; a
/// missing element only disables the behaviour that needs it.
#[derive(Clone, Debug, Default)]
pub struct BoundElements {
    pub search_bar: Option<Arc<TextInput>>,
    pub client_select: Option<Arc<Select>>,
    pub filter_form: Option<Arc<Form>>,
    pub listing: Option<Arc<Container>>,
}

impl BoundElements {
    /// Locates the elements of a served page by id.
    pub fn from_document(html: &str, ids: &ElementIds) -> Self {
        let search_bar = fragment::find_element(html, &ids.search_bar)
            .ok()
            .map(|el| Arc::new(TextInput::new(&ids.search_bar, el.attr("value").unwrap_or(""))));

        let client_select = fragment::find_element(html, &ids.client_select)
            .ok()
            .map(|el| Arc::new(select_from_element(html, &ids.client_select, &el)));

        let filter_form = fragment::find_element(html, &ids.filter_form)
            .ok()
            .map(|el| {
                Arc::new(Form {
                    id: ids.filter_form.clone(),
                    action: el.attr("action").map(str::to_string),
                    method: el.attr("method").unwrap_or("get").to_ascii_lowercase(),
                })
            });

        let listing = fragment::find_element(html, &ids.listing)
            .ok()
            .map(|el| Arc::new(Container::new(&ids.listing, el.inner_html(html))));

        Self {
            search_bar,
            client_select,
            filter_form,
            listing,
        }
    }
}

fn select_from_element(html: &str, id: &str, element: &ElementSpan) -> Select {
    let inner = element.inner_html(html);
    let mut selected: Option<String> = None;
    let options = fragment::elements_by_tag(inner, "option")
        .into_iter()
        .map(|opt| {
            let label = fragment::text_content(opt.inner_html(inner));
            let value = opt
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| label.clone());
            if selected.is_none() && opt.has_attr("selected") {
                selected = Some(value.clone());
            }
            SelectOption { value, label }
        })
        .collect();
    Select::new(id, options, selected.as_deref())
}
