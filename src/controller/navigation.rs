use std::sync::Mutex;

use reqwest::Url;

/// Receives full-page navigations requested by the controller. The controller
/// never loads the target itself.
pub trait Navigator: Send + Sync {
    fn assign(&self, location: &Url);
}

/// Keeps the most recent location so the driver can load it once the
/// triggering event has been handled.
#[derive(Debug, Default)]
pub struct PendingNavigation {
    location: Mutex<Option<Url>>,
}

impl PendingNavigation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<Url> {
        self.location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Navigator for PendingNavigation {
    fn assign(&self, location: &Url) {
        *self
            .location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(location.clone());
    }
}
