use std::{cell::RefCell, rc::Rc};

use anyhow::{Context, Result};
use url::Url;

use super::traits::Location;

#[derive(Debug)]
struct HistoryEntry {
    url: Url,
    referrer: Option<String>,
}

#[derive(Debug)]
struct History {
    current: HistoryEntry,
    previous: Vec<HistoryEntry>,
}

/// Browser location with a history stack.
///
/// Clones share the same history, so a driver can navigate "behind the back"
/// of the code holding the other handle, as a redirect does.
#[derive(Debug, Clone)]
pub struct SimulatedLocation {
    history: Rc<RefCell<History>>,
}

impl SimulatedLocation {
    pub fn new(url: Url, referrer: Option<String>) -> Self {
        SimulatedLocation {
            history: Rc::new(RefCell::new(History {
                current: HistoryEntry { url, referrer },
                previous: Vec::new(),
            })),
        }
    }

    pub fn parse(url: &str, referrer: Option<&str>) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
        Ok(Self::new(url, referrer.map(str::to_string)))
    }

    /// A navigation: pushes a new history entry
    pub fn navigate(&self, url: Url, referrer: Option<String>) {
        let mut history = self.history.borrow_mut();
        let previous = std::mem::replace(&mut history.current, HistoryEntry { url, referrer });
        history.previous.push(previous);
    }

    /// History back. Returns false when already at the first entry.
    pub fn back(&self) -> bool {
        let mut history = self.history.borrow_mut();
        match history.previous.pop() {
            Some(entry) => {
                history.current = entry;
                true
            }
            None => false,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.borrow().previous.len() + 1
    }
}

impl Location for SimulatedLocation {
    fn href(&self) -> Url {
        self.history.borrow().current.url.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.history
            .borrow()
            .current
            .referrer
            .clone()
            .filter(|referrer| !referrer.is_empty())
    }

    fn replace_state(&self, url: Url) -> Result<()> {
        self.history.borrow_mut().current.url = url;
        Ok(())
    }
}
