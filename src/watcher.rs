//! Fixed-interval URL polling.
//!
//! The redirect can happen without a navigation event arriving in time, so
//! changes are found by comparing the location against the last observed
//! value on every tick of the poll interval.

use std::time::Duration;

use crate::{
    redirect::RedirectSurvivalGuard,
    resolver::StateResolver,
    state::StateMap,
    storage::{StorageTiers, STATE_PARAM},
    tree::{TreeDom, TreeStateController},
};

/// Kind of out-of-band location change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlChange {
    /// Now served from the redirect host
    Redirect { href: String },
    /// Fragment now carries a state token
    Fragment { href: String },
    Other { href: String },
}

/// A detected change and the state applied in response, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub change: UrlChange,
    pub applied: Option<StateMap>,
}

#[derive(Debug)]
pub struct UrlChangeWatcher {
    interval: Duration,
    guard: RedirectSurvivalGuard,
    last_href: Option<String>,
    next_poll: Duration,
}

impl UrlChangeWatcher {
    pub fn new(interval: Duration, guard: RedirectSurvivalGuard) -> Self {
        UrlChangeWatcher {
            interval,
            guard,
            last_href: None,
            next_poll: interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take the comparison baseline and restart the poll period.
    /// Must run after the redirect guard on load.
    pub fn baseline(&mut self, tiers: &StorageTiers, now: Duration) {
        self.acknowledge(tiers);
        self.next_poll = now + self.interval;
    }

    /// Accept the current location as seen, e.g. after our own URL writes
    pub fn acknowledge(&mut self, tiers: &StorageTiers) {
        self.last_href = Some(tiers.href().to_string());
    }

    pub fn is_due(&self, now: Duration) -> bool {
        now >= self.next_poll
    }

    /// Compare the location with the last observed value, if a poll is due
    pub fn poll(&mut self, tiers: &StorageTiers, now: Duration) -> Option<UrlChange> {
        if !self.is_due(now) {
            return None;
        }
        // Missed ticks collapse into one comparison
        self.next_poll = now + self.interval;

        let url = tiers.href();
        let href = url.to_string();
        if self.last_href.as_deref() == Some(href.as_str()) {
            return None;
        }
        tracing::debug!(
            "URL changed: {} -> {}",
            self.last_href.as_deref().unwrap_or(""),
            href
        );
        self.last_href = Some(href.clone());

        if self.guard.rule().is_redirect_host(&url) {
            Some(UrlChange::Redirect { href })
        } else if tiers.read_hash().is_some() {
            Some(UrlChange::Fragment { href })
        } else {
            Some(UrlChange::Other { href })
        }
    }

    /// Poll and, on a relevant change, re-resolve and apply the tree state.
    /// Empty results leave the tree as it is.
    pub fn tick<D: TreeDom>(
        &mut self,
        now: Duration,
        tiers: &StorageTiers,
        resolver: &StateResolver,
        controller: &TreeStateController,
        dom: &mut D,
    ) -> Option<WatchEvent> {
        let change = self.poll(tiers, now)?;

        let map = match &change {
            UrlChange::Redirect { .. } => {
                tracing::info!("Redirect host detected, restoring state");
                self.guard.run(tiers);
                self.acknowledge(tiers);
                resolver.resolve(tiers).map
            }
            UrlChange::Fragment { .. } => {
                tracing::debug!("Fragment {} changed", STATE_PARAM);
                resolver.resolve_hash(tiers)
            }
            UrlChange::Other { .. } => StateMap::new(),
        };

        let applied = if map.is_empty() {
            None
        } else {
            controller.apply(dom, &map);
            Some(map)
        };

        Some(WatchEvent { change, applied })
    }
}
