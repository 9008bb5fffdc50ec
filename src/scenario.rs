//! Scripted browsing sessions, replayed against the in-memory document.
//!
//! ```yaml
//! url: https://storage.cloud.google.com/bucket/kpi.html
//! outline:
//!   - id: kpi
//!     children: [{ id: sales }]
//! steps:
//!   - toggle: kpi-children
//!   - advance_ms: 600
//!   - reload
//! ```

use std::{collections::BTreeMap, path::Path, rc::Rc, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    config::SyncConfig,
    document::{OutlineNode, TreeDocument},
    page::PageSession,
    schedule::{Clock, ManualClock},
    state::NodeId,
    storage::{
        KeyValueStore, Location, MemoryStore, SimulatedLocation, StorageTiers, LOCAL_DENSE_KEY,
        LOCAL_TOKEN_KEY, SESSION_DENSE_KEY, SESSION_STASH_KEY,
    },
};

/// Granularity of simulated time; the event loop gets a turn this often
const TICK: Duration = Duration::from_millis(50);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Click the control targeting this container id
    Toggle(NodeId),
    /// Let time pass, running polls and deferred tasks
    AdvanceMs(u64),
    /// Navigate to a new document (e.g. the hosting proxy's redirect)
    Navigate {
        url: String,
        #[serde(default)]
        referrer: Option<String>,
    },
    /// History back within the document
    Back,
    Reload,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    pub outline: Vec<OutlineNode>,
    /// Steps are written as single-key maps (`- toggle: id`) or bare names
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

/// Where a scenario ended up
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub url: String,
    pub share_url: Option<String>,
    pub collapsed: Vec<NodeId>,
    pub session: BTreeMap<String, String>,
    pub local: BTreeMap<String, String>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid scenario: {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Replay the steps. The session store lives for the whole scenario
    /// (one tab); `local` is the profile store and may outlive it.
    pub fn run(&self, config: &SyncConfig, local: Rc<dyn KeyValueStore>) -> Result<ScenarioOutcome> {
        let location = SimulatedLocation::parse(&self.url, self.referrer.as_deref())?;
        let session = MemoryStore::session();
        let clock = ManualClock::new();

        let open = |clock: &ManualClock| {
            let tiers = StorageTiers::new(
                Box::new(location.clone()),
                Box::new(session.clone()),
                Box::new(local.clone()),
            );
            let mut page = PageSession::new(
                config,
                tiers,
                TreeDocument::from_outline(&self.outline),
                clock.clone(),
            );
            page.load();
            page
        };

        let mut page = open(&clock);
        for step in &self.steps {
            tracing::debug!("Step: {:?}", step);
            match step {
                Step::Toggle(target) => {
                    if page.toggle(target).is_none() {
                        tracing::warn!("No control targets {}", target);
                    }
                }
                Step::AdvanceMs(ms) => {
                    let end = clock.now() + Duration::from_millis(*ms);
                    while clock.now() < end {
                        clock.advance(TICK.min(end - clock.now()));
                        page.tick();
                    }
                }
                Step::Navigate { url, referrer } => {
                    let url =
                        Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
                    location.navigate(url, referrer.clone());
                    page = open(&clock);
                }
                Step::Back => {
                    if location.back() {
                        page.popstate();
                    }
                }
                Step::Reload => page = open(&clock),
            }
        }

        Ok(ScenarioOutcome {
            url: location.href().to_string(),
            share_url: page.context().share_url.clone(),
            collapsed: page.dom().collapsed_ids(),
            session: dump(&session, &[SESSION_STASH_KEY, SESSION_DENSE_KEY]),
            local: dump(&*local, &[LOCAL_TOKEN_KEY, LOCAL_DENSE_KEY]),
        })
    }
}

fn dump(store: &dyn KeyValueStore, keys: &[&str]) -> BTreeMap<String, String> {
    keys.iter()
        .filter_map(|key| match store.get_item(key) {
            Ok(value) => value.map(|value| (key.to_string(), value)),
            Err(e) => {
                tracing::warn!("Cannot read {}: {:#}", key, e);
                None
            }
        })
        .collect()
}
