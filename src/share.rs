//! Share links, view mode and node anchors carried in the URL fragment.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    state::NodeId,
    storage::{fragment_param, STATE_PARAM},
};

pub const VIEW_MODE_PARAM: &str = "viewMode";
pub const NODE_PARAM: &str = "node";

const DEFAULT_FILE_NAME: &str = "index.html";

/// Daily or monthly value columns
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Daily,
    Monthly,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Daily => "daily",
            ViewMode::Monthly => "monthly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(ViewMode::Daily),
            "monthly" => Some(ViewMode::Monthly),
            _ => None,
        }
    }

    /// View mode requested by the fragment; invalid values are ignored
    pub fn from_url(url: &Url) -> Option<Self> {
        let raw = fragment_param(url, VIEW_MODE_PARAM)?;
        let mode = Self::parse(&raw);
        if mode.is_none() {
            tracing::warn!("Ignoring invalid view mode {:?}", raw);
        }
        mode
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node the fragment asks to scroll to (`node=<NodeId>`)
pub fn anchor_target(url: &Url) -> Option<NodeId> {
    fragment_param(url, NODE_PARAM)
}

/// Builds the links handed to the copy-to-clipboard affordances
#[derive(Debug, Clone, Default)]
pub struct ShareLinks {
    public_base: Option<String>,
}

impl ShareLinks {
    pub fn new(public_base: Option<String>) -> Self {
        let public_base = public_base
            .map(|base| base.trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty());
        ShareLinks { public_base }
    }

    pub fn public_base(&self) -> Option<&str> {
        self.public_base.as_deref()
    }

    /// Public base URL, or the document's file name when none is configured
    pub fn base(&self, current: &Url) -> String {
        if let Some(base) = &self.public_base {
            return base.clone();
        }
        current
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string()
    }

    /// `<base>#state=<token>&viewMode=<mode>`, or `<base>#viewMode=<mode>`
    /// when nothing is collapsed
    pub fn share_url(&self, current: &Url, token: &str, mode: ViewMode) -> String {
        let base = self.base(current);
        if token.is_empty() {
            format!("{}#{}={}", base, VIEW_MODE_PARAM, mode)
        } else {
            format!(
                "{}#{}={}&{}={}",
                base, STATE_PARAM, token, VIEW_MODE_PARAM, mode
            )
        }
    }

    /// `<base>#state=<token>&node=<id>`, or `<base>#node=<id>`
    pub fn anchor_url(&self, current: &Url, token: &str, node: &str) -> String {
        let base = self.base(current);
        if token.is_empty() {
            format!("{}#{}={}", base, NODE_PARAM, node)
        } else {
            format!("{}#{}={}&{}={}", base, STATE_PARAM, token, NODE_PARAM, node)
        }
    }
}
