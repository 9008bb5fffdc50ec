//! Redirect survival.
//!
//! A static-hosting proxy may bounce the browser through another host and
//! drop the query string on the way. Every load stashes the query token in
//! the tab session first; a load that arrived through the proxy puts the
//! stashed token back into the query before anything reads it.

use url::Url;

use crate::{config::SyncConfig, storage::StorageTiers};

/// True if `host` is `pattern` or a subdomain of it
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    host == pattern
        || host
            .strip_suffix(pattern.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Host patterns describing the uncontrolled redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    redirect_host: String,
    origin_host: String,
}

impl RedirectRule {
    pub fn new(redirect_host: impl Into<String>, origin_host: impl Into<String>) -> Self {
        RedirectRule {
            redirect_host: redirect_host.into(),
            origin_host: origin_host.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.redirect_host.clone(), config.origin_host.clone())
    }

    /// True if `url` is served from the redirect host
    pub fn is_redirect_host(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host_matches(host, &self.redirect_host))
    }

    /// True if the referrer is empty or points at the pre-redirect host
    pub fn is_origin_referrer(&self, referrer: Option<&str>) -> bool {
        let Some(referrer) = referrer.filter(|r| !r.is_empty()) else {
            return true;
        };
        match Url::parse(referrer) {
            Ok(url) => url
                .host_str()
                .is_some_and(|host| host_matches(host, &self.origin_host)),
            // Unparsable referrers get a plain substring check
            Err(_) => referrer.contains(&self.origin_host),
        }
    }

    pub fn arrived_via_redirect(&self, url: &Url, referrer: Option<&str>) -> bool {
        self.is_redirect_host(url) && self.is_origin_referrer(referrer)
    }
}

/// What the guard did on this load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Not a redirect; the query token (if any) is now stashed
    Direct { stashed: Option<String> },
    /// Redirect dropped the token; the stash was written back into the query
    Restored { token: String },
    /// Redirect, but the query still carries the stashed token
    Survived { token: String },
    /// Redirect with nothing stashed to restore
    NothingToRestore,
}

/// Captures the query token and restores it after the redirect
#[derive(Debug, Clone)]
pub struct RedirectSurvivalGuard {
    rule: RedirectRule,
}

impl RedirectSurvivalGuard {
    pub fn new(rule: RedirectRule) -> Self {
        RedirectSurvivalGuard { rule }
    }

    pub fn rule(&self) -> &RedirectRule {
        &self.rule
    }

    /// Run the capture/restore protocol. Must precede state resolution.
    pub fn run(&self, tiers: &StorageTiers) -> GuardOutcome {
        let query_token = tiers.read_query();
        if let Some(token) = &query_token {
            tiers.stash_session(token);
        }

        let url = tiers.href();
        let referrer = tiers.location().referrer();
        if !self.rule.arrived_via_redirect(&url, referrer.as_deref()) {
            return GuardOutcome::Direct {
                stashed: query_token,
            };
        }

        let Some(stashed) = tiers.read_session_stash() else {
            tracing::debug!("Arrived via redirect host with no stashed token");
            return GuardOutcome::NothingToRestore;
        };

        if query_token.as_deref() == Some(stashed.as_str()) {
            return GuardOutcome::Survived { token: stashed };
        }

        tiers.write_query(&stashed);
        tracing::info!("Restored state token after redirect via {}", url.host_str().unwrap_or(""));
        GuardOutcome::Restored { token: stashed }
    }
}
