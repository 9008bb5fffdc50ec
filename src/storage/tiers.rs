use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;

use super::traits::{KeyValueStore, Location};
use crate::state::StateMap;

/// URL key carrying the token, in both fragment and query
pub const STATE_PARAM: &str = "state";

/// Characters escaped in a query value we write
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Session key for the pre-redirect token stash
pub const SESSION_STASH_KEY: &str = "tree-state.redirect-stash";
/// Session key for the crash-resilience copy of the dense map
pub const SESSION_DENSE_KEY: &str = "tree-state.dense";
/// Local key for the last-known dense map
pub const LOCAL_DENSE_KEY: &str = "tree-state.dense";
/// Local key for the last-known token
pub const LOCAL_TOKEN_KEY: &str = "tree-state.token";

/// The independent places a token or state map can live
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hash,
    Query,
    Session,
    Local,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Hash => "hash",
            Tier::Query => "query",
            Tier::Session => "session",
            Tier::Local => "local",
        };
        f.write_str(name)
    }
}

/// Raw content of a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Token(String),
    Map(StateMap),
}

/// Value of `key` among the `&`-joined pairs of the URL fragment.
/// Empty values count as absent.
pub fn fragment_param(url: &Url, key: &str) -> Option<String> {
    url.fragment()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, value)| *name == key && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Value of `key` in the query string, URL-decoded. Empty values count as absent.
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Copy of `url` with the query key `key` set to `value` (removed when empty).
/// Other pairs are kept verbatim and in order.
pub fn with_query_param(url: &Url, key: &str, value: &str) -> Url {
    let mut pairs: Vec<String> = url
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(key))
        .map(str::to_string)
        .collect();
    if !value.is_empty() {
        pairs.push(format!("{}={}", key, utf8_percent_encode(value, QUERY_VALUE)));
    }

    let mut url = url.clone();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&pairs.join("&")));
    }
    url
}

/// Uniform access to the four persistence tiers.
///
/// Storage failures never escape: a tier that errors is logged and treated
/// as empty (reads) or skipped (writes).
pub struct StorageTiers {
    location: Box<dyn Location>,
    session: Box<dyn KeyValueStore>,
    local: Box<dyn KeyValueStore>,
}

impl StorageTiers {
    pub fn new(
        location: Box<dyn Location>,
        session: Box<dyn KeyValueStore>,
        local: Box<dyn KeyValueStore>,
    ) -> Self {
        StorageTiers {
            location,
            session,
            local,
        }
    }

    pub fn location(&self) -> &dyn Location {
        self.location.as_ref()
    }

    /// Current URL
    pub fn href(&self) -> Url {
        self.location.href()
    }

    /// Non-reloading URL replacement
    pub fn replace_url(&self, url: Url) {
        tracing::debug!("Replacing URL with {}", url);
        if let Err(e) = self.location.replace_state(url) {
            tracing::warn!("History replace failed: {:#}", e);
        }
    }

    /// Token from the fragment (`#...state=<token>...`)
    pub fn read_hash(&self) -> Option<String> {
        fragment_param(&self.location.href(), STATE_PARAM)
    }

    /// Token from the legacy query string (`?state=<token>`)
    pub fn read_query(&self) -> Option<String> {
        query_param(&self.location.href(), STATE_PARAM)
    }

    /// Token stashed for redirect survival
    pub fn read_session_stash(&self) -> Option<String> {
        self.get(Tier::Session, SESSION_STASH_KEY)
    }

    /// Dense map copied to the session on the last publish
    pub fn read_session_dense(&self) -> Option<StateMap> {
        self.get_map(Tier::Session, SESSION_DENSE_KEY)
    }

    /// Last-known token from the profile store
    pub fn read_local_token(&self) -> Option<String> {
        self.get(Tier::Local, LOCAL_TOKEN_KEY)
    }

    /// Last-known dense map from the profile store
    pub fn read_local_dense(&self) -> Option<StateMap> {
        self.get_map(Tier::Local, LOCAL_DENSE_KEY)
    }

    /// Raw slot content. The local slot prefers its token over its dense map.
    pub fn read(&self, tier: Tier) -> Option<SlotValue> {
        match tier {
            Tier::Hash => self.read_hash().map(SlotValue::Token),
            Tier::Query => self.read_query().map(SlotValue::Token),
            Tier::Session => self.read_session_stash().map(SlotValue::Token),
            Tier::Local => self
                .read_local_token()
                .map(SlotValue::Token)
                .or_else(|| self.read_local_dense().map(SlotValue::Map)),
        }
    }

    /// Replace the whole fragment with `#state=<token>`, or clear it for an
    /// empty token. Also records the token in the local slot.
    pub fn write_hash(&self, token: &str) {
        let mut url = self.location.href();
        if token.is_empty() {
            url.set_fragment(None);
        } else {
            url.set_fragment(Some(&format!("{}={}", STATE_PARAM, token)));
        }
        self.replace_url(url);
        self.write_local_token(token);
    }

    /// Set (or, for an empty token, remove) `state` in the query string
    pub fn write_query(&self, token: &str) {
        let url = with_query_param(&self.location.href(), STATE_PARAM, token);
        self.replace_url(url);
    }

    pub fn stash_session(&self, token: &str) {
        self.set(Tier::Session, SESSION_STASH_KEY, token);
    }

    pub fn write_session_dense(&self, map: &StateMap) {
        self.set_map(Tier::Session, SESSION_DENSE_KEY, map);
    }

    /// Remember the token for plain revisits; an empty token forgets it
    pub fn write_local_token(&self, token: &str) {
        if token.is_empty() {
            if let Err(e) = self.local.remove_item(LOCAL_TOKEN_KEY) {
                tracing::warn!("{} tier unavailable, token not cleared: {:#}", Tier::Local, e);
            }
        } else {
            self.set(Tier::Local, LOCAL_TOKEN_KEY, token);
        }
    }

    pub fn write_local_dense(&self, map: &StateMap) {
        self.set_map(Tier::Local, LOCAL_DENSE_KEY, map);
    }

    fn store(&self, tier: Tier) -> &dyn KeyValueStore {
        match tier {
            Tier::Session => self.session.as_ref(),
            _ => self.local.as_ref(),
        }
    }

    fn get(&self, tier: Tier, key: &str) -> Option<String> {
        match self.store(tier).get_item(key) {
            Ok(value) => value.filter(|value| !value.is_empty()),
            Err(e) => {
                tracing::warn!("{} tier unavailable, treating as empty: {:#}", tier, e);
                None
            }
        }
    }

    fn set(&self, tier: Tier, key: &str, value: &str) {
        if let Err(e) = self.store(tier).set_item(key, value) {
            tracing::warn!("{} tier unavailable, write of {} skipped: {:#}", tier, key, e);
        }
    }

    fn get_map(&self, tier: Tier, key: &str) -> Option<StateMap> {
        let raw = self.get(tier, key)?;
        match serde_json::from_str(&raw) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!("Ignoring unparsable {} map under {}: {}", tier, key, e);
                None
            }
        }
    }

    fn set_map(&self, tier: Tier, key: &str, map: &StateMap) {
        match serde_json::to_string(map) {
            Ok(json) => self.set(tier, key, &json),
            Err(e) => tracing::warn!("Failed to serialize state map: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::CollapseState,
        storage::{MemoryStore, SimulatedLocation},
    };

    fn tiers_at(url: &str) -> (StorageTiers, SimulatedLocation, MemoryStore, MemoryStore) {
        let location = SimulatedLocation::parse(url, None).unwrap();
        let session = MemoryStore::session();
        let local = MemoryStore::local();
        let tiers = StorageTiers::new(
            Box::new(location.clone()),
            Box::new(session.clone()),
            Box::new(local.clone()),
        );
        (tiers, location, session, local)
    }

    #[test]
    fn test_read_hash_among_pairs() {
        let (tiers, _, _, _) = tiers_at("https://example.com/r.html#viewMode=daily&state=abc.s1-n1&node=x");
        assert_eq!(tiers.read_hash(), Some("abc.s1-n1".to_string()));

        let (tiers, _, _, _) = tiers_at("https://example.com/r.html#node=x");
        assert_eq!(tiers.read_hash(), None);

        let (tiers, _, _, _) = tiers_at("https://example.com/r.html#state=");
        assert_eq!(tiers.read_hash(), None);
    }

    #[test]
    fn test_write_hash_replaces_fragment_and_records_local() {
        let (tiers, location, _, local) = tiers_at("https://example.com/r.html?x=1#node=a&viewMode=daily");

        tiers.write_hash("tok.s1-n1");
        assert_eq!(location.href().fragment(), Some("state=tok.s1-n1"));
        assert_eq!(location.href().query(), Some("x=1"));
        assert_eq!(location.history_len(), 1);
        assert_eq!(local.snapshot()[LOCAL_TOKEN_KEY], "tok.s1-n1");

        tiers.write_hash("");
        assert_eq!(location.href().fragment(), None);
        assert!(!local.snapshot().contains_key(LOCAL_TOKEN_KEY));
    }

    #[test]
    fn test_write_query_keeps_other_pairs() {
        let (tiers, location, _, _) = tiers_at("https://example.com/r.html?lang=ja&state=old");

        tiers.write_query("new.s2-n1");
        assert_eq!(location.href().query(), Some("lang=ja&state=new.s2-n1"));
        assert_eq!(tiers.read_query(), Some("new.s2-n1".to_string()));

        tiers.write_query("");
        assert_eq!(location.href().query(), Some("lang=ja"));
    }

    #[test]
    fn test_write_query_leaves_other_pairs_untouched() {
        let (tiers, location, _, _) =
            tiers_at("https://example.com/r.html?flag&q=a%20b&state=old");

        tiers.write_query("new.s2-n1");
        assert_eq!(
            location.href().query(),
            Some("flag&q=a%20b&state=new.s2-n1")
        );

        tiers.write_query("");
        assert_eq!(location.href().query(), Some("flag&q=a%20b"));
    }

    #[test]
    fn test_write_query_on_bare_url() {
        let (tiers, location, _, _) = tiers_at("https://example.com/r.html");
        tiers.write_query("");
        assert_eq!(location.href().query(), None);

        tiers.write_query("t.s1-n1");
        assert_eq!(location.href().as_str(), "https://example.com/r.html?state=t.s1-n1");
    }

    #[test]
    fn test_local_slot_prefers_token() {
        let (tiers, _, _, _) = tiers_at("https://example.com/r.html");
        let mut dense = StateMap::new();
        dense.insert("a", CollapseState::Expanded);

        tiers.write_local_dense(&dense);
        assert_eq!(tiers.read(Tier::Local), Some(SlotValue::Map(dense)));

        tiers.write_local_token("tok.s1-n1");
        assert_eq!(
            tiers.read(Tier::Local),
            Some(SlotValue::Token("tok.s1-n1".to_string()))
        );
    }

    #[test]
    fn test_unavailable_store_reads_as_empty() {
        let (tiers, _, session, local) = tiers_at("https://example.com/r.html");
        tiers.stash_session("tok");
        tiers.write_local_token("tok");

        session.set_unavailable(true);
        local.set_unavailable(true);

        assert_eq!(tiers.read(Tier::Session), None);
        assert_eq!(tiers.read(Tier::Local), None);
        // Writes are skipped without panicking
        tiers.write_hash("other");
        tiers.write_session_dense(&StateMap::new());
    }

    #[test]
    fn test_corrupt_dense_map_is_ignored() {
        let (tiers, _, _, local) = tiers_at("https://example.com/r.html");
        local.set_item(LOCAL_DENSE_KEY, "not json").unwrap();
        assert_eq!(tiers.read_local_dense(), None);
    }
}
