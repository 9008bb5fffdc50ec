use crate::{
    codec::Codec,
    state::StateMap,
    storage::{SlotValue, StorageTiers, Tier},
};

/// Effective state on load and where it came from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Winning tier, `None` when every tier was empty
    pub tier: Option<Tier>,
    pub map: StateMap,
}

/// Applies the load-time precedence across the storage tiers:
/// hash, then query (falling back to the session stash), then local.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateResolver {
    codec: Codec,
}

impl StateResolver {
    pub fn new(codec: Codec) -> Self {
        StateResolver { codec }
    }

    pub fn resolve(&self, tiers: &StorageTiers) -> Resolution {
        let candidates: [(Tier, &dyn Fn() -> Option<SlotValue>); 5] = [
            (Tier::Hash, &|| tiers.read(Tier::Hash)),
            (Tier::Query, &|| tiers.read(Tier::Query)),
            (Tier::Session, &|| tiers.read(Tier::Session)),
            (Tier::Local, &|| tiers.read_local_token().map(SlotValue::Token)),
            (Tier::Local, &|| tiers.read_local_dense().map(SlotValue::Map)),
        ];

        for (tier, read) in candidates {
            let Some(value) = read() else {
                continue;
            };
            let map = self.normalize(value);
            if !map.is_empty() {
                tracing::debug!(
                    "Resolved {} collapsed node(s) from {} tier",
                    map.collapsed_ids().count(),
                    tier
                );
                return Resolution {
                    tier: Some(tier),
                    map,
                };
            }
            tracing::debug!("{} tier held nothing usable", tier);
        }

        Resolution::default()
    }

    /// Hash tier only (history navigation and fragment changes)
    pub fn resolve_hash(&self, tiers: &StorageTiers) -> StateMap {
        tiers
            .read_hash()
            .map(|token| self.codec.decode(&token))
            .unwrap_or_default()
    }

    fn normalize(&self, value: SlotValue) -> StateMap {
        match value {
            SlotValue::Token(token) => self.codec.decode(&token),
            SlotValue::Map(map) => map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::{encode, TagPolicy},
        storage::{MemoryStore, SimulatedLocation},
    };

    fn tiers_at(url: &str) -> (StorageTiers, MemoryStore, MemoryStore) {
        let session = MemoryStore::session();
        let local = MemoryStore::local();
        let tiers = StorageTiers::new(
            Box::new(SimulatedLocation::parse(url, None).unwrap()),
            Box::new(session.clone()),
            Box::new(local.clone()),
        );
        (tiers, session, local)
    }

    #[test]
    fn test_hash_beats_query() {
        let hash = encode(&StateMap::collapsed(["from-hash"]));
        let query = encode(&StateMap::collapsed(["from-query"]));
        let (tiers, _, _) = tiers_at(&format!(
            "https://example.com/r.html?state={}#state={}",
            query, hash
        ));

        let resolution = StateResolver::default().resolve(&tiers);
        assert_eq!(resolution.tier, Some(Tier::Hash));
        assert_eq!(resolution.map, StateMap::collapsed(["from-hash"]));
    }

    #[test]
    fn test_undecodable_hash_falls_through() {
        let query = encode(&StateMap::collapsed(["from-query"]));
        let (tiers, _, _) = tiers_at(&format!(
            "https://example.com/r.html?state={}#state=%%%garbage",
            query
        ));

        let resolution = StateResolver::default().resolve(&tiers);
        assert_eq!(resolution.tier, Some(Tier::Query));
        assert_eq!(resolution.map, StateMap::collapsed(["from-query"]));
    }

    #[test]
    fn test_session_stash_backs_up_query() {
        let (tiers, _, _) = tiers_at("https://example.com/r.html");
        tiers.stash_session(&encode(&StateMap::collapsed(["stashed"])));

        let resolution = StateResolver::default().resolve(&tiers);
        assert_eq!(resolution.tier, Some(Tier::Session));
        assert_eq!(resolution.map, StateMap::collapsed(["stashed"]));
    }

    #[test]
    fn test_local_token_then_dense_map() {
        let (tiers, _, local) = tiers_at("https://example.com/r.html");
        let dense = StateMap::collapsed(["dense-only"]);
        tiers.write_local_dense(&dense);

        let resolution = StateResolver::default().resolve(&tiers);
        assert_eq!(resolution.tier, Some(Tier::Local));
        assert_eq!(resolution.map, dense);

        tiers.write_local_token(&encode(&StateMap::collapsed(["from-token"])));
        let resolution = StateResolver::default().resolve(&tiers);
        assert_eq!(resolution.map, StateMap::collapsed(["from-token"]));

        local.set_unavailable(true);
        assert_eq!(StateResolver::default().resolve(&tiers), Resolution::default());
    }

    #[test]
    fn test_nothing_anywhere_is_fully_expanded() {
        let (tiers, _, _) = tiers_at("https://example.com/r.html#node=abc");
        let resolution = StateResolver::default().resolve(&tiers);

        assert_eq!(resolution.tier, None);
        assert!(resolution.map.is_empty());
    }

    #[test]
    fn test_strict_policy_skips_forged_tier() {
        let token = encode(&StateMap::collapsed(["from-hash"]));
        let (payload, _) = token.split_once('.').unwrap();
        let query = encode(&StateMap::collapsed(["from-query"]));
        let (tiers, _, _) = tiers_at(&format!(
            "https://example.com/r.html?state={}#state={}.s0-n9",
            query, payload
        ));

        let strict = StateResolver::new(Codec::new(TagPolicy::Strict));
        assert_eq!(strict.resolve(&tiers).tier, Some(Tier::Query));
        assert_eq!(
            StateResolver::default().resolve(&tiers).tier,
            Some(Tier::Hash)
        );
    }
}
