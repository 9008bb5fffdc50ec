use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Stable identifier of a collapsible subtree container, assigned at render time.
pub type NodeId = String;

/// Display status of a subtree. Anything not recorded is expanded.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CollapseState {
    #[default]
    Expanded,
    Collapsed,
}

impl CollapseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollapseState::Expanded => "expanded",
            CollapseState::Collapsed => "collapsed",
        }
    }

    /// Parse the wire form; unknown values yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "expanded" => Some(CollapseState::Expanded),
            "collapsed" => Some(CollapseState::Collapsed),
            _ => None,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        matches!(self, CollapseState::Collapsed)
    }
}

impl fmt::Display for CollapseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NodeId -> CollapseState mapping.
///
/// Backed by a `BTreeMap`, so iteration (and therefore serialization) is in
/// lexicographic key order. Both sparse (collapsed only) and dense forms are
/// representable; [`StateMap::sparse`] drops the redundant expanded entries.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct StateMap {
    entries: BTreeMap<NodeId, CollapseState>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sparse map with every given id collapsed
    pub fn collapsed<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        ids.into_iter()
            .map(|id| (id.into(), CollapseState::Collapsed))
            .collect()
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, state: CollapseState) {
        self.entries.insert(id.into(), state);
    }

    pub fn get(&self, id: &str) -> Option<CollapseState> {
        self.entries.get(id).copied()
    }

    /// Effective state of a node: unrecorded ids are expanded
    pub fn state_of(&self, id: &str) -> CollapseState {
        self.get(id).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &CollapseState)> {
        self.entries.iter()
    }

    /// Ids recorded as collapsed, in lexicographic order
    pub fn collapsed_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_collapsed())
            .map(|(id, _)| id)
    }

    /// Copy keeping only the collapsed entries
    pub fn sparse(&self) -> StateMap {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_collapsed())
            .map(|(id, state)| (id.clone(), *state))
            .collect()
    }

    /// True when no node is collapsed, i.e. the map means "fully expanded"
    pub fn is_fully_expanded(&self) -> bool {
        self.collapsed_ids().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(NodeId, CollapseState)> for StateMap {
    fn from_iter<T: IntoIterator<Item = (NodeId, CollapseState)>>(iter: T) -> Self {
        StateMap {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_drops_expanded() {
        let mut map = StateMap::new();
        map.insert("b", CollapseState::Expanded);
        map.insert("a", CollapseState::Collapsed);

        let sparse = map.sparse();
        assert_eq!(sparse.len(), 1);
        assert_eq!(sparse.get("a"), Some(CollapseState::Collapsed));
        assert_eq!(sparse.state_of("b"), CollapseState::Expanded);
        assert!(!map.is_fully_expanded());
    }

    #[test]
    fn test_serializes_in_key_order() {
        let map = StateMap::collapsed(["node-def", "node-abc"]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"node-abc":"collapsed","node-def":"collapsed"}"#);
    }

    #[test]
    fn test_dense_map_is_fully_expanded() {
        let map: StateMap = [("x".to_string(), CollapseState::Expanded)]
            .into_iter()
            .collect();
        assert!(map.is_fully_expanded());
        assert!(!map.is_empty());
    }
}
