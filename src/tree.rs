//! Tree state controller: DOM <-> StateMap, and publishing to the tiers.

use crate::{
    codec::Codec,
    state::{CollapseState, NodeId, StateMap},
    storage::StorageTiers,
};

/// The parts of the rendered document the controller touches.
///
/// Containers are the collapsible subtrees (`id` attribute); controls are the
/// toggle buttons (`data-target` naming a container id).
pub trait TreeDom {
    /// Ids of the containers that carry one, in document order
    fn container_ids(&self) -> Vec<NodeId>;

    fn has_container(&self, id: &str) -> bool;

    /// True if some control has `data-target == target`
    fn has_control(&self, target: &str) -> bool;

    fn is_container_collapsed(&self, id: &str) -> bool;

    fn set_container_collapsed(&mut self, id: &str, collapsed: bool);

    fn set_control_collapsed(&mut self, target: &str, collapsed: bool);

    /// Clear the collapsed mark from every container and control,
    /// including those without identifiers
    fn expand_all(&mut self);

    /// True if any element carries `id`
    fn has_element(&self, id: &str) -> bool;

    /// Scroll the element into view. Returns false for unknown ids.
    fn scroll_into_view(&mut self, id: &str) -> bool;

    fn set_highlighted(&mut self, id: &str, highlighted: bool);
}

/// Result of [`TreeStateController::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub collapsed: usize,
    /// Ids with no matching container or control
    pub skipped: Vec<NodeId>,
}

/// What a publish wrote out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub token: String,
    pub dense: StateMap,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeStateController {
    codec: Codec,
}

impl TreeStateController {
    pub fn new(codec: Codec) -> Self {
        TreeStateController { codec }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Make the document show `map`: everything expanded, then each collapsed
    /// entry whose container and control both exist gets collapsed.
    pub fn apply<D: TreeDom>(&self, dom: &mut D, map: &StateMap) -> ApplyReport {
        dom.expand_all();

        let mut report = ApplyReport::default();
        for id in map.collapsed_ids() {
            if dom.has_container(id) && dom.has_control(id) {
                dom.set_container_collapsed(id, true);
                dom.set_control_collapsed(id, true);
                report.collapsed += 1;
            } else {
                report.skipped.push(id.clone());
            }
        }

        if !report.skipped.is_empty() {
            tracing::debug!("Skipped unknown node ids: {:?}", report.skipped);
        }
        report
    }

    /// Dense state of every identified container
    pub fn extract<D: TreeDom>(&self, dom: &D) -> StateMap {
        dom.container_ids()
            .into_iter()
            .map(|id| {
                let state = if dom.is_container_collapsed(&id) {
                    CollapseState::Collapsed
                } else {
                    CollapseState::Expanded
                };
                (id, state)
            })
            .collect()
    }

    /// Handle a click on the control targeting `target`: flip it, then
    /// republish. Returns `None` when the control or container is unknown.
    pub fn toggle<D: TreeDom>(
        &self,
        dom: &mut D,
        tiers: &StorageTiers,
        target: &str,
    ) -> Option<Published> {
        if !dom.has_container(target) || !dom.has_control(target) {
            tracing::debug!("Ignoring toggle for unknown target {}", target);
            return None;
        }

        let collapsed = !dom.is_container_collapsed(target);
        dom.set_container_collapsed(target, collapsed);
        dom.set_control_collapsed(target, collapsed);
        tracing::debug!(
            "Toggled {} to {}",
            target,
            if collapsed { "collapsed" } else { "expanded" }
        );

        Some(self.publish(dom, tiers))
    }

    /// Extract, encode and write the current state to hash, local and session
    pub fn publish<D: TreeDom>(&self, dom: &D, tiers: &StorageTiers) -> Published {
        let dense = self.extract(dom);
        let token = self.codec.encode(&dense);

        tiers.write_hash(&token);
        tiers.write_local_dense(&dense);
        tiers.write_session_dense(&dense);

        Published { token, dense }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::{OutlineNode, TreeDocument},
        storage::{Location, MemoryStore, SimulatedLocation},
    };

    fn outline() -> Vec<OutlineNode> {
        vec![OutlineNode::new(
            "root",
            vec![
                OutlineNode::new("node-abc", vec![OutlineNode::leaf("leaf-1")]),
                OutlineNode::new("node-xyz", vec![OutlineNode::leaf("leaf-2")]),
            ],
        )]
    }

    #[test]
    fn test_apply_collapses_known_nodes() {
        let mut doc = TreeDocument::from_outline(&outline());
        let map = StateMap::collapsed(["node-abc-children", "ghost-children"]);

        let report = TreeStateController::default().apply(&mut doc, &map);
        assert_eq!(report.collapsed, 1);
        assert_eq!(report.skipped, vec!["ghost-children".to_string()]);
        assert!(doc.is_container_collapsed("node-abc-children"));
        assert!(doc.is_control_collapsed("node-abc-children"));
        assert!(!doc.is_container_collapsed("node-xyz-children"));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let controller = TreeStateController::default();
        let map = StateMap::collapsed(["root-children", "node-xyz-children"]);

        let mut once = TreeDocument::from_outline(&outline());
        controller.apply(&mut once, &map);

        let mut twice = TreeDocument::from_outline(&outline());
        controller.apply(&mut twice, &map);
        controller.apply(&mut twice, &map);

        assert_eq!(once.class_snapshot(), twice.class_snapshot());
    }

    #[test]
    fn test_apply_resets_previous_state() {
        let controller = TreeStateController::default();
        let mut doc = TreeDocument::from_outline(&outline());

        controller.apply(&mut doc, &StateMap::collapsed(["root-children"]));
        controller.apply(&mut doc, &StateMap::new());

        assert!(controller.extract(&doc).is_fully_expanded());
        assert!(!doc.is_control_collapsed("root-children"));
    }

    #[test]
    fn test_extract_is_dense() {
        let controller = TreeStateController::default();
        let mut doc = TreeDocument::from_outline(&outline());
        controller.apply(&mut doc, &StateMap::collapsed(["node-xyz-children"]));

        let dense = controller.extract(&doc);
        assert_eq!(dense.len(), 3);
        assert_eq!(dense.get("root-children"), Some(CollapseState::Expanded));
        assert_eq!(
            dense.get("node-xyz-children"),
            Some(CollapseState::Collapsed)
        );
    }

    #[test]
    fn test_container_without_control_is_not_collapsed() {
        let mut doc = TreeDocument::new();
        doc.push_container(Some("orphan"), None);

        let report = TreeStateController::default().apply(&mut doc, &StateMap::collapsed(["orphan"]));
        assert_eq!(report.skipped, vec!["orphan".to_string()]);
        assert!(!doc.is_container_collapsed("orphan"));
    }

    #[test]
    fn test_toggle_publishes_everywhere() {
        let location = SimulatedLocation::parse("https://example.com/report.html", None).unwrap();
        let session = MemoryStore::session();
        let local = MemoryStore::local();
        let tiers = StorageTiers::new(
            Box::new(location.clone()),
            Box::new(session.clone()),
            Box::new(local.clone()),
        );
        let controller = TreeStateController::default();
        let mut doc = TreeDocument::from_outline(&outline());

        let published = controller
            .toggle(&mut doc, &tiers, "node-xyz-children")
            .unwrap();
        assert!(!published.token.is_empty());
        assert_eq!(tiers.read_hash(), Some(published.token.clone()));
        assert_eq!(tiers.read_local_dense(), Some(published.dense.clone()));
        assert_eq!(tiers.read_session_dense(), Some(published.dense));
        assert_eq!(tiers.read_local_token(), Some(published.token));

        // Toggling back clears the fragment
        let published = controller
            .toggle(&mut doc, &tiers, "node-xyz-children")
            .unwrap();
        assert_eq!(published.token, "");
        assert_eq!(location.href().fragment(), None);
        assert!(controller
            .toggle(&mut doc, &tiers, "missing-children")
            .is_none());
    }
}
