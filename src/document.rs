use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{state::NodeId, tree::TreeDom};

pub const COLLAPSED_CLASS: &str = "collapsed";
pub const HIGHLIGHT_CLASS: &str = "highlight-node";

/// One node of a report outline, as the generator describes it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutlineNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    pub fn new(id: impl Into<NodeId>, children: Vec<OutlineNode>) -> Self {
        OutlineNode {
            id: id.into(),
            children,
        }
    }

    pub fn leaf(id: impl Into<NodeId>) -> Self {
        Self::new(id, Vec::new())
    }

    /// Id of the container holding this node's children
    pub fn container_id(&self) -> NodeId {
        format!("{}-children", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// A report node (anchor target)
    Node,
    /// Toggle button
    Control { target: NodeId },
    /// Collapsible children list
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    pub id: Option<NodeId>,
    pub classes: BTreeSet<String>,
    pub parent: Option<usize>,
}

/// In-memory rendering of a collapsible tree report
#[derive(Debug, Clone, Default)]
pub struct TreeDocument {
    elements: Vec<Element>,
    scrolled_to: Option<NodeId>,
}

impl TreeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render an outline: a node with children gets a control and a container,
    /// both keyed `<id>-children`.
    pub fn from_outline(roots: &[OutlineNode]) -> Self {
        let mut doc = Self::new();
        for root in roots {
            doc.render(root, None);
        }
        doc
    }

    fn render(&mut self, node: &OutlineNode, parent: Option<usize>) {
        self.push(ElementKind::Node, Some(&node.id), parent);
        if node.children.is_empty() {
            return;
        }

        let container_id = node.container_id();
        self.push_control(&container_id, parent);
        let container = self.push_container(Some(&container_id), parent);
        for child in &node.children {
            self.render(child, Some(container));
        }
    }

    fn push(&mut self, kind: ElementKind, id: Option<&str>, parent: Option<usize>) -> usize {
        self.elements.push(Element {
            kind,
            id: id.map(str::to_string),
            classes: BTreeSet::new(),
            parent,
        });
        self.elements.len() - 1
    }

    pub fn push_node(&mut self, id: &str, parent: Option<usize>) -> usize {
        self.push(ElementKind::Node, Some(id), parent)
    }

    pub fn push_control(&mut self, target: &str, parent: Option<usize>) -> usize {
        self.push(
            ElementKind::Control {
                target: target.to_string(),
            },
            None,
            parent,
        )
    }

    pub fn push_container(&mut self, id: Option<&str>, parent: Option<usize>) -> usize {
        self.push(ElementKind::Container, id, parent)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn is_control_collapsed(&self, target: &str) -> bool {
        self.controls(target)
            .any(|control| control.classes.contains(COLLAPSED_CLASS))
    }

    pub fn is_highlighted(&self, id: &str) -> bool {
        self.elements
            .iter()
            .any(|el| el.id.as_deref() == Some(id) && el.classes.contains(HIGHLIGHT_CLASS))
    }

    /// Element last scrolled into view
    pub fn scrolled_to(&self) -> Option<&str> {
        self.scrolled_to.as_deref()
    }

    /// Ids of collapsed containers
    pub fn collapsed_ids(&self) -> Vec<NodeId> {
        self.containers()
            .filter(|el| el.classes.contains(COLLAPSED_CLASS))
            .filter_map(|el| el.id.clone())
            .collect()
    }

    /// (kind, id, classes) of every element, for comparing rendered states
    pub fn class_snapshot(&self) -> Vec<(ElementKind, Option<NodeId>, BTreeSet<String>)> {
        self.elements
            .iter()
            .map(|el| (el.kind.clone(), el.id.clone(), el.classes.clone()))
            .collect()
    }

    fn containers(&self) -> impl Iterator<Item = &Element> {
        self.elements
            .iter()
            .filter(|el| el.kind == ElementKind::Container)
    }

    fn controls<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements.iter().filter(move |el| {
            matches!(&el.kind, ElementKind::Control { target: t } if t == target)
        })
    }

    fn container_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements
            .iter_mut()
            .find(|el| el.kind == ElementKind::Container && el.id.as_deref() == Some(id))
    }
}

fn set_class(el: &mut Element, class: &str, on: bool) {
    if on {
        el.classes.insert(class.to_string());
    } else {
        el.classes.remove(class);
    }
}

impl TreeDom for TreeDocument {
    fn container_ids(&self) -> Vec<NodeId> {
        self.containers().filter_map(|el| el.id.clone()).collect()
    }

    fn has_container(&self, id: &str) -> bool {
        self.containers().any(|el| el.id.as_deref() == Some(id))
    }

    fn has_control(&self, target: &str) -> bool {
        self.controls(target).next().is_some()
    }

    fn is_container_collapsed(&self, id: &str) -> bool {
        self.containers()
            .find(|el| el.id.as_deref() == Some(id))
            .is_some_and(|el| el.classes.contains(COLLAPSED_CLASS))
    }

    fn set_container_collapsed(&mut self, id: &str, collapsed: bool) {
        if let Some(el) = self.container_mut(id) {
            set_class(el, COLLAPSED_CLASS, collapsed);
        }
    }

    fn set_control_collapsed(&mut self, target: &str, collapsed: bool) {
        for el in self.elements.iter_mut() {
            if matches!(&el.kind, ElementKind::Control { target: t } if t == target) {
                set_class(el, COLLAPSED_CLASS, collapsed);
            }
        }
    }

    fn expand_all(&mut self) {
        for el in self.elements.iter_mut() {
            if el.kind != ElementKind::Node {
                el.classes.remove(COLLAPSED_CLASS);
            }
        }
    }

    fn has_element(&self, id: &str) -> bool {
        self.elements.iter().any(|el| el.id.as_deref() == Some(id))
    }

    fn scroll_into_view(&mut self, id: &str) -> bool {
        if !self.has_element(id) {
            return false;
        }
        self.scrolled_to = Some(id.to_string());
        true
    }

    fn set_highlighted(&mut self, id: &str, highlighted: bool) {
        if let Some(el) = self
            .elements
            .iter_mut()
            .find(|el| el.id.as_deref() == Some(id))
        {
            set_class(el, HIGHLIGHT_CLASS, highlighted);
        }
    }
}
