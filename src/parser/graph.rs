//! Object graph types - the parsed form of a template

use std::ops::Index;

use crate::error::Span;
use crate::provider::{Capability, NodeKind};

/// Index of a node in its [`ObjectGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Where a failed test sends the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// Continue after this node
    Node(NodeId),
    /// Stop; the block was never closed
    End,
}

/// One parsed unit of a template
#[derive(Debug)]
pub struct TemplateNode {
    capability: Capability,
    sub: Option<ObjectGraph>,
    jump: Option<JumpTarget>,
    provider: Option<&'static str>,
    span: Span,
}

impl TemplateNode {
    pub fn new(capability: Capability, span: Span) -> Self {
        Self {
            capability,
            sub: None,
            jump: None,
            provider: None,
            span,
        }
    }

    pub fn text(text: impl Into<String>, span: Span) -> Self {
        Self::new(Capability::Text(text.into()), span)
    }

    pub fn with_sub(mut self, sub: Option<ObjectGraph>) -> Self {
        self.sub = sub;
        self
    }

    pub fn with_provider(mut self, name: &'static str) -> Self {
        self.provider = Some(name);
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.capability.kind()
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Literal text of a `PlainText` node
    pub fn text_value(&self) -> Option<&str> {
        match &self.capability {
            Capability::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn sub(&self) -> Option<&ObjectGraph> {
        self.sub.as_ref()
    }

    pub fn jump(&self) -> Option<JumpTarget> {
        self.jump
    }

    /// Name of the provider that built this node; `None` for literal text
    pub fn provider(&self) -> Option<&'static str> {
        self.provider
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Arena of nodes in template order. The successor of node `i` is node `i + 1`.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    nodes: Vec<TemplateNode>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Id the next pushed node will get
    pub fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }

    pub fn push(&mut self, node: TemplateNode) -> NodeId {
        let id = self.next_id();
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&TemplateNode> {
        self.nodes.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplateNode> {
        self.nodes.iter()
    }

    pub(crate) fn set_jump(&mut self, id: NodeId, target: JumpTarget) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.jump = Some(target);
        }
    }

    pub(crate) fn jump_of(&self, id: NodeId) -> Option<JumpTarget> {
        self.nodes.get(id.0).and_then(|n| n.jump)
    }

    /// Kinds of all nodes, in order
    pub fn kinds(&self) -> Vec<NodeKind> {
        self.nodes.iter().map(TemplateNode::kind).collect()
    }
}

impl Index<NodeId> for ObjectGraph {
    type Output = TemplateNode;

    fn index(&self, id: NodeId) -> &TemplateNode {
        &self.nodes[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_sequential_ids() {
        let mut graph = ObjectGraph::new();
        assert_eq!(graph.next_id(), NodeId(0));
        let a = graph.push(TemplateNode::text("a", 0..1));
        let b = graph.push(TemplateNode::text("b", 1..2));
        assert_eq!((a, b), (NodeId(0), NodeId(1)));
        assert_eq!(graph[b].text_value(), Some("b"));
    }

    #[test]
    fn test_set_jump() {
        let mut graph = ObjectGraph::new();
        let a = graph.push(TemplateNode::text("a", 0..1));
        assert_eq!(graph.jump_of(a), None);
        graph.set_jump(a, JumpTarget::End);
        assert_eq!(graph[a].jump(), Some(JumpTarget::End));
    }
}
