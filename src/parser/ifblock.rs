//! Resolves `if`/`else`/`endif` jump targets while a graph is built

use crate::error::{ParseError, Span};

use super::graph::{JumpTarget, NodeId, ObjectGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    If,
    Else,
}

#[derive(Debug, Clone, Copy)]
struct IfFrame {
    kind: FrameKind,
    node: NodeId,
}

/// Stack of blocks still waiting for their `else` or `endif`.
///
/// Every method takes the id the incoming node will get, so the checks run before the node
/// is appended and a rejected `else`/`endif` never reaches the graph.
#[derive(Debug, Default)]
pub struct IfStack {
    frames: Vec<IfFrame>,
}

impl IfStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn open_if(&mut self, node: NodeId) {
        self.frames.push(IfFrame {
            kind: FrameKind::If,
            node,
        });
    }

    /// The open block now jumps to `node`, which starts a new frame
    pub fn open_else(
        &mut self,
        node: NodeId,
        graph: &mut ObjectGraph,
        span: &Span,
    ) -> Result<(), ParseError> {
        let top = self
            .frames
            .last()
            .ok_or_else(|| ParseError::UnmatchedElse { span: span.clone() })?;
        graph.set_jump(top.node, JumpTarget::Node(node));
        self.frames.push(IfFrame {
            kind: FrameKind::Else,
            node,
        });
        Ok(())
    }

    /// Close the innermost block at `node`. An `else` frame takes its `if` with it.
    pub fn close(
        &mut self,
        node: NodeId,
        graph: &mut ObjectGraph,
        span: &Span,
    ) -> Result<(), ParseError> {
        let top = self
            .frames
            .pop()
            .ok_or_else(|| ParseError::UnmatchedEndif { span: span.clone() })?;
        graph.set_jump(top.node, JumpTarget::Node(node));
        if top.kind == FrameKind::Else {
            self.frames.pop();
        }
        Ok(())
    }

    /// Blocks left open jump to the end of the graph, as if closed there
    pub fn finish(self, graph: &mut ObjectGraph) {
        if self.frames.is_empty() {
            return;
        }
        tracing::warn!(open = self.frames.len(), "one or more $endif's are missing");
        for frame in self.frames {
            if graph.jump_of(frame.node).is_none() {
                graph.set_jump(frame.node, JumpTarget::End);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::graph::TemplateNode;

    fn push(graph: &mut ObjectGraph) -> NodeId {
        graph.push(TemplateNode::text("", 0..0))
    }

    #[test]
    fn test_if_endif() {
        let mut graph = ObjectGraph::new();
        let mut stack = IfStack::new();
        let cond = push(&mut graph);
        stack.open_if(cond);
        push(&mut graph);
        let end = graph.next_id();
        stack.close(end, &mut graph, &(0..0)).unwrap();
        push(&mut graph);
        assert_eq!(graph[cond].jump(), Some(JumpTarget::Node(end)));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_if_else_endif() {
        let mut graph = ObjectGraph::new();
        let mut stack = IfStack::new();
        let cond = push(&mut graph);
        stack.open_if(cond);
        let els = graph.next_id();
        stack.open_else(els, &mut graph, &(0..0)).unwrap();
        push(&mut graph);
        let end = graph.next_id();
        stack.close(end, &mut graph, &(0..0)).unwrap();
        push(&mut graph);
        assert_eq!(graph[cond].jump(), Some(JumpTarget::Node(els)));
        assert_eq!(graph[els].jump(), Some(JumpTarget::Node(end)));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_unmatched_is_fatal() {
        let mut graph = ObjectGraph::new();
        let mut stack = IfStack::new();
        let err = stack.close(NodeId(0), &mut graph, &(2..9)).unwrap_err();
        assert!(matches!(err, ParseError::UnmatchedEndif { span } if span == (2..9)));
        let err = stack.open_else(NodeId(0), &mut graph, &(0..1)).unwrap_err();
        assert!(matches!(err, ParseError::UnmatchedElse { .. }));
    }

    #[test]
    fn test_finish_patches_open_frames_to_end() {
        let mut graph = ObjectGraph::new();
        let mut stack = IfStack::new();
        let cond = push(&mut graph);
        stack.open_if(cond);
        let els = graph.next_id();
        stack.open_else(els, &mut graph, &(0..0)).unwrap();
        push(&mut graph);
        stack.finish(&mut graph);
        assert_eq!(graph[cond].jump(), Some(JumpTarget::Node(els)));
        assert_eq!(graph[els].jump(), Some(JumpTarget::End));
    }
}
