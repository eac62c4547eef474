//! Tick interpreter - walks an object graph and produces the frame text

use crate::parser::{JumpTarget, NodeId, ObjectGraph, Parser};
use crate::provider::Capability;

use super::presenter::Presenter;

/// Longest prefix of `s` that fits in `max` bytes without splitting a character
pub fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Output text with a fixed remaining capacity in bytes
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    remaining: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            remaining: capacity,
        }
    }

    /// Append as much of `s` as fits. Returns false once the buffer is full.
    pub fn push(&mut self, s: &str) -> bool {
        let piece = truncate_str(s, self.remaining);
        self.text.push_str(piece);
        self.remaining -= piece.len();
        // a multi-byte char that did not fit also ends the buffer
        if piece.len() < s.len() {
            self.remaining = 0;
        }
        self.remaining > 0
    }

    pub fn is_full(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// What a capability sees while it is evaluated
#[derive(Clone, Copy)]
pub struct Eval<'a> {
    parser: &'a Parser,
    presenter: &'a dyn Presenter,
    sub: Option<&'a ObjectGraph>,
    updates: u64,
    capacity: usize,
    depth: usize,
}

impl<'a> Eval<'a> {
    pub fn new(parser: &'a Parser, presenter: &'a dyn Presenter, updates: u64) -> Self {
        Self {
            parser,
            presenter,
            sub: None,
            updates,
            capacity: parser.limits().max_user_text,
            depth: 0,
        }
    }

    fn for_node(&self, sub: Option<&'a ObjectGraph>) -> Self {
        Self { sub, ..*self }
    }

    /// Parser for text that has to be evaluated at render time
    pub fn parser(&self) -> &'a Parser {
        self.parser
    }

    pub fn presenter(&self) -> &'a dyn Presenter {
        self.presenter
    }

    /// Number of completed updates
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// How many render-time reparses enclose this evaluation
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Context for a graph parsed from text produced at this level
    pub(crate) fn nested(&self) -> Self {
        Self {
            sub: None,
            depth: self.depth + 1,
            ..*self
        }
    }

    /// The node's child graph, if it has one
    pub fn sub(&self) -> Option<&'a ObjectGraph> {
        self.sub
    }

    /// Render `graph` into a fresh buffer
    pub fn render(&self, graph: &ObjectGraph) -> String {
        let mut out = OutputBuffer::new(self.capacity);
        render(graph, self, &mut out);
        out.into_string()
    }

    /// Render the node's child graph; empty without one
    pub fn render_sub(&self) -> String {
        self.sub.map(|g| self.render(g)).unwrap_or_default()
    }
}

/// Interpret `graph` once, appending to `out`.
///
/// A failed test moves to its jump target and continues after it; `JumpTarget::End` stops.
/// A failed test with no jump target falls through to the next node.
/// A full buffer stops interpretation.
pub fn render(graph: &ObjectGraph, ctx: &Eval<'_>, out: &mut OutputBuffer) {
    let mut index = 0;
    while let Some(node) = graph.get(NodeId(index)) {
        if out.is_full() {
            break;
        }
        let ctx = ctx.for_node(node.sub());
        let presenter = ctx.presenter();

        match node.capability() {
            Capability::Text(text) => {
                out.push(text);
            }
            Capability::Print(p) => {
                let mut s = String::new();
                p.print(&ctx, &mut s);
                out.push(&s);
            }
            Capability::Test(t) => {
                if !t.test(&ctx) {
                    match node.jump() {
                        Some(JumpTarget::Node(target)) => {
                            index = target.0 + 1;
                            continue;
                        }
                        Some(JumpTarget::End) => break,
                        // a test outside any block guards nothing
                        None => {}
                    }
                }
            }
            Capability::Bar(n) => {
                out.push(&presenter.bar(n.value(&ctx), n.size()));
            }
            Capability::Gauge(n) => {
                out.push(&presenter.gauge(n.value(&ctx), n.size()));
            }
            Capability::Graph(n) => {
                out.push(&presenter.graph(n.value(&ctx), n.size()));
            }
            Capability::Percentage(p) => {
                out.push(&presenter.percentage(p.percentage(&ctx)));
            }
        }
        index += 1;
    }
}
