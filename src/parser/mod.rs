//! Parser for template text

mod grammar;
pub mod graph;
mod ifblock;
pub mod lexer;

pub use grammar::{EnvSource, Limits, Parser, ProcessEnv};
pub use graph::{JumpTarget, NodeId, ObjectGraph, TemplateNode};
pub use ifblock::IfStack;
