//! Per-tick rendering of an object graph
//!
//! The interpreter walks the graph in arena order, asking each node's capability for its
//! text and sending numeric values through a [`Presenter`].

mod interpreter;
mod presenter;

pub use interpreter::{render, truncate_str, Eval, OutputBuffer};
pub use presenter::{ConsolePresenter, Presenter};
