//! Providers shipped with the runtime

mod control;
mod exec;
mod system;
mod text;

use std::cell::RefCell;

use crate::parser::ObjectGraph;
use crate::renderer::Eval;

use super::ProviderSpec;

pub use system::{parse_loadavg, parse_meminfo, parse_uptime, MemInfo};

/// Every built-in provider
pub fn all() -> Vec<ProviderSpec> {
    let mut specs = control::specs();
    specs.extend(exec::specs());
    specs.extend(text::specs());
    specs.extend(system::specs());
    specs
}

/// Text produced at render time and rendered again as a template.
///
/// The parsed graph is kept until the text changes, so fetches registered by it survive from
/// one frame to the next.
#[derive(Default)]
struct Reparsed {
    cache: RefCell<Option<(String, Option<ObjectGraph>)>>,
}

impl Reparsed {
    fn render(&self, ctx: &Eval<'_>, text: String, out: &mut String) {
        // reparses share the macro expansion budget
        let limit = ctx.parser().limits().max_template_passes;
        if ctx.depth() >= limit {
            tracing::warn!(depth = ctx.depth(), "render-time reparse nested too deep; dropped");
            return;
        }
        let mut cache = self.cache.borrow_mut();
        if cache.as_ref().map_or(true, |(old, _)| *old != text) {
            let graph = match ctx.parser().parse_nested(&text) {
                Ok(graph) => Some(graph),
                Err(e) => {
                    tracing::warn!(error = %e, "text is not a valid template; shown as is");
                    None
                }
            };
            *cache = Some((text, graph));
        }
        match cache.as_ref() {
            Some((_, Some(graph))) => out.push_str(&ctx.nested().render(graph)),
            Some((text, None)) => out.push_str(text),
            None => {}
        }
    }
}

/// Drop one trailing newline, as shell output usually ends with one
fn chomp(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}
