//! Template parser: turns text into an [`ObjectGraph`]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::error::{ParseError, Span};
use crate::provider::{BlockRole, BuildContext, ProviderRegistry};
use crate::renderer::truncate_str;
use crate::scheduler::Scheduler;
use crate::template::{expand_templates, TemplateRegistry};

use super::graph::{ObjectGraph, TemplateNode};
use super::ifblock::IfStack;
use super::lexer::{lex, Token};

/// Where variable names are looked up before the provider registry
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        if name.is_empty() || name.contains(['=', '\0']) {
            return None;
        }
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Size limits applied while parsing and by providers
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Longest template, and longest rendered output, in bytes
    pub max_user_text: usize,
    /// Longest provider output kept, in bytes
    pub text_buffer_size: usize,
    pub max_template_passes: usize,
    pub net_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for Limits {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            max_user_text: config.max_user_text,
            text_buffer_size: config.text_buffer_size,
            max_template_passes: config.max_template_passes,
            net_timeout: config.net_timeout(),
        }
    }
}

/// Parses templates against a provider registry.
///
/// Providers register their fetches with the parser's scheduler while the graph is built, so
/// a parser is tied to one scheduler for its lifetime.
pub struct Parser {
    providers: Arc<ProviderRegistry>,
    templates: TemplateRegistry,
    scheduler: Arc<Scheduler>,
    env: Box<dyn EnvSource>,
    limits: Limits,
}

impl Parser {
    pub fn new(providers: Arc<ProviderRegistry>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            providers,
            templates: TemplateRegistry::new(),
            scheduler,
            env: Box::new(ProcessEnv),
            limits: Limits::default(),
        }
    }

    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub(crate) fn with_boxed_env(mut self, env: Box<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Truncate to `max_user_text` and expand template macros.
    ///
    /// Spans in errors from [`parse`](Self::parse) refer to this text.
    pub fn expand(&self, text: &str) -> Result<String, ParseError> {
        let text = truncate_str(text, self.limits.max_user_text);
        Ok(expand_templates(
            text,
            &self.templates,
            self.limits.max_template_passes,
        )?)
    }

    /// Parse a full template
    pub fn parse(&self, text: &str) -> Result<ObjectGraph, ParseError> {
        let expanded = self.expand(text)?;
        self.parse_nested(&expanded)
    }

    /// Parse text that needs no macro expansion: provider arguments and text produced at
    /// render time
    pub fn parse_nested(&self, text: &str) -> Result<ObjectGraph, ParseError> {
        let mut graph = ObjectGraph::new();
        let mut ifs = IfStack::new();
        let mut literal = Literal::default();

        for (token, span) in lex(text) {
            match token {
                Ok(Token::Text(s)) => literal.push(s, &span),
                Ok(Token::DollarEscape | Token::Dollar) => literal.push("$", &span),
                Ok(Token::EscapedHash) => literal.push("#", &span),
                Ok(Token::Backslash) => literal.push("\\", &span),
                Ok(Token::Comment) => {}
                Ok(Token::Braced(var) | Token::Bare(var)) => {
                    literal.flush(&mut graph);
                    self.variable(var, span, &mut graph, &mut ifs)?;
                }
                Err(()) => literal.push(&text[span.clone()], &span),
            }
        }
        literal.flush(&mut graph);
        ifs.finish(&mut graph);

        tracing::trace!(nodes = graph.len(), "parsed template");
        Ok(graph)
    }

    fn variable(
        &self,
        var: &str,
        span: Span,
        graph: &mut ObjectGraph,
        ifs: &mut IfStack,
    ) -> Result<(), ParseError> {
        if let Some(value) = self.env.var(var) {
            if !value.is_empty() {
                graph.push(TemplateNode::text(value, span));
            }
            return Ok(());
        }

        let (name, arg) = match var.split_once(' ') {
            Some((name, arg)) => {
                let arg = arg.trim_start();
                (name, (!arg.trim().is_empty()).then_some(arg))
            }
            None => (var, None),
        };
        let name = name.to_ascii_lowercase();

        let Some(spec) = self.providers.get(&name) else {
            tracing::warn!(variable = %name, "unknown variable");
            graph.push(TemplateNode::text(format!("${{{name}}}"), span));
            return Ok(());
        };

        let ctx = BuildContext::new(self, spec);
        let construct = (spec.constructor)(&ctx, arg).map_err(|source| ParseError::Provider {
            name: name.clone(),
            span: span.clone(),
            source,
        })?;
        debug_assert_eq!(construct.capability.kind(), spec.kind, "provider {name}");

        let id = graph.next_id();
        match spec.role {
            BlockRole::None => {}
            BlockRole::If => ifs.open_if(id),
            BlockRole::Else => ifs.open_else(id, graph, &span)?,
            BlockRole::Endif => ifs.close(id, graph, &span)?,
        }

        graph.push(
            TemplateNode::new(construct.capability, span)
                .with_sub(construct.sub)
                .with_provider(spec.name),
        );
        Ok(())
    }
}

/// Adjacent literal pieces merged into one text node
#[derive(Default)]
struct Literal {
    text: String,
    span: Option<Span>,
}

impl Literal {
    fn push(&mut self, piece: &str, span: &Span) {
        self.text.push_str(piece);
        self.span = Some(match self.span.take() {
            Some(s) => s.start..span.end,
            None => span.clone(),
        });
    }

    fn flush(&mut self, graph: &mut ObjectGraph) {
        let span = self.span.take();
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        graph.push(TemplateNode::text(text, span.unwrap_or(0..0)));
    }
}
