//! Tickplate - a template runtime for periodically refreshed status text
//!
//! A template such as `load: ${loadavg 1}  ${if_match ${memperc} > 80}mem high${endif}` is
//! parsed once into an object graph. Every refresh tick the graph is interpreted into a line
//! of text, while the data behind each field is fetched on background workers. Fields that
//! ask for the same data share one periodic fetch.
//!
//! # Example
//!
//! ```rust
//! use tickplate::render_once;
//!
//! let text = render_once("${if_empty ${exec true}}empty${else}full${endif}").unwrap();
//! assert_eq!(text, "empty");
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod parser;
pub mod provider;
pub mod renderer;
pub mod scheduler;
pub mod signals;
pub mod template;

use std::sync::Arc;
use std::time::Duration;

pub use config::{ConfigError, ConsoleConfig, RuntimeConfig};
pub use error::ParseError;
pub use parser::{EnvSource, ObjectGraph, Parser, ProcessEnv};
pub use provider::{ProviderError, ProviderRegistry};
pub use renderer::{ConsolePresenter, Presenter};
pub use scheduler::{Scheduler, SchedulerStats};
pub use template::{TemplateError, TemplateRegistry};

use thiserror::Error;

use parser::Limits;
use renderer::{Eval, OutputBuffer};
use scheduler::SchedulerConfig;

/// Errors that can occur while setting up or loading a runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),
}

/// Owns everything needed to render a template tick after tick
pub struct TemplateRuntime {
    // dropped first so its handles release while the scheduler is still up
    graph: ObjectGraph,
    config: RuntimeConfig,
    parser: Parser,
    scheduler: Arc<Scheduler>,
    presenter: Box<dyn Presenter>,
    updates: u64,
}

impl TemplateRuntime {
    /// Runtime with the built-in providers, the process environment and a console presenter.
    /// `config.text` is loaded right away.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::builder(config).build()
    }

    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder {
            config,
            providers: None,
            env: None,
            presenter: None,
        }
    }

    /// Parse `text` and swap it in as the current template.
    ///
    /// The old graph is dropped after the new one is built, so fetches both templates use
    /// keep their cached values. On error the old graph stays.
    pub fn load(&mut self, text: &str) -> Result<(), ParseError> {
        let graph = self.parser.parse(text)?;
        let old = std::mem::replace(&mut self.graph, graph);
        drop(old);
        tracing::debug!(
            nodes = self.graph.len(),
            registrations = self.scheduler.stats().registrations,
            "template loaded"
        );
        Ok(())
    }

    /// Advance one tick: dispatch due fetches. Returns how many were dispatched.
    pub fn update(&mut self) -> usize {
        let dispatched = self.scheduler.tick();
        self.updates += 1;
        dispatched
    }

    /// Interpret the current graph into one frame of text
    pub fn render(&self) -> String {
        let ctx = Eval::new(&self.parser, self.presenter.as_ref(), self.updates);
        let mut out = OutputBuffer::new(self.config.max_user_text);
        renderer::render(&self.graph, &ctx, &mut out);
        out.into_string()
    }

    /// Block until every dispatched fetch has finished, or `timeout` passes
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.scheduler.wait_idle(timeout)
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of completed updates
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Drop the graph and stop the scheduler. Rendering afterwards yields an empty frame.
    pub fn shutdown(&mut self) {
        self.graph = ObjectGraph::new();
        self.scheduler.shutdown();
    }
}

/// Replaces the runtime's default collaborators
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    providers: Option<ProviderRegistry>,
    env: Option<Box<dyn EnvSource>>,
    presenter: Option<Box<dyn Presenter>>,
}

impl RuntimeBuilder {
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Some(Box::new(env));
        self
    }

    pub fn presenter(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenter = Some(Box::new(presenter));
        self
    }

    pub fn build(self) -> Result<TemplateRuntime, RuntimeError> {
        let config = self.config;
        config.validate()?;
        let templates = TemplateRegistry::from_table(&config.templates)?;

        let scheduler = Arc::new(Scheduler::new(SchedulerConfig {
            tick_interval: config.tick_interval(),
            worker_threads: config.worker_threads,
        }));
        let providers = self.providers.unwrap_or_else(ProviderRegistry::with_builtins);
        let parser = Parser::new(Arc::new(providers), Arc::clone(&scheduler))
            .with_templates(templates)
            .with_limits(Limits::from(&config))
            .with_boxed_env(self.env.unwrap_or_else(|| Box::new(ProcessEnv)));
        let presenter = self
            .presenter
            .unwrap_or_else(|| Box::new(ConsolePresenter::new(config.console.clone())));

        let graph = parser.parse(&config.text)?;
        Ok(TemplateRuntime {
            graph,
            config,
            parser,
            scheduler,
            presenter,
            updates: 0,
        })
    }
}

/// Parse `text` with default settings, run one update, wait for its fetches and render.
pub fn render_once(text: &str) -> Result<String, RuntimeError> {
    let mut runtime = TemplateRuntime::new(RuntimeConfig::new().with_text(text))?;
    runtime.update();
    if !runtime.wait_idle(Duration::from_secs(30)) {
        tracing::warn!("fetches still running; rendering what is cached");
    }
    let frame = runtime.render();
    runtime.shutdown();
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn runtime(text: &str) -> TemplateRuntime {
        TemplateRuntime::builder(
            RuntimeConfig::new()
                .with_update_interval(0.05)
                .with_text(text),
        )
        .env(HashMap::<String, String>::new())
        .build()
        .unwrap()
    }

    #[test]
    fn test_render_plain_text() {
        let rt = runtime("just text");
        assert_eq!(rt.render(), "just text");
    }

    #[test]
    fn test_failed_load_keeps_old_graph() {
        let mut rt = runtime("old");
        assert!(rt.load("${endif}").is_err());
        assert_eq!(rt.render(), "old");
    }

    #[test]
    fn test_bad_template_slot_rejected() {
        let config = RuntimeConfig::new().with_template("templateX", "x");
        assert!(matches!(
            TemplateRuntime::new(config),
            Err(RuntimeError::Template(_))
        ));
    }

    #[test]
    fn test_update_counts() {
        let mut rt = runtime("x");
        rt.update();
        rt.update();
        assert_eq!(rt.updates(), 2);
        assert_eq!(rt.scheduler().stats().tick, 2);
    }

    #[test]
    fn test_shutdown_empties_frame() {
        let mut rt = runtime("x");
        rt.shutdown();
        assert_eq!(rt.render(), "");
        assert_eq!(rt.scheduler().stats().registrations, 0);
    }
}
