//! Data providers and the capabilities template nodes are built from
//!
//! A provider is a named constructor. When the parser meets `${name args}` it looks `name`
//! up in the [`ProviderRegistry`] and calls the constructor with a [`BuildContext`] and the
//! argument text. The constructor returns the node's capability: exactly one of printing
//! text, testing a condition, or producing a number for a bar, gauge, graph or percentage.

pub mod builtin;
mod registry;

use std::time::Duration;

use thiserror::Error;

use crate::error::ParseError;
use crate::parser::{ObjectGraph, Parser};
use crate::renderer::Eval;
use crate::scheduler::{CallbackHandle, Fetch, ProviderKey};

pub use registry::{ProviderRegistry, ProviderRegistryBuilder};

/// Errors a provider constructor can report. Any of them aborts the parse.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} needs an argument: {usage}")]
    MissingArgument {
        provider: &'static str,
        usage: &'static str,
    },

    #[error("{provider}: {message}")]
    InvalidArgument {
        provider: &'static str,
        message: String,
    },

    /// The argument was parsed as a nested template and that failed
    #[error("in nested template: {0}")]
    Nested(Box<ParseError>),
}

impl From<ParseError> for ProviderError {
    fn from(err: ParseError) -> Self {
        Self::Nested(Box::new(err))
    }
}

/// Writes text into the output
pub trait Print {
    fn print(&self, ctx: &Eval<'_>, out: &mut String);
}

/// Decides whether an `if` block is entered
pub trait Test {
    fn test(&self, ctx: &Eval<'_>) -> bool;
}

/// Produces a value in `0.0..=100.0` for a bar, gauge or graph
pub trait Numeric {
    fn value(&self, ctx: &Eval<'_>) -> f64;

    /// Size requested in the template, e.g. `${execbar 6,80 cmd}`
    fn size(&self) -> BarSize {
        BarSize::default()
    }
}

/// Produces an integer percentage
pub trait Percent {
    fn percentage(&self, ctx: &Eval<'_>) -> u8;
}

/// Optional `height,width` of a bar-like field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarSize {
    pub height: Option<u32>,
    pub width: Option<u32>,
}

impl BarSize {
    /// Split a leading `height,width` or `height` token off `arg`.
    ///
    /// Returns the size and the rest of the argument. Without a size token the whole
    /// argument is returned unchanged.
    pub fn split(arg: &str) -> (Self, &str) {
        let arg = arg.trim_start();
        let (head, rest) = arg.split_once(char::is_whitespace).unwrap_or((arg, ""));
        let parsed = match head.split_once(',') {
            Some((h, w)) => h.parse().ok().zip(w.parse().ok()).map(|(h, w)| Self {
                height: Some(h),
                width: Some(w),
            }),
            None => head.parse().ok().map(|h| Self {
                height: Some(h),
                width: None,
            }),
        };
        match parsed {
            Some(size) => (size, rest.trim_start()),
            None => (Self::default(), arg),
        }
    }
}

/// What a node does when interpreted
pub enum Capability {
    Text(String),
    Print(Box<dyn Print>),
    Test(Box<dyn Test>),
    Bar(Box<dyn Numeric>),
    Gauge(Box<dyn Numeric>),
    Graph(Box<dyn Numeric>),
    Percentage(Box<dyn Percent>),
}

impl Capability {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Text(_) => NodeKind::PlainText,
            Self::Print(_) => NodeKind::Print,
            Self::Test(_) => NodeKind::IfTest,
            Self::Bar(_) => NodeKind::Bar,
            Self::Gauge(_) => NodeKind::Gauge,
            Self::Graph(_) => NodeKind::Graph,
            Self::Percentage(_) => NodeKind::Percentage,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Node kinds, one per capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    PlainText,
    Print,
    IfTest,
    Bar,
    Gauge,
    Graph,
    Percentage,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PlainText => "text",
            Self::Print => "print",
            Self::IfTest => "if",
            Self::Bar => "bar",
            Self::Gauge => "gauge",
            Self::Graph => "graph",
            Self::Percentage => "percentage",
        };
        f.write_str(name)
    }
}

/// Part a provider plays in an `if`/`else`/`endif` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockRole {
    #[default]
    None,
    If,
    Else,
    Endif,
}

/// Builds a node from its argument text
pub type Constructor = fn(&BuildContext<'_>, Option<&str>) -> Result<Construct, ProviderError>;

/// Registry entry for one provider name
#[derive(Clone)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub kind: NodeKind,
    pub role: BlockRole,
    /// Argument synopsis shown in errors and `--providers`
    pub usage: &'static str,
    /// Refresh interval used when the template does not give one
    pub interval: Option<Duration>,
    pub constructor: Constructor,
}

impl ProviderSpec {
    pub fn new(name: &'static str, kind: NodeKind, constructor: Constructor) -> Self {
        Self {
            name,
            kind,
            role: BlockRole::None,
            usage: "",
            interval: None,
            constructor,
        }
    }

    pub fn with_role(mut self, role: BlockRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_usage(mut self, usage: &'static str) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

impl std::fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("role", &self.role)
            .field("usage", &self.usage)
            .field("interval", &self.interval)
            .finish()
    }
}

/// A constructor's result
pub struct Construct {
    pub capability: Capability,
    /// Child graph parsed from the argument, evaluated by the capability
    pub sub: Option<ObjectGraph>,
}

impl Construct {
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Capability::Text(text.into()))
    }

    pub fn print(p: impl Print + 'static) -> Self {
        Self::new(Capability::Print(Box::new(p)))
    }

    pub fn test(t: impl Test + 'static) -> Self {
        Self::new(Capability::Test(Box::new(t)))
    }

    pub fn bar(n: impl Numeric + 'static) -> Self {
        Self::new(Capability::Bar(Box::new(n)))
    }

    pub fn gauge(n: impl Numeric + 'static) -> Self {
        Self::new(Capability::Gauge(Box::new(n)))
    }

    pub fn graph(n: impl Numeric + 'static) -> Self {
        Self::new(Capability::Graph(Box::new(n)))
    }

    pub fn percentage(p: impl Percent + 'static) -> Self {
        Self::new(Capability::Percentage(Box::new(p)))
    }

    pub fn with_sub(mut self, sub: ObjectGraph) -> Self {
        self.sub = Some(sub);
        self
    }

    fn new(capability: Capability) -> Self {
        Self {
            capability,
            sub: None,
        }
    }
}

/// What a constructor may use while building its node
pub struct BuildContext<'a> {
    parser: &'a Parser,
    spec: &'a ProviderSpec,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(parser: &'a Parser, spec: &'a ProviderSpec) -> Self {
        Self { parser, spec }
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn parser(&self) -> &'a Parser {
        self.parser
    }

    /// Parse `text` as a child graph with its own `if` stack
    pub fn parse_sub(&self, text: &str) -> Result<ObjectGraph, ProviderError> {
        Ok(self.parser.parse_nested(text)?)
    }

    /// Register a periodic fetch with the runtime's scheduler
    pub fn register<F: Fetch>(
        &self,
        key: ProviderKey,
        period: u32,
        fetcher: F,
    ) -> CallbackHandle<F::Output> {
        self.parser.scheduler().register(key, period, fetcher)
    }

    /// Ticks between fetches for `desired`
    pub fn period_for(&self, desired: Duration) -> u32 {
        self.parser.scheduler().period_for(desired)
    }

    /// Period from the registry entry's suggested interval, or one tick
    pub fn default_period(&self) -> u32 {
        self.spec.interval.map_or(1, |i| self.period_for(i))
    }

    /// Period from a leading interval in seconds, e.g. `execi 30 cmd`.
    /// Returns the period and the rest of the argument.
    pub fn split_interval<'s>(&self, arg: &'s str) -> Result<(u32, &'s str), ProviderError> {
        let arg = arg.trim_start();
        let (head, rest) = arg.split_once(char::is_whitespace).unwrap_or((arg, ""));
        let seconds: f64 = head.parse().map_err(|_| self.invalid(format!(
            "'{head}' is not an interval in seconds; usage: {}",
            self.spec.usage
        )))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(self.invalid(format!("interval must be positive, got {seconds}")));
        }
        Ok((self.period_for(Duration::from_secs_f64(seconds)), rest.trim_start()))
    }

    pub fn limits(&self) -> &crate::parser::Limits {
        self.parser.limits()
    }

    /// The argument, or a [`ProviderError::MissingArgument`]
    pub fn require<'s>(&self, arg: Option<&'s str>) -> Result<&'s str, ProviderError> {
        arg.filter(|a| !a.trim().is_empty())
            .ok_or(ProviderError::MissingArgument {
                provider: self.spec.name,
                usage: self.spec.usage,
            })
    }

    pub fn invalid(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::InvalidArgument {
            provider: self.spec.name,
            message: message.into(),
        }
    }
}
