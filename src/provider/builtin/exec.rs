//! Shell command providers
//!
//! Every variant runs its command through `sh -c` on a fetch worker and shares the fetch kind
//! `exec`, so one command used by `$exec`, `$execi` and `$execbar` is run once per period.

use std::process::{Command, Stdio};

use crate::provider::{
    BarSize, BuildContext, Construct, NodeKind, Numeric, Print, ProviderError, ProviderSpec,
};
use crate::renderer::{truncate_str, Eval};
use crate::scheduler::{CallbackHandle, Fetch, FetchError, ProviderKey};

use super::{chomp, Reparsed};

pub(super) fn specs() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new("exec", NodeKind::Print, exec).with_usage("${exec command}"),
        ProviderSpec::new("execi", NodeKind::Print, execi)
            .with_usage("${execi interval command}"),
        ProviderSpec::new("texeci", NodeKind::Print, execi)
            .with_usage("${texeci interval command}"),
        ProviderSpec::new("execp", NodeKind::Print, execp).with_usage("${execp command}"),
        ProviderSpec::new("execpi", NodeKind::Print, execpi)
            .with_usage("${execpi interval command}"),
        ProviderSpec::new("texecpi", NodeKind::Print, execpi)
            .with_usage("${texecpi interval command}"),
        ProviderSpec::new("execbar", NodeKind::Bar, execbar)
            .with_usage("${execbar [height,width] command}"),
        ProviderSpec::new("execgauge", NodeKind::Gauge, execgauge)
            .with_usage("${execgauge [height,width] command}"),
        ProviderSpec::new("execgraph", NodeKind::Graph, execgraph)
            .with_usage("${execgraph [height,width] command}"),
        ProviderSpec::new("execibar", NodeKind::Bar, execibar)
            .with_usage("${execibar interval [height,width] command}"),
        ProviderSpec::new("execigauge", NodeKind::Gauge, execigauge)
            .with_usage("${execigauge interval [height,width] command}"),
        ProviderSpec::new("execigraph", NodeKind::Graph, execigraph)
            .with_usage("${execigraph interval [height,width] command}"),
    ]
}

/// Runs one shell command and keeps its standard output
struct ExecFetch {
    command: String,
    max_len: usize,
}

impl ExecFetch {
    fn new(command: impl Into<String>, max_len: usize) -> Self {
        Self {
            command: command.into(),
            max_len,
        }
    }
}

impl Fetch for ExecFetch {
    type Output = String;

    fn fetch(&self) -> Result<String, FetchError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;
        if !output.status.success() {
            tracing::debug!(
                command = %self.command,
                status = %output.status,
                "command exited unsuccessfully"
            );
        }
        let text = chomp(String::from_utf8_lossy(&output.stdout).into_owned());
        Ok(truncate_str(&text, self.max_len).to_string())
    }

    fn sentinel(&self) -> String {
        String::new()
    }
}

fn register(ctx: &BuildContext<'_>, command: &str, period: u32) -> CallbackHandle<String> {
    let command = command.trim();
    ctx.register(
        ProviderKey::new("exec").arg(command),
        period,
        ExecFetch::new(command, ctx.limits().text_buffer_size),
    )
}

/// Command with the period from a leading interval
fn interval_command<'s>(
    ctx: &BuildContext<'_>,
    arg: Option<&'s str>,
) -> Result<(u32, &'s str), ProviderError> {
    let (period, command) = ctx.split_interval(ctx.require(arg)?)?;
    let command = ctx.require(Some(command))?;
    Ok((period, command))
}

struct ExecText {
    output: CallbackHandle<String>,
}

impl Print for ExecText {
    fn print(&self, _ctx: &Eval<'_>, out: &mut String) {
        out.push_str(&self.output.get_result_copy());
    }
}

fn exec(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let command = ctx.require(arg)?;
    let output = register(ctx, command, ctx.default_period());
    Ok(Construct::print(ExecText { output }))
}

fn execi(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let (period, command) = interval_command(ctx, arg)?;
    let output = register(ctx, command, period);
    Ok(Construct::print(ExecText { output }))
}

/// Command output rendered as a template
struct ExecParsed {
    output: CallbackHandle<String>,
    parsed: Reparsed,
}

impl Print for ExecParsed {
    fn print(&self, ctx: &Eval<'_>, out: &mut String) {
        self.parsed.render(ctx, self.output.get_result_copy(), out);
    }
}

fn execp(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let command = ctx.require(arg)?;
    Ok(Construct::print(ExecParsed {
        output: register(ctx, command, ctx.default_period()),
        parsed: Reparsed::default(),
    }))
}

fn execpi(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let (period, command) = interval_command(ctx, arg)?;
    Ok(Construct::print(ExecParsed {
        output: register(ctx, command, period),
        parsed: Reparsed::default(),
    }))
}

/// Command output read as a number in `0..=100`
struct ExecValue {
    output: CallbackHandle<String>,
    size: BarSize,
}

impl Numeric for ExecValue {
    fn value(&self, _ctx: &Eval<'_>) -> f64 {
        parse_percent(&self.output.get_result_copy())
    }

    fn size(&self) -> BarSize {
        self.size
    }
}

/// Leading number of `text`, clamped to `0..=100`; zero when there is none
fn parse_percent(text: &str) -> f64 {
    let value = text
        .split_whitespace()
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);
    value.clamp(0.0, 100.0)
}

fn exec_value(
    ctx: &BuildContext<'_>,
    period: u32,
    arg: &str,
) -> Result<ExecValue, ProviderError> {
    let (size, command) = BarSize::split(arg);
    // a bare number is the command, not a size
    let (size, command) = if command.trim().is_empty() {
        (BarSize::default(), arg)
    } else {
        (size, command)
    };
    let command = ctx.require(Some(command))?;
    Ok(ExecValue {
        output: register(ctx, command, period),
        size,
    })
}

fn exec_value_default(
    ctx: &BuildContext<'_>,
    arg: Option<&str>,
) -> Result<ExecValue, ProviderError> {
    exec_value(ctx, ctx.default_period(), ctx.require(arg)?)
}

fn exec_value_interval(
    ctx: &BuildContext<'_>,
    arg: Option<&str>,
) -> Result<ExecValue, ProviderError> {
    let (period, rest) = ctx.split_interval(ctx.require(arg)?)?;
    exec_value(ctx, period, ctx.require(Some(rest))?)
}

fn execbar(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    exec_value_default(ctx, arg).map(Construct::bar)
}

fn execgauge(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    exec_value_default(ctx, arg).map(Construct::gauge)
}

fn execgraph(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    exec_value_default(ctx, arg).map(Construct::graph)
}

fn execibar(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    exec_value_interval(ctx, arg).map(Construct::bar)
}

fn execigauge(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    exec_value_interval(ctx, arg).map(Construct::gauge)
}

fn execigraph(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    exec_value_interval(ctx, arg).map(Construct::graph)
}
