//! System counters from `/proc` and a TCP read

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::{
    BarSize, BuildContext, Construct, NodeKind, Numeric, Percent, Print, ProviderError,
    ProviderSpec,
};
use crate::renderer::Eval;
use crate::scheduler::{CallbackHandle, FailurePolicy, Fetch, FetchError, ProviderKey};

pub(super) fn specs() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new("read_tcp", NodeKind::Print, read_tcp)
            .with_usage("${read_tcp [host] port}"),
        ProviderSpec::new("loadavg", NodeKind::Print, loadavg).with_usage("${loadavg [1|2|3]}"),
        ProviderSpec::new("uptime", NodeKind::Print, |ctx, _| uptime(ctx, false)),
        ProviderSpec::new("uptime_short", NodeKind::Print, |ctx, _| uptime(ctx, true)),
        ProviderSpec::new("memperc", NodeKind::Percentage, memperc),
        ProviderSpec::new("membar", NodeKind::Bar, membar).with_usage("${membar [height,width]}"),
    ]
}

/// Reads a `/proc` file and parses it
struct ProcFetch<T> {
    path: PathBuf,
    parse: fn(&str) -> Result<T, FetchError>,
    sentinel: T,
}

impl<T: Clone + Send + Sync + 'static> Fetch for ProcFetch<T> {
    type Output = T;

    fn fetch(&self) -> Result<T, FetchError> {
        let content = std::fs::read_to_string(&self.path)?;
        (self.parse)(&content)
    }

    fn sentinel(&self) -> T {
        self.sentinel.clone()
    }
}

fn register_proc<T: Clone + Send + Sync + 'static>(
    ctx: &BuildContext<'_>,
    kind: &'static str,
    path: &str,
    parse: fn(&str) -> Result<T, FetchError>,
    sentinel: T,
) -> CallbackHandle<T> {
    ctx.register(
        ProviderKey::new(kind),
        ctx.default_period(),
        ProcFetch {
            path: PathBuf::from(path),
            parse,
            sentinel,
        },
    )
}

// read_tcp

struct TcpFetch {
    host: String,
    port: u16,
    timeout: Duration,
    max_len: usize,
}

impl Fetch for TcpFetch {
    type Output = String;

    fn fetch(&self) -> Result<String, FetchError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| FetchError::unavailable(format!("cannot resolve {}", self.host)))?;
        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;

        let mut buf = vec![0u8; self.max_len.max(1)];
        let n = stream.read(&mut buf)?;
        buf.truncate(n);
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn sentinel(&self) -> String {
        String::new()
    }

    fn on_failure(&self) -> FailurePolicy {
        FailurePolicy::Sentinel
    }
}

struct TcpText {
    reply: CallbackHandle<String>,
}

impl Print for TcpText {
    fn print(&self, _ctx: &Eval<'_>, out: &mut String) {
        out.push_str(&self.reply.get_result_copy());
    }
}

fn read_tcp(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let words: Vec<&str> = ctx.require(arg)?.split_whitespace().collect();
    let (host, port) = match words.as_slice() {
        [port] => ("localhost", *port),
        [host, port, ..] => (*host, *port),
        [] => return Err(ctx.invalid("missing port")),
    };
    let port: u16 = port
        .parse()
        .map_err(|_| ctx.invalid(format!("'{port}' is not a port number")))?;

    let reply = ctx.register(
        ProviderKey::new("tcp").arg(host).arg(port.to_string()),
        ctx.default_period(),
        TcpFetch {
            host: host.to_string(),
            port,
            timeout: ctx.limits().net_timeout,
            max_len: ctx.limits().text_buffer_size,
        },
    );
    Ok(Construct::print(TcpText { reply }))
}

// loadavg

/// Parse the three load averages from `/proc/loadavg`
pub fn parse_loadavg(content: &str) -> Result<[f64; 3], FetchError> {
    let mut fields = content.split_whitespace().map(str::parse::<f64>);
    let mut out = [0.0; 3];
    for slot in &mut out {
        *slot = fields
            .next()
            .and_then(Result::ok)
            .ok_or_else(|| FetchError::malformed("expected three load averages"))?;
    }
    Ok(out)
}

struct LoadAvg {
    values: CallbackHandle<[f64; 3]>,
    /// Zero-based index, or all three
    which: Option<usize>,
}

impl Print for LoadAvg {
    fn print(&self, _ctx: &Eval<'_>, out: &mut String) {
        let values = self.values.get_result_copy();
        let text = match self.which {
            Some(i) => format!("{:.2}", values[i]),
            None => format!("{:.2} {:.2} {:.2}", values[0], values[1], values[2]),
        };
        out.push_str(&text);
    }
}

fn loadavg(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let which = match arg.map(str::trim) {
        None => None,
        Some(a) => match a.parse::<usize>() {
            Ok(n @ 1..=3) => Some(n - 1),
            _ => {
                tracing::warn!(arg = a, "loadavg arg needs to be in range (1,3); showing all");
                None
            }
        },
    };
    let values = register_proc(ctx, "loadavg", "/proc/loadavg", parse_loadavg, [0.0; 3]);
    Ok(Construct::print(LoadAvg { values, which }))
}

// uptime

/// Seconds since boot from `/proc/uptime`
pub fn parse_uptime(content: &str) -> Result<u64, FetchError> {
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s as u64)
        .ok_or_else(|| FetchError::malformed("expected seconds since boot"))
}

fn format_seconds(secs: u64) -> String {
    let (days, hours, minutes, seconds) = split_seconds(secs);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else {
        format!("{hours}h {minutes}m {seconds}s")
    }
}

fn format_seconds_short(secs: u64) -> String {
    let (days, hours, minutes, seconds) = split_seconds(secs);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

fn split_seconds(secs: u64) -> (u64, u64, u64, u64) {
    (secs / 86400, secs / 3600 % 24, secs / 60 % 60, secs % 60)
}

struct Uptime {
    seconds: CallbackHandle<u64>,
    short: bool,
}

impl Print for Uptime {
    fn print(&self, _ctx: &Eval<'_>, out: &mut String) {
        let secs = self.seconds.get_result_copy();
        out.push_str(&if self.short {
            format_seconds_short(secs)
        } else {
            format_seconds(secs)
        });
    }
}

fn uptime(ctx: &BuildContext<'_>, short: bool) -> Result<Construct, ProviderError> {
    let seconds = register_proc(ctx, "uptime", "/proc/uptime", parse_uptime, 0);
    Ok(Construct::print(Uptime { seconds, short }))
}

// memory

/// Totals from `/proc/meminfo`, in KiB
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemInfo {
    pub total: u64,
    pub available: u64,
}

impl MemInfo {
    /// Share of memory in use, `0.0..=100.0`
    pub fn used_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let used = self.total.saturating_sub(self.available);
        used as f64 * 100.0 / self.total as f64
    }
}

/// Parse `/proc/meminfo`. Without `MemAvailable`, free + buffers + cached is used.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, FetchError> {
    let mut total = None;
    let mut available = None;
    let mut fallback = 0u64;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(value) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        match key {
            "MemTotal" => total = Some(value),
            "MemAvailable" => available = Some(value),
            "MemFree" | "Buffers" | "Cached" => fallback += value,
            _ => {}
        }
    }

    let total = total.ok_or_else(|| FetchError::malformed("MemTotal missing"))?;
    Ok(MemInfo {
        total,
        available: available.unwrap_or(fallback).min(total),
    })
}

fn register_meminfo(ctx: &BuildContext<'_>) -> CallbackHandle<MemInfo> {
    register_proc(ctx, "meminfo", "/proc/meminfo", parse_meminfo, MemInfo::default())
}

struct MemPerc {
    info: CallbackHandle<MemInfo>,
}

impl Percent for MemPerc {
    fn percentage(&self, _ctx: &Eval<'_>) -> u8 {
        self.info.get_result_copy().used_percent().round().clamp(0.0, 100.0) as u8
    }
}

struct MemBar {
    info: CallbackHandle<MemInfo>,
    size: BarSize,
}

impl Numeric for MemBar {
    fn value(&self, _ctx: &Eval<'_>) -> f64 {
        self.info.get_result_copy().used_percent()
    }

    fn size(&self) -> BarSize {
        self.size
    }
}

fn memperc(ctx: &BuildContext<'_>, _arg: Option<&str>) -> Result<Construct, ProviderError> {
    Ok(Construct::percentage(MemPerc {
        info: register_meminfo(ctx),
    }))
}

fn membar(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let (size, _) = BarSize::split(arg.unwrap_or(""));
    Ok(Construct::bar(MemBar {
        info: register_meminfo(ctx),
        size,
    }))
}
