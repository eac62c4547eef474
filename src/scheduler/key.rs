//! Fetch identity and period arithmetic

use std::fmt;
use std::time::Duration;

/// Identity of a deduplicated fetch: a fetch kind plus its canonical arguments.
///
/// Two template fields that build equal keys share one registration and one periodic
/// fetch. The kind names the fetch (e.g. `exec`), not the template variable, so `$exec`
/// and `$execbar` running the same command share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderKey {
    kind: &'static str,
    args: Vec<String>,
}

impl ProviderKey {
    /// Create a key with no arguments
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            args: Vec::new(),
        }
    }

    /// Append an argument. Surrounding whitespace is not significant.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().trim().to_string());
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.args.join(", "))
    }
}

/// Number of ticks between two fetches for a requested interval.
///
/// Rounds to the nearest tick and never goes below one, so a fetch runs at most once per
/// tick even when asked to run faster.
pub fn period_ticks(desired: Duration, tick: Duration) -> u32 {
    if tick.is_zero() {
        return 1;
    }
    let ticks = (desired.as_secs_f64() / tick.as_secs_f64()).round();
    if ticks.is_nan() || ticks < 1.0 {
        1
    } else if ticks >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        ticks as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_equality_ignores_surrounding_whitespace() {
        let a = ProviderKey::new("exec").arg("  uname -r ");
        let b = ProviderKey::new("exec").arg("uname -r");
        assert_eq!(a, b);
        assert_ne!(a, ProviderKey::new("tcp").arg("uname -r"));
    }

    #[test]
    fn test_key_display() {
        let key = ProviderKey::new("tcp").arg("localhost").arg("7634");
        assert_eq!(key.to_string(), "tcp(localhost, 7634)");
    }

    #[test]
    fn test_period_rounds_to_nearest_tick() {
        let tick = Duration::from_secs(2);
        assert_eq!(period_ticks(Duration::from_secs(30), tick), 15);
        assert_eq!(period_ticks(Duration::from_secs(5), tick), 3);
        assert_eq!(period_ticks(Duration::from_millis(4900), tick), 2);
    }

    #[test]
    fn test_period_never_below_one_tick() {
        let tick = Duration::from_secs(3);
        assert_eq!(period_ticks(Duration::from_millis(10), tick), 1);
        assert_eq!(period_ticks(Duration::ZERO, tick), 1);
        assert_eq!(period_ticks(Duration::from_secs(1), Duration::ZERO), 1);
    }
}
