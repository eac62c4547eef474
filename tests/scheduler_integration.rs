//! Scheduler behavior seen from outside: sharing, periods, failures and lifecycle

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tickplate::scheduler::{
    period_ticks, FailurePolicy, Fetch, FetchError, ProviderKey, Scheduler, SchedulerConfig,
};
use tickplate::{RuntimeConfig, TemplateRuntime};

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig {
        tick_interval: Duration::from_secs(3),
        worker_threads: 2,
    })
}

fn settle(s: &Scheduler) {
    assert!(s.wait_idle(Duration::from_secs(10)), "fetches did not finish");
}

/// Counts calls; fails every call after `ok_calls` successes
struct Flaky {
    calls: Arc<AtomicUsize>,
    ok_calls: usize,
    policy: FailurePolicy,
}

impl Flaky {
    fn new(ok_calls: usize, policy: FailurePolicy) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            ok_calls,
            policy,
        }
    }
}

impl Fetch for Flaky {
    type Output = String;

    fn fetch(&self) -> Result<String, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.ok_calls {
            return Err(FetchError::unavailable("gone"));
        }
        Ok(format!("value {n}"))
    }

    fn sentinel(&self) -> String {
        "n/a".to_string()
    }

    fn on_failure(&self) -> FailurePolicy {
        self.policy
    }
}

struct Slow {
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl Fetch for Slow {
    type Output = usize;

    fn fetch(&self) -> Result<usize, FetchError> {
        std::thread::sleep(self.delay);
        Ok(self.calls.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn sentinel(&self) -> usize {
        0
    }
}

/// Tracks how many fetches overlap
struct Tracked {
    delay: Duration,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Fetch for Tracked {
    type Output = usize;

    fn fetch(&self) -> Result<usize, FetchError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(now)
    }

    fn sentinel(&self) -> usize {
        0
    }
}

/// Meets the test at a barrier once the worker has picked it up
struct Gated {
    started: Arc<Barrier>,
    calls: Arc<AtomicUsize>,
}

impl Fetch for Gated {
    type Output = usize;

    fn fetch(&self) -> Result<usize, FetchError> {
        self.started.wait();
        std::thread::sleep(Duration::from_millis(100));
        Ok(self.calls.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn sentinel(&self) -> usize {
        0
    }
}

struct Panics;

impl Fetch for Panics {
    type Output = u32;

    fn fetch(&self) -> Result<u32, FetchError> {
        panic!("provider bug");
    }

    fn sentinel(&self) -> u32 {
        7
    }
}

#[test]
fn test_period_from_interval() {
    let tick = Duration::from_secs(3);
    assert_eq!(period_ticks(Duration::from_secs(45), tick), 15);
    assert_eq!(period_ticks(Duration::from_secs(1), tick), 1);
    assert_eq!(period_ticks(Duration::ZERO, tick), 1);
}

#[test]
fn test_long_period_fetches_once_per_period() {
    let s = scheduler();
    let period = s.period_for(Duration::from_secs(45));
    assert_eq!(period, 15);

    let fetch = Flaky::new(usize::MAX, FailurePolicy::KeepLast);
    let calls = Arc::clone(&fetch.calls);
    let handle = s.register(ProviderKey::new("flaky"), period, fetch);

    for _ in 0..30 {
        s.tick();
        settle(&s);
    }
    // ticks 0 and 15
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(handle.fetch_count(), 2);
    assert_eq!(handle.get_result_copy(), "value 2");
}

#[test]
fn test_failure_keeps_last_value() {
    let s = scheduler();
    let handle = s.register(
        ProviderKey::new("keep"),
        1,
        Flaky::new(1, FailurePolicy::KeepLast),
    );
    s.tick();
    settle(&s);
    assert_eq!(handle.get_result_copy(), "value 1");

    s.tick();
    settle(&s);
    assert_eq!(handle.get_result_copy(), "value 1");
    assert_eq!(handle.failure_count(), 1);
}

#[test]
fn test_failure_resets_to_sentinel() {
    let s = scheduler();
    let handle = s.register(
        ProviderKey::new("reset"),
        1,
        Flaky::new(1, FailurePolicy::Sentinel),
    );
    s.tick();
    settle(&s);
    assert_eq!(handle.get_result_copy(), "value 1");

    s.tick();
    settle(&s);
    assert_eq!(handle.get_result_copy(), "n/a");
}

#[test]
fn test_panicking_fetch_is_contained() {
    let s = scheduler();
    let handle = s.register(ProviderKey::new("panics"), 1, Panics);
    s.tick();
    settle(&s);
    s.tick();
    settle(&s);
    assert_eq!(handle.get_result_copy(), 7);
    assert_eq!(handle.failure_count(), 2);
    assert_eq!(s.stats().in_flight, 0);
}

#[test]
fn test_slow_fetch_is_not_doubled() {
    let s = scheduler();
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = s.register(
        ProviderKey::new("slow"),
        1,
        Slow {
            delay: Duration::from_millis(300),
            calls: Arc::clone(&calls),
        },
    );

    assert_eq!(s.tick(), 1);
    assert_eq!(s.tick(), 0);
    assert_eq!(s.tick(), 0);
    settle(&s);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.get_result_copy(), 1);

    // retried on the tick after the fetch finished
    assert_eq!(s.tick(), 1);
    settle(&s);
    assert_eq!(handle.fetch_count(), 2);
}

#[test]
fn test_tick_does_not_wait_for_fetches() {
    let s = scheduler();
    let _handle = s.register(
        ProviderKey::new("slow"),
        1,
        Slow {
            delay: Duration::from_millis(500),
            calls: Arc::new(AtomicUsize::new(0)),
        },
    );
    let start = Instant::now();
    s.tick();
    assert!(start.elapsed() < Duration::from_millis(250));
    settle(&s);
}

#[test]
fn test_clone_and_drop_track_references() {
    let s = scheduler();
    let key = ProviderKey::new("refs").arg("a");
    let first = s.register(key.clone(), 1, Flaky::new(1, FailurePolicy::KeepLast));
    let second = first.clone();
    let third = s.register(key.clone(), 1, Flaky::new(1, FailurePolicy::KeepLast));
    assert!(first.same_registration(&third));
    assert_eq!(s.ref_count(&key), 3);

    drop(first);
    drop(second);
    assert_eq!(s.ref_count(&key), 1);
    assert_eq!(s.stats().registrations, 1);

    drop(third);
    assert_eq!(s.ref_count(&key), 0);
    assert_eq!(s.stats().registrations, 0);
    assert_eq!(s.tick(), 0);
}

#[test]
fn test_shutdown_joins_running_fetch() {
    let s = scheduler();
    let started = Arc::new(Barrier::new(2));
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = s.register(
        ProviderKey::new("gated"),
        1,
        Gated {
            started: Arc::clone(&started),
            calls: Arc::clone(&calls),
        },
    );
    assert_eq!(s.tick(), 1);
    // the fetch is running once the barrier opens; queued ones would be skipped
    started.wait();
    s.shutdown();

    // the running fetch finished before shutdown returned
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(s.stats().registrations, 0);
    assert_eq!(s.stats().in_flight, 0);
    assert_eq!(s.tick(), 0);
    drop(handle);
}

#[test]
fn test_reregister_waits_for_released_fetch() {
    let s = scheduler();
    let key = ProviderKey::new("tracked");
    let first = Tracked::new(Duration::from_millis(400));
    let current = Arc::clone(&first.current);
    let peak = Arc::clone(&first.peak);
    let handle = s.register(key.clone(), 1, first);

    assert_eq!(s.tick(), 1);
    let deadline = Instant::now() + Duration::from_secs(5);
    while current.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "fetch never started");
        std::thread::yield_now();
    }

    // release while the fetch runs, then ask for the same key again
    drop(handle);
    assert_eq!(s.stats().registrations, 0);
    let again = Tracked {
        delay: Duration::from_millis(10),
        current: Arc::clone(&current),
        peak: Arc::clone(&peak),
    };
    let handle = s.register(key.clone(), 1, again);
    assert_eq!(s.tick(), 0);
    assert_eq!(s.stats().in_flight, 1);

    settle(&s);
    assert_eq!(s.tick(), 1);
    settle(&s);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(handle.fetch_count(), 1);
}

#[test]
fn test_lower_period_reschedules_next_tick() {
    let s = scheduler();
    let key = ProviderKey::new("lowered");
    let fetch = Flaky::new(usize::MAX, FailurePolicy::KeepLast);
    let calls = Arc::clone(&fetch.calls);
    let slow = s.register(key.clone(), 15, fetch);

    assert_eq!(s.tick(), 1);
    settle(&s);
    assert_eq!(s.tick(), 0);
    assert_eq!(s.tick(), 0);

    let fast = s.register(key.clone(), 1, Flaky::new(usize::MAX, FailurePolicy::KeepLast));
    assert!(fast.same_registration(&slow));
    assert_eq!(s.period_of(&key), Some(1));
    assert_eq!(s.ref_count(&key), 2);

    // one fetch for both handles, on the very next tick and every tick after
    assert_eq!(s.tick(), 1);
    settle(&s);
    assert_eq!(s.tick(), 1);
    settle(&s);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(fast.get_result_copy(), "value 3");
    assert_eq!(slow.get_result_copy(), "value 3");
}

#[test]
fn test_reload_keeps_recurring_keys() {
    let config = RuntimeConfig::new()
        .with_update_interval(0.05)
        .with_text("${exec echo kept} ${exec echo dropped}");
    let mut rt = TemplateRuntime::builder(config)
        .env(HashMap::<String, String>::new())
        .build()
        .unwrap();
    rt.update();
    assert!(rt.wait_idle(Duration::from_secs(10)));
    assert_eq!(rt.render(), "kept dropped");

    rt.load("[${exec echo kept}]").unwrap();
    let kept = ProviderKey::new("exec").arg("echo kept");
    let dropped = ProviderKey::new("exec").arg("echo dropped");
    assert_eq!(rt.scheduler().ref_count(&kept), 1);
    assert_eq!(rt.scheduler().ref_count(&dropped), 0);
    assert_eq!(rt.scheduler().stats().registrations, 1);

    // cached value survives without another update
    assert_eq!(rt.render(), "[kept]");
}
