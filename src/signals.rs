//! Process signals and config file watching for the display loop
//!
//! `SIGINT` and `SIGTERM` ask the loop to stop after the current frame, and a second `SIGINT`
//! exits at once. `SIGUSR1` reloads the config file, as does any change to it on disk.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};

/// Longest the loop sleeps before looking at the signal flags again
const SLICE: Duration = Duration::from_millis(100);

/// Flags set from signal handlers. `Default` gives flags no handler is attached to.
#[derive(Debug, Default, Clone)]
pub struct Signals {
    stop: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl Signals {
    /// Hook `SIGINT`, `SIGTERM` and `SIGUSR1` up to the flags
    pub fn install() -> io::Result<Self> {
        let signals = Self::default();
        // checked before the flag is set, so only a repeated SIGINT exits
        signal_hook::flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(&signals.stop))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&signals.stop))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&signals.stop))?;
        signal_hook::flag::register(SIGUSR1, Arc::clone(&signals.reload))?;
        Ok(signals)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// True once per received reload request
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }
}

/// Watches a config file through its directory, so editors that replace the file are seen
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    changes: mpsc::Receiver<()>,
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> notify::Result<Self> {
        let name = path
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| OsString::from(path));
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, changes) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if touches(&event, &name) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "config watch error"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %dir.display(), "watching config");

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// Drain pending change events. True if there was at least one.
    pub fn take_changed(&self) -> bool {
        let mut changed = false;
        while self.changes.try_recv().is_ok() {
            changed = true;
        }
        changed
    }

    /// Wait up to `timeout` for a change
    fn wait_changed(&self, timeout: Duration) -> bool {
        match self.changes.recv_timeout(timeout) {
            Ok(()) => {
                self.take_changed();
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => false,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                false
            }
        }
    }
}

/// Whether `event` writes, creates or removes the file called `name`
fn touches(event: &Event, name: &OsStr) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(name))
}

/// Why the display loop woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Tick,
    Reload,
    Stop,
}

/// Sleep until `deadline`, returning early for a stop or reload request.
///
/// Stop wins over reload when both are pending.
pub fn wait_until(deadline: Instant, signals: &Signals, watcher: Option<&ConfigWatcher>) -> Wake {
    loop {
        if signals.stop_requested() {
            return Wake::Stop;
        }
        if signals.take_reload() || watcher.is_some_and(ConfigWatcher::take_changed) {
            return Wake::Reload;
        }
        let now = Instant::now();
        if now >= deadline {
            return Wake::Tick;
        }
        let slice = SLICE.min(deadline - now);
        match watcher {
            Some(w) => {
                if w.wait_changed(slice) {
                    return if signals.stop_requested() {
                        Wake::Stop
                    } else {
                        Wake::Reload
                    };
                }
            }
            None => std::thread::sleep(slice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deadline_passes_as_tick() {
        let signals = Signals::default();
        let start = Instant::now();
        let wake = wait_until(start + Duration::from_millis(150), &signals, None);
        assert_eq!(wake, Wake::Tick);
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_stop_wins_over_reload() {
        let signals = Signals::default();
        signals.reload.store(true, Ordering::SeqCst);
        signals.stop.store(true, Ordering::SeqCst);
        let far = Instant::now() + Duration::from_secs(60);
        assert_eq!(wait_until(far, &signals, None), Wake::Stop);
    }

    #[test]
    fn test_reload_is_taken_once() {
        let signals = Signals::default();
        signals.reload.store(true, Ordering::SeqCst);
        let soon = Instant::now() + Duration::from_millis(10);
        assert_eq!(wait_until(soon, &signals, None), Wake::Reload);
        assert_eq!(wait_until(soon, &signals, None), Wake::Tick);
    }

    // the only test that raises signals; the handlers are process wide
    #[test]
    fn test_installed_handlers_set_flags() {
        let signals = Signals::install().expect("install handlers");
        assert!(!signals.take_reload());

        signal_hook::low_level::raise(SIGUSR1).expect("raise SIGUSR1");
        assert!(signals.take_reload());
        assert!(!signals.take_reload());
        assert!(!signals.stop_requested());

        signal_hook::low_level::raise(SIGTERM).expect("raise SIGTERM");
        assert!(signals.stop_requested());
    }

    #[test]
    fn test_event_filter_matches_file_name() {
        let name = OsStr::new("tickplate.toml");
        let write = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/tickplate.toml"));
        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/tickplate.toml"));
        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/other.toml"));
        let read = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/etc/tickplate.toml"));

        assert!(touches(&write, name));
        assert!(touches(&create, name));
        assert!(!touches(&other, name));
        assert!(!touches(&read, name));
    }

    #[test]
    fn test_watcher_sees_rewrite() {
        let dir = std::env::temp_dir().join(format!("tickplate-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("tickplate.toml");
        std::fs::write(&path, "text = \"a\"\n").expect("write config");

        let watcher = ConfigWatcher::new(&path).expect("watch config");
        std::fs::write(&path, "text = \"b\"\n").expect("rewrite config");

        let signals = Signals::default();
        let wake = wait_until(Instant::now() + Duration::from_secs(5), &signals, Some(&watcher));
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(wake, Wake::Reload);
    }
}
