//! Tickplate CLI
//!
//! Usage:
//!   tickplate [OPTIONS] [CONFIG]
//!
//! Options:
//!   -t, --text <TEXT>    Template text, overriding the config's `text`
//!   -n, --ticks <N>      Stop after N updates
//!       --once           Wait for the first fetches, print one frame and exit
//!   -v, --verbose        More log output (repeatable)
//!       --providers      List the available providers
//!   -h, --help           Print help
//!
//! While running, SIGUSR1 or an edit to CONFIG reloads the template, and SIGINT or SIGTERM
//! stops after the current frame.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;

use tickplate::signals::{self, ConfigWatcher, Signals, Wake};
use tickplate::{logging, ParseError, ProviderRegistry, RuntimeConfig, TemplateRuntime};

#[derive(Parser)]
#[command(name = "tickplate")]
#[command(about = "Render periodically refreshed status text from a template")]
struct Cli {
    /// Config file (TOML). Without it and without --text, the template is read from stdin.
    config: Option<PathBuf>,

    /// Template text, overriding the config's `text`
    #[arg(short, long)]
    text: Option<String>,

    /// Stop after this many updates
    #[arg(short = 'n', long)]
    ticks: Option<u64>,

    /// Wait for the first fetches, print one frame and exit
    #[arg(long)]
    once: bool,

    /// More log output; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// List the available providers
    #[arg(long)]
    providers: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if cli.providers {
        print_providers();
        return;
    }

    if cli.config.is_none() && cli.text.is_none() && io::stdin().is_terminal() {
        print_intro();
        return;
    }

    let mut config = match &cli.config {
        Some(path) => match RuntimeConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };

    let text = match (&cli.text, &cli.config) {
        (Some(text), _) => text.clone(),
        (None, Some(_)) => std::mem::take(&mut config.text),
        (None, None) => {
            let mut buffer = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buffer) {
                eprintln!("Error reading from stdin: {}", e);
                std::process::exit(1);
            }
            buffer
        }
    };
    config.text.clear();

    let mut runtime = match TemplateRuntime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.load(&text) {
        report(&runtime, &text, &e, source_name(&cli));
        std::process::exit(1);
    }

    if cli.once {
        runtime.update();
        if !runtime.wait_idle(Duration::from_secs(30)) {
            tracing::warn!("fetches still running after 30s");
        }
        println!("{}", runtime.render());
        runtime.shutdown();
        return;
    }

    let signals = Signals::install().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "signal handlers not installed");
        Signals::default()
    });

    // only reload the file when it is where the template came from
    let reload_path = cli.config.as_deref().filter(|_| cli.text.is_none());
    let watcher = reload_path.and_then(|path| match ConfigWatcher::new(path) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "not watching config; SIGUSR1 still reloads");
            None
        }
    });

    loop {
        runtime.update();
        println!("{}", runtime.render());

        if cli.ticks.is_some_and(|n| runtime.updates() >= n) {
            break;
        }

        let deadline = Instant::now() + runtime.scheduler().tick_interval();
        match signals::wait_until(deadline, &signals, watcher.as_ref()) {
            Wake::Tick => {}
            Wake::Reload => match reload_path {
                Some(path) => reload(&mut runtime, path),
                None => tracing::info!("template did not come from a config file; nothing to reload"),
            },
            Wake::Stop => {
                tracing::info!("stop requested");
                break;
            }
        }
    }
    runtime.shutdown();
}

/// Swap in the template of the config file. Other settings need a restart.
fn reload(runtime: &mut TemplateRuntime, path: &Path) {
    let config = match RuntimeConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "reload failed; keeping old template");
            return;
        }
    };
    let mut settings = config.clone();
    settings.text.clear();
    if &settings != runtime.config() {
        tracing::warn!("only the template text is reloaded; restart to apply other settings");
    }
    match runtime.load(&config.text) {
        Ok(()) => tracing::info!(path = %path.display(), "template reloaded"),
        Err(e) => report(runtime, &config.text, &e, &path.display().to_string()),
    }
}

fn source_name(cli: &Cli) -> &str {
    match (&cli.text, &cli.config) {
        (Some(_), _) => "<text>",
        (None, Some(path)) => path.to_str().unwrap_or("<config>"),
        (None, None) => "<stdin>",
    }
}

/// Print a labelled report against the macro-expanded text the spans point into
fn report(runtime: &TemplateRuntime, text: &str, error: &ParseError, filename: &str) {
    let expanded = runtime
        .parser()
        .expand(text)
        .unwrap_or_else(|_| text.to_string());
    eprintln!("{}", error.format(&expanded, filename));
}

fn print_providers() {
    let registry = ProviderRegistry::with_builtins();
    for spec in registry.specs() {
        println!("{:<14} {:<11} {}", spec.name, spec.kind.to_string(), spec.usage);
    }
}

fn print_intro() {
    println!(
        r#"Tickplate - periodically refreshed status text

Usage: tickplate [OPTIONS] [CONFIG]

Quick start:
  tickplate -t 'load ${{loadavg 1}} mem ${{memperc}}% ${{membar}}'
  tickplate --once -t '${{exec date +%T}}'
  echo '${{uptime_short}}' | tickplate --once

Options:
  -t, --text <TEXT>    Template text, overriding the config's `text`
  -n, --ticks <N>      Stop after N updates
      --once           Wait for the first fetches, print one frame and exit
  -v, --verbose        More log output (repeatable, or set TICKPLATE_LOG)
      --providers      List the available providers
  -h, --help           Print help"#
    );
}
