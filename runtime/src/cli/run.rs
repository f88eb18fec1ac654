//! The default command: run every provider and report the ledger.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use billburner::{
    spawn_watchdog, BillSink, CancelReason, CancelToken, ExecutionContext, Extraction, Ledger,
    LogSink, MailboxClient, OtpRetriever, PageDriver, RunOutcome, Runner, StatusView,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser::chromium::{ChromiumDriver, LaunchOptions};
use crate::browser::{default_profile_dir, prepare_profile_dir, NoopDriver};
use crate::cli::output::{self, Styled};
use crate::cli::view::{SilentView, TerminalView};
use crate::config::Config;
use crate::influx::InfluxSink;
use crate::mail::ImapMailbox;
use crate::providers;

/// Options for one run, taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub headless: bool,
    pub keep_profile: bool,
    pub watchdog_secs: u64,
    pub dry_run: bool,
    pub only: Vec<String>,
    pub screenshot_dir: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    outcome: &'a str,
    exit_code: i32,
    bills: &'a [billburner::ProviderEntry],
    total_due: f64,
    elapsed_secs: f64,
}

/// The interrupt listener and the watchdog. Both stop when this is dropped,
/// whichever way `run` returns.
struct KillSwitch {
    signals: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl KillSwitch {
    fn arm(cancel: &CancelToken, after: Duration) -> Self {
        Self {
            signals: tokio::spawn(cancel_on_signal(cancel.clone())),
            watchdog: spawn_watchdog(cancel.clone(), after),
        }
    }
}

impl Drop for KillSwitch {
    fn drop(&mut self) {
        self.signals.abort();
        self.watchdog.abort();
    }
}

/// Await `fut` unless `cancel` fires first.
async fn unless_cancelled<F: Future>(
    cancel: &CancelToken,
    fut: F,
) -> std::result::Result<F::Output, CancelReason> {
    tokio::select! {
        biased;
        reason = cancel.cancelled() => Err(reason),
        out = fut => Ok(out),
    }
}

/// Run the configured providers. Returns the process exit code.
pub async fn run(args: RunArgs) -> Result<i32> {
    let s = Styled::new();
    let started = Instant::now();

    let cancel = CancelToken::new();
    let _kill_switch = KillSwitch::arm(&cancel, Duration::from_secs(args.watchdog_secs));

    let config = Config::from_env().context("invalid configuration")?;
    let definitions = providers::select(providers::catalog(config.car)?, &args.only);
    if definitions.is_empty() {
        bail!("no provider matches {}", args.only.join(", "));
    }

    let driver: Box<dyn PageDriver> = if definitions.iter().any(|d| d.uses_browser()) {
        let profile_dir = match &args.profile_dir {
            Some(dir) => dir.clone(),
            None => default_profile_dir()?,
        };
        prepare_profile_dir(&profile_dir, args.keep_profile)?;
        let options = LaunchOptions {
            headless: args.headless,
            profile_dir,
            executable: None,
        };
        match unless_cancelled(&cancel, ChromiumDriver::launch(&options)).await {
            Ok(driver) => Box::new(driver?),
            Err(reason) => {
                warn!("stopped by {reason} while launching the browser");
                if output::is_json() {
                    let ledger = Ledger::new(definitions.iter().flat_map(|d| d.outputs.clone()));
                    print_summary(
                        &ledger,
                        RunOutcome::Cancelled(reason),
                        started.elapsed().as_secs_f64(),
                    );
                } else {
                    eprintln!(
                        "  {} Stopped by {reason} after {:.1}s",
                        s.fail_sym(),
                        started.elapsed().as_secs_f64()
                    );
                }
                return Ok(reason.exit_code());
            }
        }
    } else {
        Box::new(NoopDriver)
    };

    let sink: Arc<dyn BillSink> = match (&config.influx, args.dry_run) {
        (Some(influx), false) => Arc::new(InfluxSink::new(influx.clone())?),
        (Some(_), true) => {
            info!("dry run: points are logged, not written");
            Arc::new(LogSink)
        }
        (None, _) => {
            info!("INFLUXDB_URL not set: points are logged, not written");
            Arc::new(LogSink)
        }
    };

    let factory = || Box::new(ImapMailbox::new()) as Box<dyn MailboxClient>;
    let ctx = ExecutionContext {
        session: Extraction::new(driver),
        otp: OtpRetriever::new(Arc::new(factory)),
        secrets: config.secrets,
        cancel,
    };

    let mut runner = Runner::new(ctx, sink, definitions);
    if let Some(dir) = args.screenshot_dir {
        runner = runner.with_screenshot_dir(dir);
    }

    let json = output::is_json();
    let mut ledger = runner.ledger();
    let mut terminal = TerminalView::new();
    let mut silent = SilentView;
    let view: &mut dyn StatusView = if json { &mut silent } else { &mut terminal };
    let outcome = runner.run(&mut ledger, view).await;

    let elapsed = started.elapsed();
    if json {
        print_summary(&ledger, outcome, elapsed.as_secs_f64());
    } else {
        match outcome {
            RunOutcome::Completed => eprintln!(
                "  {} Done in {:.1}s",
                s.ok_sym(),
                elapsed.as_secs_f64()
            ),
            RunOutcome::Cancelled(reason) => eprintln!(
                "  {} Stopped by {reason} after {:.1}s",
                s.fail_sym(),
                elapsed.as_secs_f64()
            ),
        }
    }
    Ok(outcome.exit_code())
}

fn print_summary(ledger: &Ledger, outcome: RunOutcome, elapsed_secs: f64) {
    let summary = RunSummary {
        outcome: match outcome {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled(CancelReason::Interrupt) => "interrupted",
            RunOutcome::Cancelled(CancelReason::Watchdog) => "watchdog",
        },
        exit_code: outcome.exit_code(),
        bills: ledger.entries(),
        total_due: ledger.total_due(),
        elapsed_secs,
    };
    match serde_json::to_value(&summary) {
        Ok(value) => output::print_json(&value),
        Err(e) => warn!("failed to encode summary: {e}"),
    }
}

/// Cancel with [`CancelReason::Interrupt`] on Ctrl-C or SIGTERM.
async fn cancel_on_signal(token: CancelToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("interrupt received");
    token.cancel(CancelReason::Interrupt);
}
