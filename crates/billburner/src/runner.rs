//! Sequential provider runner.
//!
//! Runs every workflow in ledger order against one shared session. After
//! each workflow the status view is re-rendered and a sink point is written
//! for every output that was retrieved. A cancelled token stops the run at
//! the next step boundary; the session is closed on every exit path.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::{info, warn};

use crate::cancel::{CancelReason, CancelToken};
use crate::report::StatusView;
use crate::sink::{BillSink, Point};
use crate::types::{BillError, Ledger};
use crate::workflow::{execute, ExecutionContext, ProviderDefinition};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every workflow reached a terminal state.
    Completed,
    Cancelled(CancelReason),
}

impl RunOutcome {
    /// Process exit code: 0, or the cancel reason's code.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Cancelled(reason) => reason.exit_code(),
        }
    }
}

pub struct Runner {
    ctx: ExecutionContext,
    sink: Arc<dyn BillSink>,
    definitions: Vec<ProviderDefinition>,
    screenshot_dir: Option<PathBuf>,
}

impl Runner {
    pub fn new(
        ctx: ExecutionContext,
        sink: Arc<dyn BillSink>,
        definitions: Vec<ProviderDefinition>,
    ) -> Self {
        Self {
            ctx,
            sink,
            definitions,
            screenshot_dir: None,
        }
    }

    /// Save a screenshot into `dir` whenever a browser workflow fails.
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.ctx.cancel.clone()
    }

    /// A zero-valued ledger with one entry per workflow output, in order.
    pub fn ledger(&self) -> Ledger {
        Ledger::new(
            self.definitions
                .iter()
                .flat_map(|d| d.outputs.iter().cloned()),
        )
    }

    /// Run every workflow in order, then close the session.
    pub async fn run(&self, ledger: &mut Ledger, view: &mut dyn StatusView) -> RunOutcome {
        let outcome = self.run_all(ledger, view).await;
        self.ctx.session.close().await;
        if let RunOutcome::Cancelled(reason) = outcome {
            warn!("run cancelled by {reason}");
        }
        outcome
    }

    async fn run_all(&self, ledger: &mut Ledger, view: &mut dyn StatusView) -> RunOutcome {
        view.render(ledger, Utc::now());

        for definition in &self.definitions {
            if let Some(reason) = self.ctx.cancel.reason() {
                return RunOutcome::Cancelled(reason);
            }
            info!("running {}", definition.name);

            match execute(definition, &self.ctx, Local::now().date_naive()).await {
                Ok(bills) => {
                    for (name, bill) in definition.outputs.iter().zip(bills) {
                        ledger.record(name, bill);
                    }
                }
                Err(BillError::Cancelled(reason)) => return RunOutcome::Cancelled(reason),
                Err(_) if definition.uses_browser() => self.save_screenshot(&definition.name).await,
                Err(_) => {}
            }

            let now = Utc::now();
            view.render(ledger, now);
            self.write_points(definition, ledger, now).await;
        }
        RunOutcome::Completed
    }

    async fn write_points(&self, definition: &ProviderDefinition, ledger: &Ledger, now: DateTime<Utc>) {
        for name in &definition.outputs {
            let Some(bill) = ledger.get(name) else {
                continue;
            };
            if !bill.retrieved {
                continue;
            }
            let point = Point::for_bill(name, bill, now);
            if let Err(e) = self.sink.write_point(&point).await {
                warn!("failed to write point for {name}: {e:#}");
            }
        }
    }

    async fn save_screenshot(&self, provider: &str) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let png = self.ctx.session.capture_screenshot().await;
        if png.is_empty() {
            return;
        }
        let file = dir.join(format!(
            "{}-{}.png",
            provider.to_lowercase().replace(' ', "-"),
            Utc::now().format("%Y%m%dT%H%M%S")
        ));
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("cannot create screenshot directory {}: {e}", dir.display());
            return;
        }
        match tokio::fs::write(&file, &png).await {
            Ok(()) => info!("saved failure screenshot to {}", file.display()),
            Err(e) => warn!("cannot write screenshot {}: {e}", file.display()),
        }
    }
}
