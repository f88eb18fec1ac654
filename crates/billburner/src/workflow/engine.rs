//! Generic interpreter for provider workflows.
//!
//! One engine runs every [`ProviderDefinition`]. Steps execute in order
//! against the shared session; the cancellation token is checked before
//! each step and raced against the step in flight. Bills are committed only
//! when the workflow reaches `DONE`.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::extraction::Extraction;
use crate::normalize::{next_monthly_due, try_parse_amount, try_parse_due_date_at, DateLayout};
use crate::otp::OtpRetriever;
use crate::secrets::Secrets;
use crate::types::{Bill, BillError, BillResult};

use super::definition::{Action, Field, ProviderDefinition, Step, Wait};
use super::State;

/// Everything a workflow runs against.
pub struct ExecutionContext {
    pub session: Extraction,
    pub otp: OtpRetriever,
    pub secrets: Secrets,
    pub cancel: CancelToken,
}

/// Run one workflow to a terminal state.
///
/// `Ok` carries one bill per definition output, all marked retrieved. Any
/// error means `FAILED`: nothing is committed and the caller's bills keep
/// their prior values.
pub async fn execute(
    definition: &ProviderDefinition,
    ctx: &ExecutionContext,
    today: NaiveDate,
) -> BillResult<Vec<Bill>> {
    let mut run = WorkflowRun::new(definition, ctx, today);
    let result = run.drive().await;
    match &result {
        Ok(bills) => {
            run.transition(State::Done);
            info!("{}: retrieved {} bill(s)", definition.name, bills.len());
        }
        Err(e) => {
            let at = run.state;
            run.transition(State::Failed);
            warn!("{}: failed in {at}: {e}", definition.name);
        }
    }
    result
}

enum Pending {
    Raw {
        amount: String,
        due: String,
        layout: DateLayout,
    },
    Ready(Bill),
}

struct WorkflowRun<'a> {
    definition: &'a ProviderDefinition,
    ctx: &'a ExecutionContext,
    today: NaiveDate,
    state: State,
    code: Option<String>,
    /// Last text read per selector, for text-change waits.
    last_text: HashMap<String, String>,
    pending: Vec<Option<Pending>>,
}

impl<'a> WorkflowRun<'a> {
    fn new(definition: &'a ProviderDefinition, ctx: &'a ExecutionContext, today: NaiveDate) -> Self {
        Self {
            definition,
            ctx,
            today,
            state: State::Start,
            code: None,
            last_text: HashMap::new(),
            pending: definition.outputs.iter().map(|_| None).collect(),
        }
    }

    fn transition(&mut self, next: State) {
        if next != self.state {
            debug!("{}: {} -> {next}", self.definition.name, self.state);
            self.state = next;
        }
    }

    async fn drive(&mut self) -> BillResult<Vec<Bill>> {
        let definition = self.definition;
        let ctx = self.ctx;
        definition.validate()?;
        self.check_secrets()?;

        for step in &definition.steps {
            if let Some(reason) = ctx.cancel.reason() {
                return Err(BillError::Cancelled(reason));
            }
            self.transition(step.state);
            tokio::select! {
                biased;
                reason = ctx.cancel.cancelled() => return Err(BillError::Cancelled(reason)),
                result = self.perform(step) => result?,
            }
        }

        self.transition(State::Normalize);
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .zip(&definition.outputs)
            .map(|(slot, output)| match slot {
                Some(Pending::Ready(bill)) => Ok(bill),
                Some(Pending::Raw {
                    amount,
                    due,
                    layout,
                }) => Ok(self.normalize(output, &amount, &due, &layout)),
                None => Err(BillError::InvalidDefinition(format!(
                    "{}: output {output:?} was never filled",
                    definition.name
                ))),
            })
            .collect()
    }

    fn check_secrets(&self) -> BillResult<()> {
        if let Some(prefix) = &self.definition.credentials {
            if self.ctx.secrets.credentials(prefix).is_none() {
                return Err(BillError::MissingCredential(prefix.clone()));
            }
        }
        for profile in self.definition.mailbox_profiles() {
            if self.ctx.secrets.mailbox(profile).is_none() {
                return Err(BillError::MissingCredential(format!("mailbox profile {profile}")));
            }
        }
        Ok(())
    }

    async fn perform(&mut self, step: &Step) -> BillResult<()> {
        let ctx = self.ctx;
        let session = &ctx.session;
        match &step.action {
            Action::Navigate { url } => session.navigate(url).await,
            Action::Await { selector, wait } => match wait {
                Wait::Ready => session.wait_ready(selector).await,
                Wait::Bounded { timeout_ms } => {
                    if !session.element_exists(selector, *timeout_ms).await {
                        return Err(timeout_error(step.state, selector, *timeout_ms));
                    }
                }
            },
            Action::Input {
                selector,
                value,
                method,
                dispatch_events,
            } => {
                let value = self.resolve(value)?;
                session
                    .input_text(selector, &value, *method, *dispatch_events)
                    .await;
            }
            Action::Click { selector, via } => session.click(selector, *via).await,
            Action::RetrieveOtp { profile, query } => {
                let config = ctx.secrets.mailbox(profile).ok_or_else(|| {
                    BillError::MissingCredential(format!("mailbox profile {profile}"))
                })?;
                let code = ctx.otp.fetch_code(config, query).await;
                if code.is_empty() {
                    return Err(BillError::OtpUnavailable(format!(
                        "no code for subject {:?}",
                        query.subject
                    )));
                }
                debug!("{}: received a {}-character code", self.definition.name, code.len());
                self.code = Some(code);
            }
            Action::AwaitTextChange {
                selectors,
                timeout_ms,
                via,
            } => {
                let previous: Vec<(&str, String)> = selectors
                    .iter()
                    .map(|sel| {
                        let text = self.last_text.get(sel).cloned().unwrap_or_default();
                        (sel.as_str(), text)
                    })
                    .collect();
                let previous = &previous;
                let changed = session
                    .poll_until(*timeout_ms, || async move {
                        for (selector, before) in previous {
                            let text = session.get_text(selector, *via).await;
                            if !text.is_empty() && text != *before {
                                return true;
                            }
                        }
                        false
                    })
                    .await;
                if !changed {
                    info!(
                        "{}: {} unchanged after {timeout_ms}ms, reading as is",
                        self.definition.name,
                        selectors.join(", ")
                    );
                }
            }
            Action::Extract {
                output,
                amount_selector,
                due_selector,
                layout,
                via,
            } => {
                let amount = session.get_text(amount_selector, *via).await;
                let due = session.get_text(due_selector, *via).await;
                debug!(
                    "{}: read amount {amount:?} and due date {due:?}",
                    self.definition.name
                );
                self.last_text.insert(amount_selector.clone(), amount.clone());
                self.last_text.insert(due_selector.clone(), due.clone());
                self.fill(
                    *output,
                    Pending::Raw {
                        amount,
                        due,
                        layout: layout.clone(),
                    },
                )?;
            }
            Action::Fixed {
                output,
                amount,
                due_day,
            } => {
                let due = next_monthly_due(*due_day, self.today);
                self.fill(*output, Pending::Ready(Bill::retrieved(*amount, due)))?;
            }
        }
        Ok(())
    }

    fn fill(&mut self, output: usize, value: Pending) -> BillResult<()> {
        match self.pending.get_mut(output) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(BillError::InvalidDefinition(format!(
                "{}: unknown output {output}",
                self.definition.name
            ))),
        }
    }

    fn resolve(&self, field: &Field) -> BillResult<String> {
        let credentials = || {
            self.definition
                .credentials
                .as_deref()
                .and_then(|prefix| self.ctx.secrets.credentials(prefix))
                .ok_or_else(|| {
                    BillError::MissingCredential(
                        self.definition.credentials.clone().unwrap_or_default(),
                    )
                })
        };
        match field {
            Field::Literal(value) => Ok(value.clone()),
            Field::Username => Ok(credentials()?.username.clone()),
            Field::Password => Ok(credentials()?.password.clone()),
            Field::Otp => self
                .code
                .clone()
                .ok_or_else(|| BillError::OtpUnavailable("no code retrieved".to_string())),
        }
    }

    /// Parse failures keep the zero amount or the unknown date.
    fn normalize(&self, output: &str, amount: &str, due: &str, layout: &DateLayout) -> Bill {
        let amount_due = try_parse_amount(amount).unwrap_or_else(|e| {
            warn!("{output}: {e}");
            0.0
        });
        let due_date = match try_parse_due_date_at(due, layout, self.today) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!("{output}: {e}");
                None
            }
        };
        Bill::retrieved(amount_due, due_date)
    }
}

fn timeout_error(state: State, selector: &str, timeout_ms: u64) -> BillError {
    match state {
        State::AwaitResult | State::Extract => BillError::ResultTimeout {
            selector: selector.to_string(),
            timeout_ms,
        },
        _ => BillError::AuthStepTimeout {
            state,
            selector: selector.to_string(),
            timeout_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_by_state() {
        assert!(matches!(
            timeout_error(State::AwaitLoginForm, "#user", 15_000),
            BillError::AuthStepTimeout {
                state: State::AwaitLoginForm,
                ..
            }
        ));
        assert!(matches!(
            timeout_error(State::AwaitOtpChallenge, "#code", 15_000),
            BillError::AuthStepTimeout { .. }
        ));
        assert!(matches!(
            timeout_error(State::AwaitResult, ".amount", 15_000),
            BillError::ResultTimeout { .. }
        ));
    }
}
