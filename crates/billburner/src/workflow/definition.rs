//! Declarative provider workflows.
//!
//! A [`ProviderDefinition`] is an ordered list of [`Step`]s, each tagged with
//! the [`State`] it belongs to. Provider quirks (input method, wait strategy,
//! extra navigation clicks, paired outputs) are step variants rather than
//! code paths.

use std::collections::HashSet;

use crate::extraction::{InputMethod, Via};
use crate::normalize::DateLayout;
use crate::otp::CodeQuery;
use crate::types::{BillError, BillResult};

use super::State;

/// Where an input value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Literal(String),
    Username,
    Password,
    /// The code from the most recent `RetrieveOtp` step.
    Otp,
}

/// How an await step decides the page is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Bounded poll; fails the workflow once the bound is exceeded.
    Bounded { timeout_ms: u64 },
    /// Unbounded; only cancellation ends the wait.
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate {
        url: String,
    },
    Await {
        selector: String,
        wait: Wait,
    },
    Input {
        selector: String,
        value: Field,
        method: InputMethod,
        dispatch_events: bool,
    },
    Click {
        selector: String,
        via: Via,
    },
    RetrieveOtp {
        /// Mailbox profile name resolved through the run's secrets.
        profile: String,
        query: CodeQuery,
    },
    /// Bounded poll until the text of any of `selectors` differs from the
    /// value last read from it by an `Extract` step. Running out of time is
    /// not a failure: the texts may legitimately be unchanged.
    AwaitTextChange {
        selectors: Vec<String>,
        timeout_ms: u64,
        via: Via,
    },
    Extract {
        output: usize,
        amount_selector: String,
        due_selector: String,
        layout: DateLayout,
        via: Via,
    },
    /// A bill with a fixed amount due on a fixed day of every month.
    Fixed {
        output: usize,
        amount: f64,
        due_day: u32,
    },
}

impl Action {
    pub fn navigate(url: impl Into<String>) -> Self {
        Action::Navigate { url: url.into() }
    }

    pub fn await_element(selector: impl Into<String>, timeout_ms: u64) -> Self {
        Action::Await {
            selector: selector.into(),
            wait: Wait::Bounded { timeout_ms },
        }
    }

    pub fn await_ready(selector: impl Into<String>) -> Self {
        Action::Await {
            selector: selector.into(),
            wait: Wait::Ready,
        }
    }

    /// Keystroke input without synthetic events.
    pub fn type_into(selector: impl Into<String>, value: Field) -> Self {
        Action::Input {
            selector: selector.into(),
            value,
            method: InputMethod::Keystrokes,
            dispatch_events: false,
        }
    }

    /// Keystroke input followed by synthetic input/change events.
    pub fn type_with_events(selector: impl Into<String>, value: Field) -> Self {
        Action::Input {
            selector: selector.into(),
            value,
            method: InputMethod::Keystrokes,
            dispatch_events: true,
        }
    }

    /// Direct value assignment followed by synthetic input/change events.
    pub fn assign(selector: impl Into<String>, value: Field) -> Self {
        Action::Input {
            selector: selector.into(),
            value,
            method: InputMethod::Assign,
            dispatch_events: true,
        }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        Action::Click {
            selector: selector.into(),
            via: Via::Native,
        }
    }

    pub fn click_script(selector: impl Into<String>) -> Self {
        Action::Click {
            selector: selector.into(),
            via: Via::Script,
        }
    }

    pub fn retrieve_otp(
        profile: impl Into<String>,
        subject: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Action::RetrieveOtp {
            profile: profile.into(),
            query: CodeQuery {
                subject: subject.into(),
                start: start.into(),
                end: end.into(),
            },
        }
    }

    pub fn await_text_change<I, S>(selectors: I, timeout_ms: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::AwaitTextChange {
            selectors: selectors.into_iter().map(Into::into).collect(),
            timeout_ms,
            via: Via::Native,
        }
    }

    pub fn extract(
        output: usize,
        amount_selector: impl Into<String>,
        due_selector: impl Into<String>,
        layout: DateLayout,
    ) -> Self {
        Action::Extract {
            output,
            amount_selector: amount_selector.into(),
            due_selector: due_selector.into(),
            layout,
            via: Via::Native,
        }
    }

    pub fn fixed(output: usize, amount: f64, due_day: u32) -> Self {
        Action::Fixed {
            output,
            amount,
            due_day,
        }
    }

    fn output(&self) -> Option<usize> {
        match self {
            Action::Extract { output, .. } | Action::Fixed { output, .. } => Some(*output),
            _ => None,
        }
    }

    fn needs_browser(&self) -> bool {
        !matches!(self, Action::Fixed { .. } | Action::RetrieveOtp { .. })
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: State,
    pub action: Action,
}

/// The full workflow for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefinition {
    pub name: String,
    /// Ledger entries this workflow fills, in output-index order.
    pub outputs: Vec<String>,
    /// Credential prefix (e.g. `AMEREN`), if the workflow signs in.
    pub credentials: Option<String>,
    pub steps: Vec<Step>,
}

impl ProviderDefinition {
    pub fn builder(name: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder {
            name: name.into(),
            outputs: Vec::new(),
            credentials: None,
            state: State::Navigate,
            steps: Vec::new(),
        }
    }

    /// Mailbox profiles referenced by `RetrieveOtp` steps.
    pub fn mailbox_profiles(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match &step.action {
            Action::RetrieveOtp { profile, .. } => Some(profile.as_str()),
            _ => None,
        })
    }

    /// Whether any step drives the browser.
    pub fn uses_browser(&self) -> bool {
        self.steps.iter().any(|step| step.action.needs_browser())
    }

    /// Check structural invariants.
    ///
    /// Every output is filled by exactly one `Extract` or `Fixed` step,
    /// steps never move backwards through the state order, credential and
    /// code inputs have a source, and text-change waits follow a read of
    /// the same selector.
    pub fn validate(&self) -> BillResult<()> {
        let invalid = |msg: String| Err(BillError::InvalidDefinition(format!("{}: {msg}", self.name)));

        if self.outputs.is_empty() {
            return invalid("no outputs".to_string());
        }
        if self.steps.is_empty() {
            return invalid("no steps".to_string());
        }

        let mut filled = vec![0usize; self.outputs.len()];
        let mut previous = State::Start;
        let mut has_otp = false;
        let mut read: HashSet<&str> = HashSet::new();

        for (index, step) in self.steps.iter().enumerate() {
            if !step.state.is_step_state() {
                return invalid(format!("step {index} is in state {}", step.state));
            }
            if step.state < previous {
                return invalid(format!(
                    "step {index} moves back from {previous} to {}",
                    step.state
                ));
            }
            previous = step.state;

            if let Some(output) = step.action.output() {
                match filled.get_mut(output) {
                    Some(count) => *count += 1,
                    None => return invalid(format!("step {index} fills unknown output {output}")),
                }
            }

            match &step.action {
                Action::Input { value, .. } => match value {
                    Field::Username | Field::Password if self.credentials.is_none() => {
                        return invalid(format!("step {index} needs credentials"));
                    }
                    Field::Otp if !has_otp => {
                        return invalid(format!("step {index} submits a code before retrieving one"));
                    }
                    _ => {}
                },
                Action::RetrieveOtp { .. } => has_otp = true,
                Action::Extract {
                    amount_selector,
                    due_selector,
                    ..
                } => {
                    read.insert(amount_selector.as_str());
                    read.insert(due_selector.as_str());
                }
                Action::AwaitTextChange { selectors, .. } => {
                    if selectors.is_empty() {
                        return invalid(format!("step {index} waits on no selector"));
                    }
                    if let Some(selector) = selectors.iter().find(|s| !read.contains(s.as_str())) {
                        return invalid(format!("step {index} waits on `{selector}` before reading it"));
                    }
                }
                _ => {}
            }
        }

        if let Some(output) = filled.iter().position(|&count| count != 1) {
            return invalid(format!(
                "output {:?} is filled {} times",
                self.outputs[output], filled[output]
            ));
        }
        Ok(())
    }
}

/// Builds a [`ProviderDefinition`], tagging each step with the current state.
pub struct DefinitionBuilder {
    name: String,
    outputs: Vec<String>,
    credentials: Option<String>,
    state: State,
    steps: Vec<Step>,
}

impl DefinitionBuilder {
    /// Ledger entries filled by this workflow. Defaults to the provider name.
    pub fn outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn credentials(mut self, prefix: impl Into<String>) -> Self {
        self.credentials = Some(prefix.into());
        self
    }

    /// Subsequent steps belong to `state`.
    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn step(mut self, action: Action) -> Self {
        self.steps.push(Step {
            state: self.state,
            action,
        });
        self
    }

    pub fn build(self) -> BillResult<ProviderDefinition> {
        let outputs = if self.outputs.is_empty() {
            vec![self.name.clone()]
        } else {
            self.outputs
        };
        let definition = ProviderDefinition {
            name: self.name,
            outputs,
            credentials: self.credentials,
            steps: self.steps,
        };
        definition.validate()?;
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(builder: DefinitionBuilder) -> DefinitionBuilder {
        builder
            .credentials("SPIRE")
            .state(State::Navigate)
            .step(Action::navigate("https://example.com/login"))
            .state(State::AwaitLoginForm)
            .step(Action::await_element("#user", 15_000))
            .state(State::SubmitCredentials)
            .step(Action::type_into("#user", Field::Username))
            .step(Action::type_into("#pass", Field::Password))
            .step(Action::click("#submit"))
    }

    #[test]
    fn test_builder_tags_states() {
        let def = login(ProviderDefinition::builder("Gas"))
            .state(State::AwaitResult)
            .step(Action::await_element(".amount", 15_000))
            .state(State::Extract)
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .build()
            .unwrap();
        assert_eq!(def.outputs, vec!["Gas".to_string()]);
        assert_eq!(def.steps[0].state, State::Navigate);
        assert_eq!(def.steps[2].state, State::SubmitCredentials);
        assert_eq!(def.steps.last().unwrap().state, State::Extract);
        assert!(def.uses_browser());
    }

    #[test]
    fn test_output_must_be_filled_once() {
        let err = login(ProviderDefinition::builder("Pair"))
            .outputs(["A", "B"])
            .state(State::Extract)
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("\"B\" is filled 0 times"));
    }

    #[test]
    fn test_states_cannot_move_backwards() {
        let err = login(ProviderDefinition::builder("Gas"))
            .state(State::Navigate)
            .step(Action::navigate("https://example.com/again"))
            .state(State::Extract)
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .build()
            .unwrap_err();
        assert!(matches!(err, BillError::InvalidDefinition(_)));
    }

    #[test]
    fn test_otp_input_requires_retrieval() {
        let err = login(ProviderDefinition::builder("Mortgage"))
            .state(State::SubmitOtp)
            .step(Action::assign("#code", Field::Otp))
            .state(State::Extract)
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%m/%d/%Y")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("before retrieving"));
    }

    #[test]
    fn test_text_change_requires_prior_read() {
        let err = login(ProviderDefinition::builder("Pair"))
            .outputs(["A", "B"])
            .state(State::Extract)
            .step(Action::await_text_change([".amount"], 5_000))
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .step(Action::extract(1, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("before reading it"));
    }

    #[test]
    fn test_text_change_accepts_amount_and_due_selectors() {
        let def = login(ProviderDefinition::builder("Pair"))
            .outputs(["A", "B"])
            .state(State::Extract)
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .step(Action::await_text_change([".amount", ".due"], 5_000))
            .step(Action::extract(1, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .build();
        assert!(def.is_ok());

        let err = login(ProviderDefinition::builder("Pair"))
            .outputs(["A", "B"])
            .state(State::Extract)
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .step(Action::await_text_change(Vec::<String>::new(), 5_000))
            .step(Action::extract(1, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no selector"));
    }

    #[test]
    fn test_fixed_definition() {
        let def = ProviderDefinition::builder("Car")
            .state(State::Extract)
            .step(Action::fixed(0, 422.94, 17))
            .build()
            .unwrap();
        assert!(!def.uses_browser());
        assert!(def.credentials.is_none());
        assert_eq!(def.mailbox_profiles().count(), 0);
    }

    #[test]
    fn test_credential_input_requires_prefix() {
        let err = ProviderDefinition::builder("Gas")
            .state(State::SubmitCredentials)
            .step(Action::type_into("#user", Field::Username))
            .state(State::Extract)
            .step(Action::extract(0, ".amount", ".due", DateLayout::new("%b %d, %Y")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("needs credentials"));
    }
}
