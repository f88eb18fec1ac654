//! Workflow states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a workflow in the authenticate-then-extract sequence.
///
/// Variants are declared in execution order; a definition's steps must not
/// move backwards through this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Start,
    Navigate,
    AwaitLoginForm,
    SubmitCredentials,
    AwaitPostLogin,
    AwaitOtpChallenge,
    RetrieveOtp,
    SubmitOtp,
    AwaitResult,
    Extract,
    Normalize,
    Done,
    Failed,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Start => "START",
            State::Navigate => "NAVIGATE",
            State::AwaitLoginForm => "AWAIT_LOGIN_FORM",
            State::SubmitCredentials => "SUBMIT_CREDENTIALS",
            State::AwaitPostLogin => "AWAIT_POST_LOGIN",
            State::AwaitOtpChallenge => "AWAIT_OTP_CHALLENGE",
            State::RetrieveOtp => "RETRIEVE_OTP",
            State::SubmitOtp => "SUBMIT_OTP",
            State::AwaitResult => "AWAIT_RESULT",
            State::Extract => "EXTRACT",
            State::Normalize => "NORMALIZE",
            State::Done => "DONE",
            State::Failed => "FAILED",
        }
    }

    /// Terminal states end a workflow.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }

    /// States a definition may place steps in.
    pub fn is_step_state(self) -> bool {
        !matches!(
            self,
            State::Start | State::Normalize | State::Done | State::Failed
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
