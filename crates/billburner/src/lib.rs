//! Billburner: core engine for retrieving recurring bills from provider
//! websites.
//!
//! Each provider is a declarative [`ProviderDefinition`] interpreted by one
//! workflow engine against a fail-soft browser [`Extraction`] facade. The
//! [`Runner`] executes providers strictly in order, renders a status table
//! after each one and writes a time-series point for every retrieved bill.

pub mod cancel;
pub mod driver;
pub mod extraction;
pub mod normalize;
pub mod otp;
pub mod report;
pub mod runner;
pub mod script;
pub mod secrets;
pub mod sink;
pub mod types;
pub mod workflow;

pub use cancel::{spawn_watchdog, CancelReason, CancelToken};
pub use driver::PageDriver;
pub use extraction::{Extraction, InputMethod, Via};
pub use normalize::{days_until, parse_amount, parse_due_date, DateLayout};
pub use otp::{CodeQuery, MailboxClient, MailboxConfig, MailboxFactory, OtpRetriever};
pub use report::{status_rows, StatusView};
pub use runner::{RunOutcome, Runner};
pub use secrets::{Credentials, Secrets};
pub use sink::{BillSink, LogSink, Point};
pub use types::*;
pub use workflow::{Action, ExecutionContext, Field, ProviderDefinition, State};
