//! End-to-end runs of the engine and runner against in-memory fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use billburner::workflow::execute;
use billburner::{
    spawn_watchdog, Action, Bill, BillError, CancelReason, Credentials, DateLayout, Field,
    MailboxConfig, ProviderDefinition, RunOutcome, Runner, Secrets, State,
};
use chrono::{Datelike, Local, TimeZone, Utc};
use common::{context, FakeMailbox, FakePage, RecordingSink, RecordingView};

const POWER_URL: &str = "https://power.example.com/login";
const GAS_URL: &str = "https://gas.example.com/sign-in";

fn secrets() -> Secrets {
    let mut secrets = Secrets::new();
    secrets.insert_credentials("AMEREN", Credentials::new("alice", "pw-power"));
    secrets.insert_credentials("SPIRE", Credentials::new("alice", "pw-gas"));
    secrets.insert_credentials("PENNYMAC", Credentials::new("alice", "pw-mortgage"));
    secrets.insert_credentials("ATT", Credentials::new("alice", "pw-att"));
    secrets.insert_mailbox(
        "IMAP",
        MailboxConfig {
            host: "mail.example.com".to_string(),
            secure: true,
            username: "bills@example.com".to_string(),
            password: "pw-mail".to_string(),
        },
    );
    secrets
}

fn power() -> ProviderDefinition {
    ProviderDefinition::builder("Power")
        .credentials("AMEREN")
        .state(State::Navigate)
        .step(Action::navigate(POWER_URL))
        .state(State::AwaitLoginForm)
        .step(Action::await_element("#txtSignInEmail", 2_000))
        .state(State::SubmitCredentials)
        .step(Action::type_into("#txtSignInEmail", Field::Username))
        .step(Action::type_into("#txtPassword", Field::Password))
        .step(Action::click("#btnLogin"))
        .state(State::AwaitResult)
        .step(Action::await_element(".amount", 2_000))
        .state(State::Extract)
        .step(Action::extract(
            0,
            ".amount",
            ".alert",
            DateLayout::new("%m/%d/%y").after("by").first_word(),
        ))
        .build()
        .unwrap()
}

fn gas() -> ProviderDefinition {
    ProviderDefinition::builder("Gas")
        .credentials("SPIRE")
        .state(State::Navigate)
        .step(Action::navigate(GAS_URL))
        .state(State::AwaitLoginForm)
        .step(Action::await_element("#loginEmail", 2_000))
        .state(State::SubmitCredentials)
        .step(Action::type_into("#loginEmail", Field::Username))
        .step(Action::type_into("#loginPassword", Field::Password))
        .step(Action::click("#signin"))
        .state(State::AwaitResult)
        .step(Action::await_element(".amount-due", 2_000))
        .state(State::Extract)
        .step(Action::extract(
            0,
            ".amount-due",
            ".due-date",
            DateLayout::new("%b %d, %Y"),
        ))
        .build()
        .unwrap()
}

fn gas_page() -> Arc<FakePage> {
    Arc::new(FakePage::default())
        .with("#loginEmail", "")
        .with(".amount-due", "Amount due: $40.25")
        .with(".due-date", "May 08, 2024")
}

fn mortgage() -> ProviderDefinition {
    ProviderDefinition::builder("Mortgage")
        .credentials("PENNYMAC")
        .state(State::Navigate)
        .step(Action::navigate("https://mortgage.example.com/login"))
        .state(State::AwaitLoginForm)
        .step(Action::await_element("#username", 2_000))
        .state(State::SubmitCredentials)
        .step(Action::type_into("#username", Field::Username))
        .step(Action::type_into("#password", Field::Password))
        .step(Action::click("#submit-button"))
        .state(State::AwaitOtpChallenge)
        .step(Action::await_element("#tfaEmail", 2_000))
        .state(State::RetrieveOtp)
        .step(Action::retrieve_otp("IMAP", "Email Confirmation", "PM-", "\n"))
        .state(State::SubmitOtp)
        .step(Action::assign("#tfaEmail", Field::Otp))
        .step(Action::click("#verify"))
        .state(State::AwaitResult)
        .step(Action::await_element(".loan-amount", 2_000))
        .state(State::Extract)
        .step(Action::extract(
            0,
            ".loan-amount",
            ".loan-due",
            DateLayout::new("%m/%d/%Y"),
        ))
        .build()
        .unwrap()
}

fn mortgage_page() -> Arc<FakePage> {
    Arc::new(FakePage::default())
        .with("#username", "")
        .with("#tfaEmail", "")
        .with(".loan-amount", "$1,250.00")
        .with(".loan-due", "06/01/2024")
}

fn paired() -> ProviderDefinition {
    ProviderDefinition::builder("Wireless+Internet")
        .outputs(["Wireless", "Internet"])
        .credentials("ATT")
        .state(State::Navigate)
        .step(Action::navigate("https://telco.example.com/signin"))
        .state(State::AwaitResult)
        .step(Action::await_element(".w-100", 2_000))
        .state(State::Extract)
        .step(Action::extract(
            0,
            ".w-100",
            ".due",
            DateLayout::new("Due %b %d, %Y"),
        ))
        .step(Action::click("#internet-tab"))
        .step(Action::await_element("#internet-panel", 2_000))
        .step(Action::await_text_change([".w-100", ".due"], 2_000))
        .step(Action::extract(
            1,
            ".w-100",
            ".due",
            DateLayout::new("Due %b %d, %Y"),
        ))
        .build()
        .unwrap()
}

fn paired_page() -> Arc<FakePage> {
    Arc::new(FakePage::default())
        .with(".w-100", "$85.10")
        .with(".due", "Due May 08, 2024")
}

fn utc(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_failed_login_form_leaves_default_bill_and_run_continues() {
    // The power login form never appears; the gas page is complete.
    let page = gas_page();
    let sink = Arc::new(RecordingSink::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), secrets()),
        sink.clone(),
        vec![power(), gas()],
    );
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    let outcome = runner.run(&mut ledger, &mut view).await;

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(ledger.get("Power"), Some(&Bill::default()));

    let gas = ledger.get("Gas").unwrap();
    assert!(gas.retrieved);
    assert_eq!(gas.amount_due, 40.25);
    assert_eq!(gas.due_date, Some(utc(2024, 5, 9)));

    assert_eq!(sink.providers(), vec!["Gas".to_string()]);
    assert_eq!(view.renders, 3);
    assert_eq!(view.last_total, 40.25);
    assert_eq!(page.visited(), vec![POWER_URL.to_string(), GAS_URL.to_string()]);
    assert!(*page.closed.lock().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_login_form_timeout_reports_state_and_selector() {
    let page = Arc::new(FakePage::default());
    let ctx = context(&page, FakeMailbox::default(), secrets());

    let err = execute(&power(), &ctx, Local::now().date_naive())
        .await
        .unwrap_err();
    match err {
        BillError::AuthStepTimeout {
            state,
            selector,
            timeout_ms,
        } => {
            assert_eq!(state, State::AwaitLoginForm);
            assert_eq!(selector, "#txtSignInEmail");
            assert_eq!(timeout_ms, 2_000);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Credentials are never typed into a form that did not appear.
    assert!(page.typed.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_result_is_result_timeout() {
    let page = Arc::new(FakePage::default()).with("#loginEmail", "");
    let ctx = context(&page, FakeMailbox::default(), secrets());

    let err = execute(&gas(), &ctx, Local::now().date_naive())
        .await
        .unwrap_err();
    assert!(matches!(err, BillError::ResultTimeout { .. }));
    assert_eq!(
        page.typed.lock().unwrap().as_slice(),
        &[
            ("#loginEmail".to_string(), "alice".to_string()),
            ("#loginPassword".to_string(), "pw-gas".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_text_keeps_zero_and_unknown_date() {
    let page = Arc::new(FakePage::default())
        .with("#loginEmail", "")
        .with(".amount-due", "Balance unavailable")
        .with(".due-date", "soon");
    let ctx = context(&page, FakeMailbox::default(), secrets());

    let bills = execute(&gas(), &ctx, Local::now().date_naive())
        .await
        .unwrap();
    assert_eq!(bills, vec![Bill::retrieved(0.0, None)]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_fail_before_navigation() {
    let page = gas_page();
    let sink = Arc::new(RecordingSink::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), Secrets::new()),
        sink.clone(),
        vec![gas()],
    );
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    assert_eq!(runner.run(&mut ledger, &mut view).await, RunOutcome::Completed);
    assert!(!ledger.get("Gas").unwrap().retrieved);
    assert!(page.visited().is_empty());
    assert!(sink.providers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_otp_code_is_submitted() {
    let page = mortgage_page();
    let mailbox = FakeMailbox {
        messages: vec![
            (
                2,
                "Pennymac - Email Confirmation".to_string(),
                "PM-000000\n".to_string(),
            ),
            (
                7,
                "Pennymac - Email Confirmation".to_string(),
                "Your code:\r\n...PM-482910\n...".to_string(),
            ),
        ],
    };
    let ctx = context(&page, mailbox, secrets());

    let bills = execute(&mortgage(), &ctx, Local::now().date_naive())
        .await
        .unwrap();
    assert_eq!(bills[0].amount_due, 1250.0);
    assert_eq!(bills[0].due_date, Some(utc(2024, 6, 2)));

    let scripts = page.scripts.lock().unwrap();
    assert!(scripts
        .iter()
        .any(|s| s.contains("#tfaEmail") && s.contains("'482910'")));
}

#[tokio::test(start_paused = true)]
async fn test_empty_otp_fails_without_submitting() {
    let page = mortgage_page();
    let ctx = context(&page, FakeMailbox::default(), secrets());

    let err = execute(&mortgage(), &ctx, Local::now().date_naive())
        .await
        .unwrap_err();
    assert!(matches!(err, BillError::OtpUnavailable(_)));
    assert!(page
        .scripts
        .lock()
        .unwrap()
        .iter()
        .all(|s| !s.contains("#tfaEmail")));
}

#[tokio::test(start_paused = true)]
async fn test_paired_outputs_from_one_session() {
    let page = paired_page()
        .on_click("#internet-tab", "#internet-panel", "")
        .on_click("#internet-tab", ".w-100", "$60.00")
        .on_click("#internet-tab", ".due", "Due May 20, 2024");
    let sink = Arc::new(RecordingSink::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), secrets()),
        sink.clone(),
        vec![paired()],
    );
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    runner.run(&mut ledger, &mut view).await;

    let names: Vec<&str> = ledger.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Wireless", "Internet"]);
    assert_eq!(
        ledger.get("Wireless"),
        Some(&Bill::retrieved(85.10, Some(utc(2024, 5, 9))))
    );
    assert_eq!(
        ledger.get("Internet"),
        Some(&Bill::retrieved(60.00, Some(utc(2024, 5, 21))))
    );
    assert_eq!(
        sink.providers(),
        vec!["Wireless".to_string(), "Internet".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_paired_outputs_with_equal_amounts() {
    // Both accounts show $0.00; only the due date moves with the tab.
    let page = Arc::new(FakePage::default())
        .with(".w-100", "$0.00")
        .with(".due", "Due May 08, 2024")
        .on_click("#internet-tab", "#internet-panel", "")
        .on_click("#internet-tab", ".due", "Due May 20, 2024");
    let sink = Arc::new(RecordingSink::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), secrets()),
        sink.clone(),
        vec![paired()],
    );
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    runner.run(&mut ledger, &mut view).await;

    assert_eq!(
        ledger.get("Wireless"),
        Some(&Bill::retrieved(0.0, Some(utc(2024, 5, 9))))
    );
    assert_eq!(
        ledger.get("Internet"),
        Some(&Bill::retrieved(0.0, Some(utc(2024, 5, 21))))
    );
    assert_eq!(
        sink.providers(),
        vec!["Wireless".to_string(), "Internet".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_paired_outputs_with_identical_tabs() {
    // Nothing on the page changes; the wait runs out and both are read.
    let page = paired_page().on_click("#internet-tab", "#internet-panel", "");
    let ctx = context(&page, FakeMailbox::default(), secrets());

    let bills = execute(&paired(), &ctx, Local::now().date_naive())
        .await
        .unwrap();
    let expected = Bill::retrieved(85.10, Some(utc(2024, 5, 9)));
    assert_eq!(bills, vec![expected.clone(), expected]);
}

#[tokio::test(start_paused = true)]
async fn test_paired_outputs_commit_nothing_when_second_half_fails() {
    // The Internet tab never opens.
    let page = paired_page();
    let sink = Arc::new(RecordingSink::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), secrets()),
        sink.clone(),
        vec![paired()],
    );
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    runner.run(&mut ledger, &mut view).await;

    assert!(!ledger.get("Wireless").unwrap().retrieved);
    assert!(!ledger.get("Internet").unwrap().retrieved);
    assert!(sink.providers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fixed_entry_needs_no_browser() {
    let page = Arc::new(FakePage::default());
    let sink = Arc::new(RecordingSink::default());
    let car = ProviderDefinition::builder("Car")
        .state(State::Extract)
        .step(Action::fixed(0, 422.94, 17))
        .build()
        .unwrap();
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), Secrets::new()),
        sink.clone(),
        vec![car],
    );
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    runner.run(&mut ledger, &mut view).await;

    let bill = ledger.get("Car").unwrap();
    assert!(bill.retrieved);
    assert_eq!(bill.amount_due, 422.94);
    assert_eq!(bill.due_date.unwrap().day(), 17);
    assert!(page.visited().is_empty());
    assert_eq!(sink.providers(), vec!["Car".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_cancels_run_and_closes_session() {
    // The first workflow waits without a bound for a node that never appears.
    let stuck = ProviderDefinition::builder("Stuck")
        .state(State::Navigate)
        .step(Action::navigate("https://stuck.example.com"))
        .state(State::AwaitLoginForm)
        .step(Action::await_ready("#never"))
        .state(State::Extract)
        .step(Action::extract(0, ".amount", ".due", DateLayout::new("%m/%d/%Y")))
        .build()
        .unwrap();
    let page = gas_page();
    let sink = Arc::new(RecordingSink::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), secrets()),
        sink.clone(),
        vec![stuck, gas()],
    );
    let watchdog = spawn_watchdog(runner.cancel_token(), Duration::from_secs(120));
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    let outcome = runner.run(&mut ledger, &mut view).await;
    watchdog.await.unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled(CancelReason::Watchdog));
    assert_eq!(outcome.exit_code(), 2);
    assert!(*page.closed.lock().unwrap());
    assert!(!page.visited().contains(&GAS_URL.to_string()));
    assert!(sink.providers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_before_run_skips_every_workflow() {
    let page = gas_page();
    let sink = Arc::new(RecordingSink::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), secrets()),
        sink.clone(),
        vec![gas()],
    );
    runner.cancel_token().cancel(CancelReason::Interrupt);
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    let outcome = runner.run(&mut ledger, &mut view).await;
    assert_eq!(outcome.exit_code(), 1);
    assert!(page.visited().is_empty());
    assert!(*page.closed.lock().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_failure_screenshot_is_saved() {
    let dir = tempfile::tempdir().unwrap();
    let page = Arc::new(FakePage::default());
    let runner = Runner::new(
        context(&page, FakeMailbox::default(), secrets()),
        Arc::new(RecordingSink::default()),
        vec![power()],
    )
    .with_screenshot_dir(dir.path());
    let mut ledger = runner.ledger();
    let mut view = RecordingView::default();

    runner.run(&mut ledger, &mut view).await;

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("power-"));
    assert!(files[0].ends_with(".png"));
}
