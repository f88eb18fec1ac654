//! The provider catalog, in run and display order.

use billburner::workflow::DefinitionBuilder;
use billburner::{Action, BillResult, DateLayout, Field, ProviderDefinition, State};

use crate::config::FixedBill;

/// Bound for login, post-login and challenge elements.
const AUTH_TIMEOUT_MS: u64 = 15_000;
/// Bound for result elements.
const RESULT_TIMEOUT_MS: u64 = 30_000;
/// How long a tab switch may take to redraw the figures. Equal figures on
/// both tabs simply use up the bound.
const TAB_SWITCH_TIMEOUT_MS: u64 = 10_000;

/// Every workflow in order. Ledger order follows the outputs:
/// Car, Power, Gas, Sewer, Water, Wireless, Internet, Mortgage, Insurance.
pub fn catalog(car: FixedBill) -> BillResult<Vec<ProviderDefinition>> {
    Ok(vec![
        car_payment(car)?,
        power()?,
        gas()?,
        sewer()?,
        water()?,
        wireless_and_internet()?,
        mortgage()?,
        insurance()?,
    ])
}

/// Keep definitions whose name or any output matches one of `only`
/// (case-insensitive). An empty filter keeps everything.
pub fn select(definitions: Vec<ProviderDefinition>, only: &[String]) -> Vec<ProviderDefinition> {
    if only.is_empty() {
        return definitions;
    }
    definitions
        .into_iter()
        .filter(|d| {
            only.iter().any(|name| {
                d.name.eq_ignore_ascii_case(name)
                    || d.outputs.iter().any(|o| o.eq_ignore_ascii_case(name))
            })
        })
        .collect()
}

/// Navigate, wait for the username field and sign in with the usual three
/// fields.
fn sign_in(
    builder: DefinitionBuilder,
    url: &str,
    username: &str,
    password: &str,
    submit: &str,
) -> DefinitionBuilder {
    builder
        .state(State::Navigate)
        .step(Action::navigate(url))
        .state(State::AwaitLoginForm)
        .step(Action::await_element(username, AUTH_TIMEOUT_MS))
        .state(State::SubmitCredentials)
        .step(Action::type_into(username, Field::Username))
        .step(Action::type_into(password, Field::Password))
        .step(Action::click(submit))
}

fn car_payment(car: FixedBill) -> BillResult<ProviderDefinition> {
    ProviderDefinition::builder("Car")
        .state(State::Extract)
        .step(Action::fixed(0, car.amount, car.due_day))
        .build()
}

fn power() -> BillResult<ProviderDefinition> {
    let builder = ProviderDefinition::builder("Power").credentials("AMEREN");
    sign_in(
        builder,
        "https://www.ameren.com/login-page/",
        "#txtSignInEmail",
        ".input-password > input:nth-child(1)",
        "#btnLogin",
    )
    .state(State::AwaitResult)
    .step(Action::await_element(".amount", RESULT_TIMEOUT_MS))
    .step(Action::await_element(".alert", RESULT_TIMEOUT_MS))
    .state(State::Extract)
    // "... due by 05/08/24 ..."
    .step(Action::extract(
        0,
        ".amount",
        ".alert",
        DateLayout::new("%m/%d/%y").after("by").first_word(),
    ))
    .build()
}

fn gas() -> BillResult<ProviderDefinition> {
    let builder = ProviderDefinition::builder("Gas").credentials("SPIRE");
    sign_in(
        builder,
        "https://myaccount.spireenergy.com/web/customer/registration/#/sign-in",
        "#loginEmail",
        "#loginPassword",
        "section.buttons:nth-child(4) > button:nth-child(1)",
    )
    .state(State::AwaitResult)
    .step(Action::await_element(".amount-due", RESULT_TIMEOUT_MS))
    .step(Action::await_element(".due-date", RESULT_TIMEOUT_MS))
    .state(State::Extract)
    // "May 08, 2024"
    .step(Action::extract(
        0,
        ".amount-due",
        ".due-date",
        DateLayout::new("%b %d, %Y"),
    ))
    .build()
}

fn sewer() -> BillResult<ProviderDefinition> {
    const BALANCE: &str =
        "#body_content_AccountSummaryTabControl_BillingSummaryControl1_lblCurrentBalanceText";
    const DUE: &str =
        "#body_content_AccountSummaryTabControl_BillingSummaryControl1_lblAppOrLatePaymentDateText";

    let builder = ProviderDefinition::builder("Sewer").credentials("STLMSD");
    sign_in(
        builder,
        "https://myaccount.stlmsd.com/MSDSSP/Index.aspx",
        "#body_content_txtUsername",
        "#body_content_txtPassword",
        "#body_content_btnLogin",
    )
    .state(State::AwaitResult)
    .step(Action::await_element(BALANCE, RESULT_TIMEOUT_MS))
    .step(Action::await_element(DUE, RESULT_TIMEOUT_MS))
    .state(State::Extract)
    // "May 6, 2024"
    .step(Action::extract(0, BALANCE, DUE, DateLayout::new("%b %d, %Y")))
    .build()
}

fn water() -> BillResult<ProviderDefinition> {
    const LOGIN_LINK: &str = "#menu > div > ul > li.lastTopRowMenuItem > a";
    const USERNAME: &str = "div.labelRow:nth-child(3) > input:nth-child(2)";
    const ACCOUNT_LINK: &str = ".menuWrapper > ul:nth-child(1) > li:nth-child(6) > a:nth-child(1)";
    const BALANCE: &str = "div.labelRow:nth-child(5)";
    const DUE: &str = "#contentPanel > p:nth-child(9)";

    ProviderDefinition::builder("Water")
        .credentials("STLO_EGOV")
        .state(State::Navigate)
        .step(Action::navigate(
            "https://stlo-egov.aspgov.com/Click2GovCX/index.html",
        ))
        .state(State::AwaitLoginForm)
        .step(Action::await_element(LOGIN_LINK, AUTH_TIMEOUT_MS))
        .step(Action::click(LOGIN_LINK))
        .step(Action::await_element(USERNAME, AUTH_TIMEOUT_MS))
        .state(State::SubmitCredentials)
        .step(Action::type_into(USERNAME, Field::Username))
        .step(Action::type_into("#password", Field::Password))
        .step(Action::click("#submitButton"))
        .state(State::AwaitPostLogin)
        .step(Action::await_element(ACCOUNT_LINK, AUTH_TIMEOUT_MS))
        .step(Action::click(ACCOUNT_LINK))
        .state(State::AwaitResult)
        .step(Action::await_element(BALANCE, RESULT_TIMEOUT_MS))
        .step(Action::await_element(DUE, RESULT_TIMEOUT_MS))
        .state(State::Extract)
        // "... is due on 04/23/2024. ..."
        .step(Action::extract(
            0,
            BALANCE,
            DUE,
            DateLayout::new("%m/%d/%Y").after("due on ").before("."),
        ))
        .build()
}

fn wireless_and_internet() -> BillResult<ProviderDefinition> {
    const BALANCE: &str = ".w-100";
    const DUE: &str = "div.pad-t-md-sm:nth-child(1) > div:nth-child(2)";
    const INTERNET_TAB: &str =
        "div.jsx-2552546055:nth-child(1) > div:nth-child(1) > div:nth-child(3) > div:nth-child(1)";

    // "Due Apr 28, 2024"
    let layout = DateLayout::new("Due %b %d, %Y");

    ProviderDefinition::builder("Wireless")
        .outputs(["Wireless", "Internet"])
        .credentials("ATT")
        .state(State::Navigate)
        .step(Action::navigate("https://www.att.com/acctmgmt/signin"))
        .state(State::AwaitLoginForm)
        .step(Action::await_element("#userID", AUTH_TIMEOUT_MS))
        .state(State::SubmitCredentials)
        .step(Action::type_with_events("#userID", Field::Username))
        .step(Action::click("#continueFromUserLogin"))
        .step(Action::await_element("#password", AUTH_TIMEOUT_MS))
        .step(Action::type_with_events("#password", Field::Password))
        .step(Action::click("#signin"))
        .state(State::AwaitPostLogin)
        .step(Action::await_element(
            "#chooseMethodMakePaymentButton",
            AUTH_TIMEOUT_MS,
        ))
        .step(Action::click("#chooseMethodMakePaymentButton"))
        .state(State::AwaitResult)
        .step(Action::await_element(".page-title", RESULT_TIMEOUT_MS))
        .step(Action::await_element(BALANCE, RESULT_TIMEOUT_MS))
        .step(Action::await_element(DUE, RESULT_TIMEOUT_MS))
        .state(State::Extract)
        .step(Action::extract(0, BALANCE, DUE, layout.clone()))
        .step(Action::click_script(INTERNET_TAB))
        .step(Action::await_text_change([BALANCE, DUE], TAB_SWITCH_TIMEOUT_MS))
        .step(Action::extract(1, BALANCE, DUE, layout))
        .build()
}

fn mortgage() -> BillResult<ProviderDefinition> {
    const BALANCE: &str =
        "div.r-edyy15:nth-child(1) > div:nth-child(1) > div:nth-child(1) > div:nth-child(1)";
    const DUE: &str =
        "div.r-edyy15:nth-child(1) > div:nth-child(1) > div:nth-child(3) > div:nth-child(1)";

    let builder = ProviderDefinition::builder("Mortgage").credentials("PENNYMAC");
    sign_in(
        builder,
        "https://mypennymac.pennymacusa.com/account/login",
        "#username",
        "#password",
        "#submit-button",
    )
    .state(State::AwaitOtpChallenge)
    .step(Action::await_element("#tfaEmail", AUTH_TIMEOUT_MS))
    .state(State::RetrieveOtp)
    .step(Action::retrieve_otp(
        "IMAP",
        "Pennymac - Email Confirmation",
        "PM-",
        "\n",
    ))
    .state(State::SubmitOtp)
    .step(Action::type_with_events("#tfaEmail", Field::Otp))
    .step(Action::click("#login-tfa-email-verify-btn"))
    .state(State::AwaitResult)
    .step(Action::await_element(BALANCE, RESULT_TIMEOUT_MS))
    .step(Action::await_element(DUE, RESULT_TIMEOUT_MS))
    .state(State::Extract)
    // "04/23/2024"
    .step(Action::extract(0, BALANCE, DUE, DateLayout::new("%m/%d/%Y")))
    .build()
}

fn insurance() -> BillResult<ProviderDefinition> {
    const EMAIL_OPTION: &str = "#emailAddress > label:nth-child(2)";

    ProviderDefinition::builder("Insurance")
        .credentials("STATE_FARM")
        .state(State::Navigate)
        .step(Action::navigate(
            "https://proofing.statefarm.com/login-ui/login",
        ))
        .state(State::AwaitLoginForm)
        .step(Action::await_element("#username", AUTH_TIMEOUT_MS))
        .state(State::SubmitCredentials)
        .step(Action::type_into("#username", Field::Username))
        .step(Action::type_into("#password", Field::Password))
        .step(Action::click_script("#submitButton"))
        .state(State::AwaitOtpChallenge)
        .step(Action::await_element(EMAIL_OPTION, AUTH_TIMEOUT_MS))
        .step(Action::click_script(EMAIL_OPTION))
        .step(Action::click_script("#submitButton"))
        .step(Action::await_element("#verification_code", AUTH_TIMEOUT_MS))
        .state(State::RetrieveOtp)
        .step(Action::retrieve_otp(
            "EMAIL",
            "Verification Code",
            r#"<span style=3D"color:#E22925;">"#,
            "</",
        ))
        .state(State::SubmitOtp)
        .step(Action::type_into("#verification_code", Field::Otp))
        .step(Action::click_script("#submitButton"))
        .state(State::AwaitResult)
        .step(Action::await_element(".bill-due-amt-txt", RESULT_TIMEOUT_MS))
        .step(Action::await_element(".bill-due-date", RESULT_TIMEOUT_MS))
        .state(State::Extract)
        // "Due date\nMay 17"
        .step(Action::extract(
            0,
            ".bill-due-amt-txt",
            ".bill-due-date",
            DateLayout::new("%b %d %Y")
                .join_lines()
                .remove("Due date")
                .current_year(),
        ))
        .build()
}
