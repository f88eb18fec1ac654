//! Environment configuration.
//!
//! Everything is read once at start-up. Empty values count as unset.

use billburner::{Credentials, MailboxConfig, Secrets};
use tracing::debug;
use url::Url;

/// Credential prefixes; each reads `<PREFIX>_USERNAME` and `<PREFIX>_PASSWORD`.
pub const PROVIDER_PREFIXES: [&str; 7] = [
    "AMEREN",
    "SPIRE",
    "STLMSD",
    "STLO_EGOV",
    "ATT",
    "PENNYMAC",
    "STATE_FARM",
];

/// Mailbox profiles; each reads `<PROFILE>_USERNAME` and `<PROFILE>_PASSWORD`.
pub const MAILBOX_PROFILES: [&str; 2] = ["IMAP", "EMAIL"];

pub const DEFAULT_MAILBOX_HOST: &str = "hmail.digi-safe.co";
pub const DEFAULT_CAR_AMOUNT: f64 = 422.94;
pub const DEFAULT_CAR_DUE_DAY: u32 = 17;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{set} is set but {missing} is missing")]
    Incomplete {
        set: &'static str,
        missing: &'static str,
    },
}

/// Connection parameters for the InfluxDB v2 write API.
#[derive(Debug, Clone, PartialEq)]
pub struct InfluxConfig {
    pub url: Url,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// The fixed-schedule car payment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedBill {
    pub amount: f64,
    pub due_day: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub secrets: Secrets,
    /// `None` when `INFLUXDB_URL` is unset; points are then only logged.
    pub influx: Option<InfluxConfig>,
    pub car: FixedBill,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut secrets = Secrets::new();
        for prefix in PROVIDER_PREFIXES {
            match account(&get, prefix) {
                Some((username, password)) => {
                    secrets.insert_credentials(prefix, Credentials::new(username, password))
                }
                None => debug!("no credentials for {prefix}"),
            }
        }

        let host = get("MAILBOX_HOST").unwrap_or_else(|| DEFAULT_MAILBOX_HOST.to_string());
        let secure = match get("MAILBOX_TLS") {
            Some(value) => parse_bool("MAILBOX_TLS", &value)?,
            None => false,
        };
        for profile in MAILBOX_PROFILES {
            if let Some((username, password)) = account(&get, profile) {
                secrets.insert_mailbox(
                    profile,
                    MailboxConfig {
                        host: host.clone(),
                        secure,
                        username,
                        password,
                    },
                );
            }
        }

        let influx = match get("INFLUXDB_URL") {
            Some(raw) => {
                let url = Url::parse(&raw).map_err(|_| ConfigError::Invalid {
                    name: "INFLUXDB_URL",
                    value: raw.clone(),
                    expected: "URL",
                })?;
                let require = |missing: &'static str| {
                    get(missing).ok_or(ConfigError::Incomplete {
                        set: "INFLUXDB_URL",
                        missing,
                    })
                };
                Some(InfluxConfig {
                    url,
                    token: require("INFLUXDB_TOKEN")?,
                    org: require("INFLUXDB_ORG")?,
                    bucket: require("INFLUXDB_BUCKET")?,
                })
            }
            None => None,
        };

        let amount = match get("CAR_AMOUNT") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or(ConfigError::Invalid {
                    name: "CAR_AMOUNT",
                    value: raw,
                    expected: "dollar amount",
                })?,
            None => DEFAULT_CAR_AMOUNT,
        };
        let due_day = match get("CAR_DUE_DAY") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|d| (1..=31).contains(d))
                .ok_or(ConfigError::Invalid {
                    name: "CAR_DUE_DAY",
                    value: raw,
                    expected: "day of month (1-31)",
                })?,
            None => DEFAULT_CAR_DUE_DAY,
        };

        Ok(Self {
            secrets,
            influx,
            car: FixedBill { amount, due_day },
        })
    }
}

fn account<G>(get: &G, prefix: &str) -> Option<(String, String)>
where
    G: Fn(&str) -> Option<String>,
{
    let username = get(&format!("{prefix}_USERNAME"))?;
    let password = get(&format!("{prefix}_PASSWORD"))?;
    Some((username, password))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            expected: "boolean",
        }),
    }
}
