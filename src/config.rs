// =============================================================================
// Configuration — environment-driven feed selection and process parameters
// =============================================================================

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Which market-data adapter to construct. `FEED_TYPE` is checked first,
/// then the legacy `EDGEHUNTER_FEED` alias, defaulting to `Mock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedType {
    Mock,
    Ibkr,
}

impl Default for FeedType {
    fn default() -> Self {
        Self::Mock
    }
}

fn parse_feed_type(raw: &str) -> Option<FeedType> {
    match raw.to_ascii_uppercase().as_str() {
        "MOCK" => Some(FeedType::Mock),
        "IBKR" => Some(FeedType::Ibkr),
        _ => None,
    }
}

pub fn get_feed_type() -> FeedType {
    let raw = std::env::var("FEED_TYPE")
        .ok()
        .or_else(|| std::env::var("EDGEHUNTER_FEED").ok());

    match raw {
        None => FeedType::default(),
        Some(raw) => parse_feed_type(&raw).unwrap_or_else(|| {
            warn!(value = %raw, "invalid FEED_TYPE, falling back to MOCK");
            FeedType::default()
        }),
    }
}

#[derive(Debug, Clone)]
pub struct IbkrConnectionConfig {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
}

impl Default for IbkrConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
        }
    }
}

pub fn get_ibkr_connection_config() -> IbkrConnectionConfig {
    let mut cfg = IbkrConnectionConfig::default();
    if let Ok(host) = std::env::var("IBKR_HOST") {
        if !host.trim().is_empty() {
            cfg.host = host;
        }
    }
    if let Ok(port) = std::env::var("IBKR_PORT") {
        if let Ok(parsed) = port.parse::<u16>() {
            if parsed >= 1 {
                cfg.port = parsed;
            }
        }
    }
    if let Ok(client_id) = std::env::var("IBKR_CLIENT_ID") {
        if let Ok(parsed) = client_id.parse::<i32>() {
            if parsed >= 0 {
                cfg.client_id = parsed;
            }
        }
    }
    cfg
}

#[derive(Debug, Clone)]
pub struct IbkrContractConfig {
    pub symbol: String,
    pub expiry: String,
    pub exchange: String,
    pub currency: String,
    pub sec_type: String,
    pub multiplier: Option<i64>,
}

impl IbkrContractConfig {
    pub fn contract_key(&self) -> String {
        format!("{}.{}", self.symbol, self.expiry)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::MissingField("symbol"));
        }
        if self.expiry.len() != 6 || !self.expiry.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                field: "expiry",
                value: self.expiry.clone(),
            });
        }
        if self.exchange.trim().is_empty() {
            return Err(ConfigError::MissingField("exchange"));
        }
        if self.currency.trim().is_empty() {
            return Err(ConfigError::MissingField("currency"));
        }
        Ok(())
    }
}

pub fn get_ibkr_contract_config() -> Result<IbkrContractConfig, ConfigError> {
    let symbol = std::env::var("IBKR_SYMBOL").map_err(|_| ConfigError::MissingField("symbol"))?;
    let expiry = std::env::var("IBKR_EXPIRY").map_err(|_| ConfigError::MissingField("expiry"))?;
    let exchange = std::env::var("IBKR_EXCHANGE").unwrap_or_else(|_| "CME".to_string());
    let currency = std::env::var("IBKR_CURRENCY").unwrap_or_else(|_| "USD".to_string());
    let sec_type = std::env::var("IBKR_SECTYPE").unwrap_or_else(|_| "FUT".to_string());
    let multiplier = std::env::var("IBKR_MULTIPLIER")
        .ok()
        .and_then(|v| v.parse::<i64>().ok());

    let cfg = IbkrContractConfig {
        symbol,
        expiry,
        exchange,
        currency,
        sec_type,
        multiplier,
    };
    cfg.validate()?;
    Ok(cfg)
}

/// How long the kernel runs before shutting itself down, absent an operator
/// signal. Resolution order: `MAX_RUNTIME_S` env var, then a positional CLI
/// argument, then a default of 30 seconds.
#[derive(Debug, Clone, Copy)]
pub struct ProcessConfig {
    pub max_runtime_s: f64,
}

pub fn get_process_config(args: &[String]) -> ProcessConfig {
    if let Ok(raw) = std::env::var("MAX_RUNTIME_S") {
        if let Ok(parsed) = raw.parse::<f64>() {
            return ProcessConfig {
                max_runtime_s: parsed,
            };
        }
    }
    if let Some(raw) = args.get(1) {
        if let Ok(parsed) = raw.parse::<f64>() {
            return ProcessConfig {
                max_runtime_s: parsed,
            };
        }
    }
    ProcessConfig { max_runtime_s: 30.0 }
}

#[derive(Debug, Clone)]
pub struct TriggerCardLoggerConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    pub cadence_hz: f64,
}

fn truthy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

pub fn get_trigger_card_logger_config() -> TriggerCardLoggerConfig {
    let enabled = std::env::var("ENABLE_TRIGGERCARD_LOGGER")
        .map(|v| truthy(&v))
        .unwrap_or(false);
    let log_dir = std::env::var("TRIGGERCARD_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let cadence_hz = std::env::var("TRIGGERCARD_CADENCE_HZ")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|hz| *hz > 0.0)
        .unwrap_or(1.0);
    TriggerCardLoggerConfig {
        enabled,
        log_dir,
        cadence_hz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_key_joins_symbol_and_expiry() {
        let cfg = IbkrContractConfig {
            symbol: "MNQ".to_string(),
            expiry: "202603".to_string(),
            exchange: "CME".to_string(),
            currency: "USD".to_string(),
            sec_type: "FUT".to_string(),
            multiplier: None,
        };
        assert_eq!(cfg.contract_key(), "MNQ.202603");
    }

    #[test]
    fn contract_validate_rejects_malformed_expiry() {
        let cfg = IbkrContractConfig {
            symbol: "MNQ".to_string(),
            expiry: "2026".to_string(),
            exchange: "CME".to_string(),
            currency: "USD".to_string(),
            sec_type: "FUT".to_string(),
            multiplier: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn contract_validate_rejects_missing_symbol() {
        let cfg = IbkrContractConfig {
            symbol: String::new(),
            expiry: "202603".to_string(),
            exchange: "CME".to_string(),
            currency: "USD".to_string(),
            sec_type: "FUT".to_string(),
            multiplier: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_ibkr_connection_uses_paper_port() {
        let cfg = IbkrConnectionConfig::default();
        assert_eq!(cfg.port, 7497);
        assert_eq!(cfg.client_id, 1);
    }

    #[test]
    fn process_config_falls_back_to_default_when_unset() {
        let cfg = get_process_config(&["binary_name".to_string()]);
        assert!(cfg.max_runtime_s > 0.0);
    }

    #[test]
    fn feed_type_parse_is_case_insensitive() {
        assert_eq!(parse_feed_type("ibkr"), Some(FeedType::Ibkr));
        assert_eq!(parse_feed_type("Mock"), Some(FeedType::Mock));
        assert_eq!(parse_feed_type("bogus"), None);
    }
}
