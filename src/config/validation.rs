//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{Config, DelayRange, RelayKind};
use crate::bench::ScenarioKind;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("relay.group_id is required")]
    MissingGroupId,
    #[error("relay.{0} is required")]
    MissingAccount(&'static str),
    #[error("relay.url must be an http(s) URL, got '{0}'")]
    InvalidUrl(String),
    #[error("relay.cli_path is required for the cli relay")]
    MissingCliPath,
    #[error("relay.send_rate_per_second must be positive")]
    ZeroSendRate,
    #[error("bench.{0} must be positive")]
    Zero(&'static str),
    #[error("bench.sweep_sizes must be positive and strictly ascending, got {0:?}")]
    SweepNotAscending(Vec<usize>),
    #[error("bench.concurrent.{name} range is inverted: [{lo}, {hi}]")]
    InvertedDelay { name: &'static str, lo: u64, hi: u64 },
    #[error("unknown suite '{0}' (expected a prefix of one of: {known})", known = ScenarioKind::keys().join(", "))]
    UnknownSuite(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let relay = &config.relay;

    // Relay
    if relay.group_id.is_empty() {
        errors.push(ValidationError::MissingGroupId);
    }
    if relay.sender_account.is_empty() {
        errors.push(ValidationError::MissingAccount("sender_account"));
    }
    if relay.receiver_account.is_empty() {
        errors.push(ValidationError::MissingAccount("receiver_account"));
    }
    match relay.kind {
        RelayKind::Http
            if !(relay.url.starts_with("http://") || relay.url.starts_with("https://")) =>
        {
            errors.push(ValidationError::InvalidUrl(relay.url.clone()));
        }
        RelayKind::Cli if relay.cli_path.is_empty() => {
            errors.push(ValidationError::MissingCliPath);
        }
        _ => {}
    }
    if relay.send_rate_per_second == Some(0) {
        errors.push(ValidationError::ZeroSendRate);
    }

    // Workload
    let bench = &config.bench;
    for (name, value) in [
        ("updates", bench.updates),
        ("send_concurrency", bench.send_concurrency),
        ("max_send_attempts", bench.max_send_attempts as usize),
        ("idle.max_idle_rounds", bench.idle.max_idle_rounds as usize),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }
    let sizes = &bench.sweep_sizes;
    if sizes.first() == Some(&0) || sizes.windows(2).any(|w| w[0] >= w[1]) {
        errors.push(ValidationError::SweepNotAscending(sizes.clone()));
    }
    for (name, DelayRange { lo, hi }) in [
        ("delay_a_ms", bench.concurrent.delay_a),
        ("delay_b_ms", bench.concurrent.delay_b),
    ] {
        if lo > hi {
            errors.push(ValidationError::InvertedDelay { name, lo, hi });
        }
    }

    // Suites
    for suite in &config.run.suites {
        if ScenarioKind::selected(std::slice::from_ref(suite)).is_empty() {
            errors.push(ValidationError::UnknownSuite(suite.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[relay]
kind = "loopback"
group_id = "grp"
sender_account = "+100"
receiver_account = "+200"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_config_reports_every_missing_field() {
        let config: Config = toml::from_str("").unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingGroupId)));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::MissingAccount(_)))
                .count(),
            2
        );
    }

    #[test]
    fn test_http_relay_needs_url() {
        let toml = r#"
[relay]
url = "localhost:8080"
group_id = "grp"
sender_account = "+100"
receiver_account = "+200"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::InvalidUrl(_)]));
    }

    #[test]
    fn test_sweep_must_ascend() {
        let mut config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        config.bench.sweep_sizes = vec![1, 10, 10];
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[..], [ValidationError::SweepNotAscending(_)]));

        config.bench.sweep_sizes = vec![0, 1];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_inverted_delay_range() {
        let mut config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        config.bench.concurrent.delay_b = DelayRange { lo: 9, hi: 3 };
        let errors = validate(&config).unwrap_err();
        assert!(matches!(
            errors[..],
            [ValidationError::InvertedDelay { name: "delay_b_ms", lo: 9, hi: 3 }]
        ));
    }

    #[test]
    fn test_zero_values() {
        let mut config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        config.bench.updates = 0;
        config.bench.send_concurrency = 0;
        config.relay.send_rate_per_second = Some(0);
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_suite_prefixes() {
        let mut config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        config.run.suites = vec!["seq".into(), "large".into()];
        assert!(validate(&config).is_ok());

        config.run.suites = vec!["s9".into()];
        let errors = validate(&config).unwrap_err();
        assert!(matches!(&errors[..], [ValidationError::UnknownSuite(s)] if s == "s9"));
    }
}
