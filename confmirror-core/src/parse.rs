//! String coercion at the configuration and annotation boundary.
//!
//! The sync engine never parses strings itself: durations, signal names,
//! boolean annotation values and label selectors all come through here and
//! produce typed values (or a fatal [`ConfigError`] at load time).

use std::time::Duration;

use crate::error::ConfigError;
use crate::types::Signal;

// ---------------------------------------------------------------------------
// Booleans
// ---------------------------------------------------------------------------

/// Permissive boolean parsing for annotation and label values.
///
/// Accepts the standard boolean text forms (`1`, `t`, `true`, `True`, `TRUE`
/// and their negatives). Anything unparsable is treated as false.
pub fn truthy(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "True" | "TRUE")
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

/// Parse a duration string such as `"500ms"`, `"30s"`, `"5m"`, `"1h30m"`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        value: value.to_owned(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        if digits_end == 0 {
            return Err(invalid());
        }
        let (digits, tail) = rest.split_at(digits_end);
        let amount: u64 = digits.parse().map_err(|_| invalid())?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        total += match unit {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount * 60),
            "h" => Duration::from_secs(amount * 3600),
            _ => return Err(invalid()),
        };
        rest = tail;
    }

    Ok(total)
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Parse a signal name (`"HUP"`, `"SIGHUP"`) or number (`"1"`).
///
/// The empty string means the default reload signal, SIGHUP.
pub fn parse_signal(value: &str) -> Result<Signal, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Signal::HUP);
    }

    if let Ok(number) = trimmed.parse::<i32>() {
        return Ok(Signal(number));
    }

    let name = trimmed.to_ascii_uppercase();
    let name = name.strip_prefix("SIG").unwrap_or(&name);
    let number = match name {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ABRT" => 6,
        "KILL" => 9,
        "USR1" => 10,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        "CONT" => 18,
        "STOP" => 19,
        "TSTP" => 20,
        "WINCH" => 28,
        _ => {
            return Err(ConfigError::InvalidSignal {
                value: value.to_owned(),
            })
        }
    };
    Ok(Signal(number))
}

// ---------------------------------------------------------------------------
// Label selectors
// ---------------------------------------------------------------------------

/// One requirement of a label selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Exists(String),
    NotExists(String),
    Equals(String, String),
    NotEquals(String, String),
}

/// An equality-based label selector: comma-separated requirements of the
/// forms `key`, `!key`, `key=value`, `key==value` and `key!=value`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSelector {
            value: expr.to_owned(),
        };

        let mut requirements = Vec::new();
        for part in expr.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let requirement = if let Some((key, value)) = part.split_once("!=") {
                Requirement::NotEquals(key.trim().to_owned(), value.trim().to_owned())
            } else if let Some((key, value)) = part.split_once("==") {
                Requirement::Equals(key.trim().to_owned(), value.trim().to_owned())
            } else if let Some((key, value)) = part.split_once('=') {
                Requirement::Equals(key.trim().to_owned(), value.trim().to_owned())
            } else if let Some(key) = part.strip_prefix('!') {
                Requirement::NotExists(key.trim().to_owned())
            } else {
                Requirement::Exists(part.to_owned())
            };

            let key = match &requirement {
                Requirement::Exists(k) | Requirement::NotExists(k) => k,
                Requirement::Equals(k, _) | Requirement::NotEquals(k, _) => k,
            };
            if key.is_empty() {
                return Err(invalid());
            }
            requirements.push(requirement);
        }

        Ok(Selector { requirements })
    }

    /// True when every requirement holds against the given label set.
    pub fn matches(&self, labels: &std::collections::BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|req| match req {
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::NotExists(key) => !labels.contains_key(key),
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
