use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity of a log record, with the platform's numeric priorities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Verbose = 2,
    Debug = 3,
    Info = 4,
    Warn = 5,
    Error = 6,
    Assert = 7,
}

impl Severity {
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Verbose => "VERBOSE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Assert => "ASSERT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v" | "verbose" | "trace" => Ok(Severity::Verbose),
            "d" | "debug" => Ok(Severity::Debug),
            "i" | "info" => Ok(Severity::Info),
            "w" | "warn" | "warning" => Ok(Severity::Warn),
            "e" | "error" => Ok(Severity::Error),
            "a" | "assert" => Ok(Severity::Assert),
            other => Err(format!("Unknown severity: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_match_platform() {
        assert_eq!(Severity::Verbose.priority(), 2);
        assert_eq!(Severity::Error.priority(), 6);
        assert!(Severity::Warn > Severity::Info);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("INFO".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("w".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("loud".parse::<Severity>().is_err());
        assert_eq!(Severity::Debug.to_string(), "DEBUG");
    }
}
