//! Log level names shared by `extentd` and `extentctl`.

use std::fmt;
use std::str::FromStr;

/// A single verbosity for the `--log-level` flag.
///
/// `warning` is accepted for `warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Off,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("warning") {
            return Ok(LogLevel::Warn);
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| s.eq_ignore_ascii_case(level.as_directive()))
            .ok_or_else(|| {
                format!("unknown log level '{s}' (expected off, error, warn, info, debug or trace)")
            })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

/// Rewrite the `warning` alias to `warn` in a filter directive string.
///
/// Only level positions are touched: a bare `warning` directive, or the part
/// after the last `=` of `target=warning`. Target names are left alone.
pub fn normalize_directive(directives: &str) -> String {
    directives
        .split(',')
        .map(|directive| match directive.rsplit_once('=') {
            Some((target, level)) if level.trim().eq_ignore_ascii_case("warning") => {
                format!("{target}=warn")
            }
            None if directive.trim().eq_ignore_ascii_case("warning") => "warn".to_string(),
            _ => directive.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_levels() {
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("TRACE".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_display_roundtrips() {
        for level in LogLevel::ALL {
            assert_eq!(level.to_string().parse::<LogLevel>(), Ok(level));
        }
    }

    #[test]
    fn test_normalize_bare_and_targeted() {
        assert_eq!(normalize_directive("warning"), "warn");
        assert_eq!(normalize_directive("extentd=warning,info"), "extentd=warn,info");
        assert_eq!(normalize_directive("extentd=debug"), "extentd=debug");
    }

    #[test]
    fn test_normalize_leaves_target_names_alone() {
        assert_eq!(normalize_directive("my_warning_mod=debug"), "my_warning_mod=debug");
        assert_eq!(
            normalize_directive("my_warning_mod=warning"),
            "my_warning_mod=warn"
        );
    }
}
