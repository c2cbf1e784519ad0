// ── Process-wide verbosity ──
//
// `LogLevel` is the single owner of the verbosity knob. The root
// protocol publishes it as the writable `LogLevel` property; the binary
// wires an applier that reloads the tracing filter.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::level_filters::LevelFilter;

use crate::error::CoreError;

/// Verbosity levels accepted by the `LogLevel` property.
///
/// Parsing is case-insensitive; `WARN` is accepted as an alias of
/// `WARNING`. `CRITICAL` and `NOTICE` have no tracing equivalent and
/// collapse onto `ERROR` and `INFO` respectively.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(try_from = "String", into = "String")]
pub enum Verbosity {
    Critical,
    Error,
    #[strum(to_string = "WARNING", serialize = "WARN")]
    Warning,
    Notice,
    #[default]
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Critical | Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Notice | Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Parse a property value, mapping failure into a core error.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        raw.trim()
            .parse()
            .map_err(|_| CoreError::InvalidLogLevel {
                value: raw.to_owned(),
            })
    }
}

impl TryFrom<String> for Verbosity {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, CoreError> {
        Self::parse(&s)
    }
}

/// The closest verbosity for an installed tracing filter. `OFF` has no
/// counterpart and maps onto `CRITICAL`.
impl From<LevelFilter> for Verbosity {
    fn from(filter: LevelFilter) -> Self {
        if filter == LevelFilter::OFF {
            Self::Critical
        } else if filter == LevelFilter::ERROR {
            Self::Error
        } else if filter == LevelFilter::WARN {
            Self::Warning
        } else if filter == LevelFilter::INFO {
            Self::Info
        } else if filter == LevelFilter::DEBUG {
            Self::Debug
        } else {
            Self::Trace
        }
    }
}

impl From<Verbosity> for String {
    fn from(v: Verbosity) -> Self {
        v.to_string()
    }
}

type Applier = Box<dyn Fn(LevelFilter) -> Result<(), String> + Send + Sync>;

/// Owner of the current verbosity.
///
/// Without an applier the level is only recorded (useful in tests and
/// when the subscriber cannot be reloaded).
pub struct LogLevel {
    current: Mutex<Verbosity>,
    applier: Option<Applier>,
}

impl LogLevel {
    pub fn new(initial: Verbosity) -> Self {
        Self {
            current: Mutex::new(initial),
            applier: None,
        }
    }

    /// Build with a hook that applies a new filter process-wide.
    pub fn with_applier<F>(initial: Verbosity, applier: F) -> Self
    where
        F: Fn(LevelFilter) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            current: Mutex::new(initial),
            applier: Some(Box::new(applier)),
        }
    }

    pub fn get(&self) -> Verbosity {
        *self.current.lock()
    }

    /// Apply and record a new level. The recorded value only changes if
    /// the applier succeeds.
    pub fn set(&self, level: Verbosity) -> Result<(), CoreError> {
        let mut current = self.current.lock();
        if let Some(apply) = &self.applier {
            apply(level.to_level_filter())
                .map_err(|message| CoreError::LogLevelApply { message })?;
        }
        *current = level;
        Ok(())
    }

    /// Parse `raw` and apply it.
    pub fn set_from_str(&self, raw: &str) -> Result<Verbosity, CoreError> {
        let level = Verbosity::parse(raw)?;
        self.set(level)?;
        Ok(level)
    }
}

impl fmt::Debug for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogLevel")
            .field("current", &self.get())
            .field("applier", &self.applier.is_some())
            .finish()
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::new(Verbosity::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Verbosity::parse("debug").unwrap(), Verbosity::Debug);
        assert_eq!(Verbosity::parse("DEBUG").unwrap(), Verbosity::Debug);
        assert_eq!(Verbosity::parse(" Info ").unwrap(), Verbosity::Info);
    }

    #[test]
    fn warn_is_an_alias() {
        assert_eq!(Verbosity::parse("warn").unwrap(), Verbosity::Warning);
        assert_eq!(Verbosity::Warning.to_string(), "WARNING");
    }

    #[test]
    fn display_parses_back() {
        for v in Verbosity::iter() {
            assert_eq!(Verbosity::parse(&v.to_string()).unwrap(), v);
        }
    }

    #[test]
    fn rejects_garbage() {
        let err = Verbosity::parse("loud").unwrap_err();
        assert!(matches!(err, CoreError::InvalidLogLevel { value } if value == "loud"));
    }

    #[test]
    fn maps_onto_tracing_filters() {
        assert_eq!(Verbosity::Critical.to_level_filter(), LevelFilter::ERROR);
        assert_eq!(Verbosity::Notice.to_level_filter(), LevelFilter::INFO);
        assert_eq!(Verbosity::Trace.to_level_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn installed_filters_map_back() {
        assert_eq!(Verbosity::from(LevelFilter::DEBUG), Verbosity::Debug);
        assert_eq!(Verbosity::from(LevelFilter::WARN), Verbosity::Warning);
        assert_eq!(Verbosity::from(LevelFilter::TRACE), Verbosity::Trace);
        assert_eq!(Verbosity::from(LevelFilter::OFF), Verbosity::Critical);
    }

    #[test]
    fn converts_from_owned_string() {
        assert_eq!(Verbosity::try_from("warn".to_owned()).unwrap(), Verbosity::Warning);
        assert!(Verbosity::try_from("loud".to_owned()).is_err());
    }

    #[test]
    fn set_invokes_applier() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let level = LogLevel::with_applier(Verbosity::Info, move |f| {
            sink.lock().push(f);
            Ok(())
        });

        assert_eq!(level.set_from_str("debug").unwrap(), Verbosity::Debug);
        assert_eq!(level.get(), Verbosity::Debug);
        assert_eq!(*seen.lock(), vec![LevelFilter::DEBUG]);
    }

    #[test]
    fn failed_apply_keeps_previous_level() {
        let level = LogLevel::with_applier(Verbosity::Info, |_| Err("reload failed".into()));
        let err = level.set(Verbosity::Debug).unwrap_err();
        assert!(matches!(err, CoreError::LogLevelApply { .. }));
        assert_eq!(level.get(), Verbosity::Info);
    }

    #[test]
    fn invalid_value_does_not_touch_state() {
        let level = LogLevel::new(Verbosity::Warning);
        assert!(level.set_from_str("nope").is_err());
        assert_eq!(level.get(), Verbosity::Warning);
    }
}
