//! Tracing setup with a reloadable filter.
//!
//! The filter layer sits behind a `reload` handle so the root's
//! `LogLevel` property can change verbosity while the daemon runs.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Registry, fmt, reload};

use protobus_core::{LogLevel, Verbosity};

/// Handle used to swap the active filter.
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over everything for the initial filter; otherwise
/// `-v` flags raise the configured level. Returns the reload handle and
/// the verbosity the installed filter actually runs at.
pub fn init_tracing(verbosity: u8, configured: Verbosity) -> (FilterHandle, Verbosity) {
    let (filter, active) =
        initial_filter(verbosity, configured, EnvFilter::try_from_default_env().ok());
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    (handle, active)
}

fn initial_filter(
    verbosity: u8,
    configured: Verbosity,
    from_env: Option<EnvFilter>,
) -> (EnvFilter, Verbosity) {
    if let Some(filter) = from_env {
        let active = filter.max_level_hint().map_or(configured, Verbosity::from);
        return (filter, active);
    }

    let active = match verbosity {
        0 => configured,
        1 if configured.to_level_filter() >= LevelFilter::INFO => configured,
        1 => Verbosity::Info,
        2 => Verbosity::Debug,
        _ => Verbosity::Trace,
    };
    let filter = EnvFilter::default().add_directive(active.to_level_filter().into());
    (filter, active)
}

/// Build the process-wide `LogLevel`, wired to reload `handle`.
pub fn log_level(initial: Verbosity, handle: FilterHandle) -> LogLevel {
    LogLevel::with_applier(initial, move |level| {
        handle
            .reload(EnvFilter::default().add_directive(level.into()))
            .map_err(|e| e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_kept_without_flags() {
        let (_, active) = initial_filter(0, Verbosity::Notice, None);
        assert_eq!(active, Verbosity::Notice);
    }

    #[test]
    fn verbose_flags_raise_the_reported_level() {
        assert_eq!(initial_filter(1, Verbosity::Warning, None).1, Verbosity::Info);
        assert_eq!(initial_filter(1, Verbosity::Debug, None).1, Verbosity::Debug);
        assert_eq!(initial_filter(2, Verbosity::Warning, None).1, Verbosity::Debug);
        assert_eq!(initial_filter(3, Verbosity::Warning, None).1, Verbosity::Trace);
    }

    #[test]
    fn env_filter_wins_and_is_reported() {
        let env = EnvFilter::new("debug");
        let (filter, active) = initial_filter(0, Verbosity::Warning, Some(env));
        assert_eq!(active, Verbosity::Debug);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
