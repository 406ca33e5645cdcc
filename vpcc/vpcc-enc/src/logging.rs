//! Optional logger setup for applications embedding the encoder.
//!
//! The core only emits through the `log` facade, with the pipeline
//! component as the record target ("PATCH GENERATION", "MAP ENCODING", ...).
//! Installing a sink is the application's choice; this helper builds a
//! `fern` dispatcher matching the encoder's `logLevel` parameter.

use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

/// Map the `logLevel` parameter value onto a `log` filter.
///
/// FATAL has no direct `log` counterpart; fatal conditions are ERROR
/// records followed by a fatal `Err`, so both names map to `Error`.
pub fn level_filter(log_level: &str) -> LevelFilter {
    match log_level {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARNING" => LevelFilter::Warn,
        "ERROR" | "FATAL" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Build a colored stderr dispatcher tagging every record with its
/// component target. Apply it with `.apply()`; doing so twice in one
/// process fails, so this is left to the caller.
pub fn default_dispatch(log_level: &str) -> fern::Dispatch {
    let colors = ColoredLevelConfig::new()
        .warn(Color::Yellow)
        .error(Color::Red)
        .trace(Color::BrightBlack);

    fern::Dispatch::new()
        .level(level_filter(log_level))
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}] [{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_round_trip() {
        assert_eq!(level_filter("TRACE"), LevelFilter::Trace);
        assert_eq!(level_filter("WARNING"), LevelFilter::Warn);
        assert_eq!(level_filter("FATAL"), LevelFilter::Error);
        assert_eq!(level_filter("nonsense"), LevelFilter::Info);
    }
}
