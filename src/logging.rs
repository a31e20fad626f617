//! File logging via `simplelog`.

use std::fs::{File, OpenOptions};
use std::io;

use log::LevelFilter;
use simplelog::WriteLogger;

use crate::config::LoggingConfig;

/// Initializes the global logger from the `[Logging]` configuration.
///
/// A level of `Off` skips initialization entirely. Failures are reported to
/// the caller but are never fatal: the plugin redirects with or without a
/// log file.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    if config.level == LevelFilter::Off {
        return Ok(());
    }

    let file = if config.append {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&config.file)?
    } else {
        File::create(&config.file)?
    };

    WriteLogger::init(config.level, simplelog::Config::default(), file)
        .map_err(|err| io::Error::other(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn off_level_skips_initialization() {
        let config = LoggingConfig {
            file: PathBuf::from("/nonexistent/dir/never-created.log"),
            level: LevelFilter::Off,
            append: true,
        };
        assert!(init(&config).is_ok());
    }

    #[test]
    fn unwritable_path_reports_an_error() {
        let config = LoggingConfig {
            file: PathBuf::from("/nonexistent/dir/out.log"),
            level: LevelFilter::Info,
            append: false,
        };
        assert!(init(&config).is_err());
    }
}
