//! User configuration: where the tracked files are redirected to, and how
//! the plugin logs.
//!
//! The configuration lives in a plain `.ini` next to the other SKSE plugin
//! data (`Data\SKSE\Plugins\SkyrimRedirector.ini`). Loading is
//! read-or-default-then-persist: every key is written back after it is read,
//! so a fresh install produces a fully populated, self-documenting file.
//! Redirection destinations are revalidated on every load -- a configured
//! path that does not refer to an existing, non-directory file is replaced by
//! its default before the redirection core ever sees it.

use std::path::PathBuf;

use log::{LevelFilter, warn};
use thiserror::Error;

/// Directory, relative to the host executable, holding the plugin's config
/// and default log file.
pub const CONFIG_DIR: &str = "Data\\SKSE\\Plugins";

pub const CONFIG_FILE_NAME: &str = "SkyrimRedirector.ini";
pub const LOG_FILE_NAME: &str = "SkyrimRedirector.log";

pub const DEFAULT_LOG_LEVEL: &str = if cfg!(debug_assertions) {
    "TRACE"
} else {
    "INFO"
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the host executable directory")]
    ModuleDir,

    #[error("{0}")]
    System(String),
}

/// `[Logging]` section.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub file: PathBuf,
    pub level: LevelFilter,
    pub append: bool,
}

/// `[Redirection]` section: the validated destination for each tracked file.
#[derive(Debug, Clone)]
pub struct RedirectionConfig {
    pub ini: PathBuf,
    pub prefs_ini: PathBuf,
    pub plugins: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UserConfig {
    pub logging: LoggingConfig,
    pub redirection: RedirectionConfig,
}

/// Parses a configured log level name, case-insensitively. Unrecognized
/// values disable logging.
pub fn parse_level(text: &str) -> LevelFilter {
    if text.eq_ignore_ascii_case("TRACE") {
        LevelFilter::Trace
    } else if text.eq_ignore_ascii_case("DEBUG") {
        LevelFilter::Debug
    } else if text.eq_ignore_ascii_case("INFO") {
        LevelFilter::Info
    } else if text.eq_ignore_ascii_case("WARN") {
        LevelFilter::Warn
    } else if text.eq_ignore_ascii_case("ERROR") {
        LevelFilter::Error
    } else {
        LevelFilter::Off
    }
}

/// Keeps a configured destination only if it refers to an existing,
/// non-directory file; otherwise falls back to the default.
pub fn validate_destination(configured: PathBuf, default: PathBuf) -> PathBuf {
    if configured.is_file() {
        return configured;
    }
    if configured != default {
        warn!(
            "configured redirection target {} does not refer to an existing file, using {}",
            configured.display(),
            default.display()
        );
    }
    if !default.is_file() {
        warn!(
            "redirection target {} does not exist yet",
            default.display()
        );
    }
    default
}

#[cfg(windows)]
impl UserConfig {
    /// Loads the configuration from the plugin's `.ini`, applying and
    /// persisting defaults for missing keys and revalidating every
    /// redirection destination.
    pub fn load() -> Result<UserConfig, ConfigError> {
        loader::load()
    }
}

#[cfg(windows)]
mod loader {
    use std::ffi::c_void;
    use std::path::{Path, PathBuf};

    use windows::Win32::System::Com::CoTaskMemFree;
    use windows::Win32::System::WindowsProgramming::{
        GetPrivateProfileStringW, WritePrivateProfileStringW,
    };
    use windows::Win32::UI::Shell::{
        FOLDERID_Documents, FOLDERID_LocalAppData, KNOWN_FOLDER_FLAG, SHGetKnownFolderPath,
    };
    use windows::core::{GUID, PCWSTR};

    use super::*;

    fn wz(text: &str) -> Vec<u16> {
        let mut wide: Vec<u16> = text.encode_utf16().collect();
        wide.push(0);
        wide
    }

    fn path_wz(path: &Path) -> Vec<u16> {
        let mut wide = crate::strings::path_to_wide(path);
        wide.push(0);
        wide
    }

    fn base_dir() -> Result<PathBuf, ConfigError> {
        let exe = std::env::current_exe().map_err(|_| ConfigError::ModuleDir)?;
        let dir = exe.parent().ok_or(ConfigError::ModuleDir)?;
        Ok(dir.join(CONFIG_DIR))
    }

    fn known_folder(id: *const GUID) -> Result<PathBuf, ConfigError> {
        let buffer = unsafe { SHGetKnownFolderPath(id, KNOWN_FOLDER_FLAG(0), None) }
            .map_err(|err| ConfigError::System(err.to_string()))?;
        let path = unsafe { buffer.to_string() }.map_err(|err| ConfigError::System(err.to_string()));
        unsafe { CoTaskMemFree(Some(buffer.as_ptr() as *const c_void)) };
        Ok(PathBuf::from(path?))
    }

    /// Reads a `.ini` string fully, growing the buffer until the value fits.
    /// A missing or empty key reads as `None`.
    fn read_ini_string(file: &[u16], section: &[u16], key: &[u16]) -> Option<String> {
        let mut capacity = 256usize;
        loop {
            let mut buffer = vec![0u16; capacity];
            let len = unsafe {
                GetPrivateProfileStringW(
                    PCWSTR(section.as_ptr()),
                    PCWSTR(key.as_ptr()),
                    PCWSTR::null(),
                    Some(&mut buffer),
                    PCWSTR(file.as_ptr()),
                )
            } as usize;

            if len + 1 >= capacity {
                capacity *= 2;
                continue;
            }
            if len == 0 {
                return None;
            }
            buffer.truncate(len);
            return Some(String::from_utf16_lossy(&buffer));
        }
    }

    fn write_ini_string(file: &[u16], section: &[u16], key: &[u16], value: &str) {
        let value = wz(value);
        let _ = unsafe {
            WritePrivateProfileStringW(
                PCWSTR(section.as_ptr()),
                PCWSTR(key.as_ptr()),
                PCWSTR(value.as_ptr()),
                PCWSTR(file.as_ptr()),
            )
        };
    }

    /// Read-or-default-then-persist: the effective value is always written
    /// back so the config file documents itself.
    fn read_or(file: &[u16], section: &str, key: &str, default: &str) -> String {
        let section = wz(section);
        let key = wz(key);
        let value =
            read_ini_string(file, &section, &key).unwrap_or_else(|| default.to_string());
        write_ini_string(file, &section, &key, &value);
        value
    }

    pub(super) fn load() -> Result<UserConfig, ConfigError> {
        let base = base_dir()?;
        let file = path_wz(&base.join(CONFIG_FILE_NAME));

        let documents = known_folder(&FOLDERID_Documents)?;
        let local_app_data = known_folder(&FOLDERID_LocalAppData)?;

        let default_log = base.join(LOG_FILE_NAME);
        let default_ini = documents.join("My Games\\Enderal\\Enderal.ini");
        let default_prefs_ini = documents.join("My Games\\Enderal\\EnderalPrefs.ini");
        let default_plugins = local_app_data.join("Enderal\\plugins.txt");

        let logging = LoggingConfig {
            file: PathBuf::from(read_or(
                &file,
                "Logging",
                "File",
                &default_log.to_string_lossy(),
            )),
            level: parse_level(&read_or(&file, "Logging", "Level", DEFAULT_LOG_LEVEL)),
            append: read_or(&file, "Logging", "Append", "TRUE").eq_ignore_ascii_case("TRUE"),
        };

        let redirection = RedirectionConfig {
            ini: validate_destination(
                PathBuf::from(read_or(
                    &file,
                    "Redirection",
                    "Ini",
                    &default_ini.to_string_lossy(),
                )),
                default_ini,
            ),
            prefs_ini: validate_destination(
                PathBuf::from(read_or(
                    &file,
                    "Redirection",
                    "PrefsIni",
                    &default_prefs_ini.to_string_lossy(),
                )),
                default_prefs_ini,
            ),
            plugins: validate_destination(
                PathBuf::from(read_or(
                    &file,
                    "Redirection",
                    "Plugins",
                    &default_plugins.to_string_lossy(),
                )),
                default_plugins,
            ),
        };

        Ok(UserConfig {
            logging,
            redirection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parse_level_is_case_insensitive() {
        assert_eq!(parse_level("trace"), LevelFilter::Trace);
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("Info"), LevelFilter::Info);
        assert_eq!(parse_level("waRN"), LevelFilter::Warn);
        assert_eq!(parse_level("ERROR"), LevelFilter::Error);
        assert_eq!(parse_level("verbose"), LevelFilter::Off);
    }

    #[test]
    fn validate_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let configured = dir.path().join("Enderal.ini");
        fs::write(&configured, "[Display]\n").unwrap();

        let default = dir.path().join("default.ini");
        assert_eq!(
            validate_destination(configured.clone(), default),
            configured
        );
    }

    #[test]
    fn validate_falls_back_when_missing() {
        let dir = TempDir::new().unwrap();
        let configured = dir.path().join("nope.ini");
        let default = dir.path().join("default.ini");
        fs::write(&default, "").unwrap();

        assert_eq!(
            validate_destination(configured, default.clone()),
            default
        );
    }

    #[test]
    fn validate_rejects_directories() {
        let dir = TempDir::new().unwrap();
        let configured = dir.path().join("a-directory");
        fs::create_dir(&configured).unwrap();
        let default = dir.path().join("default.ini");
        fs::write(&default, "").unwrap();

        assert_eq!(
            validate_destination(configured, default.clone()),
            default
        );
    }
}
