//! The active set of (tracked file name -> destination path) mappings.
//!
//! Each destination is materialized in three encodings at build time -- wide
//! (UTF-16), UTF-8, and the local ANSI codepage -- so that both narrow and
//! wide API variants can be served without converting or allocating inside a
//! hooked call. The three mirrors are created together in one constructor and
//! freed together when the value drops; they are never mutated independently.

use std::ffi::{CStr, CString};
use std::path::Path;

use crate::config::RedirectionConfig;
use crate::strings;

/// Tracked source file names, in match priority order.
pub const TRACKED_FILES: [&str; 3] = ["Skyrim.ini", "SkyrimPrefs.ini", "plugins.txt"];

/// One tracked file and its destination in every encoding the hooked APIs
/// can present.
#[derive(Debug)]
pub(crate) struct Target {
    /// Tracked source file name, as narrow and wide code units.
    pub(crate) source_narrow: Vec<u8>,
    pub(crate) source_wide: Vec<u16>,
    /// Destination path, UTF-16 with a trailing nul.
    pub(crate) wide: Vec<u16>,
    /// Destination path, UTF-8.
    pub(crate) utf8: CString,
    /// Destination path, local ANSI codepage.
    pub(crate) ansi: CString,
}

impl Target {
    fn build(source: &str, destination: &Path) -> Self {
        let wide_body = strings::path_to_wide(destination);
        let utf8 = strings::utf16_to_utf8(&wide_body);
        let ansi = strings::utf16_to_codepage(&wide_body);

        let mut wide = wide_body;
        wide.push(0);

        Target {
            source_narrow: source.as_bytes().to_vec(),
            source_wide: source.encode_utf16().collect(),
            wide,
            utf8,
            ansi,
        }
    }
}

/// The redirection targets for one attach cycle.
///
/// Built from the user configuration whenever the redirection table is
/// (re)built, released with it on detach. Lookups borrow from this value;
/// callers never free what they are handed.
#[derive(Debug)]
pub struct RedirectionTargets {
    pub(crate) entries: Vec<Target>,
}

impl RedirectionTargets {
    pub fn new(config: &RedirectionConfig) -> Self {
        let mapping: [(&str, &Path); 3] = [
            (TRACKED_FILES[0], &config.ini),
            (TRACKED_FILES[1], &config.prefs_ini),
            (TRACKED_FILES[2], &config.plugins),
        ];

        RedirectionTargets {
            entries: mapping
                .iter()
                .map(|(source, destination)| Target::build(source, destination))
                .collect(),
        }
    }

    /// The UTF-8 destination for a tracked source file name, used for
    /// diagnostics.
    pub fn utf8_destination(&self, source: &str) -> Option<&CStr> {
        self.entries
            .iter()
            .find(|t| strings::eq_ignore_case(&t.source_narrow, source.as_bytes()))
            .map(|t| t.utf8.as_c_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> RedirectionConfig {
        RedirectionConfig {
            ini: PathBuf::from("C:\\Enderal\\Enderal.ini"),
            prefs_ini: PathBuf::from("C:\\Enderal\\EnderalPrefs.ini"),
            plugins: PathBuf::from("C:\\Enderal\\plugins.txt"),
        }
    }

    #[test]
    fn builds_one_target_per_tracked_file() {
        let targets = RedirectionTargets::new(&config());
        assert_eq!(targets.entries.len(), TRACKED_FILES.len());
        for (target, source) in targets.entries.iter().zip(TRACKED_FILES) {
            assert_eq!(target.source_narrow, source.as_bytes());
        }
    }

    #[test]
    fn encodings_are_built_in_lockstep() {
        let targets = RedirectionTargets::new(&config());
        for target in &targets.entries {
            assert_eq!(target.wide.last(), Some(&0), "wide mirror must end in nul");
            assert!(!target.utf8.to_bytes().is_empty());
            assert!(!target.ansi.to_bytes().is_empty());

            let from_wide = String::from_utf16_lossy(&target.wide[..target.wide.len() - 1]);
            assert_eq!(from_wide.as_bytes(), target.utf8.to_bytes());
        }
    }

    #[test]
    fn utf8_destination_is_case_insensitive_on_source() {
        let targets = RedirectionTargets::new(&config());
        let dest = targets.utf8_destination("SKYRIM.INI").expect("tracked");
        assert_eq!(dest.to_bytes(), b"C:\\Enderal\\Enderal.ini");
        assert!(targets.utf8_destination("Skyrim.esm").is_none());
    }
}
