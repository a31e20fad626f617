//! The path matcher: decides whether an intercepted path names one of the
//! tracked files and, if so, supplies the replacement.
//!
//! Matching contract: the final path component (text after the last `\` or
//! `/`) is compared case-insensitively, under an invariant ASCII fold, against
//! each tracked file name in priority order. Matching is by trailing file name
//! equality only -- a path whose component merely *contains* a tracked name is
//! not redirected. Directory prefixes are ignored entirely: any path anywhere
//! ending in a tracked file name is redirected.

use crate::strings::{self, CodeUnit};

use super::targets::{RedirectionTargets, Target};

/// A borrowed path in either Win32 encoding, as presented to a hooked call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRef<'a> {
    Narrow(&'a [u8]),
    Wide(&'a [u16]),
}

fn lookup<'t, U, S>(targets: &'t RedirectionTargets, path: &[U], source: S) -> Option<&'t Target>
where
    U: CodeUnit,
    S: Fn(&Target) -> &[U],
{
    let name = strings::file_name(path);
    targets
        .entries
        .iter()
        .find(|target| strings::eq_ignore_case(name, source(target)))
}

impl RedirectionTargets {
    /// Resolves a path in either encoding: the configured destination for a
    /// tracked file name, or the input unchanged (identity passthrough).
    ///
    /// Returned destinations borrow from this table and must not be freed.
    pub fn resolve<'a>(&'a self, path: PathRef<'a>) -> PathRef<'a> {
        match path {
            PathRef::Narrow(p) => PathRef::Narrow(self.resolve_narrow(p).unwrap_or(p)),
            PathRef::Wide(p) => PathRef::Wide(self.resolve_wide(p).unwrap_or(p)),
        }
    }

    /// Wide-encoding lookup. The returned slice includes the trailing nul so
    /// hooked calls can pass its pointer straight to the original function.
    pub fn resolve_wide(&self, path: &[u16]) -> Option<&[u16]> {
        lookup(self, path, |t| t.source_wide.as_slice()).map(|t| t.wide.as_slice())
    }

    /// Narrow-encoding lookup; the destination is the local-codepage mirror.
    pub fn resolve_narrow(&self, path: &[u8]) -> Option<&[u8]> {
        lookup(self, path, |t| t.source_narrow.as_slice()).map(|t| t.ansi.to_bytes_with_nul())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedirectionConfig;
    use std::path::PathBuf;

    const INI_DEST: &str = "C:\\Users\\me\\Documents\\My Games\\Enderal\\Enderal.ini";
    const PREFS_DEST: &str = "C:\\Users\\me\\Documents\\My Games\\Enderal\\EnderalPrefs.ini";
    const PLUGINS_DEST: &str = "C:\\Users\\me\\AppData\\Local\\Enderal\\plugins.txt";

    fn targets() -> RedirectionTargets {
        RedirectionTargets::new(&RedirectionConfig {
            ini: PathBuf::from(INI_DEST),
            prefs_ini: PathBuf::from(PREFS_DEST),
            plugins: PathBuf::from(PLUGINS_DEST),
        })
    }

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn wide_z(s: &str) -> Vec<u16> {
        let mut w = wide(s);
        w.push(0);
        w
    }

    #[test]
    fn tracked_name_is_redirected_regardless_of_directory() {
        let targets = targets();
        for path in [
            "Skyrim.ini",
            "C:\\Games\\Skyrim\\Skyrim.ini",
            "D:\\anywhere/at/all/Skyrim.ini",
        ] {
            let resolved = targets.resolve_wide(&wide(path)).expect("redirected");
            assert_eq!(resolved, wide_z(INI_DEST).as_slice());
        }
    }

    #[test]
    fn match_is_case_insensitive_and_invariant() {
        let targets = targets();
        let upper = targets.resolve_wide(&wide("C:\\X\\SKYRIM.INI"));
        let lower = targets.resolve_wide(&wide("C:\\X\\skyrim.ini"));
        assert_eq!(upper, lower);
        assert!(upper.is_some());
    }

    #[test]
    fn untracked_final_component_is_identity() {
        let targets = targets();
        for path in [
            "C:\\Games\\Skyrim\\Skyrim.esm",
            "C:\\Games\\Skyrim.ini\\textures.bsa",
            "plugins.txt.bak",
        ] {
            assert!(targets.resolve_wide(&wide(path)).is_none());
            assert!(targets.resolve_narrow(path.as_bytes()).is_none());
            let input = PathRef::Narrow(path.as_bytes());
            assert_eq!(targets.resolve(input), input);
        }
    }

    #[test]
    fn containment_is_not_a_match() {
        // Trailing file-name equality is the documented contract: a component
        // that merely ends with a tracked name is untouched.
        let targets = targets();
        assert!(targets.resolve_wide(&wide("C:\\X\\NotSkyrim.ini")).is_none());
        assert!(targets.resolve_narrow(b"C:\\X\\myplugins.txt").is_none());
    }

    #[test]
    fn each_tracked_file_maps_to_its_own_destination() {
        let targets = targets();
        let cases = [
            ("C:\\S\\Skyrim.ini", INI_DEST),
            ("C:\\S\\SkyrimPrefs.ini", PREFS_DEST),
            ("C:\\S\\plugins.txt", PLUGINS_DEST),
        ];
        for (input, destination) in cases {
            assert_eq!(
                targets.resolve_wide(&wide(input)),
                Some(wide_z(destination).as_slice())
            );
        }
    }

    #[test]
    fn narrow_match_returns_nul_terminated_codepage_mirror() {
        let targets = targets();
        let resolved = targets
            .resolve_narrow(b"c:\\games\\PLUGINS.TXT")
            .expect("redirected");
        assert_eq!(resolved.last(), Some(&0));
        // Off Windows the codepage mirror is the UTF-8 mirror, so the bytes
        // are directly comparable.
        assert_eq!(&resolved[..resolved.len() - 1], PLUGINS_DEST.as_bytes());
    }

    #[test]
    fn wide_resolution_preserves_encoding_of_input() {
        let targets = targets();
        let input = wide("Skyrim.ini");
        match targets.resolve(PathRef::Wide(&input)) {
            PathRef::Wide(w) => assert_eq!(w, wide_z(INI_DEST).as_slice()),
            PathRef::Narrow(_) => panic!("wide input must resolve to wide output"),
        }
    }
}
