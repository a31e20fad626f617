//! String utilities shared by the matcher and the codepage bridge.
//!
//! The redirector has to compare and substitute paths in both the narrow
//! (`u8`) and wide (`u16`) Win32 encodings without allocating at call time,
//! so everything here is generic over the code unit. Case folding is
//! ASCII-only on purpose: tracked file names are ASCII and the comparison
//! must be locale-invariant, not locale-aware.

use std::ffi::CString;
use std::path::Path;

/// A single code unit of a narrow or wide Win32 string.
pub trait CodeUnit: Copy + Eq {
    const NUL: Self;
    const BACKSLASH: Self;
    const SLASH: Self;

    /// Invariant (ASCII-only) uppercase fold.
    fn fold(self) -> Self;
}

impl CodeUnit for u8 {
    const NUL: Self = 0;
    const BACKSLASH: Self = b'\\';
    const SLASH: Self = b'/';

    fn fold(self) -> Self {
        self.to_ascii_uppercase()
    }
}

impl CodeUnit for u16 {
    const NUL: Self = 0;
    const BACKSLASH: Self = b'\\' as u16;
    const SLASH: Self = b'/' as u16;

    fn fold(self) -> Self {
        if (b'a' as u16..=b'z' as u16).contains(&self) {
            self - 0x20
        } else {
            self
        }
    }
}

/// Returns the final path component: the text after the last `\` or `/`,
/// or the whole string if neither separator occurs.
pub fn file_name<U: CodeUnit>(path: &[U]) -> &[U] {
    match path
        .iter()
        .rposition(|&u| u == U::BACKSLASH || u == U::SLASH)
    {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Case-insensitive equality under the invariant fold.
pub fn eq_ignore_case<U: CodeUnit>(a: &[U], b: &[U]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| x.fold() == y.fold())
}

/// Reads a nul-terminated string into a slice, excluding the terminator.
///
/// # Safety
/// `ptr` must be non-null and point to a valid nul-terminated string.
pub unsafe fn nul_terminated<'a, U: CodeUnit>(ptr: *const U) -> &'a [U] {
    let mut len = 0usize;
    unsafe {
        while *ptr.add(len) != U::NUL {
            len += 1;
        }
        std::slice::from_raw_parts(ptr, len)
    }
}

/// Encodes a path as UTF-16 code units, without a terminator.
pub fn path_to_wide(path: &Path) -> Vec<u16> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        path.as_os_str().encode_wide().collect()
    }
    #[cfg(not(windows))]
    {
        path.to_string_lossy().encode_utf16().collect()
    }
}

/// Converts a wide string (no terminator) to a nul-terminated UTF-8 string.
///
/// Conversion anomalies yield an empty string rather than an error; inputs
/// come from trusted configuration and are not expected to be malformed.
pub fn utf16_to_utf8(wide: &[u16]) -> CString {
    CString::new(String::from_utf16_lossy(wide)).unwrap_or_default()
}

/// Converts a wide string (no terminator) to a nul-terminated string in the
/// local Windows ANSI codepage. A conversion reporting zero required bytes
/// yields an empty string.
#[cfg(windows)]
pub fn utf16_to_codepage(wide: &[u16]) -> CString {
    use windows::Win32::Globalization::{CP_ACP, WideCharToMultiByte};
    use windows::core::PCSTR;

    if wide.is_empty() {
        return CString::default();
    }

    let needed = unsafe { WideCharToMultiByte(CP_ACP, 0, wide, None, PCSTR::null(), None) };
    if needed <= 0 {
        return CString::default();
    }

    let mut buffer = vec![0u8; needed as usize];
    let written =
        unsafe { WideCharToMultiByte(CP_ACP, 0, wide, Some(&mut buffer), PCSTR::null(), None) };
    if written <= 0 {
        return CString::default();
    }

    buffer.truncate(written as usize);
    CString::new(buffer).unwrap_or_default()
}

/// Non-Windows stand-in so the bridge stays testable: the local codepage
/// mirror is simply the UTF-8 mirror.
#[cfg(not(windows))]
pub fn utf16_to_codepage(wide: &[u16]) -> CString {
    utf16_to_utf8(wide)
}
