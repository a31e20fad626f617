//! The redirect trampolines for every tracked Win32 function.
//!
//! Each tracked function gets an `extern "system"` trampoline with the exact
//! signature of the API it replaces, plus a call-through slot that receives
//! the original's reachable address when the patch transaction commits. A
//! trampoline passes every path-bearing argument through the path matcher
//! independently, then tail-calls the original with the (possibly
//! substituted) arguments; results and error state pass through untouched.
//!
//! The whole set is declared once in the [`redirect_hooks!`] invocation
//! below, which doubles as the data-driven registration list iterated at
//! table-build time. The tracked set is a design constant, not configurable
//! at runtime.

#![allow(non_camel_case_types)]

use std::ffi::{CString, c_void};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};
use windows::Win32::Foundation::{BOOL, BOOLEAN, HANDLE, HMODULE};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::core::{PCSTR, PCWSTR, PSTR, PWSTR, w};

use crate::config::UserConfig;
use crate::strings;

use super::table::{HookDef, RedirectionTable, SymbolResolver, TableBuilder};
use super::targets::{RedirectionTargets, TRACKED_FILES};
use super::RedirectError;

// Pointer-shaped Win32 types the trampolines only forward, never inspect.
type PSECURITY_ATTRIBUTES = *mut c_void;
type LPPROGRESS_ROUTINE = *mut c_void;
type LPOFSTRUCT = *mut c_void;
type GET_FILEEX_INFO_LEVELS = i32;
type HFILE = i32;

/// The targets consulted by the trampolines. Published by the lifecycle glue
/// around attach/detach; `None` means every call passes through unredirected.
static ACTIVE_TARGETS: RwLock<Option<Arc<RedirectionTargets>>> = RwLock::new(None);

pub(crate) fn set_active_targets(targets: Option<Arc<RedirectionTargets>>) {
    let mut guard = ACTIVE_TARGETS
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *guard = targets;
}

fn active_targets() -> Option<Arc<RedirectionTargets>> {
    ACTIVE_TARGETS.read().ok()?.clone()
}

/// Tries to redirect a wide path. If the path can't be redirected, it is
/// returned unchanged. The returned pointer borrows table storage kept alive
/// by the caller's `Arc` and must not be freed.
fn try_redirect_w(targets: Option<&RedirectionTargets>, input: PCWSTR) -> PCWSTR {
    let Some(targets) = targets else { return input };
    if input.is_null() {
        return input;
    }
    let path = unsafe { strings::nul_terminated(input.0) };
    match targets.resolve_wide(path) {
        Some(destination) => PCWSTR(destination.as_ptr()),
        None => input,
    }
}

/// Narrow counterpart of [`try_redirect_w`]; destinations come from the
/// local-codepage mirror.
fn try_redirect_a(targets: Option<&RedirectionTargets>, input: PCSTR) -> PCSTR {
    let Some(targets) = targets else { return input };
    if input.is_null() {
        return input;
    }
    let path = unsafe { strings::nul_terminated(input.0) };
    match targets.resolve_narrow(path) {
        Some(destination) => PCSTR(destination.as_ptr()),
        None => input,
    }
}

macro_rules! redirect_arg {
    (narrow, $targets:expr, $arg:expr) => {
        try_redirect_a($targets, $arg)
    };
    (wide, $targets:expr, $arg:expr) => {
        try_redirect_w($targets, $arg)
    };
}

/// Declares, for every tracked function: its call-through slot, its
/// trampoline, and its row in the registration list returned by
/// [`hook_defs`]. Arguments marked `=> narrow` / `=> wide` are passed through
/// the path matcher; everything else is forwarded verbatim.
macro_rules! redirect_hooks {
    ($(
        $slot:ident: $sym:literal =>
        fn $name:ident( $($arg:ident : $ty:ty $(=> $enc:ident)?),* $(,)? ) -> $ret:ty;
    )*) => {
        $(
            static $slot: AtomicPtr<c_void> = AtomicPtr::new(ptr::null_mut());

            unsafe extern "system" fn $name($($arg: $ty),*) -> $ret {
                let targets = active_targets();
                $($(let $arg = redirect_arg!($enc, targets.as_deref(), $arg);)?)*
                let original: unsafe extern "system" fn($($ty),*) -> $ret =
                    unsafe { std::mem::transmute($slot.load(Ordering::Acquire)) };
                unsafe { original($($arg),*) }
            }
        )*

        /// The registration list: one `(name, trampoline, slot)` triple per
        /// tracked function, iterated at table-build time.
        pub(crate) fn hook_defs() -> Vec<HookDef> {
            vec![$(
                HookDef {
                    name: $sym,
                    replacement: {
                        let f: unsafe extern "system" fn($($ty),*) -> $ret = $name;
                        f as *mut c_void
                    },
                    slot: &$slot,
                },
            )*]
        }
    };
}

redirect_hooks! {
    CREATE_FILE_A: "CreateFileA" =>
        fn create_file_a(
            file_name: PCSTR => narrow,
            desired_access: u32,
            share_mode: u32,
            security: PSECURITY_ATTRIBUTES,
            creation_disposition: u32,
            flags_and_attributes: u32,
            template_file: HANDLE,
        ) -> HANDLE;

    CREATE_FILE_W: "CreateFileW" =>
        fn create_file_w(
            file_name: PCWSTR => wide,
            desired_access: u32,
            share_mode: u32,
            security: PSECURITY_ATTRIBUTES,
            creation_disposition: u32,
            flags_and_attributes: u32,
            template_file: HANDLE,
        ) -> HANDLE;

    OPEN_FILE: "OpenFile" =>
        fn open_file(
            file_name: PCSTR => narrow,
            reopen_buff: LPOFSTRUCT,
            style: u32,
        ) -> HFILE;

    DELETE_FILE_A: "DeleteFileA" =>
        fn delete_file_a(file_name: PCSTR => narrow) -> BOOL;

    DELETE_FILE_W: "DeleteFileW" =>
        fn delete_file_w(file_name: PCWSTR => wide) -> BOOL;

    COPY_FILE_A: "CopyFileA" =>
        fn copy_file_a(
            existing_file_name: PCSTR => narrow,
            new_file_name: PCSTR => narrow,
            fail_if_exists: BOOL,
        ) -> BOOL;

    COPY_FILE_W: "CopyFileW" =>
        fn copy_file_w(
            existing_file_name: PCWSTR => wide,
            new_file_name: PCWSTR => wide,
            fail_if_exists: BOOL,
        ) -> BOOL;

    COPY_FILE_EX_A: "CopyFileExA" =>
        fn copy_file_ex_a(
            existing_file_name: PCSTR => narrow,
            new_file_name: PCSTR => narrow,
            progress_routine: LPPROGRESS_ROUTINE,
            data: *mut c_void,
            cancel: *mut BOOL,
            copy_flags: u32,
        ) -> BOOL;

    COPY_FILE_EX_W: "CopyFileExW" =>
        fn copy_file_ex_w(
            existing_file_name: PCWSTR => wide,
            new_file_name: PCWSTR => wide,
            progress_routine: LPPROGRESS_ROUTINE,
            data: *mut c_void,
            cancel: *mut BOOL,
            copy_flags: u32,
        ) -> BOOL;

    MOVE_FILE_A: "MoveFileA" =>
        fn move_file_a(
            existing_file_name: PCSTR => narrow,
            new_file_name: PCSTR => narrow,
        ) -> BOOL;

    MOVE_FILE_W: "MoveFileW" =>
        fn move_file_w(
            existing_file_name: PCWSTR => wide,
            new_file_name: PCWSTR => wide,
        ) -> BOOL;

    MOVE_FILE_EX_A: "MoveFileExA" =>
        fn move_file_ex_a(
            existing_file_name: PCSTR => narrow,
            new_file_name: PCSTR => narrow,
            flags: u32,
        ) -> BOOL;

    MOVE_FILE_EX_W: "MoveFileExW" =>
        fn move_file_ex_w(
            existing_file_name: PCWSTR => wide,
            new_file_name: PCWSTR => wide,
            flags: u32,
        ) -> BOOL;

    MOVE_FILE_WITH_PROGRESS_A: "MoveFileWithProgressA" =>
        fn move_file_with_progress_a(
            existing_file_name: PCSTR => narrow,
            new_file_name: PCSTR => narrow,
            progress_routine: LPPROGRESS_ROUTINE,
            data: *mut c_void,
            flags: u32,
        ) -> BOOL;

    MOVE_FILE_WITH_PROGRESS_W: "MoveFileWithProgressW" =>
        fn move_file_with_progress_w(
            existing_file_name: PCWSTR => wide,
            new_file_name: PCWSTR => wide,
            progress_routine: LPPROGRESS_ROUTINE,
            data: *mut c_void,
            flags: u32,
        ) -> BOOL;

    CREATE_HARD_LINK_A: "CreateHardLinkA" =>
        fn create_hard_link_a(
            file_name: PCSTR => narrow,
            existing_file_name: PCSTR => narrow,
            security: PSECURITY_ATTRIBUTES,
        ) -> BOOL;

    CREATE_HARD_LINK_W: "CreateHardLinkW" =>
        fn create_hard_link_w(
            file_name: PCWSTR => wide,
            existing_file_name: PCWSTR => wide,
            security: PSECURITY_ATTRIBUTES,
        ) -> BOOL;

    CREATE_SYMBOLIC_LINK_A: "CreateSymbolicLinkA" =>
        fn create_symbolic_link_a(
            symlink_file_name: PCSTR => narrow,
            target_file_name: PCSTR => narrow,
            flags: u32,
        ) -> BOOLEAN;

    CREATE_SYMBOLIC_LINK_W: "CreateSymbolicLinkW" =>
        fn create_symbolic_link_w(
            symlink_file_name: PCWSTR => wide,
            target_file_name: PCWSTR => wide,
            flags: u32,
        ) -> BOOLEAN;

    GET_PRIVATE_PROFILE_SECTION_A: "GetPrivateProfileSectionA" =>
        fn get_private_profile_section_a(
            app_name: PCSTR,
            returned_string: PSTR,
            size: u32,
            file_name: PCSTR => narrow,
        ) -> u32;

    GET_PRIVATE_PROFILE_SECTION_W: "GetPrivateProfileSectionW" =>
        fn get_private_profile_section_w(
            app_name: PCWSTR,
            returned_string: PWSTR,
            size: u32,
            file_name: PCWSTR => wide,
        ) -> u32;

    GET_PRIVATE_PROFILE_STRING_A: "GetPrivateProfileStringA" =>
        fn get_private_profile_string_a(
            app_name: PCSTR,
            key_name: PCSTR,
            default: PCSTR,
            returned_string: PSTR,
            size: u32,
            file_name: PCSTR => narrow,
        ) -> u32;

    GET_PRIVATE_PROFILE_STRING_W: "GetPrivateProfileStringW" =>
        fn get_private_profile_string_w(
            app_name: PCWSTR,
            key_name: PCWSTR,
            default: PCWSTR,
            returned_string: PWSTR,
            size: u32,
            file_name: PCWSTR => wide,
        ) -> u32;

    GET_PRIVATE_PROFILE_INT_A: "GetPrivateProfileIntA" =>
        fn get_private_profile_int_a(
            app_name: PCSTR,
            key_name: PCSTR,
            default: i32,
            file_name: PCSTR => narrow,
        ) -> u32;

    GET_PRIVATE_PROFILE_INT_W: "GetPrivateProfileIntW" =>
        fn get_private_profile_int_w(
            app_name: PCWSTR,
            key_name: PCWSTR,
            default: i32,
            file_name: PCWSTR => wide,
        ) -> u32;

    GET_PRIVATE_PROFILE_STRUCT_A: "GetPrivateProfileStructA" =>
        fn get_private_profile_struct_a(
            section: PCSTR,
            key: PCSTR,
            out_struct: *mut c_void,
            size_struct: u32,
            file: PCSTR => narrow,
        ) -> BOOL;

    GET_PRIVATE_PROFILE_STRUCT_W: "GetPrivateProfileStructW" =>
        fn get_private_profile_struct_w(
            section: PCWSTR,
            key: PCWSTR,
            out_struct: *mut c_void,
            size_struct: u32,
            file: PCWSTR => wide,
        ) -> BOOL;

    GET_PRIVATE_PROFILE_SECTION_NAMES_A: "GetPrivateProfileSectionNamesA" =>
        fn get_private_profile_section_names_a(
            return_buffer: PSTR,
            size: u32,
            file_name: PCSTR => narrow,
        ) -> u32;

    GET_PRIVATE_PROFILE_SECTION_NAMES_W: "GetPrivateProfileSectionNamesW" =>
        fn get_private_profile_section_names_w(
            return_buffer: PWSTR,
            size: u32,
            file_name: PCWSTR => wide,
        ) -> u32;

    WRITE_PRIVATE_PROFILE_SECTION_A: "WritePrivateProfileSectionA" =>
        fn write_private_profile_section_a(
            app_name: PCSTR,
            string: PCSTR,
            file_name: PCSTR => narrow,
        ) -> BOOL;

    WRITE_PRIVATE_PROFILE_SECTION_W: "WritePrivateProfileSectionW" =>
        fn write_private_profile_section_w(
            app_name: PCWSTR,
            string: PCWSTR,
            file_name: PCWSTR => wide,
        ) -> BOOL;

    WRITE_PRIVATE_PROFILE_STRING_A: "WritePrivateProfileStringA" =>
        fn write_private_profile_string_a(
            app_name: PCSTR,
            key_name: PCSTR,
            string: PCSTR,
            file_name: PCSTR => narrow,
        ) -> BOOL;

    WRITE_PRIVATE_PROFILE_STRING_W: "WritePrivateProfileStringW" =>
        fn write_private_profile_string_w(
            app_name: PCWSTR,
            key_name: PCWSTR,
            string: PCWSTR,
            file_name: PCWSTR => wide,
        ) -> BOOL;

    WRITE_PRIVATE_PROFILE_STRUCT_A: "WritePrivateProfileStructA" =>
        fn write_private_profile_struct_a(
            section: PCSTR,
            key: PCSTR,
            in_struct: *mut c_void,
            size_struct: u32,
            file: PCSTR => narrow,
        ) -> BOOL;

    WRITE_PRIVATE_PROFILE_STRUCT_W: "WritePrivateProfileStructW" =>
        fn write_private_profile_struct_w(
            section: PCWSTR,
            key: PCWSTR,
            in_struct: *mut c_void,
            size_struct: u32,
            file: PCWSTR => wide,
        ) -> BOOL;

    GET_FILE_ATTRIBUTES_A: "GetFileAttributesA" =>
        fn get_file_attributes_a(file_name: PCSTR => narrow) -> u32;

    GET_FILE_ATTRIBUTES_W: "GetFileAttributesW" =>
        fn get_file_attributes_w(file_name: PCWSTR => wide) -> u32;

    GET_FILE_ATTRIBUTES_EX_A: "GetFileAttributesExA" =>
        fn get_file_attributes_ex_a(
            file_name: PCSTR => narrow,
            info_level_id: GET_FILEEX_INFO_LEVELS,
            file_information: *mut c_void,
        ) -> BOOL;

    GET_FILE_ATTRIBUTES_EX_W: "GetFileAttributesExW" =>
        fn get_file_attributes_ex_w(
            file_name: PCWSTR => wide,
            info_level_id: GET_FILEEX_INFO_LEVELS,
            file_information: *mut c_void,
        ) -> BOOL;

    SET_FILE_ATTRIBUTES_A: "SetFileAttributesA" =>
        fn set_file_attributes_a(
            file_name: PCSTR => narrow,
            file_attributes: u32,
        ) -> BOOL;

    SET_FILE_ATTRIBUTES_W: "SetFileAttributesW" =>
        fn set_file_attributes_w(
            file_name: PCWSTR => wide,
            file_attributes: u32,
        ) -> BOOL;
}

/// Resolves tracked exports from the process's loaded `kernel32.dll`.
pub struct ModuleResolver {
    module: HMODULE,
}

impl ModuleResolver {
    pub fn kernel32() -> Result<Self, RedirectError> {
        let module = unsafe { GetModuleHandleW(w!("kernel32.dll")) }
            .map_err(|_| RedirectError::SystemModuleNotFound)?;
        Ok(ModuleResolver { module })
    }
}

impl SymbolResolver for ModuleResolver {
    fn resolve(&self, symbol: &str) -> *mut c_void {
        let Ok(symbol) = CString::new(symbol) else {
            return ptr::null_mut();
        };
        match unsafe { GetProcAddress(self.module, PCSTR(symbol.as_ptr() as *const u8)) } {
            Some(address) => address as *mut c_void,
            None => ptr::null_mut(),
        }
    }
}

/// Builds the redirection table the plugin runs with: fresh configuration,
/// fresh target encodings, and addresses resolved from `kernel32.dll`.
pub struct PluginTableBuilder;

impl TableBuilder for PluginTableBuilder {
    fn build(&self) -> Result<RedirectionTable, RedirectError> {
        let config = UserConfig::load().map_err(|err| RedirectError::Config(err.to_string()))?;
        let targets = RedirectionTargets::new(&config.redirection);

        for source in TRACKED_FILES {
            match targets.utf8_destination(source) {
                Some(destination) => {
                    debug!("redirecting {source} to {}", destination.to_string_lossy());
                }
                None => warn!("no redirection destination for {source}"),
            }
        }

        let resolver = ModuleResolver::kernel32()?;
        Ok(RedirectionTable::build(targets, hook_defs(), &resolver))
    }
}
