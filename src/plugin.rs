//! SKSE plugin ABI types.
//!
//! These mirror the C structures the script extender passes across the
//! plugin boundary; layout and field order are fixed by the host.

use std::ffi::{CStr, c_char, c_void};

pub const PLUGIN_INFO_VERSION: u32 = 1;
pub const PLUGIN_NAME: &CStr = c"Skyrim Redirector";
pub const PLUGIN_VERSION: u32 = 1;

/// Interface handed to `SKSEPlugin_Query` and `SKSEPlugin_Load` by the
/// script extender. Only the version fields and the editor flag are read;
/// the function pointers are part of the fixed layout but unused here.
#[repr(C)]
pub struct SkseInterface {
    pub skse_version: u32,
    pub runtime_version: u32,
    pub editor_version: u32,
    pub is_editor: u32,
    pub query_interface: *mut c_void,
    pub get_plugin_handle: *mut c_void,
    pub get_release_index: *mut c_void,
    pub get_plugin_info: *mut c_void,
}

/// Filled in during `SKSEPlugin_Query` to describe this plugin to the host.
#[repr(C)]
pub struct PluginInfo {
    pub info_version: u32,
    pub name: *const c_char,
    pub version: u32,
}

impl PluginInfo {
    pub fn fill(&mut self) {
        self.info_version = PLUGIN_INFO_VERSION;
        self.name = PLUGIN_NAME.as_ptr();
        self.version = PLUGIN_VERSION;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_describes_this_plugin() {
        let mut info = PluginInfo {
            info_version: 0,
            name: std::ptr::null(),
            version: 0,
        };
        info.fill();

        assert_eq!(info.info_version, PLUGIN_INFO_VERSION);
        assert_eq!(info.version, PLUGIN_VERSION);
        let name = unsafe { CStr::from_ptr(info.name) };
        assert_eq!(name, PLUGIN_NAME);
    }
}
