//! Skyrim Redirector - an SKSE plugin DLL that redirects the game's file
//! accesses to `Skyrim.ini`, `SkyrimPrefs.ini` and `plugins.txt` towards
//! configurable replacement files.
//!
//! The game names those three files by convention, so total-conversion mods
//! that want their own configuration and load order have to intercept the
//! accesses at the Win32 layer. This plugin patches the tracked `kernel32`
//! file and profile functions on process attach, substitutes the path
//! argument whenever its trailing file name matches a tracked file, and
//! forwards everything else untouched. All patches are removed on process
//! detach.

pub mod config;
pub mod logging;
pub mod plugin;
pub mod redirect;
pub mod strings;

#[cfg(windows)]
mod glue {
    use std::ffi::c_void;
    use std::sync::{Mutex, OnceLock, PoisonError};

    use log::{debug, error};
    use windows::Win32::Foundation::HMODULE;
    use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
    use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    use crate::config::UserConfig;
    use crate::plugin::{PluginInfo, SkseInterface};
    use crate::redirect::detours::RetourBackend;
    use crate::redirect::hooks::{self, PluginTableBuilder};
    use crate::redirect::Redirector;

    type PluginRedirector = Redirector<RetourBackend, PluginTableBuilder>;

    static REDIRECTOR: OnceLock<Mutex<PluginRedirector>> = OnceLock::new();

    fn redirector() -> &'static Mutex<PluginRedirector> {
        REDIRECTOR
            .get_or_init(|| Mutex::new(Redirector::new(RetourBackend::default(), PluginTableBuilder)))
    }

    fn on_process_attach() -> bool {
        // Logging comes up first so attach failures are visible in the log.
        if let Ok(config) = UserConfig::load() {
            let _ = crate::logging::init(&config.logging);
        }

        let mut engine = redirector()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match engine.attach() {
            Ok(targets) => {
                hooks::set_active_targets(Some(targets));
                true
            }
            Err(err) => {
                error!("failed to attach redirections: {err}");
                false
            }
        }
    }

    fn on_process_detach() -> bool {
        let mut engine = redirector()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let detached = match engine.detach() {
            Ok(()) => true,
            Err(err) => {
                error!("failed to detach redirections: {err}");
                false
            }
        };
        hooks::set_active_targets(None);
        detached
    }

    /// DLL entry point.
    #[unsafe(no_mangle)]
    pub extern "system" fn DllMain(
        module: HMODULE,
        call_reason: u32,
        _reserved: *mut c_void,
    ) -> bool {
        match call_reason {
            DLL_PROCESS_ATTACH => {
                // Thread attach/detach notifications are never used.
                unsafe {
                    let _ = DisableThreadLibraryCalls(module);
                }
                on_process_attach()
            }
            DLL_PROCESS_DETACH => on_process_detach(),
            _ => true,
        }
    }

    /// SKSE discovery callback. Describes the plugin and refuses to load
    /// inside the editor, which does not read the redirected files.
    #[unsafe(no_mangle)]
    pub extern "system" fn SKSEPlugin_Query(
        skse: *const SkseInterface,
        info: *mut PluginInfo,
    ) -> bool {
        if skse.is_null() || info.is_null() {
            return false;
        }

        unsafe { (*info).fill() };

        let is_editor = unsafe { (*skse).is_editor } != 0;
        debug!("queried by the script extender (editor: {is_editor})");
        !is_editor
    }

    /// SKSE load callback. The redirections are already installed from
    /// `DllMain`; nothing further to do.
    #[unsafe(no_mangle)]
    pub extern "system" fn SKSEPlugin_Load(_skse: *const SkseInterface) -> bool {
        debug!("loaded by the script extender");
        true
    }
}
