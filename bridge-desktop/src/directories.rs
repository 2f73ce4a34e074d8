//! Desktop mapping of the well-known platform directories

use bridge_traits::storage::PlatformDirectories;
use std::path::{Path, PathBuf};

/// Resolves [`PlatformDirectories`] from the user's standard folders.
///
/// Desktop has no SD card or application bundle, so those entries fall back
/// to the home directory and the directory of the running executable.
pub struct DesktopDirectories;

impl DesktopDirectories {
    /// Discover directories for an application named `app_name`
    ///
    /// Cache and library directories are namespaced by the app name so
    /// several hosts can share a machine without clobbering each other.
    pub fn discover(app_name: &str) -> PlatformDirectories {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let under_home = |name: &str| home.join(name);

        let document = dirs::document_dir().unwrap_or_else(|| under_home("Documents"));
        let picture = dirs::picture_dir().unwrap_or_else(|| under_home("Pictures"));
        let main_bundle = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        PlatformDirectories {
            cache: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(app_name),
            music: dirs::audio_dir().unwrap_or_else(|| under_home("Music")),
            movie: dirs::video_dir().unwrap_or_else(|| under_home("Videos")),
            download: dirs::download_dir().unwrap_or_else(|| under_home("Downloads")),
            dcim: picture.join("DCIM"),
            sd_card: home.clone(),
            sd_card_application: dirs::data_dir()
                .unwrap_or_else(|| home.join(".local").join("share"))
                .join(app_name),
            library: dirs::config_dir()
                .unwrap_or_else(|| home.join(".config"))
                .join(app_name),
            document,
            picture,
            main_bundle,
        }
    }
}
