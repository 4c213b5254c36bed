use std::path::{Path, PathBuf};
use tokio::fs;
use anyhow::Result;

use crate::auto_update::AutoUpdater;
use crate::auto_update::updater::ManagedBinary;

use crate::yt_dlp_interface::utils::{executable_name, is_executable_present, locate_tool, make_executable};
use crate::yt_dlp_interface::urls::{get_latest_yt_dlp_url, get_latest_ffmpeg_url};
use crate::yt_dlp_interface::downloader::{download_file, extract_ffmpeg_archive};

/// Resolved locations of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Toolchain {
    /// Directory holding ffmpeg, handed to yt-dlp as `--ffmpeg-location`.
    pub fn ffmpeg_dir(&self) -> &Path {
        self.ffmpeg.parent().unwrap_or_else(|| Path::new("."))
    }
}

pub fn managed_yt_dlp_path(libraries_dir: &Path) -> PathBuf {
    libraries_dir.join(executable_name("yt-dlp"))
}

pub fn managed_ffmpeg_dir(libraries_dir: &Path) -> PathBuf {
    libraries_dir.join("ffmpeg")
}

pub fn managed_ffmpeg_path(libraries_dir: &Path) -> PathBuf {
    managed_ffmpeg_dir(libraries_dir).join(executable_name("ffmpeg"))
}

fn ffmpeg_archive_path(libraries_dir: &Path) -> PathBuf {
    let name = if cfg!(target_os = "windows") {
        "ffmpeg-release.zip"
    } else if cfg!(target_os = "macos") {
        "ffmpeg-release.7z"
    } else {
        "ffmpeg-release.tar.xz"
    };
    libraries_dir.join(name)
}

pub async fn ensure_binaries(libraries_dir: &Path) -> Result<Toolchain> {
    fs::create_dir_all(libraries_dir).await?;
    let updater = AutoUpdater::new(libraries_dir.to_path_buf());

    let yt_dlp = match locate_tool("yt-dlp", &managed_yt_dlp_path(libraries_dir)) {
        Some(path) => {
            log::info!("yt-dlp already exists at {:?}", path);
            path
        }
        None => {
            let path = install_yt_dlp(libraries_dir).await?;
            updater.record_installed(ManagedBinary::YtDlp).await;
            path
        }
    };

    let ffmpeg = match locate_tool("ffmpeg", &managed_ffmpeg_path(libraries_dir)) {
        Some(path) => {
            log::info!("ffmpeg already exists at {:?}", path);
            path
        }
        None => {
            let path = install_ffmpeg(libraries_dir).await?;
            updater.record_installed(ManagedBinary::Ffmpeg).await;
            path
        }
    };

    Ok(Toolchain { yt_dlp, ffmpeg })
}

pub async fn install_yt_dlp(libraries_dir: &Path) -> Result<PathBuf> {
    log::info!("yt-dlp not found, downloading latest version...");
    let yt_dlp_path = managed_yt_dlp_path(libraries_dir);
    download_file(&get_latest_yt_dlp_url(), &yt_dlp_path).await?;
    make_executable(&yt_dlp_path).await?;

    if !is_executable_present(&yt_dlp_path) {
        return Err(anyhow::anyhow!("yt-dlp not found at {:?} after download", yt_dlp_path));
    }
    Ok(yt_dlp_path)
}

pub async fn install_ffmpeg(libraries_dir: &Path) -> Result<PathBuf> {
    log::info!("ffmpeg not found, downloading latest version...");
    let archive_path = ffmpeg_archive_path(libraries_dir);
    let ffmpeg_dir = managed_ffmpeg_dir(libraries_dir);
    let ffmpeg_path = managed_ffmpeg_path(libraries_dir);

    download_file(&get_latest_ffmpeg_url(), &archive_path).await?;
    let extracted = extract_ffmpeg_archive(&archive_path, &ffmpeg_dir).await;

    if let Err(e) = fs::remove_file(&archive_path).await {
        log::warn!("Failed to remove ffmpeg archive {:?}: {}", archive_path, e);
    }
    extracted?;

    if !is_executable_present(&ffmpeg_path) {
        log::error!("ffmpeg was not found in the expected location after extraction: {:?}", ffmpeg_path);
        return Err(anyhow::anyhow!("ffmpeg not available at {:?}", ffmpeg_path));
    }
    Ok(ffmpeg_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_paths_live_under_libraries_dir() {
        let lib = Path::new("/opt/zkdl/lib");
        assert_eq!(managed_yt_dlp_path(lib), lib.join(executable_name("yt-dlp")));
        assert_eq!(managed_ffmpeg_path(lib), lib.join("ffmpeg").join(executable_name("ffmpeg")));
        assert!(ffmpeg_archive_path(lib).starts_with(lib));
    }

    #[test]
    fn test_toolchain_ffmpeg_dir() {
        let toolchain = Toolchain {
            yt_dlp: PathBuf::from("/usr/bin/yt-dlp"),
            ffmpeg: PathBuf::from("/opt/lib/ffmpeg/ffmpeg"),
        };
        assert_eq!(toolchain.ffmpeg_dir(), Path::new("/opt/lib/ffmpeg"));
    }
}
