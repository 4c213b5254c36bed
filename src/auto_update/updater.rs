use std::path::{Path, PathBuf};
use tokio::fs;
use anyhow::Result;
use log::{info, warn, error};
use feed_rs::parser;

use crate::auto_update::version_manager::VersionManager;
use crate::yt_dlp_interface::ensure::{install_ffmpeg, install_yt_dlp, managed_ffmpeg_path, managed_yt_dlp_path};
use crate::yt_dlp_interface::utils::is_executable_present;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedBinary {
    YtDlp,
    Ffmpeg,
}

impl ManagedBinary {
    pub const ALL: [ManagedBinary; 2] = [ManagedBinary::YtDlp, ManagedBinary::Ffmpeg];

    pub fn name(&self) -> &'static str {
        match self {
            ManagedBinary::YtDlp => "yt-dlp",
            ManagedBinary::Ffmpeg => "ffmpeg",
        }
    }

    /// Release feed of the project the install URL downloads from. ffmpeg
    /// comes from BtbN only on Windows; other builds have no feed.
    fn rss_url(&self) -> Option<&'static str> {
        match self {
            ManagedBinary::YtDlp => Some("https://github.com/yt-dlp/yt-dlp/releases.atom"),
            ManagedBinary::Ffmpeg if cfg!(target_os = "windows") => {
                Some("https://github.com/BtbN/FFmpeg-Builds/releases.atom")
            }
            ManagedBinary::Ffmpeg => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Updated { from: String, to: String },
    UpToDate(String),
    /// Not installed in the libraries directory (e.g. provided by the system).
    NotManaged,
    /// Installed from a source that publishes no release feed.
    NoReleaseFeed,
    Failed(String),
}

pub struct AutoUpdater {
    libraries_dir: PathBuf,
    version_manager: VersionManager,
}

impl AutoUpdater {
    pub fn new(libraries_dir: PathBuf) -> Self {
        Self {
            version_manager: VersionManager::new(libraries_dir.join(".versions")),
            libraries_dir,
        }
    }

    fn binary_path(&self, binary: ManagedBinary) -> PathBuf {
        match binary {
            ManagedBinary::YtDlp => managed_yt_dlp_path(&self.libraries_dir),
            ManagedBinary::Ffmpeg => managed_ffmpeg_path(&self.libraries_dir),
        }
    }

    async fn get_latest_version_from_rss(&self, rss_url: &str) -> Result<String> {
        let response = reqwest::get(rss_url).await?.error_for_status()?;
        let content = response.text().await?;
        let feed = parser::parse(content.as_bytes())?;

        let entry = feed
            .entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("No entries found in RSS feed"))?;
        let title = entry.title.as_ref().map(|t| t.content.as_str()).unwrap_or("");

        clean_version(title).ok_or_else(|| anyhow::anyhow!("Release feed {} has no version title", rss_url))
    }

    async fn update_binary(&self, binary: ManagedBinary, new_version: &str) -> Result<()> {
        info!("Updating {} to version {}", binary.name(), new_version);

        let path = self.binary_path(binary);
        let backup = backup_path(&path);
        fs::rename(&path, &backup).await?;

        let installed = match binary {
            ManagedBinary::YtDlp => install_yt_dlp(&self.libraries_dir).await,
            ManagedBinary::Ffmpeg => install_ffmpeg(&self.libraries_dir).await,
        };

        match installed {
            Ok(_) => {
                fs::remove_file(&backup).await.ok();
                self.version_manager.save_version(binary.name(), new_version).await?;
                info!("Successfully updated {} to {}", binary.name(), new_version);
                Ok(())
            }
            Err(e) => {
                // Keep the working binary when the new one could not be installed.
                fs::rename(&backup, &path).await.ok();
                Err(e)
            }
        }
    }

    /// Stores the feed's latest version for a binary that was just installed
    /// from its latest-release URL. Failures are only logged.
    pub async fn record_installed(&self, binary: ManagedBinary) {
        let Some(rss_url) = binary.rss_url() else {
            return;
        };
        let saved = match self.get_latest_version_from_rss(rss_url).await {
            Ok(version) => self.version_manager.save_version(binary.name(), &version).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!("Could not record installed version of {}: {}", binary.name(), e);
        }
    }

    pub async fn check_single_binary(&self, binary: ManagedBinary) -> UpdateStatus {
        if !is_executable_present(&self.binary_path(binary)) {
            return UpdateStatus::NotManaged;
        }
        let Some(rss_url) = binary.rss_url() else {
            info!("{} has no release feed, skipping update check", binary.name());
            return UpdateStatus::NoReleaseFeed;
        };

        let current_version = self
            .version_manager
            .get_stored_version(binary.name())
            .await
            .unwrap_or_default();

        match self.get_latest_version_from_rss(rss_url).await {
            Ok(latest_version) if latest_version != current_version => {
                info!("New version available for {}: {} -> {}",
                    binary.name(), current_version, latest_version);
                match self.update_binary(binary, &latest_version).await {
                    Ok(()) => UpdateStatus::Updated { from: current_version, to: latest_version },
                    Err(e) => {
                        error!("Failed to update {}: {}", binary.name(), e);
                        UpdateStatus::Failed(e.to_string())
                    }
                }
            }
            Ok(latest_version) => {
                info!("{} is up to date ({})", binary.name(), latest_version);
                UpdateStatus::UpToDate(latest_version)
            }
            Err(e) => {
                warn!("Failed to check updates for {}: {}", binary.name(), e);
                UpdateStatus::Failed(e.to_string())
            }
        }
    }

    pub async fn check_for_updates(&self) -> Vec<(ManagedBinary, UpdateStatus)> {
        info!("Checking for binary updates...");
        let mut results = Vec::new();
        for binary in ManagedBinary::ALL {
            results.push((binary, self.check_single_binary(binary).await));
        }
        results
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// First token of a release title that looks like a version:
/// "yt-dlp 2025.09.26" -> "2025.09.26", "Release v1.2.3" -> "v1.2.3".
pub fn clean_version(title: &str) -> Option<String> {
    let tokens: Vec<&str> = title
        .split_whitespace()
        .map(|t| t.trim_matches(|c| c == '(' || c == ')'))
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .iter()
        .find(|t| t.chars().any(|c| c.is_ascii_digit()))
        .or_else(|| tokens.first())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clean_version() {
        assert_eq!(clean_version("Release v1.2.3").as_deref(), Some("v1.2.3"));
        assert_eq!(clean_version("  yt-dlp 2025.09.26 ").as_deref(), Some("2025.09.26"));
        assert_eq!(clean_version("2025.09.26").as_deref(), Some("2025.09.26"));
        assert_eq!(clean_version("Latest Auto-Build (2025-10-01 12:52)").as_deref(), Some("2025-10-01"));
        assert_eq!(clean_version("nightly").as_deref(), Some("nightly"));
        assert_eq!(clean_version("   "), None);
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(backup_path(Path::new("/lib/yt-dlp")), PathBuf::from("/lib/yt-dlp.bak"));
        assert_eq!(backup_path(Path::new("/lib/ffmpeg/ffmpeg.exe")), PathBuf::from("/lib/ffmpeg/ffmpeg.exe.bak"));
    }

    #[test]
    fn test_release_feeds_match_download_sources() {
        assert!(ManagedBinary::YtDlp.rss_url().is_some_and(|url| url.contains("yt-dlp/yt-dlp")));
        assert_eq!(ManagedBinary::Ffmpeg.rss_url().is_some(), cfg!(target_os = "windows"));
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test]
    async fn test_ffmpeg_without_feed_is_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let ffmpeg = managed_ffmpeg_path(temp_dir.path());
        std::fs::create_dir_all(ffmpeg.parent().unwrap()).unwrap();
        std::fs::write(&ffmpeg, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let updater = AutoUpdater::new(temp_dir.path().to_path_buf());
        assert_eq!(updater.check_single_binary(ManagedBinary::Ffmpeg).await, UpdateStatus::NoReleaseFeed);

        updater.record_installed(ManagedBinary::Ffmpeg).await;
        assert!(!temp_dir.path().join(".versions").exists());
        assert!(ffmpeg.exists());
    }

    #[tokio::test]
    async fn test_binaries_outside_libraries_dir_are_not_managed() {
        let temp_dir = TempDir::new().unwrap();
        let updater = AutoUpdater::new(temp_dir.path().to_path_buf());
        for binary in ManagedBinary::ALL {
            assert_eq!(updater.check_single_binary(binary).await, UpdateStatus::NotManaged);
        }
    }
}
