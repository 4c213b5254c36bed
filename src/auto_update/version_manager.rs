use std::path::PathBuf;
use tokio::fs;
use anyhow::Result;

/// Remembers which release of each managed binary is installed.
pub struct VersionManager {
    storage_dir: PathBuf,
}

impl VersionManager {
    pub fn new(storage_dir: PathBuf) -> Self {
        Self { storage_dir }
    }

    fn version_file(&self, binary_name: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.version", binary_name))
    }

    pub async fn get_stored_version(&self, binary_name: &str) -> Result<String> {
        let version_file = self.version_file(binary_name);
        if fs::try_exists(&version_file).await? {
            Ok(fs::read_to_string(&version_file).await?.trim().to_string())
        } else {
            Ok(String::new())
        }
    }

    pub async fn save_version(&self, binary_name: &str, version: &str) -> Result<()> {
        fs::create_dir_all(&self.storage_dir).await?;
        fs::write(self.version_file(binary_name), version).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_versions_round_trip_per_binary() {
        let temp_dir = TempDir::new().unwrap();
        let manager = VersionManager::new(temp_dir.path().join(".versions"));

        assert_eq!(manager.get_stored_version("yt-dlp").await.unwrap(), "");

        manager.save_version("yt-dlp", "2025.09.26").await.unwrap();
        manager.save_version("ffmpeg", "latest").await.unwrap();

        assert_eq!(manager.get_stored_version("yt-dlp").await.unwrap(), "2025.09.26");
        assert_eq!(manager.get_stored_version("ffmpeg").await.unwrap(), "latest");
    }
}
