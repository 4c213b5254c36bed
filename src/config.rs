use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transcode::Encoder;

pub const LIBRARIES_DIR_ENV: &str = "ZKDL_LIBRARIES_DIR";
pub const DATA_DIR_ENV: &str = "ZKDL_DATA_DIR";

const APP_DIR_NAME: &str = "zking-download";

pub fn find_dotenv() -> Result<Option<PathBuf>> {
    // 1. Check directory where the executable is located
    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(exe_dir) = current_exe.parent() {
            let exe_dir_dotenv = exe_dir.join(".env");
            if exe_dir_dotenv.exists() {
                return Ok(Some(exe_dir_dotenv));
            }
        }
    }

    // 2. Check current working directory (for cargo run compatibility)
    let current_dotenv = std::env::current_dir()?.join(".env");
    if current_dotenv.exists() {
        return Ok(Some(current_dotenv));
    }

    Ok(None)
}

/// Loads `.env` if there is one. Runs before logging is set up, so the
/// caller reports the returned path.
pub fn load_environment() -> Result<Option<PathBuf>> {
    match find_dotenv()? {
        Some(path) => {
            dotenv::from_path(&path)?;
            Ok(Some(path))
        },
        None => Ok(None),
    }
}

/// Where the program keeps its tools and its state files.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub libraries_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir()?;

        let libraries_dir = std::env::var_os(LIBRARIES_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| cwd.join("lib"));

        let data_dir = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME)))
            .unwrap_or_else(|| cwd.join(".zkdl"));

        Ok(Self { libraries_dir, data_dir })
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }

    pub fn error_log_file(&self) -> PathBuf {
        self.data_dir.join("errors.log")
    }
}

pub fn default_download_folder() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("downloads")
}

/// User choices persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub download_folder: PathBuf,
    pub encoder: Encoder,
}

// Encoder is kept as text on disk so an unknown name doesn't discard the folder.
#[derive(Deserialize)]
struct StoredSettings {
    download_folder: Option<PathBuf>,
    encoder: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_folder: default_download_folder(),
            encoder: Encoder::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Settings {
        let mut settings = Settings::default();

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("No settings at {:?} ({}), using defaults", path, e);
                return settings;
            }
        };

        let stored: StoredSettings = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("Ignoring unreadable settings file {:?}: {}", path, e);
                return settings;
            }
        };

        if let Some(folder) = stored.download_folder {
            if folder.is_dir() {
                settings.download_folder = folder;
            } else {
                log::warn!("Saved download folder {:?} no longer exists, using {:?}", folder, settings.download_folder);
            }
        }

        if let Some(name) = stored.encoder {
            match name.parse() {
                Ok(encoder) => settings.encoder = encoder,
                Err(e) => log::warn!("{}, using {}", e, settings.encoder),
            }
        }

        settings
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings to {:?}", path))?;
        log::info!("Settings saved to {:?}", path);
        Ok(())
    }

    pub fn set_download_folder(&mut self, folder: &Path) -> Result<()> {
        if !folder.is_dir() {
            return Err(anyhow::anyhow!("{:?} is not an existing directory", folder));
        }
        self.download_folder = folder
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", folder))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_missing_settings_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load(&temp_dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.encoder, Encoder::Libx264);
    }

    #[test]
    fn test_settings_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.set_download_folder(temp_dir.path()).unwrap();
        settings.encoder = Encoder::H264Qsv;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_stale_folder_and_unknown_encoder_fall_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"download_folder": "/definitely/not/here", "encoder": "h265_magic"}"#,
        )
        .unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.download_folder, default_download_folder());
        assert_eq!(loaded.encoder, Encoder::Libx264);
    }

    #[test]
    fn test_unknown_encoder_keeps_valid_folder() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        let json = serde_json::json!({
            "download_folder": temp_dir.path(),
            "encoder": "nope",
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.download_folder, temp_dir.path());
        assert_eq!(loaded.encoder, Encoder::Libx264);
    }

    #[test]
    fn test_corrupt_settings_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_set_download_folder_requires_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        assert!(settings.set_download_folder(&temp_dir.path().join("missing")).is_err());

        let file = temp_dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(settings.set_download_folder(&file).is_err());
    }

    #[test]
    #[serial]
    fn test_app_paths_from_env() {
        let temp_dir = TempDir::new().unwrap();
        let lib = temp_dir.path().join("tools");
        let data = temp_dir.path().join("state");

        // SAFETY: serialized with the other environment tests.
        unsafe {
            std::env::set_var(LIBRARIES_DIR_ENV, &lib);
            std::env::set_var(DATA_DIR_ENV, &data);
        }
        let paths = AppPaths::from_env().unwrap();
        unsafe {
            std::env::remove_var(LIBRARIES_DIR_ENV);
            std::env::remove_var(DATA_DIR_ENV);
        }

        assert_eq!(paths.libraries_dir, lib);
        assert_eq!(paths.settings_file(), data.join("settings.json"));
        assert_eq!(paths.history_file(), data.join("history.json"));
        assert_eq!(paths.error_log_file(), data.join("errors.log"));
    }

    #[test]
    #[serial]
    fn test_app_paths_defaults() {
        // SAFETY: serialized with the other environment tests.
        unsafe {
            std::env::remove_var(LIBRARIES_DIR_ENV);
            std::env::remove_var(DATA_DIR_ENV);
        }
        let paths = AppPaths::from_env().unwrap();
        assert_eq!(paths.libraries_dir, std::env::current_dir().unwrap().join("lib"));
        assert!(paths.data_dir.ends_with(APP_DIR_NAME) || paths.data_dir.ends_with(".zkdl"));
    }
}
