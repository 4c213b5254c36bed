use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use anyhow::{Context, Result};

#[cfg(target_os = "windows")]
use std::io::Read;

#[cfg(target_os = "windows")]
use zip::ZipArchive;

#[cfg(target_os = "macos")]
use sevenz_rust::decompress_file as decompress_7z;

#[cfg(all(unix, not(target_os = "macos")))]
use tar::Archive;

#[cfg(all(unix, not(target_os = "macos")))]
use xz2::read::XzDecoder;

use crate::yt_dlp_interface::utils::executable_name;

/// Binaries pulled out of an ffmpeg release archive. Only `ffmpeg` is required.
const ARCHIVE_BINARIES: [(&str, bool); 2] = [("ffmpeg", true), ("ffprobe", false)];

pub async fn download_file(url: &str, path: &Path) -> Result<()> {
    log::info!("Downloading from {} to {:?}", url, path);

    let client = reqwest::Client::new();
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to send GET request to {}", url))?;

    if !response.status().is_success() {
        log::error!("Download failed for {}: HTTP status {}", url, response.status());
        return Err(anyhow::anyhow!("Download failed for {}: HTTP status {}", url, response.status()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create file {:?}", path))?;

    let total = response.content_length().unwrap_or(0);
    let mut written: u64 = 0;
    let mut last_logged_percent = 0;

    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("Failed to read chunk from response for {}", url))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write chunk to file {:?}", path))?;
        written += chunk.len() as u64;

        if total > 0 {
            let percent = written * 100 / total;
            if percent >= last_logged_percent + 10 {
                last_logged_percent = percent;
                log::info!("Downloading {}: {}%", url, percent);
            }
        }
    }
    file.flush().await?;

    log::info!("Download completed successfully to {:?} ({} bytes)", path, written);
    Ok(())
}

/// Extracts the ffmpeg binaries from the platform's release archive into `extract_to`.
pub async fn extract_ffmpeg_archive(archive_path: &Path, extract_to: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(extract_to).await?;

    let archive_path = archive_path.to_path_buf();
    let extract_to = extract_to.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &extract_to))
        .await
        .context("ffmpeg extraction task panicked")?
}

#[cfg(target_os = "windows")]
fn extract_blocking(archive_path: &Path, extract_to: &Path) -> Result<Vec<PathBuf>> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_name = PathBuf::from(entry.name());
        let Some(file_name) = entry_name.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };

        if let Some((tool, _)) = ARCHIVE_BINARIES.iter().find(|(tool, _)| file_name == executable_name(tool)) {
            let outpath = extract_to.join(executable_name(tool));
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            std::fs::write(&outpath, &buffer)?;
            log::info!("Extracted {} to {:?}", file_name, outpath);
            extracted.push(outpath);
        }

        if extracted.len() == ARCHIVE_BINARIES.len() {
            break;
        }
    }

    check_required(extract_to)?;
    Ok(extracted)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn extract_blocking(archive_path: &Path, extract_to: &Path) -> Result<Vec<PathBuf>> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = Archive::new(XzDecoder::new(file));
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let file_name = match entry.path()?.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };

        if let Some((tool, _)) = ARCHIVE_BINARIES.iter().find(|(tool, _)| file_name == *tool) {
            let output_path = extract_to.join(tool);
            let mut outfile = std::fs::File::create(&output_path)?;
            std::io::copy(&mut entry, &mut outfile)?;
            set_executable_blocking(&output_path)?;

            log::info!("Extracted {} to {:?}", tool, output_path);
            extracted.push(output_path);
        }

        if extracted.len() == ARCHIVE_BINARIES.len() {
            break;
        }
    }

    check_required(extract_to)?;
    Ok(extracted)
}

#[cfg(target_os = "macos")]
fn extract_blocking(archive_path: &Path, extract_to: &Path) -> Result<Vec<PathBuf>> {
    decompress_7z(archive_path, extract_to)
        .map_err(|e| anyhow::anyhow!("Failed to extract 7z archive: {:?}", e))?;

    // The archive layout varies between builds, so search the whole tree.
    let mut extracted = Vec::new();
    let mut dirs_to_check = vec![extract_to.to_path_buf()];

    while let Some(dir) = dirs_to_check.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                dirs_to_check.push(entry_path);
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_lowercase();
            if let Some((tool, _)) = ARCHIVE_BINARIES.iter().find(|(tool, _)| file_name == *tool) {
                let output_path = extract_to.join(tool);
                if output_path != entry_path {
                    std::fs::copy(&entry_path, &output_path)?;
                }
                set_executable_blocking(&output_path)?;
                log::info!("Extracted {} to {:?}", tool, output_path);
                extracted.push(output_path);
            }
        }
    }

    check_required(extract_to)?;
    Ok(extracted)
}

#[cfg(unix)]
fn set_executable_blocking(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

fn check_required(extract_to: &Path) -> Result<()> {
    for (tool, required) in ARCHIVE_BINARIES {
        let path = extract_to.join(executable_name(tool));
        if !path.exists() {
            if required {
                return Err(anyhow::anyhow!("{} binary not found in archive", tool));
            }
            log::warn!("{} not found in archive, continuing without it", tool);
        }
    }
    Ok(())
}
