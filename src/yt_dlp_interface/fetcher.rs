use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;
use tokio::io::{BufReader, AsyncBufReadExt};
use anyhow::{Context, Result};
use regex::Regex;

use crate::utils::progress_bar::ProgressBar;
use crate::yt_dlp_interface::ensure::Toolchain;
use crate::yt_dlp_interface::formats::{parse_video_info, VideoInfo};

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("valid ANSI regex"));

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[download\]\s+(?P<pct>\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(?P<total>\d+(?:\.\d+)?[KMGT]?i?B))?(?:\s+at\s+(?P<speed>\d+(?:\.\d+)?[KMGT]?i?B)/s)?(?:\s+ETA\s+(?P<eta>[\d:]+))?",
    )
    .expect("valid progress regex")
});

// Lines of stderr kept for error reports.
const STDERR_TAIL: usize = 10;

/// One `[download]` progress report from yt-dlp.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub percent: f64,
    pub total_bytes: Option<u64>,
    pub speed_bytes_per_sec: Option<f64>,
    pub eta_secs: Option<u64>,
}

impl DownloadProgress {
    /// Seconds left, from total size and current speed.
    pub fn remaining_secs(&self) -> Option<f64> {
        let total = self.total_bytes? as f64;
        let speed = self.speed_bytes_per_sec.filter(|s| *s > 0.0)?;
        if self.percent <= 0.0 {
            return None;
        }
        Some(total * (1.0 - self.percent / 100.0) / speed)
    }

    pub fn status_text(&self, elapsed_secs: f64) -> String {
        let speed_mb = self.speed_bytes_per_sec.unwrap_or(0.0) / 1_048_576.0;
        let remaining = self
            .remaining_secs()
            .or_else(|| self.eta_secs.map(|eta| eta as f64));
        let time = match remaining {
            Some(remaining) => format!("{:.1}s | {:.1}s remaining", elapsed_secs, remaining),
            None => format!("{:.1}s", elapsed_secs),
        };
        format!("| {:.1} MB/s | {}", speed_mb, time)
    }
}

#[derive(Clone)]
pub struct YoutubeFetcher {
    pub yt_dlp_path: PathBuf,
    pub ffmpeg_dir: PathBuf,
}

impl YoutubeFetcher {
    pub fn new(toolchain: &Toolchain) -> Self {
        YoutubeFetcher {
            yt_dlp_path: toolchain.yt_dlp.clone(),
            ffmpeg_dir: toolchain.ffmpeg_dir().to_path_buf(),
        }
    }

    /// Fetches video metadata without downloading anything.
    pub async fn fetch_info(&self, url: &str) -> Result<VideoInfo> {
        log::info!("Fetching formats for {}", url);
        let output = Command::new(&self.yt_dlp_path)
            .arg("--dump-single-json")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--skip-download")
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run yt-dlp at {:?}", self.yt_dlp_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "yt-dlp failed to fetch formats ({}): {}",
                output.status,
                tail(&stderr, STDERR_TAIL)
            ));
        }

        parse_video_info(&String::from_utf8_lossy(&output.stdout))
    }

    /// Downloads one stream into `output_dir/<stem>.<ext>` and returns the file path.
    pub async fn download_stream(
        &self,
        url: &str,
        format: &str,
        output_dir: &Path,
        stem: &str,
        progress_bar: &mut ProgressBar,
    ) -> Result<PathBuf> {
        let output_template = output_dir.join(format!("{}.%(ext)s", stem));

        let mut cmd = Command::new(&self.yt_dlp_path);
        cmd.arg("--format")
           .arg(format)
           .arg("--output")
           .arg(&output_template)
           .arg("--no-playlist")
           .arg("--no-part")
           .arg("--no-mtime")
           .arg("--ffmpeg-location")
           .arg(&self.ffmpeg_dir)
           .arg("--progress")
           .arg("--newline")
           .arg(url)
           .stdout(Stdio::piped())
           .stderr(Stdio::piped());

        log::debug!("Running {:?}", cmd);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start yt-dlp at {:?}", self.yt_dlp_path))?;
        let stdout = child.stdout.take().context("yt-dlp stdout not captured")?;
        let stderr = child.stderr.take().context("yt-dlp stderr not captured")?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut stderr_lines: Vec<String> = Vec::new();
        let mut last_percentage = -1.0f64;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            log::trace!("yt-dlp stdout: {}", line);
                            if let Some(progress) = parse_progress_line(&line) {
                                if progress.percent > last_percentage {
                                    last_percentage = progress.percent;
                                    let info = progress.status_text(progress_bar.elapsed().as_secs_f64());
                                    progress_bar.update(progress.percent, Some(&info));
                                }
                            }
                        }
                        _ => stdout_done = true,
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            log::trace!("yt-dlp stderr: {}", line);
                            stderr_lines.push(line);
                            if stderr_lines.len() > STDERR_TAIL {
                                stderr_lines.remove(0);
                            }
                        }
                        _ => stderr_done = true,
                    }
                }
            }
        }

        let status = child.wait().await?;
        progress_bar.finish();

        if !status.success() {
            return Err(anyhow::anyhow!(
                "yt-dlp failed to download format {} ({}): {}",
                format,
                status,
                stderr_lines.join("\n")
            ));
        }

        find_downloaded_file(output_dir, stem)
            .with_context(|| format!("Downloaded file for {} not found in {:?}", stem, output_dir))
    }
}

/// Finds `<dir>/<stem>.<any ext>`, skipping leftover partial files.
pub fn find_downloaded_file(dir: &Path, stem: &str) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.file_stem().map_or(false, |s| s.to_string_lossy() == stem))
        .find(|path| {
            path.extension()
                .map_or(true, |ext| ext != "part" && ext != "ytdl")
        })
        .ok_or_else(|| anyhow::anyhow!("no file named {}.* in {:?}", stem, dir))
}

pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let clean_line = remove_ansi_codes(line);
    let caps = PROGRESS_RE.captures(&clean_line)?;
    let percent = caps.name("pct")?.as_str().parse::<f64>().ok()?;

    Some(DownloadProgress {
        percent,
        total_bytes: caps.name("total").and_then(|m| parse_size_string(m.as_str())),
        speed_bytes_per_sec: caps
            .name("speed")
            .and_then(|m| parse_size_string(m.as_str()))
            .map(|bytes| bytes as f64),
        eta_secs: caps.name("eta").and_then(|m| parse_eta(m.as_str())),
    })
}

fn remove_ansi_codes(text: &str) -> String {
    ANSI_RE.replace_all(text, "").to_string()
}

fn parse_size_string(s: &str) -> Option<u64> {
    let s_clean = s.trim().to_lowercase();
    let number_end = s_clean
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s_clean.len());
    let (number_str, unit) = s_clean.split_at(number_end);
    let number = number_str.parse::<f64>().ok()?;

    let multiplier: f64 = match unit {
        "b" | "" => 1.0,
        "kib" => 1024.0,
        "kb" => 1000.0,
        "mib" => 1024.0 * 1024.0,
        "mb" => 1000.0 * 1000.0,
        "gib" => 1024.0 * 1024.0 * 1024.0,
        "gb" => 1000.0 * 1000.0 * 1000.0,
        "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "tb" => 1000.0 * 1000.0 * 1000.0 * 1000.0,
        _ => return None,
    };
    Some((number * multiplier) as u64)
}

fn parse_eta(s: &str) -> Option<u64> {
    s.split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|v| acc * 60 + v))
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
