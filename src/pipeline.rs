use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

use crate::history::{History, HistoryEntry};
use crate::transcode::{Encoder, Transcoder};
use crate::utils::progress_bar::ProgressBar;
use crate::yt_dlp_interface::{VideoChoice, YoutubeFetcher};

const AUDIO_FORMAT: &str = "bestaudio/best";
const TEMP_DIR_NAME: &str = "temp";
const MP3_HISTORY_LABEL: &str = "MP3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DownloadAudio,
    DownloadVideo,
    ConvertVideo,
    ConvertAudio,
    Cleanup,
}

impl Phase {
    fn text(&self) -> &'static str {
        match self {
            Phase::DownloadAudio => "Downloading audio...",
            Phase::DownloadVideo => "Downloading video...",
            Phase::ConvertVideo => "Converting video to MP4...",
            Phase::ConvertAudio => "Converting audio to MP3...",
            Phase::Cleanup => "Removing temporary files...",
        }
    }
}

pub fn phases(mp3_only: bool) -> &'static [Phase] {
    if mp3_only {
        &[Phase::DownloadAudio, Phase::ConvertAudio, Phase::Cleanup]
    } else {
        &[
            Phase::DownloadAudio,
            Phase::DownloadVideo,
            Phase::ConvertVideo,
            Phase::ConvertAudio,
            Phase::Cleanup,
        ]
    }
}

/// Status label such as `2/5 Downloading video...`.
pub fn phase_label(mp3_only: bool, phase: Phase) -> String {
    let all = phases(mp3_only);
    let position = all.iter().position(|p| *p == phase).map_or(0, |i| i + 1);
    format!("{}/{} {}", position, all.len(), phase.text())
}

/// Keeps alphanumerics, spaces, `-` and `_`.
pub fn safe_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Removes every file in `temp_dir` and then the directory, ignoring failures.
pub fn cleanup_temp_dir(temp_dir: &Path) {
    if let Ok(entries) = std::fs::read_dir(temp_dir) {
        for entry in entries.flatten() {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                log::warn!("Failed to remove temporary file {:?}: {}", entry.path(), e);
            }
        }
    }
    if let Err(e) = std::fs::remove_dir(temp_dir) {
        log::debug!("Temporary directory {:?} not removed: {}", temp_dir, e);
    }
}

/// Picks the video stream: an explicit format id, a 1-based position, or the first choice.
pub fn select_choice(
    choices: &[VideoChoice],
    format_id: Option<&str>,
    pick: Option<usize>,
) -> Result<VideoChoice> {
    if let Some(id) = format_id {
        return choices
            .iter()
            .find(|c| c.format_id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Format {} is not one of the video-only formats", id));
    }
    if let Some(n) = pick {
        return n
            .checked_sub(1)
            .and_then(|i| choices.get(i))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Choice {} is out of range (1-{})", n, choices.len()));
    }
    choices
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No video-only formats found"))
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub title: String,
    /// `None` downloads audio only.
    pub video: Option<VideoChoice>,
}

impl DownloadRequest {
    pub fn mp3_only(&self) -> bool {
        self.video.is_none()
    }

    fn history_label(&self) -> String {
        match &self.video {
            Some(choice) => choice.history_label(),
            None => MP3_HISTORY_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub mp3: PathBuf,
    pub mp4: Option<PathBuf>,
    pub elapsed: Duration,
}

pub struct DownloadPipeline {
    fetcher: YoutubeFetcher,
    transcoder: Transcoder,
    download_folder: PathBuf,
    encoder: Encoder,
    history_file: PathBuf,
}

impl DownloadPipeline {
    pub fn new(
        fetcher: YoutubeFetcher,
        transcoder: Transcoder,
        download_folder: PathBuf,
        encoder: Encoder,
        history_file: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            download_folder,
            encoder,
            history_file,
        }
    }

    pub async fn run(&self, request: &DownloadRequest, progress_bar: &mut ProgressBar) -> Result<DownloadOutcome> {
        let title = safe_title(&request.title);
        let temp_dir = self.download_folder.join(TEMP_DIR_NAME);
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", temp_dir))?;

        log::info!("Starting download of '{}' from {}", title, request.url);
        let result = self.run_phases(request, &title, &temp_dir, progress_bar).await;

        if result.is_ok() {
            progress_bar.status(&phase_label(request.mp3_only(), Phase::Cleanup));
        }
        cleanup_temp_dir(&temp_dir);

        let (mp3, mp4) = result?;
        History::record(&self.history_file, HistoryEntry::now(&title, &request.history_label()))?;
        progress_bar.update(100.0, None);
        progress_bar.finish();

        Ok(DownloadOutcome {
            mp3,
            mp4,
            elapsed: progress_bar.elapsed(),
        })
    }

    async fn run_phases(
        &self,
        request: &DownloadRequest,
        title: &str,
        temp_dir: &Path,
        progress_bar: &mut ProgressBar,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        let mp3_only = request.mp3_only();

        progress_bar.status(&phase_label(mp3_only, Phase::DownloadAudio));
        let audio_file = self
            .fetcher
            .download_stream(&request.url, AUDIO_FORMAT, temp_dir, title, progress_bar)
            .await
            .context("Audio download failed")?;

        let mp4_file = match &request.video {
            Some(choice) => {
                progress_bar.status(&phase_label(mp3_only, Phase::DownloadVideo));
                let video_stem = format!("{}_video", title);
                let video_file = self
                    .fetcher
                    .download_stream(&request.url, &choice.format_id, temp_dir, &video_stem, progress_bar)
                    .await
                    .context("Video download failed")?;

                progress_bar.status(&phase_label(mp3_only, Phase::ConvertVideo));
                let mp4_file = self.download_folder.join(format!("{}.mp4", title));
                self.transcoder.to_mp4(&video_file, &mp4_file, self.encoder).await?;
                Some(mp4_file)
            }
            None => None,
        };

        progress_bar.status(&phase_label(mp3_only, Phase::ConvertAudio));
        let mp3_file = self.download_folder.join(format!("{}.mp3", title));
        self.transcoder.to_mp3(&audio_file, &mp3_file).await?;

        Ok((mp3_file, mp4_file))
    }
}
