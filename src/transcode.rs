use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// H.264 encoders offered for the MP4 output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoder {
    #[serde(rename = "h264_nvenc")]
    H264Nvenc,
    #[serde(rename = "h264_amf")]
    H264Amf,
    #[serde(rename = "h264_qsv")]
    H264Qsv,
    #[default]
    #[serde(rename = "libx264")]
    Libx264,
}

impl Encoder {
    pub const ALL: [Encoder; 4] = [
        Encoder::H264Nvenc,
        Encoder::H264Amf,
        Encoder::H264Qsv,
        Encoder::Libx264,
    ];

    pub fn codec_name(&self) -> &'static str {
        match self {
            Encoder::H264Nvenc => "h264_nvenc",
            Encoder::H264Amf => "h264_amf",
            Encoder::H264Qsv => "h264_qsv",
            Encoder::Libx264 => "libx264",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Encoder::H264Nvenc => "NVIDIA GPU (fast, recommended for editing)",
            Encoder::H264Amf => "AMD GPU (fast, recommended for editing)",
            Encoder::H264Qsv => "Intel integrated graphics",
            Encoder::Libx264 => "CPU only (universal, slower)",
        }
    }

    /// Accepts a codec name or a 1-based position in [`Encoder::ALL`].
    pub fn from_choice(choice: &str) -> Option<Encoder> {
        let choice = choice.trim();
        if let Ok(index) = choice.parse::<usize>() {
            return index.checked_sub(1).and_then(|i| Encoder::ALL.get(i).copied());
        }
        choice.parse().ok()
    }

    fn quality_args(&self) -> &'static [&'static str] {
        match self {
            Encoder::Libx264 | Encoder::H264Nvenc => &["-preset", "fast", "-crf", "22"],
            Encoder::H264Amf | Encoder::H264Qsv => &[],
        }
    }
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codec_name())
    }
}

impl FromStr for Encoder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Encoder::ALL
            .into_iter()
            .find(|encoder| encoder.codec_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown encoder '{}'", s))
    }
}

/// Arguments turning a video-only stream into an H.264 MP4 without audio.
pub fn mp4_args(input: &Path, output: &Path, encoder: Encoder) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-c:v".into(),
        encoder.codec_name().into(),
    ];
    args.extend(encoder.quality_args().iter().map(OsString::from));
    args.push("-an".into());
    args.push(output.into());
    args
}

/// Arguments turning an audio stream into a 320 kbps, 44.1 kHz MP3.
pub fn mp3_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-vn".into(),
        "-ab".into(),
        "320k".into(),
        "-ar".into(),
        "44100".into(),
        "-f".into(),
        "mp3".into(),
        output.into(),
    ]
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_path: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    pub async fn to_mp4(&self, input: &Path, output: &Path, encoder: Encoder) -> Result<()> {
        log::info!("Converting {:?} to MP4 with {}", input, encoder);
        self.run(mp4_args(input, output, encoder)).await
    }

    pub async fn to_mp3(&self, input: &Path, output: &Path) -> Result<()> {
        log::info!("Converting {:?} to MP3", input);
        self.run(mp3_args(input, output)).await
    }

    async fn run(&self, args: Vec<OsString>) -> Result<()> {
        log::debug!("Running {:?} {:?}", self.ffmpeg_path, args);
        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run ffmpeg at {:?}", self.ffmpeg_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(anyhow::anyhow!("ffmpeg exited with {}: {}", output.status, tail.join("\n")));
        }
        Ok(())
    }
}
