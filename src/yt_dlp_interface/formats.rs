use std::collections::HashSet;
use serde::Deserialize;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Subset of the metadata printed by `yt-dlp -J`.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatEntry>,
}

fn default_title() -> String {
    "video".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatEntry {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

impl FormatEntry {
    fn is_video_only_webm(&self) -> bool {
        self.acodec.as_deref() == Some("none")
            && self.vcodec.as_deref() != Some("none")
            && self.ext.as_deref() == Some("webm")
    }

    fn resolution_label(&self) -> String {
        match (&self.resolution, self.height) {
            (Some(resolution), _) if !resolution.is_empty() => resolution.clone(),
            (_, Some(height)) if height > 0 => format!("{}p", height),
            _ => "?p".to_string(),
        }
    }

    fn size_bytes(&self) -> u64 {
        self.filesize.or(self.filesize_approx).unwrap_or(0)
    }
}

/// A video-only stream the user can pick for the MP4 output.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoChoice {
    pub format_id: String,
    pub resolution: String,
    pub ext: String,
    pub size_mb: f64,
}

impl VideoChoice {
    pub fn description(&self) -> String {
        format!(
            "{} — {} — {}MB (itag:{})",
            self.resolution,
            self.ext.to_uppercase(),
            format_mb(self.size_mb),
            self.format_id
        )
    }

    /// Short label stored in the download history.
    pub fn history_label(&self) -> String {
        self.description()
            .split('—')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

pub fn parse_video_info(json: &str) -> anyhow::Result<VideoInfo> {
    serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Failed to parse yt-dlp metadata: {}", e))
}

/// Keeps the first webm video-only format for each resolution, in extractor order.
pub fn video_choices(info: &VideoInfo) -> Vec<VideoChoice> {
    let mut seen_resolutions = HashSet::new();

    info.formats
        .iter()
        .filter(|format| format.is_video_only_webm())
        .filter_map(|format| {
            let resolution = format.resolution_label();
            if !seen_resolutions.insert(resolution.clone()) {
                return None;
            }
            Some(VideoChoice {
                format_id: format.format_id.clone(),
                resolution,
                ext: format.ext.clone().unwrap_or_default(),
                size_mb: round_mb(format.size_bytes()),
            })
        })
        .collect()
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

// Whole sizes keep one decimal: "1.0", not "1".
fn format_mb(size_mb: f64) -> String {
    if size_mb.fract() == 0.0 {
        format!("{:.1}", size_mb)
    } else {
        size_mb.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "title": "Some Song (Official Video)",
        "thumbnail": "https://i.ytimg.com/vi/abcdefghijk/maxresdefault.jpg",
        "formats": [
            {"format_id": "251", "ext": "webm", "acodec": "opus", "vcodec": "none"},
            {"format_id": "278", "ext": "webm", "acodec": "none", "vcodec": "vp9", "resolution": "256x144", "height": 144, "filesize": 1048576},
            {"format_id": "160", "ext": "mp4", "acodec": "none", "vcodec": "avc1", "resolution": "256x144", "height": 144},
            {"format_id": "247", "ext": "webm", "acodec": "none", "vcodec": "vp9", "height": 720, "filesize_approx": 15938355},
            {"format_id": "302", "ext": "webm", "acodec": "none", "vcodec": "vp9", "height": 720, "filesize": 99},
            {"format_id": "sb0", "ext": "mhtml", "acodec": "none", "vcodec": "none"},
            {"format_id": "18", "ext": "mp4", "acodec": "mp4a", "vcodec": "avc1"},
            {"format_id": "999", "ext": "webm", "acodec": "none", "vcodec": "vp9"}
        ]
    }"#;

    #[test]
    fn test_video_choices_filters_and_dedupes() {
        let info = parse_video_info(SAMPLE).unwrap();
        assert_eq!(info.title, "Some Song (Official Video)");
        assert!(info.thumbnail.is_some());

        let choices = video_choices(&info);
        let ids: Vec<&str> = choices.iter().map(|c| c.format_id.as_str()).collect();
        assert_eq!(ids, vec!["278", "247", "999"]);

        assert_eq!(choices[0].resolution, "256x144");
        assert_eq!(choices[0].size_mb, 1.0);
        assert_eq!(choices[1].resolution, "720p");
        assert_eq!(choices[1].size_mb, 15.2);
        assert_eq!(choices[2].resolution, "?p");
        assert_eq!(choices[2].size_mb, 0.0);
    }

    #[test]
    fn test_description_and_history_label() {
        let choice = VideoChoice {
            format_id: "247".to_string(),
            resolution: "1280x720".to_string(),
            ext: "webm".to_string(),
            size_mb: 15.2,
        };
        assert_eq!(choice.description(), "1280x720 — WEBM — 15.2MB (itag:247)");
        assert_eq!(choice.history_label(), "1280x720");
    }

    #[test]
    fn test_whole_sizes_keep_one_decimal() {
        let mut choice = VideoChoice {
            format_id: "278".to_string(),
            resolution: "256x144".to_string(),
            ext: "webm".to_string(),
            size_mb: 1.0,
        };
        assert_eq!(choice.description(), "256x144 — WEBM — 1.0MB (itag:278)");

        choice.size_mb = 0.0;
        assert_eq!(choice.description(), "256x144 — WEBM — 0.0MB (itag:278)");

        choice.size_mb = 3.25;
        assert_eq!(choice.description(), "256x144 — WEBM — 3.25MB (itag:278)");
    }

    #[test]
    fn test_missing_title_defaults_to_video() {
        let info = parse_video_info(r#"{"formats": []}"#).unwrap();
        assert_eq!(info.title, "video");
        assert!(video_choices(&info).is_empty());
    }

    #[test]
    fn test_invalid_metadata_is_an_error() {
        assert!(parse_video_info("ERROR: not json").is_err());
    }
}
