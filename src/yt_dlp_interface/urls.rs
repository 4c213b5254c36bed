use url::Url;

const CANONICAL_WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const VIDEO_ID_LEN: usize = 11;

const WATCH_HOSTS: [&str; 4] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];

pub fn get_latest_yt_dlp_url() -> String {
    let os = if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else if cfg!(target_os = "linux") {
        "yt-dlp_linux"
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos"
    } else {
        "yt-dlp"  // fallback
    };

    format!("https://github.com/yt-dlp/yt-dlp/releases/latest/download/{}", os)
}

pub fn get_latest_ffmpeg_url() -> String {
    if cfg!(target_os = "windows") {
        "https://github.com/BtbN/FFmpeg-Builds/releases/latest/download/ffmpeg-master-latest-win64-gpl.zip".to_string()
    } else if cfg!(target_os = "linux") {
        "https://johnvansickle.com/ffmpeg/builds/ffmpeg-git-amd64-static.tar.xz".to_string()
    } else {
        "https://evermeet.cx/ffmpeg/get/ffmpeg/7z".to_string()
    }
}

/// Rewrites any recognized video link shape into
/// `https://www.youtube.com/watch?v=<id>`.
///
/// Input that is not a recognized video link (other sites, plain text,
/// links without a well-formed 11 character id) comes back unchanged.
pub fn normalize_video_url(raw_url: &str) -> String {
    match video_id(raw_url) {
        Some(id) => format!("{CANONICAL_WATCH_URL}{id}"),
        None => raw_url.to_string(),
    }
}

/// Extracts the video id from a recognized link shape.
pub fn video_id(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if host == "youtu.be" {
        match segments.as_slice() {
            [id] => Some(id.to_string()),
            _ => None,
        }
    } else if WATCH_HOSTS.contains(&host.as_str()) {
        match segments.as_slice() {
            ["watch"] => url
                .query_pairs()
                .find_map(|(key, value)| (key == "v").then(|| value.into_owned())),
            ["shorts", id] | ["embed", id] => Some(id.to_string()),
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| is_valid_video_id(id))
}

fn is_valid_video_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "https://www.youtube.com/watch?v=abcdefghijk";

    #[test]
    fn test_recognized_shapes_map_to_canonical() {
        let cases = [
            "https://www.youtube.com/watch?v=abcdefghijk",
            "https://youtu.be/abcdefghijk",
            "https://www.youtube.com/shorts/abcdefghijk",
            "https://music.youtube.com/watch?v=abcdefghijk",
            "https://www.youtube.com/watch?v=abcdefghijk&ab_channel=Test",
            "https://www.youtube.com/embed/abcdefghijk",
            "https://www.youtube.com/watch?v=abcdefghijk&list=PL1234567890",
        ];

        for input in cases {
            assert_eq!(normalize_video_url(input), CANONICAL, "input: {}", input);
        }
    }

    #[test]
    fn test_unrecognized_input_is_returned_unchanged() {
        let cases = [
            "https://www.notyoutube.com/",
            "abcdefghijk",
            "",
            "   ",
            "https://www.youtube.com/",
            "https://www.youtube.com/watch?list=PL1234567890",
            "https://www.youtube.com/watch?v=",
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/watch?v=abcdefghijkl",
            "https://youtu.be/",
            "https://youtu.be/abc$efghijk",
            "https://vimeo.com/abcdefghijk",
            "ftp://www.youtube.com/watch?v=abcdefghijk",
            "https://www.youtube.com/channel/abcdefghijk",
        ];

        for input in cases {
            assert_eq!(normalize_video_url(input), input, "input: {:?}", input);
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "https://youtu.be/abcdefghijk?si=share",
            "https://m.youtube.com/watch?feature=share&v=A1b2C3d4_-Z",
            "https://www.youtube.com/shorts/abcdefghijk/",
            "http://youtube.com/embed/abcdefghijk",
            "https://www.notyoutube.com/",
            "not a url at all",
        ];

        for input in inputs {
            let once = normalize_video_url(input);
            assert_eq!(normalize_video_url(&once), once, "input: {}", input);
        }
    }

    #[test]
    fn test_alternate_hosts_and_parameter_order() {
        assert_eq!(
            normalize_video_url("https://m.youtube.com/watch?feature=share&v=A1b2C3d4_-Z"),
            "https://www.youtube.com/watch?v=A1b2C3d4_-Z"
        );
        assert_eq!(normalize_video_url("http://youtube.com/embed/abcdefghijk"), CANONICAL);
        assert_eq!(normalize_video_url("https://youtu.be/abcdefghijk?si=share"), CANONICAL);
        assert_eq!(normalize_video_url("  https://youtu.be/abcdefghijk \n"), CANONICAL);
    }

    #[test]
    fn test_video_id() {
        assert_eq!(video_id("https://youtu.be/abcdefghijk").as_deref(), Some("abcdefghijk"));
        assert_eq!(video_id("https://www.notyoutube.com/watch?v=abcdefghijk"), None);
        assert_eq!(video_id("abcdefghijk"), None);
    }

    #[test]
    fn test_release_urls_point_at_known_hosts() {
        assert!(get_latest_yt_dlp_url().starts_with("https://github.com/yt-dlp/yt-dlp/releases/latest/download/"));
        assert!(get_latest_ffmpeg_url().starts_with("https://"));
    }
}
