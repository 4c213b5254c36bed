pub mod fetcher;
pub mod formats;
pub mod utils;
pub mod urls;
pub mod downloader;
pub mod ensure;

pub use fetcher::YoutubeFetcher;
pub use formats::{video_choices, VideoChoice, VideoInfo};
pub use urls::normalize_video_url;
pub use ensure::ensure_binaries;
