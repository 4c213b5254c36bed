use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "zkdl", version, about = "Download a video's audio and video and convert them to MP3/MP4")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the canonical form of a video link
    Normalize { url: String },

    /// List the video-only formats available for a video
    Formats { url: String },

    /// Download audio (MP3) and video (MP4)
    Download {
        url: String,

        /// Video format id to download (see `formats`)
        #[arg(long = "format", conflicts_with = "pick")]
        format_id: Option<String>,

        /// 1-based position in the `formats` list
        #[arg(long)]
        pick: Option<usize>,

        /// Only produce the MP3
        #[arg(long, conflicts_with_all = ["format_id", "pick"])]
        mp3_only: bool,
    },

    /// Show previous downloads
    History,

    /// Show the video encoder options, or select one by name or number
    Encoder { choice: Option<String> },

    /// Show the download folder, or change it
    Folder { path: Option<PathBuf> },

    /// Install yt-dlp and ffmpeg if they are missing
    Setup,

    /// Check the installed tools for newer releases
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_flags() {
        let cli = Cli::try_parse_from(["zkdl", "download", "https://youtu.be/abcdefghijk", "--pick", "2"]).unwrap();
        match cli.command {
            Command::Download { url, format_id, pick, mp3_only } => {
                assert_eq!(url, "https://youtu.be/abcdefghijk");
                assert_eq!(format_id, None);
                assert_eq!(pick, Some(2));
                assert!(!mp3_only);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["zkdl", "download", "u", "--mp3-only", "--pick", "1"]).is_err());
        assert!(Cli::try_parse_from(["zkdl", "download", "u", "--format", "247", "--pick", "1"]).is_err());
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["zkdl", "history", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::History));
    }
}
