use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Error};
use clap::Parser;
use log::LevelFilter;

use crate::auto_update::{AutoUpdater, UpdateStatus};
use crate::cli::{Cli, Command};
use crate::config::{AppPaths, Settings};
use crate::history::History;
use crate::pipeline::{select_choice, DownloadPipeline, DownloadRequest};
use crate::transcode::{Encoder, Transcoder};
use crate::utils::progress_bar::ProgressBar;
use crate::utils::retry;
use crate::yt_dlp_interface::{ensure_binaries, normalize_video_url, video_choices, VideoInfo, YoutubeFetcher};

mod auto_update;
mod cli;
mod config;
mod history;
mod pipeline;
mod transcode;
mod utils;
mod yt_dlp_interface;

const FETCH_ATTEMPTS: u32 = 3;

fn init_logging(error_log: &Path, verbose: bool) -> Result<(), Error> {
    if let Some(parent) = error_log.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create a shared file handle for error logging
    let error_log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(error_log)
        .with_context(|| format!("Failed to open error log {:?}", error_log))?;
    let error_log_file = Arc::new(Mutex::new(error_log_file));

    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .format(move |buf, record| {
            use std::io::Write;
            let output = format!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            );

            // For error messages, also write to the error log file
            if record.level() == log::Level::Error {
                if let Ok(mut file) = error_log_file.try_lock() {
                    let _ = writeln!(file, "{}", &output);
                }
            }

            writeln!(buf, "{}", &output)
        })
        .filter(None, if verbose { LevelFilter::Debug } else { LevelFilter::Warn })
        .parse_env("RUST_LOG")
        .init();
    Ok(())
}

async fn fetch_info(fetcher: &YoutubeFetcher, url: &str) -> Result<VideoInfo, Error> {
    retry::retry_with_backoff(FETCH_ATTEMPTS, move || fetcher.fetch_info(url)).await
}

async fn list_formats(paths: &AppPaths, url: &str) -> Result<(), Error> {
    let url = normalize_video_url(url.trim());
    let toolchain = ensure_binaries(&paths.libraries_dir).await?;
    let fetcher = YoutubeFetcher::new(&toolchain);

    let info = fetch_info(&fetcher, &url).await?;
    let choices = video_choices(&info);

    println!("{}", info.title);
    if let Some(thumbnail) = &info.thumbnail {
        println!("Thumbnail: {}", thumbnail);
    }

    if choices.is_empty() {
        println!("No video-only formats found.");
        return Ok(());
    }

    println!("Found {} video resolutions:", choices.len());
    for (i, choice) in choices.iter().enumerate() {
        println!("{:>3}. {}", i + 1, choice.description());
    }
    println!("Final video file: {}.mp4", info.title);
    Ok(())
}

async fn download(
    paths: &AppPaths,
    url: &str,
    format_id: Option<String>,
    pick: Option<usize>,
    mp3_only: bool,
) -> Result<(), Error> {
    let url = normalize_video_url(url.trim());
    if url.is_empty() {
        return Err(anyhow::anyhow!("Please enter a valid URL."));
    }

    let settings = Settings::load(&paths.settings_file());
    std::fs::create_dir_all(&settings.download_folder)
        .with_context(|| format!("Failed to create {:?}", settings.download_folder))?;

    let toolchain = ensure_binaries(&paths.libraries_dir).await?;
    let fetcher = YoutubeFetcher::new(&toolchain);

    let mut progress_bar = ProgressBar::new();
    progress_bar.status("Preparing download...");
    let info = fetch_info(&fetcher, &url).await?;

    let video = if mp3_only {
        None
    } else {
        let choices = video_choices(&info);
        Some(select_choice(&choices, format_id.as_deref(), pick)?)
    };
    if let Some(choice) = &video {
        log::info!("Selected video format {}", choice.description());
    }

    let request = DownloadRequest {
        url,
        title: info.title,
        video,
    };
    let pipeline = DownloadPipeline::new(
        fetcher,
        Transcoder::new(toolchain.ffmpeg.clone()),
        settings.download_folder.clone(),
        settings.encoder,
        paths.history_file(),
    );

    let outcome = pipeline.run(&request, &mut progress_bar).await?;

    if let Some(mp4) = &outcome.mp4 {
        println!("Video: {}", mp4.display());
    }
    println!("Audio: {}", outcome.mp3.display());
    println!("Download completed in {:.1} seconds.", outcome.elapsed.as_secs_f64());
    Ok(())
}

fn select_encoder(paths: &AppPaths, choice: Option<String>) -> Result<(), Error> {
    let mut settings = Settings::load(&paths.settings_file());

    let Some(choice) = choice else {
        for (i, encoder) in Encoder::ALL.iter().enumerate() {
            let marker = if *encoder == settings.encoder { "*" } else { " " };
            println!("{} {}. {:<11} {}", marker, i + 1, encoder.codec_name(), encoder.description());
        }
        return Ok(());
    };

    let encoder = Encoder::from_choice(&choice).ok_or_else(|| {
        anyhow::anyhow!("Unknown encoder '{}'; pick 1-{} or a codec name", choice, Encoder::ALL.len())
    })?;
    settings.encoder = encoder;
    settings.save(&paths.settings_file())?;
    println!("Encoder '{}' saved.", encoder);
    Ok(())
}

fn select_folder(paths: &AppPaths, path: Option<std::path::PathBuf>) -> Result<(), Error> {
    let mut settings = Settings::load(&paths.settings_file());

    match path {
        Some(path) => {
            settings.set_download_folder(&path)?;
            settings.save(&paths.settings_file())?;
            println!("Selected folder: {}", settings.download_folder.display());
        }
        None => println!("{}", settings.download_folder.display()),
    }
    Ok(())
}

async fn update_tools(paths: &AppPaths) -> Result<(), Error> {
    let updater = AutoUpdater::new(paths.libraries_dir.clone());
    let mut failed = false;

    for (binary, status) in updater.check_for_updates().await {
        match status {
            UpdateStatus::Updated { from, to } if from.is_empty() => println!("{}: installed {}", binary.name(), to),
            UpdateStatus::Updated { from, to } => println!("{}: {} -> {}", binary.name(), from, to),
            UpdateStatus::UpToDate(version) => println!("{}: up to date ({})", binary.name(), version),
            UpdateStatus::NotManaged => println!("{}: not managed by zkdl, skipped", binary.name()),
            UpdateStatus::NoReleaseFeed => println!("{}: no release feed for this build, skipped", binary.name()),
            UpdateStatus::Failed(reason) => {
                failed = true;
                println!("{}: update failed: {}", binary.name(), reason);
            }
        }
    }

    if failed {
        return Err(anyhow::anyhow!("Some tools could not be updated"));
    }
    Ok(())
}

async fn run(cli: Cli, paths: AppPaths) -> Result<(), Error> {
    match cli.command {
        Command::Normalize { url } => {
            println!("{}", normalize_video_url(&url));
            Ok(())
        }
        Command::Formats { url } => list_formats(&paths, &url).await,
        Command::Download { url, format_id, pick, mp3_only } => {
            download(&paths, &url, format_id, pick, mp3_only).await
        }
        Command::History => {
            println!("{}", History::load(&paths.history_file()).render());
            Ok(())
        }
        Command::Encoder { choice } => select_encoder(&paths, choice),
        Command::Folder { path } => select_folder(&paths, path),
        Command::Setup => {
            let toolchain = ensure_binaries(&paths.libraries_dir).await?;
            println!("yt-dlp: {}", toolchain.yt_dlp.display());
            println!("ffmpeg: {}", toolchain.ffmpeg.display());
            Ok(())
        }
        Command::Update => update_tools(&paths).await,
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let dotenv_path = config::load_environment()?;
    let paths = AppPaths::from_env()?;
    init_logging(&paths.error_log_file(), cli.verbose)?;

    if let Some(path) = dotenv_path {
        log::info!("Loaded environment variables from {:?}", path);
    }
    log::debug!("Libraries directory: {:?}, data directory: {:?}", paths.libraries_dir, paths.data_dir);

    let start_time = std::time::Instant::now();
    let result = run(cli, paths).await;
    log::debug!("Finished in {:.2?}", start_time.elapsed());

    if let Err(e) = &result {
        log::error!("{:#}", e);
    }
    result
}
