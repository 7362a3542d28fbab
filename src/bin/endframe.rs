use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use endframe::{
    BatchBoard, BatchEvent, BatchItemStatus, DecoderLogLevel, Delivery, DeliveryError,
    DirectorySink, DownloadSink, DownloadStrategy, ExtractOptions, ExtractionResult,
    FfmpegBackend, FrameExtractor, HandleRegistry, ResourceHandle, Session, SessionOutcome,
    VideoFile, is_acceptable,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

const CLI_AFTER_HELP: &str = "Examples:\n  endframe extract clip.mov\n  endframe extract clip.mov --frames 3 --out stills\n  endframe extract *.mp4 --progress --json\n  endframe check holiday.mkv notes.txt\n  endframe completions zsh > _endframe";

#[derive(Debug, Parser)]
#[command(
    name = "endframe",
    version,
    about = "Save the last frames of video files as PNG stills",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while extracting.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract the final frames of one or more videos.
    #[command(
        about = "Extract end-of-video frames",
        after_help = "Examples:\n  endframe extract clip.mov --frames 2\n  endframe extract a.mp4 b.mkv --out stills --json"
    )]
    Extract {
        /// Input video files. More than one runs a batch.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Number of frames to take from the end of each video.
        #[arg(long, short = 'n', default_value_t = 1)]
        frames: usize,
        /// Output directory for the PNG files.
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Extract without writing any files.
        #[arg(long)]
        no_save: bool,
        /// Print results as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Give up waiting for a seek after this many milliseconds.
        #[arg(long)]
        seek_timeout_ms: Option<u64>,
        /// Fail a file that is not ready after this many milliseconds.
        #[arg(long)]
        ready_timeout_ms: Option<u64>,
    },

    /// Report which inputs would be accepted as videos.
    #[command(
        about = "Check inputs against the video filter",
        after_help = "Examples:\n  endframe check clip.ts notes.txt --json"
    )]
    Check {
        /// Files to check.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Print the report as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_log_level(value: &str) -> Option<DecoderLogLevel> {
    value.parse().ok()
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        endframe::set_decoder_log_level(parsed);
    }

    Ok(())
}

fn extract_options(
    seek_timeout_ms: Option<u64>,
    ready_timeout_ms: Option<u64>,
) -> ExtractOptions {
    let mut options = ExtractOptions::new();
    if let Some(milliseconds) = seek_timeout_ms {
        options = options.with_seek_timeout(Duration::from_millis(milliseconds));
    }
    if let Some(milliseconds) = ready_timeout_ms {
        options = options.with_ready_timeout(Duration::from_millis(milliseconds));
    }
    options
}

/// Writes stills through a [`DirectorySink`] and remembers which ones failed.
struct SaveLedger {
    sink: DirectorySink,
    failed: Mutex<Vec<String>>,
}

impl SaveLedger {
    fn new(sink: DirectorySink) -> Self {
        Self {
            sink,
            failed: Mutex::new(Vec::new()),
        }
    }

    fn failed(&self) -> Vec<String> {
        self.failed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DownloadSink for SaveLedger {
    fn download(&self, handle: &ResourceHandle, file_name: &str) -> Result<(), DeliveryError> {
        let outcome = self.sink.download(handle, file_name);
        if outcome.is_err() {
            self.failed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(file_name.to_string());
        }
        outcome
    }
}

fn build_session(
    options: ExtractOptions,
    out: &Path,
    save: bool,
    overwrite: bool,
) -> (Session, Option<Arc<SaveLedger>>) {
    let registry = HandleRegistry::new();
    let mut delivery = Delivery::new();
    let mut ledger = None;
    if save {
        let sink = DirectorySink::new(out, Arc::clone(&registry)).with_overwrite(overwrite);
        let saves = Arc::new(SaveLedger::new(sink));
        delivery = delivery.with_strategy(DownloadStrategy::new(
            Arc::clone(&saves) as Arc<dyn DownloadSink>,
            Arc::clone(&registry),
            options.revoke_delay(),
        ));
        ledger = Some(saves);
    }
    let extractor = FrameExtractor::new(
        FfmpegBackend::shared(Arc::clone(&registry)),
        registry,
        options,
    );
    (Session::new(extractor, Arc::new(delivery)), ledger)
}

fn result_json(result: &ExtractionResult) -> Value {
    json!({
        "file_name": result.file_name(),
        "timestamp": result.timestamp(),
        "bytes": result.image_data().len(),
    })
}

fn status_label(status: BatchItemStatus) -> String {
    match status {
        BatchItemStatus::Completed => status.to_string().green().bold().to_string(),
        BatchItemStatus::Error => status.to_string().red().bold().to_string(),
        BatchItemStatus::Processing => status.to_string().cyan().to_string(),
        BatchItemStatus::Pending => status.to_string().dimmed().to_string(),
    }
}

fn print_single(
    results: &[ExtractionResult],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let payload = json!({
            "mode": "single",
            "frames": results.iter().map(result_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for result in results {
        println!(
            "{} {} @ {:.3}s",
            "frame".green().bold(),
            result.file_name(),
            result.timestamp()
        );
    }
    println!(
        "{} {}",
        "success:".green().bold(),
        format!("Extracted {} frame(s)", results.len()).green()
    );
    Ok(())
}

fn print_batch(board: &BatchBoard, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let progress = board.progress();

    if json {
        let items: Vec<Value> = board
            .items()
            .iter()
            .map(|item| {
                json!({
                    "id": item.id(),
                    "file": item.file().name(),
                    "status": item.status().to_string(),
                    "result": item.result().map(result_json),
                    "error": item.error(),
                })
            })
            .collect();
        let payload = json!({
            "mode": "batch",
            "items": items,
            "completed": progress.completed,
            "failed": progress.failed,
            "percentage": progress.percentage,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for item in board.items() {
        match (item.result(), item.error()) {
            (Some(result), _) => println!(
                "{:<10} {} -> {}",
                status_label(item.status()),
                item.file(),
                result.file_name()
            ),
            (None, Some(error)) => println!(
                "{:<10} {} ({error})",
                status_label(item.status()),
                item.file()
            ),
            (None, None) => println!("{:<10} {}", status_label(item.status()), item.file()),
        }
    }
    println!(
        "{} {}/{} completed ({}%)",
        "batch:".bold(),
        progress.completed,
        progress.total,
        progress.percentage
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Extract {
            inputs,
            frames,
            out,
            no_save,
            json,
            seek_timeout_ms,
            ready_timeout_ms,
        } => {
            if frames == 0 {
                return Err("--frames must be greater than 0".into());
            }

            let options = extract_options(seek_timeout_ms, ready_timeout_ms);
            let (session, ledger) = build_session(options, &out, !no_save, cli.global.overwrite);
            let files: Vec<VideoFile> = inputs.iter().map(VideoFile::new).collect();

            let progress_bar = if cli.global.progress {
                let accepted = files.iter().filter(|file| is_acceptable(file)).count();
                let bar = ProgressBar::new(accepted as u64);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?;
                bar.set_style(style.progress_chars("##-"));
                bar.enable_steady_tick(Duration::from_millis(120));
                Some(bar)
            } else {
                None
            };

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let outcome = runtime.block_on(session.process_with(
                files,
                frames,
                !no_save,
                |_board: &BatchBoard, event: &BatchEvent| {
                    let Some(bar) = &progress_bar else {
                        return;
                    };
                    match event {
                        BatchEvent::ItemProcessing { index } => {
                            bar.set_message(format!("item {}", index + 1));
                        }
                        BatchEvent::ItemCompleted { .. } | BatchEvent::ItemFailed { .. } => {
                            bar.inc(1);
                        }
                        _ => {}
                    }
                },
            ));

            if let Some(bar) = &progress_bar {
                bar.finish_with_message("done");
            }

            let failed = match outcome? {
                SessionOutcome::Single(results) => {
                    print_single(&results, json)?;
                    0
                }
                SessionOutcome::Batch(board) => {
                    print_batch(&board, json)?;
                    board.progress().failed
                }
            };
            session.reset();

            let unsaved = ledger.map(|ledger| ledger.failed()).unwrap_or_default();
            for file_name in &unsaved {
                eprintln!("{} could not save {file_name}", "warning:".yellow().bold());
            }

            if failed > 0 {
                return Err(format!("{failed} file(s) could not be processed").into());
            }
            if !unsaved.is_empty() {
                return Err(format!("{} frame(s) could not be saved", unsaved.len()).into());
            }
        }
        Commands::Check { inputs, json } => {
            let files: Vec<VideoFile> = inputs.iter().map(VideoFile::new).collect();
            if json {
                let payload: Vec<Value> = files
                    .iter()
                    .map(|file| json!({ "file": file.name(), "accepted": is_acceptable(file) }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for file in &files {
                    if is_acceptable(file) {
                        println!("{} {file}", "accepted".green().bold());
                    } else {
                        println!("{} {file}", "rejected".red().bold());
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "endframe", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, SaveLedger, parse_log_level};
    use clap::{CommandFactory, Parser};
    use endframe::{DecoderLogLevel, DirectorySink, DownloadSink, HandleRegistry, HandleTarget};
    use std::sync::Arc;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_log_level_aliases() {
        assert_eq!(parse_log_level("quiet"), Some(DecoderLogLevel::Quiet));
        assert_eq!(parse_log_level("WARN"), Some(DecoderLogLevel::Warning));
        assert_eq!(parse_log_level("verbose"), None);
    }

    #[test]
    fn extract_defaults_to_one_frame_in_current_directory() {
        let cli = Cli::try_parse_from(["endframe", "extract", "clip.mov"]).unwrap();
        let Commands::Extract {
            inputs, frames, out, no_save, ..
        } = cli.command
        else {
            panic!("expected the extract command");
        };
        assert_eq!(inputs.len(), 1);
        assert_eq!(frames, 1);
        assert_eq!(out, std::path::PathBuf::from("."));
        assert!(!no_save);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli =
            Cli::try_parse_from(["endframe", "extract", "a.mp4", "b.mkv", "-n", "3", "--overwrite"])
                .unwrap();
        assert!(cli.global.overwrite);
        assert!(matches!(cli.command, Commands::Extract { frames: 3, .. }));
    }

    #[test]
    fn extract_requires_an_input() {
        assert!(Cli::try_parse_from(["endframe", "extract"]).is_err());
    }

    #[test]
    fn save_ledger_records_refused_writes() {
        let directory = tempfile::tempdir().unwrap();
        std::fs::write(directory.path().join("clip_end.png"), b"old").unwrap();
        let registry = HandleRegistry::new();
        let handle = registry.allocate(HandleTarget::Bytes(Arc::from(&b"png"[..])));
        let ledger = SaveLedger::new(DirectorySink::new(directory.path(), registry.clone()));

        assert!(ledger.download(&handle, "clip_end.png").is_err());
        assert!(ledger.download(&handle, "other_end.png").is_ok());

        assert_eq!(ledger.failed(), ["clip_end.png"]);
    }
}
