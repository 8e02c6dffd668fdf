// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow, Context};
use log::{error, warn, info, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::io::Write;
use std::sync::Arc;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;

use translatity::app_config::{self, Config};
use translatity::file_utils::FileManager;
use translatity::job::JobStatus;
use translatity::providers::gemini::Gemini;
use translatity::{QueueScheduler, mask_secret};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate subtitle files (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for translatity
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug, Clone)]
struct TranslateArgs {
    /// SRT files or directories to translate
    #[arg(value_name = "PATHS")]
    paths: Vec<PathBuf>,

    /// Source language code or name (e.g., 'en', 'English')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code or name (e.g., 'pt', 'Brazilian Portuguese')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Free-form context for the model (show name, genre, character names)
    #[arg(long)]
    context: Option<String>,

    /// API key; may be repeated to rotate between several keys
    #[arg(long = "api-key", env = "TRANSLATITY_API_KEYS", value_delimiter = ',', hide_env_values = true)]
    api_keys: Vec<String>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Number of files translated at the same time
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// Translatity - SRT subtitle translation queue
///
/// Translates SRT subtitle files with a large-context language model, several
/// files at a time, rotating between API keys when one hits its rate limit.
#[derive(Parser, Debug)]
#[command(name = "translatity")]
#[command(version)]
#[command(about = "Contextual SRT subtitle translation")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "Translatity translates SRT subtitle files in batches, feeding recently translated lines back as context.

EXAMPLES:
    translatity movie.srt -s en -t pt                    # Translate one file
    translatity season1/ -t \"Brazilian Portuguese\" -j 3  # Translate a directory, three files at a time
    translatity movie.srt --api-key KEY1 --api-key KEY2  # Rotate between two API keys
    translatity completions bash > translatity.bash      # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

OUTPUT:
    Each input gets an output_<name>.srt file next to it. Press Ctrl-C to cancel;
    files that were not finished are not written.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    translate: TranslateArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
    progress: Mutex<Option<MultiProgress>>,
}

static LOGGER: once_cell::sync::OnceCell<CustomLogger> = once_cell::sync::OnceCell::new();

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| CustomLogger {
            level: LevelFilter::Trace,
            progress: Mutex::new(None),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @routes: Log lines through the progress bars while they are drawn
    fn attach_progress(progress: Option<MultiProgress>) {
        if let Some(logger) = LOGGER.get() {
            *logger.progress.lock() = progress;
        }
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with("translatity")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let line = format!(
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );

            match self.progress.lock().as_ref() {
                Some(progress) => {
                    let _ = progress.println(line);
                }
                None => {
                    let _ = writeln!(std::io::stderr(), "{}", line);
                }
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config says otherwise
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "translatity", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => run_translate(cli.translate).await,
    }
}

/// Load the config file and apply command line overrides
fn load_config(options: &TranslateArgs) -> Result<Config> {
    let (mut config, created) = Config::load_or_create(&options.config_path)?;
    if created {
        warn!("Config file not found at '{}', created a default one.", options.config_path);
    }

    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(context) = &options.context {
        config.context_hint = context.clone();
    }
    if let Some(model) = &options.model {
        config.provider.model = model.clone();
    }
    if let Some(concurrency) = options.concurrency {
        config.queue.concurrency_limit = concurrency;
    }
    if !options.api_keys.is_empty() {
        config.credentials = options.api_keys.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} cues ({percent}%) {msg}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░")
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if options.paths.is_empty() {
        return Err(anyhow!("At least one subtitle file or directory is required"));
    }

    let config = load_config(&options)?;
    log::set_max_level(config.log_level.to_level_filter());

    let files = FileManager::expand_inputs(&options.paths, &config.output.prefix)?;
    if files.is_empty() {
        return Err(anyhow!("No .srt files found in the given paths"));
    }

    info!(
        "🚀 Translatity: {} -> {} with {} ({} files, {} keys: {})",
        config.source_language,
        config.target_language,
        config.provider.model,
        files.len(),
        config.credentials.len(),
        config.credentials.iter().map(|k| mask_secret(k)).collect::<Vec<_>>().join(", ")
    );

    let provider = Arc::new(Gemini::new(&config.provider)?);
    let scheduler = Arc::new(QueueScheduler::new(&config, provider)?);
    scheduler.enqueue(files, &config.source_language, &config.target_language, &config.context_hint);

    // Progress bars
    let multi_progress = MultiProgress::new();
    CustomLogger::attach_progress(Some(multi_progress.clone()));
    let overall_pb = multi_progress.add(ProgressBar::new(0));
    overall_pb.set_style(bar_style());
    overall_pb.set_message("overall");
    let file_bars: Arc<Mutex<HashMap<usize, ProgressBar>>> = Arc::new(Mutex::new(HashMap::new()));

    {
        let multi_progress = multi_progress.clone();
        let overall_pb = overall_pb.clone();
        let file_bars = file_bars.clone();
        scheduler.on_progress(move |event| {
            overall_pb.set_length(event.overall.total_cues as u64);
            overall_pb.set_position(event.overall.completed_cues as u64);

            let mut bars = file_bars.lock();
            let bar = bars.entry(event.file.job_id).or_insert_with(|| {
                let bar = multi_progress.add(ProgressBar::new(event.file.total_cues as u64));
                bar.set_style(bar_style());
                bar
            });
            bar.set_length(event.file.total_cues as u64);
            bar.set_position(event.file.completed_cues as u64);
            let name = event
                .file
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            bar.set_message(format!("{} [{}]", name, event.file.status.label()));
        });
    }
    {
        let file_bars = file_bars.clone();
        scheduler.on_file_complete(move |report| {
            if let Some(bar) = file_bars.lock().get(&report.job_id) {
                bar.finish();
            }
        });
    }

    // Ctrl-C cancels the run
    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling queue");
                scheduler.cancel();
            }
        });
    }

    let result = scheduler.start().await;
    overall_pb.finish();
    CustomLogger::attach_progress(None);
    let report = result?;

    for file in &report.files {
        match &file.status {
            JobStatus::Succeeded => {
                let output = file.output_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
                if file.fallbacks.is_empty() {
                    info!("✅ {} -> {}", file.source_path.display(), output);
                } else {
                    warn!(
                        "{} -> {} ({} batches left untranslated)",
                        file.source_path.display(),
                        output,
                        file.fallbacks.len()
                    );
                }
            }
            status => error!("{}: {}", file.source_path.display(), status),
        }
    }
    info!(
        "Done: {} succeeded, {} failed, {} cancelled",
        report.succeeded(),
        report.failed(),
        report.cancelled()
    );

    if let Some(fatal) = report.fatal {
        return Err(anyhow!(fatal));
    }
    let unfinished = report.unfinished();
    if unfinished > 0 {
        return Err(anyhow!("{} of {} files were not translated", unfinished, report.files.len()));
    }
    Ok(())
}
