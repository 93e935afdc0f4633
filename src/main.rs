use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use eyre::{Result, WrapErr, bail, eyre};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use ytldr::config::{self, Config};
use ytldr::output::{self, TerminalSink};
use ytldr::page::InitialPlayerResponseResolver;
use ytldr::summary::{HttpBackend, StreamOptions, StreamOutcome, SummaryConsumer, SummaryRequest};
use ytldr::youtube::{HttpPageSource, TranscriptFetcher};
use ytldr::{ErrorKind, SummaryError, TranscriptError, VideoId};

mod cli;

use cli::{Cli, Command, FetchArgs, OutputFormat, ResolverKind, SummarizeArgs, TracksArgs, TranscriptArgs};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytldr.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytldr")
        .join("logs")
}

fn build_after_help(config: &Config) -> String {
    let config_path = config::config_path();
    let config_line = if config_path.exists() {
        format!("  \x1b[32m✅\x1b[0m config     {}", config_path.display())
    } else {
        format!("  \x1b[33m➖\x1b[0m config     {} (not found, using defaults)", config_path.display())
    };

    let log_path = log_dir().join("ytldr.log");

    format!(
        "\nSETTINGS:\n{config_line}\n  backend    {}\n\nLogs are written to: {}",
        config.backend_url(),
        log_path.display()
    )
}

fn error_kind(report: &eyre::Report) -> Option<ErrorKind> {
    report
        .downcast_ref::<TranscriptError>()
        .map(TranscriptError::kind)
        .or_else(|| report.downcast_ref::<SummaryError>().map(SummaryError::kind))
}

/// Retry an async operation with exponential backoff, only for retryable failures
async fn retry<F, Fut, T>(retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt < retries && error_kind(&e).is_some_and(ErrorKind::is_retryable) => {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                debug!("Attempt {} failed: {e}, retrying in {delay:?}", attempt + 1);
                eprintln!("{e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn build_fetcher(client: &reqwest::Client, args: &FetchArgs, config: &Config) -> TranscriptFetcher<HttpPageSource> {
    let mut options = config.fetch_options();
    if !args.lang.is_empty() {
        options.preferred_languages = args.lang.clone();
    }
    if let Some(threshold) = args.fallback_threshold {
        options.fallback_threshold = threshold;
    }
    debug!("Fetch options: {options:?}");

    let fetcher = TranscriptFetcher::new(HttpPageSource::new(client.clone())).with_options(options);
    match args.resolver {
        ResolverKind::Embedded => fetcher,
        ResolverKind::PlayerResponse => fetcher.with_resolver(InitialPlayerResponseResolver),
    }
}

fn parse_video_id(input: &str) -> Result<VideoId> {
    VideoId::from_input(input).wrap_err_with(|| format!("could not extract video ID from: {input}\n\nSupported formats:\n  https://www.youtube.com/watch?v=ID\n  https://youtu.be/ID\n  https://www.youtube.com/embed/ID\n  https://www.youtube.com/shorts/ID\n  <11-character video ID>"))
}

fn output_format(args: &TranscriptArgs, config: &Config) -> OutputFormat {
    if let Some(format) = args.format {
        return format;
    }
    config
        .default_format
        .as_deref()
        .and_then(|name| match <OutputFormat as clap::ValueEnum>::from_str(name, true) {
            Ok(format) => Some(format),
            Err(e) => {
                warn!("Ignoring config default_format {name:?}: {e}");
                None
            }
        })
        .unwrap_or(OutputFormat::Text)
}

async fn run_transcript(args: TranscriptArgs, config: &Config, client: &reqwest::Client, verbose: bool) -> Result<()> {
    let fetcher = build_fetcher(client, &args.fetch, config);
    let format = output_format(&args, config);

    // Collect URLs: from arg or stdin
    let urls = if let Some(ref url) = args.url {
        vec![url.clone()]
    } else {
        let stdin = io::stdin();
        stdin.lock().lines().collect::<Result<Vec<_>, _>>()?
    };

    if urls.iter().all(|u| u.trim().is_empty()) {
        bail!("no URL or video ID provided\n\nUsage: ytldr transcript <URL>\n       echo <URL> | ytldr transcript");
    }

    for url_input in &urls {
        let url_input = url_input.trim();
        if url_input.is_empty() {
            continue;
        }

        let video_id = parse_video_id(url_input)?;
        let transcript = fetcher
            .fetch(&video_id)
            .await
            .wrap_err_with(|| format!("failed to fetch transcript for {video_id}"))?;

        if verbose {
            eprintln!(
                "Video: {}\nLanguage: {}{}\nFormat: {}\nSegments: {}",
                transcript.video_id,
                transcript.language,
                if transcript.generated { " (auto-generated)" } else { "" },
                transcript.format,
                transcript.segments.len(),
            );
        }

        let rendered = match format {
            OutputFormat::Text => output::render_text(&transcript),
            OutputFormat::Json => output::render_json(&transcript)?,
            OutputFormat::Srt => output::render_srt(&transcript),
            OutputFormat::Timed => output::render_timed(&transcript),
        };

        if let Some(ref path) = args.output {
            std::fs::write(path, &rendered)?;
            if verbose {
                eprintln!("Output written to: {}", path.display());
            }
        } else {
            println!("{rendered}");
        }
    }

    Ok(())
}

async fn run_tracks(args: TracksArgs, config: &Config, client: &reqwest::Client) -> Result<()> {
    let video_id = parse_video_id(&args.url)?;
    let tracks = build_fetcher(client, &args.fetch, config)
        .list_tracks(&video_id)
        .await
        .wrap_err_with(|| format!("failed to list caption tracks for {video_id}"))?;
    println!("{}", output::render_tracks(&tracks));
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling summary stream");
            child.cancel();
        }
    });
    token
}

/// Run `work` unless `token` fires first. Work that completes in the same poll wins,
/// so a stream that handles the token itself still reports its own outcome.
async fn until_cancelled<F: std::future::Future>(token: &CancellationToken, work: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        output = work => Some(output),
        _ = token.cancelled() => None,
    }
}

async fn run_summarize(args: SummarizeArgs, config: &Config, client: &reqwest::Client, verbose: bool) -> Result<()> {
    let video_id = parse_video_id(&args.url)?;
    let user_id = args
        .user
        .clone()
        .or_else(|| config.user_id(std::env::var(config::USER_ID_ENV).ok()))
        .ok_or_else(|| {
            eyre!(
                "no user id configured\n\nPass --user <ID>, set {}, or add user_id to {}",
                config::USER_ID_ENV,
                config::config_path().display()
            )
        })?;

    let backend_url = args.backend.clone().unwrap_or_else(|| config.backend_url().to_string());
    let timeout = args.timeout.map(Duration::from_secs).unwrap_or_else(|| config.timeout());
    if verbose {
        eprintln!("Backend: {backend_url}\nUser: {user_id}\nTimeout: {}s", timeout.as_secs());
    }

    let fetcher = build_fetcher(client, &args.fetch, config);
    let backend = HttpBackend::new(client.clone(), backend_url);
    let cancel = cancel_on_ctrl_c();
    let consumer = SummaryConsumer::new(backend.clone(), backend).with_options(StreamOptions {
        timeout,
        cancel: Some(cancel.clone()),
    });

    // Ctrl-C must also stop the page fetch, usage check, request and retry backoff.
    let attempts = retry(args.retries, || {
        let fetcher = &fetcher;
        let consumer = &consumer;
        let video_id = &video_id;
        let user_id = &user_id;
        let live = args.live;
        async move {
            let transcript = match fetcher.fetch(video_id).await {
                Ok(transcript) => transcript.segments,
                Err(e) if e.kind().is_retryable() => return Err(eyre::Report::from(e)),
                Err(e) => {
                    warn!("Summarizing {video_id} without a transcript: {e}");
                    eprintln!("Warning: {e}; summarizing without a transcript");
                    Vec::new()
                }
            };
            if verbose {
                eprintln!("Transcript segments: {}", transcript.len());
            }

            let request = SummaryRequest {
                video_id: video_id.clone(),
                transcript,
                user_id: user_id.clone(),
                subscription: None,
            };
            let mut sink = TerminalSink::new(io::stdout(), live);
            let outcome = consumer.stream_summary(&request, &mut sink).await;
            sink.finish()?;
            Ok::<_, eyre::Report>(outcome?)
        }
    });
    let Some(outcome) = until_cancelled(&cancel, attempts).await else {
        eprintln!("Cancelled.");
        info!("Summary for {video_id} cancelled before the stream started");
        return Ok(());
    };
    let outcome = outcome?;

    match outcome {
        StreamOutcome::Completed { done: false, .. } => debug!("Summary for {video_id} ended without a done marker"),
        StreamOutcome::Completed { .. } | StreamOutcome::Partial(_) => {}
        StreamOutcome::LimitReached(usage) => {
            info!("Usage limit reached: {}/{}", usage.usage.current, usage.usage.limit)
        }
        StreamOutcome::Cancelled(artifact) => {
            eprintln!("Cancelled.");
            debug!("Cancelled after {} bytes", artifact.text().len());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    // Load config file (non-fatal if missing/invalid)
    let config = Config::load().unwrap_or_else(|e| {
        warn!("Ignoring config: {e}");
        Config::default()
    });

    let after_help = build_after_help(&config);
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    if cli.verbose {
        let config_path = config::config_path();
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
    }

    let client = reqwest::Client::new();

    match cli.command {
        Command::Transcript(args) => run_transcript(args, &config, &client, cli.verbose).await,
        Command::Tracks(args) => run_tracks(args, &config, &client).await,
        Command::Summarize(args) => run_summarize(args, &config, &client, cli.verbose).await,
    }
}
