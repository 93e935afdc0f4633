use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Srt,
    Timed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResolverKind {
    /// The `"captions":` block of the watch page
    Embedded,
    /// The `ytInitialPlayerResponse` assignment
    PlayerResponse,
}

#[derive(Parser)]
#[command(
    name = "ytldr",
    about = "YouTube transcripts and streamed summaries",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Show extraction method and metadata
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the transcript of a video
    Transcript(TranscriptArgs),

    /// List the caption tracks a video offers
    Tracks(TracksArgs),

    /// Stream a summary of a video from the summary service
    Summarize(SummarizeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Preferred caption language, in priority order (repeatable)
    #[arg(short, long = "lang")]
    pub lang: Vec<String>,

    /// How to locate the caption tracks in the watch page
    #[arg(long, value_enum, default_value_t = ResolverKind::Embedded)]
    pub resolver: ResolverKind,

    /// Also try the XML format when JSON3 yields fewer segments than this
    #[arg(long)]
    pub fallback_threshold: Option<usize>,
}

#[derive(Args)]
pub struct TranscriptArgs {
    /// YouTube video URL or video ID (reads from stdin if omitted)
    pub url: Option<String>,

    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Output format: text (default), json, srt, timed
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct TracksArgs {
    /// YouTube video URL or video ID
    pub url: String,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args)]
pub struct SummarizeArgs {
    /// YouTube video URL or video ID
    pub url: String,

    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Redraw the summary as chunks arrive
    #[arg(long)]
    pub live: bool,

    /// Summary service base URL
    #[arg(long)]
    pub backend: Option<String>,

    /// User id sent to the summary service (or YTLDR_USER_ID)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Seconds to wait for the summary service to answer
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Re-run fetch and summary this many times on retryable failures
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}
