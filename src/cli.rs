// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Two subcommands:
// - search:        crawl posts (and comments) matching one or more queries
// - check-tokens:  test every access token once and report its state
//
// Tokens can be given with --token (repeatable), --tokens a,b,c or the
// WALL_SWEEPER_TOKENS environment variable, so they don't have to sit in
// shell history.
// =============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use wall_sweeper::export::ExportFormat;
use wall_sweeper::{MatchMode, DEFAULT_BASE_URL};

#[derive(Parser, Debug)]
#[command(
    name = "wall-sweeper",
    version,
    about = "Find posts and comments mentioning a keyword over any date range",
    long_about = "wall-sweeper searches a rate-limited social network API slice by slice over a date range, \
                  rotating between access tokens, and saves matching posts and their comments as JSON lines."
)]
pub struct Cli {
    /// Show debug logs (same as RUST_LOG=wall_sweeper=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search posts matching one or more queries
    ///
    /// Example: wall-sweeper search budget --from 2024-03-01 --to 2024-03-08 --tokens abc,def
    Search(SearchArgs),

    /// Check which access tokens work
    CheckTokens {
        #[command(flatten)]
        tokens: TokenArgs,

        /// Output results in JSON format instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Keyword or phrase to look for (give several to run them all)
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Start of the range: 2024-03-01, "2024-03-01 08:30" or RFC 3339. Naive times are UTC.
    #[arg(long, value_parser = parse_time)]
    pub from: DateTime<Utc>,

    /// End of the range (exclusive), same formats as --from
    #[arg(long, value_parser = parse_time)]
    pub to: DateTime<Utc>,

    /// exact = whole words/phrase, partial = substring
    #[arg(long, value_enum, default_value_t = ModeArg::Exact)]
    pub mode: ModeArg,

    /// How many work items run at once
    #[arg(long, default_value_t = wall_sweeper::config::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Pause after every request, in seconds
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(0..=10))]
    pub pause_secs: u64,

    /// Divide the pause by the number of tokens
    #[arg(long)]
    pub scale_pause: bool,

    /// Width of each time window, in hours
    #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(u64).range(1..))]
    pub step_hours: u64,

    /// Skip fetching comments
    #[arg(long)]
    pub no_comments: bool,

    /// Only keep posts from this wall (communities are negative, e.g. -1)
    #[arg(long, allow_negative_numbers = true)]
    pub owner_id: Option<i64>,

    /// Directory for the posts and comments files
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// File format for --out
    #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
    pub format: FormatArg,

    /// Output the summary in JSON format instead of a table
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub tokens: TokenArgs,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Access token (repeat for more)
    #[arg(long = "token")]
    pub token: Vec<String>,

    /// Comma-separated access tokens
    #[arg(long = "tokens", env = "WALL_SWEEPER_TOKENS", value_delimiter = ',', hide_env_values = true)]
    pub tokens: Vec<String>,

    /// API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL, hide = true)]
    pub api_url: String,
}

impl TokenArgs {
    /// Every token from every source, trimmed, blanks dropped
    pub fn all(&self) -> Vec<String> {
        self.token
            .iter()
            .chain(self.tokens.iter())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Exact,
    Partial,
}

impl From<ModeArg> for MatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Exact => MatchMode::Exact,
            ModeArg::Partial => MatchMode::Partial,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Csv,
    Jsonl,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Jsonl => ExportFormat::Jsonl,
        }
    }
}

// Accepts RFC 3339, "YYYY-MM-DD HH:MM[:SS]" or a bare date (midnight).
fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    Err(format!("'{}' is not a date (try 2024-03-01 or 2024-03-01 08:30)", s))
}
