// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (tracing, to stderr so stdout stays clean for --json)
// 3. Dispatch to the appropriate subcommand handler
// 4. Print results and exit with a proper code
//    (0 = clean run, 1 = partial results or failed work items, 2 = error)
//
// Ctrl-C stops a running crawl; whatever was found so far is still printed
// and written to disk.
// =============================================================================

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, SearchArgs, TokenArgs};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wall_sweeper::api::VkClient;
use wall_sweeper::config::{CrawlConfig, DEFAULT_PAGE_SIZE};
use wall_sweeper::credentials::{check_tokens, CredentialPool, TokenCheck};
use wall_sweeper::crawl::{CrawlObserver, CrawlOutcome, CrawlResult, Crawler, ProgressReport};
use wall_sweeper::error::CrawlError;
use wall_sweeper::export;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // If an unexpected error occurred, print it and exit with code 2
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "wall_sweeper=debug" } else { "wall_sweeper=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Search(args) => handle_search(args).await,
        Commands::CheckTokens { tokens, json } => handle_check_tokens(&tokens, json).await,
    }
}

fn require_tokens(args: &TokenArgs) -> Result<Vec<String>> {
    let tokens = args.all();
    if tokens.is_empty() {
        bail!("no access tokens given; use --token, --tokens or WALL_SWEEPER_TOKENS");
    }
    Ok(tokens)
}

// Handles the 'search' subcommand
async fn handle_search(args: SearchArgs) -> Result<i32> {
    let tokens = require_tokens(&args.tokens)?;
    let api = VkClient::new(&args.tokens.api_url, DEFAULT_PAGE_SIZE)?;

    let config = CrawlConfig::new(args.queries.iter().cloned(), args.from, args.to)
        .with_mode(args.mode.into())
        .with_tokens(tokens)
        .with_workers(args.workers)
        .with_pause(Duration::from_secs(args.pause_secs))
        .with_scaled_pause(args.scale_pause)
        .with_step(chrono::Duration::hours(args.step_hours as i64))
        .with_comments(!args.no_comments)
        .with_owner(args.owner_id);
    config.validate()?;

    let total = config.total_work_items()?;
    // With --json, stdout carries the report and nothing else
    if let Some(header) = search_header(&args, config.queries().len(), total) {
        println!("{}", header);
    }

    // Ctrl-C cancels; the crawl then returns what it has
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️  Stopping, keeping results found so far...");
            on_ctrl_c.cancel();
        }
    });

    let observer = BarObserver::new(total as u64);
    let crawler = Crawler::new(Arc::new(api), config).with_cancellation(cancel);
    let result = crawler.run(&observer).await?;

    let files = match &args.out {
        Some(dir) => Some(export::write_datasets(dir, &result.data, args.format.into()).context("writing results")?),
        None => None,
    };

    if args.json {
        let report = serde_json::json!({
            "outcome": result.outcome,
            "summary": result.data.summary(),
            "work_items": result.work_items,
            "completed_items": result.completed_items,
            "failures": result.failures,
            "credentials": result.credentials,
            "files": files.as_ref().map(|f| serde_json::json!({
                "posts": f.posts.display().to_string(),
                "comments": f.comments.display().to_string(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&result);
        if let Some(files) = &files {
            println!("💾 Saved {} and {}", files.posts.display(), files.comments.display());
        }
    }

    Ok(if result.is_clean() { 0 } else { 1 })
}

// Handles the 'check-tokens' subcommand
async fn handle_check_tokens(args: &TokenArgs, json: bool) -> Result<i32> {
    let tokens = require_tokens(args)?;
    let api = VkClient::new(&args.api_url, DEFAULT_PAGE_SIZE)?;
    let pool = CredentialPool::new(&tokens, Duration::ZERO);

    let checks = check_tokens(&api, &pool, Duration::from_millis(400)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        print_checks(&checks);
    }

    Ok(if pool.is_empty() { 1 } else { 0 })
}

// Feeds progress reports into an indicatif bar on stderr
struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} windows  {msg}  elapsed: {elapsed_precise}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        bar.enable_steady_tick(Duration::from_millis(200));
        Self { bar }
    }
}

impl CrawlObserver for BarObserver {
    fn on_progress(&self, report: &ProgressReport) {
        self.bar.set_position(report.completed as u64);
        let eta = report
            .eta
            .map(|d| format!("eta {}s", d.as_secs()))
            .unwrap_or_default();
        self.bar.set_message(format!(
            "{} posts, {} comments, {} failed  {}",
            report.posts_found, report.comments_found, report.failed, eta
        ));
    }

    fn on_finish(&self, _result: &CrawlResult) {
        self.bar.finish_and_clear();
    }

    fn on_error(&self, _error: &CrawlError) {
        self.bar.abandon();
    }
}

fn search_header(args: &SearchArgs, queries: usize, total: usize) -> Option<String> {
    if args.json {
        return None;
    }
    Some(format!(
        "🔍 Searching for {} quer{}\n📅 {} .. {} in {} work item(s)",
        queries,
        if queries == 1 { "y" } else { "ies" },
        args.from,
        args.to,
        total
    ))
}

fn print_summary(result: &CrawlResult) {
    let summary = result.data.summary();

    match &result.outcome {
        CrawlOutcome::Completed => println!("\n✅ Search finished in {}s", result.elapsed.as_secs()),
        CrawlOutcome::Cancelled => println!("\n⏹️  Search stopped early, results are partial"),
        CrawlOutcome::Aborted(e) => println!("\n❌ Search aborted: {}", e),
    }

    println!("📊 Summary:");
    println!("   📝 Posts: {}", summary.posts);
    println!("   💬 Comments: {}", summary.comments);
    if summary.orphaned_comments > 0 {
        println!("   ❓ Comments without a post: {}", summary.orphaned_comments);
    }
    println!("   👍 Mean likes per post: {:.2}", summary.mean_post_likes);
    println!("   🔁 Mean reposts per post: {:.2}", summary.mean_post_reposts);
    println!("   👀 Mean views per post: {:.2}", summary.mean_post_views);
    println!("   👍 Mean likes per comment: {:.2}", summary.mean_comment_likes);
    println!("   📋 Work items: {}/{}", result.completed_items, result.work_items);

    if !result.failures.is_empty() {
        println!("\n{:<20} {:<42} {:<10} {}", "QUERY", "WINDOW", "STAGE", "ERROR");
        println!("{}", "=".repeat(105));
        for failure in &result.failures {
            let stage = match failure.stage {
                wall_sweeper::crawl::Stage::Search => "search",
                wall_sweeper::crawl::Stage::Comments => "comments",
            };
            println!(
                "{:<20} {:<42} {:<10} {}",
                truncate(&failure.query, 20),
                failure.window.to_string(),
                stage,
                failure.error
            );
        }
    }

    println!("\n🔑 Tokens:");
    for report in &result.credentials {
        println!("   {} {:?}", report.credential, report.state);
    }
}

fn print_checks(checks: &[TokenCheck]) {
    println!("{:<20} {:<15} {}", "TOKEN", "STATE", "MESSAGE");
    println!("{}", "=".repeat(60));
    for check in checks {
        println!(
            "{:<20} {:<15} {}",
            check.credential,
            format!("{:?}", check.state),
            check.message.as_deref().unwrap_or("")
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 3).collect();
        format!("{}...", cut)
    }
}
