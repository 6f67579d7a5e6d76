use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use gitfetch::analysis::contribution_level;
use gitfetch::config::clamp_ttl;
use gitfetch::models::{ProviderKind, SearchResult};
use gitfetch::{
    build_provider, CacheStore, Config, Error, FetchConfig, FetchOutcome, StatsOrigin,
    StatsPipeline,
};

/// Days shown in the activity strip of the text report.
const RECENT_DAYS: usize = 7 * 12;

/// Conventional exit status after SIGINT.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "gitfetch")]
#[command(version)]
#[command(about = "Developer activity statistics from GitHub, GitLab, Gitea and Sourcehut")]
struct Args {
    /// Username to fetch (defaults to GITFETCH_USERNAME, then the logged-in account)
    username: Option<String>,

    /// Provider (github, gitlab, gitea, sourcehut)
    #[arg(short, long)]
    provider: Option<String>,

    /// Provider instance URL
    #[arg(long)]
    url: Option<String>,

    /// Access token for Gitea or Sourcehut
    #[arg(long)]
    token: Option<String>,

    /// Skip the cache and fetch live data
    #[arg(long)]
    no_cache: bool,

    /// Cache lifetime in minutes
    #[arg(long)]
    cache_ttl: Option<u32>,

    /// Delete every cached entry
    #[arg(long)]
    clear_cache: bool,

    /// Delete cached entries for one user
    #[arg(long, value_name = "USERNAME")]
    clear_user: Option<String>,

    /// List cached accounts
    #[arg(long)]
    list_cached: bool,

    /// Show cache statistics
    #[arg(long)]
    cache_stats: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so the report on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gitfetch=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = load_config(&args)?;
    let cache = CacheStore::new(&config.cache_path);

    if run_cache_command(&args, &cache)? {
        return Ok(ExitCode::SUCCESS);
    }

    let provider = build_provider(&config)?;
    let username = match args.username.clone().or_else(|| config.username.clone()) {
        Some(username) => username,
        None => match provider.authenticated_user().await {
            Ok(username) => username,
            Err(e) => return Ok(report_error(&e)),
        },
    };

    let mut fetch_config = FetchConfig::from(&config);
    fetch_config.cache_bypass = args.no_cache;
    let pipeline = StatsPipeline::new(provider, cache, fetch_config);

    let spinner = spinner(&format!("Fetching {} stats for {}", config.provider, username));
    let result = tokio::select! {
        result = pipeline.fetch(&username) => result,
        _ = tokio::signal::ctrl_c() => Err(Error::Cancelled),
    };
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            output_outcome(&outcome, &args)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(report_error(&e)),
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::from_env()?;

    if args.provider.is_some() || args.url.is_some() || args.token.is_some() {
        let provider = match &args.provider {
            Some(name) => ProviderKind::parse(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown provider '{}'", name))?,
            None => config.provider,
        };
        config = config.with_provider(provider, args.url.clone(), args.token.clone())?;
    }

    if let Some(ttl) = args.cache_ttl {
        config.cache_ttl_minutes = clamp_ttl(ttl);
    }

    Ok(config)
}

/// Handles the cache maintenance flags. Returns true when one was given.
fn run_cache_command(args: &Args, cache: &CacheStore) -> anyhow::Result<bool> {
    if args.clear_cache {
        let removed = cache.clear()?;
        println!("Removed {} cached entries from {}", removed, cache.path().display());
        return Ok(true);
    }

    if let Some(ref username) = args.clear_user {
        let removed = cache.clear_user(username)?;
        println!("Removed {} cached entries for {}", removed, username);
        return Ok(true);
    }

    if args.list_cached {
        let accounts = cache.list_cached()?;
        if accounts.is_empty() {
            println!("No cached accounts");
        }
        for account in accounts {
            println!(
                "{:<10} {:<24} {}  ttl {}m{}",
                account.provider.as_str(),
                account.username,
                account.stored_at.format("%Y-%m-%d %H:%M:%S UTC"),
                account.ttl_minutes,
                if account.is_stale { "  (stale)" } else { "" }
            );
        }
        return Ok(true);
    }

    if args.cache_stats {
        let stats = cache.stats()?;
        println!("Cache file: {}", cache.path().display());
        println!("Entries: {}", stats.row_count);
        println!("Payload size: {} bytes", stats.total_size);
        if let Some(age) = stats.oldest_entry_age {
            println!("Oldest entry: {} minutes old", age.num_minutes());
        }
        if let Some((provider, username, stored_at)) = stats.newest_entry {
            println!(
                "Newest entry: {} on {} at {}",
                username,
                provider,
                stored_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        return Ok(true);
    }

    Ok(false)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn report_error(error: &Error) -> ExitCode {
    if matches!(error, Error::Cancelled) {
        eprintln!("Cancelled");
    } else {
        eprintln!("Error: {}", error);
        if let Some(hint) = error.hint() {
            eprintln!("Hint: {}", hint);
        }
    }
    ExitCode::from(exit_status(error))
}

fn exit_status(error: &Error) -> u8 {
    match error {
        Error::Cancelled => EXIT_CANCELLED,
        _ => 1,
    }
}

fn output_outcome(outcome: &FetchOutcome, args: &Args) -> anyhow::Result<()> {
    let output = match args.format.as_str() {
        "json" => serde_json::to_string_pretty(&serde_json::json!({
            "stale": outcome.is_stale(),
            "stale_error": outcome.stale_error().map(|e| e.to_string()),
            "stats": outcome.stats,
        }))?,
        _ => format_text(outcome),
    };

    if let Some(ref path) = args.output {
        std::fs::write(path, &output)?;
        tracing::info!("Output written to: {}", path);
    } else {
        println!("{}", output);
    }

    Ok(())
}

fn format_text(outcome: &FetchOutcome) -> String {
    let stats = &outcome.stats;
    let mut output = String::new();

    match &outcome.origin {
        StatsOrigin::Stale { error } => {
            output.push_str(&format!(
                "Showing cached data from {}; live fetch failed: {}\n",
                stats.fetched_at.format("%Y-%m-%d %H:%M UTC"),
                error
            ));
            if let Some(hint) = error.hint() {
                output.push_str(&format!("Hint: {}\n", hint));
            }
        }
        StatsOrigin::Cached => output.push_str(&format!(
            "(cached {})\n",
            stats.fetched_at.format("%Y-%m-%d %H:%M UTC")
        )),
        StatsOrigin::Live => {}
    }

    output.push_str(&format!(
        "\n=== {} on {} ===\n\n",
        stats.profile.login, stats.provider
    ));

    if let Some(ref name) = stats.profile.display_name {
        output.push_str(&format!("Name: {}\n", name));
    }
    if let Some(ref bio) = stats.profile.bio {
        output.push_str(&format!("Bio: {}\n", bio));
    }
    if let Some(ref location) = stats.profile.location {
        output.push_str(&format!("Location: {}\n", location));
    }
    if let (Some(followers), Some(following)) = (stats.profile.followers, stats.profile.following) {
        output.push_str(&format!("Followers: {}  Following: {}\n", followers, following));
    }
    if let Some(joined) = stats.profile.joined_at {
        output.push_str(&format!("Joined: {}\n", joined.format("%Y-%m-%d")));
    }

    match (stats.total_stars, stats.total_forks) {
        (Some(stars), Some(forks)) => output.push_str(&format!(
            "Repositories: {} (stars: {}, forks: {})\n",
            stats.repositories.len(),
            stars,
            forks
        )),
        _ => output.push_str(&format!("Repositories: {}\n", stats.repositories.len())),
    }

    output.push_str("\nContributions:\n");
    match &stats.contribution_calendar {
        Some(calendar) => {
            output.push_str(&format!("  Last year: {}\n", stats.total_contributions));
            output.push_str(&format!("  Current streak: {} days\n", stats.current_streak));
            output.push_str(&format!("  Longest streak: {} days\n", stats.longest_streak));

            let recent: String = calendar
                .days()
                .skip(calendar.len().saturating_sub(RECENT_DAYS))
                .map(|(_, count)| level_glyph(contribution_level(count)))
                .collect();
            output.push_str(&format!("  Last 12 weeks: {}\n", recent));
        }
        None => output.push_str(&format!("  Unavailable on {}\n", stats.provider)),
    }

    let languages = stats.top_languages(8);
    if !languages.is_empty() {
        output.push_str("\nLanguages:\n");
        for (name, share) in languages {
            output.push_str(&format!("  {:<16} {:>5.1}%\n", name, share));
        }
    }

    format_searches(&mut output, "Pull requests", &stats.pull_requests);
    format_searches(&mut output, "Issues", &stats.issues);

    output.push_str(&format!(
        "\nFetched on: {}\n",
        stats.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output
}

fn format_searches(
    output: &mut String,
    title: &str,
    results: &std::collections::BTreeMap<String, SearchResult>,
) {
    if results.is_empty() {
        return;
    }

    output.push_str(&format!("\n{}:\n", title));
    for (key, result) in results {
        output.push_str(&format!("  {}\n", search_line(&key.replace('_', " "), result)));
        for item in &result.items {
            let reference = match item.number {
                Some(number) => format!("{}#{}", item.repo, number),
                None => item.repo.clone(),
            };
            output.push_str(&format!("    - {} {}\n", reference, item.title));
        }
    }
}

/// "23 awaiting review (showing 5)" for exact totals, "at least 5 ..." for capped ones.
fn search_line(label: &str, result: &SearchResult) -> String {
    let shown = result.items.len() as u64;
    if result.unsupported {
        format!("{}: unavailable", label)
    } else if !result.is_exact {
        format!("at least {} {} (showing {})", result.count, label, shown)
    } else if result.count > shown {
        format!("{} {} (showing {})", result.count, label, shown)
    } else {
        format!("{} {}", result.count, label)
    }
}

fn level_glyph(level: u8) -> char {
    match level {
        0 => '.',
        1 => ':',
        2 => '+',
        3 => '*',
        _ => '#',
    }
}
