use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use atlas_core::{AtlasConfig, OutputFormat, RefreshPolicy};
use atlas_repomap::cache::TagCache;
use atlas_repomap::language::Language;
use atlas_repomap::output::{format_report, MapReport};
use atlas_repomap::{MapRequest, RepoMap};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tag cache location, relative to the repository root.
const TAG_CACHE_PATH: &str = ".atlas/tags.cache.json";

#[derive(Parser)]
#[command(
    name = "atlas",
    version,
    about = "Token-budgeted repository maps",
    long_about = "Atlas summarizes a codebase into a token-budgeted map for LLM context windows.\n\n\
                   Source files are parsed with tree-sitter, ranked with PageRank over a\n\
                   reference graph, and the best-ranked definitions are rendered as elided\n\
                   source excerpts until the budget is met.\n\n\
                   Examples:\n  \
                     atlas map --path .                      Map the current repository\n  \
                     atlas map --chat src/main.rs            Map everything except an open file\n  \
                     atlas map --mention-ident parse_config  Bias the map toward an identifier\n  \
                     atlas tags --path . --limit 20          Show the top-ranked definitions\n  \
                     atlas doctor                            Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .atlas.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      The map as an LLM would see it (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output (debug logging)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a token-budgeted map of the repository
    #[command(long_about = "Generate a token-budgeted map of the repository.\n\n\
        Every file found under --path is a candidate. Files passed with --chat are\n\
        considered already visible: they steer the ranking but are never rendered.\n\n\
        Examples:\n  atlas map --path .\n  atlas map --max-tokens 2048 --chat src/main.rs")]
    Map {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Token budget (overrides [map] max_tokens)
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Files already open in the consumer; excluded from the map
        #[arg(long)]
        chat: Vec<PathBuf>,

        /// Files to bias the ranking toward (repository-relative)
        #[arg(long)]
        mention_file: Vec<String>,

        /// Identifiers to bias the ranking toward
        #[arg(long)]
        mention_ident: Vec<String>,

        /// Refresh policy (overrides [map] refresh)
        #[arg(long)]
        refresh: Option<RefreshPolicy>,

        /// Do not read or write the tag cache
        #[arg(long)]
        no_cache: bool,
    },
    /// List ranked definitions without rendering them
    #[command(long_about = "List ranked definitions without rendering them.\n\n\
        Prints one definition per line as path:line name, best-ranked first.\n\n\
        Examples:\n  atlas tags --path .\n  atlas tags --limit 20 --format json")]
    Tags {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Maximum definitions to show (default: all)
        #[arg(long)]
        limit: Option<usize>,

        /// Files already open in the consumer; excluded from the list
        #[arg(long)]
        chat: Vec<PathBuf>,

        /// Identifiers to bias the ranking toward
        #[arg(long)]
        mention_ident: Vec<String>,
    },
    /// Create a default .atlas.toml configuration file
    #[command(long_about = "Create a default .atlas.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .atlas.toml already exists.")]
    Init,
    /// Check your Atlas setup and environment
    #[command(long_about = "Check your Atlas setup and environment.\n\n\
        Runs diagnostics for the git repository, config file, language grammars,\n\
        tag cache, and candidate files. Use --format json for machine-readable output.")]
    Doctor {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1matlas\x1b[0m v{version} — token-budgeted repository maps\n");

        println!("Quick start:");
        println!("  \x1b[36matlas init\x1b[0m             Create a .atlas.toml config file");
        println!("  \x1b[36matlas map --path .\x1b[0m     Generate a map of the repository\n");

        println!("All commands:");
        println!("  \x1b[32mmap\x1b[0m     Ranked, elided map of the codebase");
        println!("  \x1b[32mtags\x1b[0m    Ranked definitions, one per line");
        println!("  \x1b[32mdoctor\x1b[0m  Check your setup and environment");
        println!("  \x1b[32minit\x1b[0m    Create default configuration\n");
    } else {
        println!("atlas v{version} — token-budgeted repository maps\n");

        println!("Quick start:");
        println!("  atlas init             Create a .atlas.toml config file");
        println!("  atlas map --path .     Generate a map of the repository\n");

        println!("All commands:");
        println!("  map     Ranked, elided map of the codebase");
        println!("  tags    Ranked definitions, one per line");
        println!("  doctor  Check your setup and environment");
        println!("  init    Create default configuration\n");
    }

    println!("Run 'atlas <command> --help' for details.");
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AtlasConfig> {
    let config = match path {
        Some(path) => AtlasConfig::from_file(path)?,
        None => {
            let default_path = Path::new(".atlas.toml");
            if default_path.exists() {
                AtlasConfig::from_file(default_path)?
            } else {
                AtlasConfig::default()
            }
        }
    };
    Ok(config)
}

fn spinner(message: &'static str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
    {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

/// Candidate files under `root`, minus the chat files.
fn other_files(root: &Path, config: &AtlasConfig, chat: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let files = atlas_repomap::walker::walk_repo(root, &config.walk)?;
    let chat: HashSet<PathBuf> = chat.iter().map(|p| absolute(root, p)).collect();
    Ok(files
        .paths
        .into_iter()
        .filter(|p| !chat.contains(p))
        .collect())
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

fn run_doctor(
    root: &Path,
    config: &AtlasConfig,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Git repository
    let start = std::fs::canonicalize(root).into_diagnostic()?;
    let git_root = start.ancestors().find(|dir| dir.join(".git").exists());
    match git_root {
        Some(dir) => checks.push(CheckResult::pass(
            "git_repository",
            format!("detected at {}", dir.display()),
        )),
        None => checks.push(CheckResult::info(
            "git_repository",
            "not a git repository (.gitignore files are not applied)",
        )),
    }

    // 2. Config file
    if Path::new(".atlas.toml").exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!(
                ".atlas.toml found (max_tokens = {}, refresh = {})",
                config.map.max_tokens, config.map.refresh
            ),
        ));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            ".atlas.toml not found",
            "run 'atlas init' to create a default config",
        ));
    }

    // 3. Grammars and tag queries
    let broken: Vec<String> = Language::SUPPORTED
        .iter()
        .filter_map(|lang| lang.compile_tags_query().err().map(|e| e.to_string()))
        .collect();
    if broken.is_empty() {
        let names: Vec<&str> = Language::SUPPORTED.iter().map(|l| l.name()).collect();
        checks.push(CheckResult::pass("languages", names.join(", ")));
    } else {
        checks.push(CheckResult::fail(
            "languages",
            broken.join("; "),
            "rebuild atlas; the bundled queries do not match the grammars",
        ));
    }

    // 4. Tag cache
    let cache_path = root.join(TAG_CACHE_PATH);
    if cache_path.exists() {
        let cache = TagCache::load(&cache_path);
        checks.push(CheckResult::pass(
            "tag_cache",
            format!("{} cached files", cache.len()),
        ));
    } else {
        checks.push(CheckResult::info(
            "tag_cache",
            "not found (created by 'atlas map')",
        ));
    }

    // 5. Candidate files
    match atlas_repomap::walker::walk_repo(root, &config.walk) {
        Ok(files) => {
            let parseable = files
                .paths
                .iter()
                .filter(|p| Language::from_path(p) != Language::Unknown)
                .count();
            checks.push(CheckResult::info(
                "candidate_files",
                format!("{} files ({parseable} with a grammar)", files.len()),
            ));
        }
        Err(e) => checks.push(CheckResult::fail(
            "candidate_files",
            e.to_string(),
            "check --path and the [walk] exclude patterns",
        )),
    }

    // Output
    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("Atlas v{version} — Environment Check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<20} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Atlas Configuration

[map]
# Token budget of the map
# max_tokens = 1024
# Context window of the consumer; enables a larger map when no files are open
# max_context_window = 128000
# Budget multiplier applied when no files are open
# map_multiplier_no_files = 8.0
# When to reuse a computed map: auto, manual, always, files
# refresh = "auto"
# Text placed before the map; {other} becomes "other " when files are open
# repo_content_prefix = "Here are summaries of some {other}files in the repository:\n"
# verbose = false

[render]
# line_numbers = false
# mark_lois = true
# loi_pad = 1
# margin = 3
# header_max = 10
# last_line = true
# parent_context = true
# child_context = true
# show_top_of_file_parent_scope = false

[walk]
# exclude = ["vendor/**", "*.min.js"]
# max_file_size = 1048576
"#;

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.map.verbose = true;
    }

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Map {
            ref path,
            max_tokens,
            ref chat,
            ref mention_file,
            ref mention_ident,
            refresh,
            no_cache,
        }) => {
            if let Some(max_tokens) = max_tokens {
                config.map.max_tokens = max_tokens;
            }
            if let Some(refresh) = refresh {
                config.map.refresh = refresh;
            }

            let cache_path = path.join(TAG_CACHE_PATH);
            let tags = if no_cache {
                TagCache::new()
            } else {
                TagCache::load(&cache_path)
            };

            let spinner = spinner("Mapping repository...");
            let other = other_files(path, &config, chat)?;
            let file_count = other.len();
            let request = MapRequest {
                chat_files: chat.clone(),
                other_files: other,
                mentioned_files: mention_file.iter().cloned().collect(),
                mentioned_idents: mention_ident.iter().cloned().collect(),
                force_refresh: false,
            };
            let mut repo_map = RepoMap::new(path, &config).with_tag_cache(tags);
            let map = repo_map.get_repo_map(&request);
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }

            if !no_cache {
                if let Err(e) = repo_map.tag_cache().save(&cache_path) {
                    tracing::warn!("unable to save tag cache: {e}");
                }
            }

            let Some(map) = map else {
                miette::bail!(miette::miette!(
                    help = "check --path, --max-tokens and the [walk] exclude patterns",
                    "no map available: nothing to map or the budget is zero"
                ));
            };
            let report = MapReport::new(map, file_count);
            let output = format_report(&report, cli.format)?;
            if cli.format == OutputFormat::Text {
                print!("{output}");
            } else {
                println!("{output}");
            }
        }
        Some(Command::Tags {
            ref path,
            limit,
            ref chat,
            ref mention_ident,
        }) => {
            let request = MapRequest {
                chat_files: chat.clone(),
                other_files: other_files(path, &config, chat)?,
                mentioned_idents: mention_ident.iter().cloned().collect(),
                ..MapRequest::default()
            };
            let mut repo_map = RepoMap::new(path, &config);
            let mut ranked = repo_map.ranked_tags(&request);
            ranked.retain(|t| t.is_definition());
            if let Some(limit) = limit {
                ranked.truncate(limit);
            }

            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&ranked).into_diagnostic()?
                    );
                }
                OutputFormat::Markdown => {
                    println!("# Ranked Definitions\n");
                    for tag in &ranked {
                        println!("- `{}` ({}:{})", tag.name, tag.rel_path, tag.line);
                    }
                }
                OutputFormat::Text => {
                    for tag in &ranked {
                        println!("{}:{} {}", tag.rel_path, tag.line, tag.name);
                    }
                }
            }
        }
        Some(Command::Init) => {
            let path = Path::new(".atlas.toml");
            if path.exists() {
                miette::bail!(".atlas.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .atlas.toml with default configuration");
        }
        Some(Command::Doctor { ref path }) => {
            run_doctor(path, &config, cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "atlas", &mut std::io::stdout());
        }
    }

    Ok(())
}
