//! wordscan CLI - scan WordPress sites and manage stored scan results

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use wordscan::{
    AssetCatalog, CatalogSources, Error, FileStore, JobStore, ScanConfig, Scanner, SyncOutcome,
    VulnerabilityClient,
    output::{OutputConfig, OutputFormat, OutputSort, output_job, output_jobs},
};

/// WordPress security scanner - exposures, plugins, themes and known vulnerabilities
#[derive(Parser, Debug)]
#[command(name = "wordscan")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a WordPress site
    Scan(ScanArgs),
    /// Show a stored scan
    Show {
        /// Scan id
        id: Uuid,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List stored scans, newest first
    List {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Delete a stored scan
    Delete {
        /// Scan id
        id: Uuid,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show remaining vulnerability database credits across all tokens
    Credits {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Write a default configuration file
    InitConfig {
        /// Destination file
        #[arg(default_value = "wordscan.json")]
        path: PathBuf,
    },
    /// Refresh the plugin/theme catalog from WordPress.org (at most once a day)
    SyncCatalog {
        /// Catalog file
        #[arg(long, default_value = "catalog.json")]
        catalog: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// URL of the WordPress site to scan
    url: String,

    #[command(flatten)]
    config: ConfigArgs,

    /// Catalog file with plugin and theme slugs
    #[arg(long, default_value = "catalog.json")]
    catalog: PathBuf,

    /// Concurrent plugin/theme probes
    #[arg(long)]
    threads: Option<usize>,

    /// User-Agent sent to the target
    #[arg(long = "user-agent")]
    user_agent: Option<String>,

    /// Allow scanning private/internal IP addresses (localhost, 192.168.x.x, etc.)
    #[arg(long = "allow-private")]
    allow_private: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Configuration file (JSON)
    #[arg(long, default_value = "wordscan.json")]
    config: PathBuf,

    /// Vulnerability database API token (repeatable, replaces configured tokens)
    #[arg(long = "token")]
    tokens: Vec<String>,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Directory holding scan results
    #[arg(long = "store", default_value = "scans")]
    dir: PathBuf,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output format
    #[arg(short = 'o', long = "output", default_value = "human", value_enum)]
    format: OutputFormatArg,

    /// Sort order for plugin/theme rows
    #[arg(long = "sort", default_value = "name", value_enum)]
    sort: OutputSortArg,
}

impl OutputArgs {
    fn config(&self) -> OutputConfig {
        OutputConfig::new(self.format.into(), self.sort.into())
    }
}

/// Output format argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
    None,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::None => OutputFormat::None,
        }
    }
}

/// Output sort argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputSortArg {
    /// Sort by type (Theme, Plugin), then by name (default)
    Name,
    /// Most vulnerable components first
    Vulns,
}

impl From<OutputSortArg> for OutputSort {
    fn from(arg: OutputSortArg) -> Self {
        match arg {
            OutputSortArg::Name => OutputSort::Name,
            OutputSortArg::Vulns => OutputSort::Vulns,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "wordscan=info",
        1 => "wordscan=debug",
        _ => "wordscan=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command) -> wordscan::Result<ExitCode> {
    let stdout = std::io::stdout();
    let mut writer = stdout.lock();

    match command {
        Command::Scan(args) => run_scan(args, &mut writer).await,
        Command::Show { id, store, output } => {
            let store = FileStore::open(&store.dir).await?;
            let job = store
                .find(id)
                .await?
                .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
            output_job(&job, &output.config(), &mut writer)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List { store, output } => {
            let store = FileStore::open(&store.dir).await?;
            output_jobs(&store.list().await?, &output.config(), &mut writer)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Delete { id, store } => {
            let store = FileStore::open(&store.dir).await?;
            if !store.delete(id).await? {
                return Err(Error::JobNotFound(id.to_string()));
            }
            println!("Scan {} deleted", id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Credits { config } => {
            let config = load_config(&config)?;
            let credits = if config.has_api_token() {
                VulnerabilityClient::from_config(&config)?
                    .total_remaining_credits()
                    .await
            } else {
                0
            };
            println!("{}", credits);
            Ok(ExitCode::SUCCESS)
        }
        Command::InitConfig { path } => {
            ScanConfig::default().save(&path)?;
            println!("Configuration written to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::SyncCatalog { catalog } => {
            let mut current = AssetCatalog::load(&catalog)?;
            let client = reqwest::Client::builder()
                .user_agent(wordscan::config::DEFAULT_USER_AGENT)
                .build()
                .map_err(|e| Error::HttpClient(e.to_string()))?;
            match current
                .sync(&client, &CatalogSources::default(), chrono::Utc::now())
                .await?
            {
                SyncOutcome::Updated { plugins, themes } => {
                    current.save(&catalog)?;
                    println!("Catalog updated: {} plugins, {} themes", plugins, themes);
                }
                SyncOutcome::TooRecent { last_sync } => {
                    println!("Last sync performed less than 1 day ago ({})", last_sync);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_scan<W: std::io::Write>(args: ScanArgs, writer: &mut W) -> wordscan::Result<ExitCode> {
    if matches!(args.output.format, OutputFormatArg::Human) {
        print_banner();
    }

    let mut config = load_config(&args.config)?;
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(user_agent) = args.user_agent {
        config.user_agent = user_agent;
    }
    config.allow_private |= args.allow_private;
    config.validate()?;

    let catalog = AssetCatalog::load(&args.catalog)?;
    if catalog.is_empty() {
        tracing::warn!(catalog = %args.catalog.display(), "catalog is empty, run `wordscan sync-catalog` first");
    }

    let store = Arc::new(FileStore::open(&args.store.dir).await?);
    let scanner = Scanner::new(config, catalog, store);

    match scanner.scan(&args.url).await? {
        Some(job) => {
            output_job(&job, &args.output.config(), writer)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("Target is not a WordPress site");
            Ok(ExitCode::from(2))
        }
    }
}

fn print_banner() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    println!("wordscan v{}", VERSION);
    println!();
}

/// Load the config file if it exists, then apply CLI tokens
fn load_config(args: &ConfigArgs) -> wordscan::Result<ScanConfig> {
    let mut config = if Path::new(&args.config).exists() {
        ScanConfig::load(&args.config)?
    } else {
        ScanConfig::default()
    };
    if !args.tokens.is_empty() {
        config.api_tokens = args.tokens.clone();
    }
    Ok(config)
}
