//! riskmatrix CLI - Risk register generation from company filings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use riskmatrix::client::HealthStatus;
use riskmatrix::pipeline::{
    classify_stored_matrix, load_custom_priors, parse_headlines, simulate_stored_treat,
};
use riskmatrix::simulation::{CustomPriors, LossPrior, Simulator};
use riskmatrix::{
    ArtifactStore, CancellationToken, Config, LLMClient, RiskPipeline, TiktokenTokenizer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "riskmatrix")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Risk register generation: extraction, banded scoring, 3T treatment and loss simulation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract risks from a filing text file
    Extract {
        /// Company ticker
        #[arg(short, long)]
        ticker: String,

        /// Plain-text filing
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Extract risks from news headlines (one per line)
    ExtractNews {
        /// Company name
        #[arg(long)]
        company: String,

        /// Headlines file
        #[arg(long)]
        headlines: PathBuf,
    },

    /// Score the saved risk list into a risk matrix
    Score {
        #[arg(short, long)]
        ticker: String,
    },

    /// Classify the saved risk matrix into Tolerate / Treat / Transfer
    Classify {
        #[arg(short, long)]
        ticker: String,
    },

    /// Simulate losses for a single risk
    Simulate {
        /// Risk name
        #[arg(short, long)]
        risk: String,

        /// Mean loss (defaults to [simulation].mean)
        #[arg(long)]
        mean: Option<f64>,

        /// Loss standard deviation (defaults to [simulation].stddev)
        #[arg(long)]
        stddev: Option<f64>,

        /// Number of draws (defaults to [simulation].simulations)
        #[arg(short = 'n', long)]
        simulations: Option<usize>,

        /// Fixed seed for reproducible draws
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Simulate losses for every Treat risk of a ticker
    SimulateTreat {
        #[arg(short, long)]
        ticker: String,

        /// JSON map of per-risk overrides: {"risk": [mean, stddev]}
        #[arg(long)]
        custom: Option<PathBuf>,
    },

    /// Extract, score and classify in one run
    Run {
        #[arg(short, long)]
        ticker: String,

        #[arg(short, long)]
        input: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Also check that the endpoint answers
        #[arg(long)]
        ping: bool,
    },

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# riskmatrix configuration file

[llm]
# API key (can also use the variable named by api_key_env)
# api_key = "${LLM_API_KEY}"
api_key_env = "LLM_API_KEY"
base_url = "https://openrouter.ai/api/v1"
model = "google/gemini-pro-1.5"
timeout_secs = 120
max_tokens = 2048
temperature = 0.2

[extraction]
max_tokens_per_chunk = 10000
max_chunks = 50
max_headlines = 15
# filing_prompt = "prompts/filing.md"
# news_prompt = "prompts/news.md"
max_retries = 2
retry_delay_secs = 2.0

[scoring]
max_risks = 200
max_retries = 2
retry_delay_secs = 2.0
concurrency = 1
band_policy = "reject"   # reject | clamp | accept
# seed = 42

[simulation]
mean = 1000000.0
stddev = 300000.0
simulations = 10000
bins = 50
# seed = 42

[output]
data_dir = "data"
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn build_client(config: &Config) -> Result<LLMClient> {
    let api_key = config
        .resolve_api_key()
        .context("Failed to resolve API key")?;
    LLMClient::new(&config.llm, Some(api_key)).context("Failed to create LLM client")
}

/// Pipeline wired to the real client, cancelled on Ctrl-C.
///
/// The client handle is returned alongside for usage reporting.
fn build_pipeline(config: Config) -> Result<(RiskPipeline, Arc<LLMClient>)> {
    let client = Arc::new(build_client(&config)?);
    let tokenizer = Arc::new(TiktokenTokenizer::cl100k()?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current request");
            on_signal.cancel();
        }
    });

    let pipeline = RiskPipeline::new(config, client.clone(), tokenizer).with_cancellation(cancel);
    Ok((pipeline, client))
}

fn print_usage(client: &LLMClient) {
    let (input, output) = client.total_tokens();
    println!("Requests:    {}", client.total_requests());
    println!("Tokens:      {input} in / {output} out");
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {path:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate { ping } => {
            let config = load_config(&cli.config)?;
            let client = build_client(&config)?;

            info!("Configuration is valid");
            info!("  Model: {} at {}", config.llm.model, config.llm.base_url);
            info!(
                "  Extraction: {} tokens per chunk, up to {:?} chunks",
                config.extraction.max_tokens_per_chunk, config.extraction.max_chunks
            );
            info!(
                "  Scoring: up to {} risks, band policy {:?}",
                config.scoring.max_risks, config.scoring.band_policy
            );
            info!("  Data directory: {:?}", config.output.data_dir);

            if ping {
                let health = client.health_check().await;
                match health.status {
                    HealthStatus::Healthy => {
                        info!(latency_ms = ?health.latency_ms, "Endpoint is healthy")
                    }
                    status => anyhow::bail!(
                        "Endpoint is {status}: {}",
                        health.error.unwrap_or_default()
                    ),
                }
            }
            return Ok(());
        }

        Commands::Simulate {
            risk,
            mean,
            stddev,
            simulations,
            seed,
        } => {
            let config = if cli.config.exists() {
                load_config(&cli.config)?
            } else {
                Config::default()
            };
            let mut simulator = Simulator::from(&config.simulation);
            simulator.simulations = simulations.unwrap_or(simulator.simulations);
            simulator.seed = seed.or(simulator.seed);
            let prior = LossPrior {
                mean: mean.unwrap_or(simulator.prior.mean),
                stddev: stddev.unwrap_or(simulator.prior.stddev),
            };

            let result = simulator.run(&risk, prior)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Extract { ticker, input } => {
            let text = read_input(&input)?;
            let (pipeline, client) = build_pipeline(load_config(&cli.config)?)?;
            let report = pipeline.extract_filing(&ticker, &text).await?;

            println!("\n=== Extraction Complete ===");
            println!("Ticker:      {}", report.ticker);
            println!("Chunks:      {} ({} used)", report.chunks_total, report.chunks_used);
            println!("Failed:      {}", report.chunks_failed);
            println!("Risks:       {}", report.risks);
            println!("Output:      {:?}", report.path);
            print_usage(&client);
        }

        Commands::ExtractNews { company, headlines } => {
            let config = load_config(&cli.config)?;
            let lines = parse_headlines(&read_input(&headlines)?, config.extraction.max_headlines);
            let (pipeline, client) = build_pipeline(config)?;
            let report = pipeline.extract_news(&company, &lines).await?;

            println!("\n=== News Extraction Complete ===");
            println!("Company:     {}", report.company);
            println!("Headlines:   {}", report.headlines);
            println!("Risks:       {}", report.risks.len());
            for risk in &report.risks {
                println!("  - {risk}");
            }
            println!("Output:      {:?}", report.path);
            print_usage(&client);
        }

        Commands::Score { ticker } => {
            let (pipeline, client) = build_pipeline(load_config(&cli.config)?)?;
            let report = pipeline.score_matrix(&ticker).await?;

            println!("\n=== Scoring Complete ===");
            println!("Ticker:      {}", report.ticker);
            println!("Scored:      {}", report.scored);
            println!("Degraded:    {} (recorded as likelihood=1, impact=1)", report.degraded.len());
            println!("JSON:        {:?}", report.json_path);
            println!("CSV:         {:?}", report.csv_path);
            print_usage(&client);
        }

        Commands::Classify { ticker } => {
            let config = load_config(&cli.config)?;
            let store = ArtifactStore::new(config.output.data_dir.clone());
            let report = classify_stored_matrix(&store, &ticker)?;

            println!("\n=== 3T Classification Complete ===");
            println!("Tolerate:    {}", report.counts.tolerate);
            println!("Treat:       {}", report.counts.treat);
            println!("Transfer:    {}", report.counts.transfer);
            println!("Register:    {:?}", report.full_path);
            println!("Treat only:  {:?}", report.treat_path);
        }

        Commands::SimulateTreat { ticker, custom } => {
            let custom = match custom {
                Some(path) => load_custom_priors(&path)
                    .with_context(|| format!("Failed to load custom inputs from {path:?}"))?,
                None => CustomPriors::new(),
            };
            let config = load_config(&cli.config)?;
            let store = ArtifactStore::new(config.output.data_dir.clone());
            let report = simulate_stored_treat(&store, &config.simulation, &ticker, &custom)?;

            println!("\n=== Simulation Complete ===");
            for r in &report.results {
                println!(
                    "{:<60} min {:>14.2}  avg {:>14.2}  max {:>14.2}",
                    r.risk, r.min_loss, r.avg_loss, r.max_loss
                );
            }
            println!("Output:      {:?}", report.path);
        }

        Commands::Run { ticker, input } => {
            let text = read_input(&input)?;
            let (pipeline, client) = build_pipeline(load_config(&cli.config)?)?;
            let report = pipeline.run(&ticker, &text).await?;

            println!("\n=== Risk Register Complete ===");
            println!("Ticker:      {}", report.extraction.ticker);
            println!("Risks:       {}", report.extraction.risks);
            println!("Scored:      {}", report.matrix.scored);
            println!("Degraded:    {}", report.matrix.degraded.len());
            println!("Tolerate:    {}", report.treatment.counts.tolerate);
            println!("Treat:       {}", report.treatment.counts.treat);
            println!("Transfer:    {}", report.treatment.counts.transfer);
            println!("Register:    {:?}", report.treatment.full_path);
            print_usage(&client);
        }
    }

    Ok(())
}
