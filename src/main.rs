use clap::{Parser, Subcommand};
use revibe::{
    config::LLMProvider, planner, reporter::format_usage, Analyzer, Config, FileDiscovery,
    IgnoreFilter, LLMClient, Reporter,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "revibe")]
#[command(about = "Find Python files that fail to parse or import missing modules, and get an LLM fix plan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project and request a remediation plan
    Scan {
        /// Directory to scan (defaults to current directory)
        path: Option<PathBuf>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write revibe-report.json and revibe-plan.md into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only scan and print the prompt, do not contact the LLM
        #[arg(long)]
        skip_llm: bool,

        /// Stop scanning once this many files have been flagged
        #[arg(long)]
        max_files: Option<usize>,

        /// Lines of context around each problem line
        #[arg(long)]
        context_lines: Option<usize>,

        /// Python interpreter whose environment decides which imports resolve
        #[arg(long)]
        python: Option<String>,

        /// LLM provider to use
        #[arg(long, value_enum)]
        provider: Option<LLMProvider>,

        /// Model name for the provider
        #[arg(long)]
        model: Option<String>,

        /// Print the scan result as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Print the directory structure that would be scanned, as JSON
    Tree {
        /// Directory to show (defaults to current directory)
        path: Option<PathBuf>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Generate a default configuration file
    Config {
        /// Output path for the config file (defaults to ~/.revibe.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

struct ScanOptions {
    output: Option<PathBuf>,
    skip_llm: bool,
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    match cli.command {
        Commands::Scan {
            path,
            config,
            output,
            skip_llm,
            max_files,
            context_lines,
            python,
            provider,
            model,
            json,
        } => {
            let mut config = load_config(config, path)?;
            if let Some(max_files) = max_files {
                config.max_files_in_report = max_files;
            }
            if let Some(context_lines) = context_lines {
                config.context_lines = context_lines;
            }
            if let Some(python) = python {
                config.python.interpreter = python;
            }
            if let Some(provider) = provider {
                if provider != config.llm.provider {
                    config.llm.provider = provider;
                    config.llm.model = provider.default_model().to_string();
                    config.llm.api_key = None;
                    config.apply_env();
                }
            }
            if let Some(model) = model {
                config.llm.model = model;
            }

            scan_project(config, ScanOptions { output, skip_llm, json }).await?;
        }
        Commands::Tree { path, config } => {
            let config = load_config(config, path)?;
            let filter = IgnoreFilter::from_config(&config.ignore)?;
            let tree = FileDiscovery::new(&config, filter).tree()?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Commands::Config { output } => {
            generate_config(output)?;
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, target: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None => Config::load()?,
    };
    if let Some(target) = target {
        config.target_directory = target;
    }
    if !config.target_directory.is_dir() {
        anyhow::bail!("{} is not a directory", config.target_directory.display());
    }
    Ok(config)
}

async fn scan_project(config: Config, options: ScanOptions) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let quiet = options.json;

    if !quiet {
        println!("🚀 Scanning {}", config.target_directory.display());
    }

    let llm_config = config.llm.clone();
    let analyzer = Analyzer::new(config)?;
    let analysis = analyzer.analyze_project();

    if !quiet {
        analysis.print_summary();
    }

    let plan = if !analysis.has_problems() {
        if !quiet {
            println!("\n✅ No syntax errors or unresolved imports found");
        }
        None
    } else if options.skip_llm {
        if !quiet {
            println!("\n⚡ Skipping LLM request; prompt that would be sent:\n");
            println!("{}", planner::build_prompt(&analysis.reports));
        }
        None
    } else {
        let client = LLMClient::new(llm_config.clone())?;
        if !quiet {
            println!("\n🤖 Requesting remediation plan from {} ({})...", client.provider(), client.model());
        }
        let plan = analyzer.request_plan(&analysis, &client).await?;
        if !quiet {
            println!("\n📋 Remediation plan\n==================\n{}", plan.text.trim_end());
            if let Some(usage) = plan.usage {
                println!("\n{}", format_usage(&usage));
            }
        }
        Some(plan)
    };

    let reporter = Reporter::new();
    let model = plan
        .as_ref()
        .map(|_| (llm_config.provider.to_string(), llm_config.model.clone()));
    let report = reporter.generate_report(
        &analysis,
        plan.as_ref(),
        model.as_ref().map(|(provider, model)| (provider.as_str(), model.as_str())),
    );

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if let Some(output_dir) = options.output {
        let exported_files = reporter.export_report(&report, &output_dir)?;
        if !quiet {
            println!("\n📁 Reports exported to:");
            for file in exported_files {
                println!("   - {}", file.display());
            }
        }
    }

    if !quiet {
        println!("\n⏱️  Done in {:.2}s", start_time.elapsed().as_secs_f64());
    }

    Ok(())
}

fn generate_config(output_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config_path = match output_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, Config::create_documented_config())?;

    println!("📝 Configuration file created: {}", config_path.display());
    println!("💡 Edit it to change ignore rules, the flagged-file cap, or the LLM provider.");

    Ok(())
}
