use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use enlace::config::{Config, LoggingConfig};
use enlace::{classify, ConfigError, Disposition, Document};
use log::info;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "enlace")]
#[command(about = "A stateful command router for MongoDB Sharded Clusters")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Enlace Team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show how a command document would be routed
    Classify {
        /// Command as Extended JSON
        #[arg(short, long, conflicts_with = "file")]
        command: Option<String>,
        /// File containing the command as Extended JSON
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate_config(config),
        Commands::Config { output } => generate_config(output),
        Commands::Classify { command, file } => classify_command(command, file),
        Commands::Version => {
            show_version();
            Ok(())
        }
    }
}

fn generate_config(output: PathBuf) -> Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to list your mongos routers and validate it with:");
    println!("  enlace validate --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            init_logging(&config)?;
            info!("Configuration loaded from: {:?}", config_path);

            println!("✓ Configuration file is valid");
            println!("  Default database: {}", config.router.default_db);
            println!("  Backends: {} instances", config.router.backends.len());
            for (i, backend) in config.router.backends.iter().enumerate() {
                println!("    {}: {}", i + 1, backend);
            }
            match config.routing.seed {
                Some(seed) => println!("  Selection: uniform random (seed {})", seed),
                None => println!("  Selection: uniform random"),
            }
            println!(
                "  Evict exhausted cursors: {}",
                config.routing.evict_exhausted_cursors
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            Err(e.into())
        }
    }
}

fn classify_command(command: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let text = match (command, file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read command from {:?}", path))?,
        (None, None) => bail!("Either --command or --file is required"),
    };

    let command: Document =
        serde_json::from_str(&text).context("Command must be a JSON object")?;

    match classify(&command) {
        Disposition::Unsupported { field, reason } => {
            println!("unsupported");
            println!("  field:  {}", field);
            println!("  reason: {}", reason);
        }
        Disposition::Affine(affinity) => {
            println!("affine");
            if let Some(cursor) = affinity.cursor {
                println!("  cursor:  {}", cursor);
            }
            if let Some(session) = affinity.session {
                println!("  session: {}", session);
            }
        }
        other => println!("{}", other),
    }

    Ok(())
}

fn show_version() {
    println!("enlace v{}", env!("CARGO_PKG_VERSION"));
    println!("A stateful command router for MongoDB Sharded Clusters");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Cursor affinity for getMore/killCursors/releaseMemory");
    println!("  • Transaction affinity per (lsid, txnNumber)");
    println!("  • Monotonic $clusterTime gossip across routers");
    println!("  • Broadcast of router-wide administrative commands");
}

fn init_logging(config: &Config) -> Result<()> {
    let mut builder = logger_builder(&config.logging)?;
    builder.init();

    info!(
        "Logging initialized at level: {} ({})",
        config.logging.level, config.logging.format
    );
    Ok(())
}

/// env_logger builder honouring level, format and destination
fn logger_builder(logging: &LoggingConfig) -> Result<env_logger::Builder> {
    let log_level = match logging.level.as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(log_level);

    if logging.format == "json" {
        builder.format(|buf, record| {
            let line = serde_json::json!({
                "timestamp": buf.timestamp().to_string(),
                "level": record.level().as_str(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    }

    // A file wins over stdout; stderr when neither is asked for
    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        None if logging.stdout => {
            builder.target(env_logger::Target::Stdout);
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    Ok(builder)
}
