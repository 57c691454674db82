//! # Morphic CLI
//!
//! Command-line interface over the Morphic engine.
//!
//! ## Commands
//!
//! - `init` - Write a default `morphic.toml` and create the database
//! - `entity` - Create, list, show, delete entities and print their forms
//! - `attribute` - Create, list, attach, detach and delete attributes
//! - `relationship` - Create, list and delete relationship definitions
//! - `record` - Create, get and list records
//!
//! Results are printed to stdout as pretty JSON; status lines and logs go
//! to stderr.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use morphic_core::{DataType, EngineError, RecordId, RelationType, RelationshipId, UserId};
use morphic_engine::EngineConfig;
use morphic_forms::FormMode;
use tracing_subscriber::EnvFilter;

/// CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "morphic", version, about = "Dynamic content modeling over SQLite")]
pub struct Cli {
    /// Configuration file [default: ./morphic.toml when present]
    #[arg(short, long, global = true, env = "MORPHIC_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite database file, or `:memory:`
    #[arg(short, long, global = true, value_name = "PATH")]
    pub database: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default configuration file and create the database
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Manage entities
    #[command(subcommand)]
    Entity(EntityCommand),

    /// Manage attributes
    #[command(subcommand)]
    Attribute(AttributeCommand),

    /// Manage relationships between entities
    #[command(subcommand)]
    Relationship(RelationshipCommand),

    /// Create and read records
    #[command(subcommand)]
    Record(RecordCommand),
}

#[derive(Subcommand, Debug)]
pub enum EntityCommand {
    /// Create an entity
    Create {
        name: String,

        /// Slug [default: derived from the name]
        #[arg(long)]
        slug: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// List all entities
    List,

    /// Show an entity with its attributes and relationships
    Show { slug: String },

    /// Print the form schema of an entity
    Form {
        slug: String,

        /// create, replace or patch
        #[arg(long, default_value = "create")]
        mode: FormMode,

        /// Record being updated, for replace and patch
        #[arg(long)]
        record: Option<RecordId>,
    },

    /// Delete an entity with its records
    Delete { slug: String },
}

#[derive(Subcommand, Debug)]
pub enum AttributeCommand {
    /// Create an attribute
    Create(CreateAttribute),

    /// List attributes, optionally only those attached to an entity
    List {
        #[arg(long)]
        entity: Option<String>,
    },

    /// Attach an attribute to an entity
    Attach { attribute: String, entity: String },

    /// Detach an attribute from an entity
    Detach { attribute: String, entity: String },

    /// Delete an attribute with its stored values
    Delete { attribute: String },
}

#[derive(Args, Debug)]
pub struct CreateAttribute {
    pub name: String,

    /// string, integer, float, date or boolean
    #[arg(short = 't', long = "type", default_value = "string")]
    pub data_type: DataType,

    /// Slug [default: derived from the name]
    #[arg(long)]
    pub slug: Option<String>,

    #[arg(long)]
    pub required: bool,

    #[arg(long)]
    pub unique: bool,

    /// Default value, as text
    #[arg(long)]
    pub default: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RelationshipCommand {
    /// Create a relationship between two entities
    Create {
        /// one-to-one, one-to-many or many-to-many
        #[arg(short = 't', long = "type")]
        relation_type: RelationType,

        /// Source entity slug
        #[arg(long)]
        from: String,

        /// Target entity slug
        #[arg(long)]
        to: String,

        /// Field name on the source [default: derived from the slugs]
        #[arg(long)]
        name: Option<String>,

        /// Field name on the target [default: derived from the slugs]
        #[arg(long)]
        inverse_name: Option<String>,
    },

    /// List relationships, optionally only those touching an entity
    List {
        #[arg(long)]
        entity: Option<String>,
    },

    /// Delete a relationship with its record links
    Delete { id: RelationshipId },
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Validate and store a record
    Create {
        /// Entity slug
        entity: String,

        /// Record fields as a JSON object
        #[arg(short = 'D', long)]
        data: String,

        /// Acting user id
        #[arg(long)]
        user: Option<UserId>,
    },

    /// Print one record
    Get { entity: String, id: RecordId },

    /// List records, newest first
    List {
        entity: String,

        #[arg(long)]
        page: Option<u64>,

        #[arg(long)]
        per_page: Option<u64>,
    },
}

// ============================================================================
// Entry points
// ============================================================================

/// Parse arguments, run, and report errors on stderr
pub fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Run one parsed command
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let allow_missing = matches!(cli.command, Command::Init { .. });
    let config = load_config(&cli, allow_missing)?;
    init_tracing(&config.logging.level, cli.verbose);
    tracing::debug!(database = %config.database.path, "configuration loaded");
    commands::execute(cli, config)
}

/// Configuration file, then environment, then `--database`
fn load_config(cli: &Cli, allow_missing: bool) -> anyhow::Result<EngineConfig> {
    let dir = std::env::current_dir()?;
    let config = match cli.config.as_deref() {
        Some(path) if allow_missing && !path.exists() => EngineConfig::default(),
        path => EngineConfig::discover(path, &dir)?,
    };

    let mut config = config.with_process_env();
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    Ok(config)
}

/// Install the stderr subscriber; `RUST_LOG` wins over `level`
pub fn init_tracing(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn report(err: &anyhow::Error) {
    eprintln!("{} {:#}", "error:".red().bold(), err);

    if let Some(errors) = err
        .downcast_ref::<EngineError>()
        .and_then(EngineError::validation_errors)
    {
        for (field, messages) in errors.iter() {
            for message in messages {
                eprintln!("  {} {}", format!("{}:", field).yellow(), message);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
