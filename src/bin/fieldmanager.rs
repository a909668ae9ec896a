//! fieldmanager - server-side apply from the command line.
//!
//! Runs apply, update and patch writes against objects stored in YAML/JSON
//! files and prints the resulting object with its managed fields.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use field_manager::config::{FieldManagerConfig, Resource, ResourceRegistry};
use field_manager::schema::TypeRef;
use field_manager::typed::TypedValue;
use field_manager::value::{self, Value};
use field_manager::{
    ApplyRequest, Error, FieldManager, FixedClock, PatchRequest, PatchType, UpdateRequest,
};

const LOG_ENV: &str = "FIELDMANAGER_LOG";

#[derive(Debug, Parser)]
#[command(name = "fieldmanager", version, about = "Server-side apply field manager")]
struct Cli {
    /// Field manager configuration (YAML). Objects of undeclared kinds are
    /// handled without a schema.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Time to record instead of the current time (RFC 3339).
    #[arg(long, global = true)]
    now: Option<String>,

    #[arg(short, long, global = true, value_enum, default_value_t = Format::Yaml)]
    output: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PatchKind {
    Json,
    Merge,
    Strategic,
}

impl From<PatchKind> for PatchType {
    fn from(kind: PatchKind) -> Self {
        match kind {
            PatchKind::Json => PatchType::Json,
            PatchKind::Merge => PatchType::Merge,
            PatchKind::Strategic => PatchType::Strategic,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply a partial configuration to the live object.
    Apply {
        /// The applied configuration.
        file: PathBuf,
        /// The stored object; omit to create it.
        #[arg(long)]
        live: Option<PathBuf>,
        #[arg(short, long)]
        manager: String,
        #[arg(long, default_value = "")]
        subresource: String,
        #[arg(long)]
        force: bool,
    },
    /// Replace the live object.
    Update {
        /// The new object.
        file: PathBuf,
        #[arg(long)]
        live: Option<PathBuf>,
        #[arg(short, long)]
        manager: Option<String>,
        #[arg(long, default_value = "")]
        subresource: String,
    },
    /// Patch the live object.
    Patch {
        /// The patch document.
        file: PathBuf,
        #[arg(long)]
        live: PathBuf,
        #[arg(long = "type", value_enum, default_value_t = PatchKind::Strategic)]
        patch_type: PatchKind,
        #[arg(short, long)]
        manager: Option<String>,
        #[arg(long, default_value = "")]
        subresource: String,
    },
    /// Print the FieldsV1 encoding of the fields an object sets.
    Fieldset { file: PathBuf },
    /// Print the fields that differ between two objects.
    Compare { lhs: PathBuf, rhs: PathBuf },
}

fn initialize_logging(env: &str) {
    let filter = EnvFilter::try_from_env(env)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    initialize_logging(LOG_ENV);
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e.downcast_ref::<Error>() {
                Some(err) if err.is_client_error() => ExitCode::from(1),
                _ => ExitCode::from(2),
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => FieldManagerConfig::from_file(path)?,
        None => FieldManagerConfig::default(),
    };
    let registry = config.build()?;
    let now = cli
        .now
        .as_deref()
        .map(DateTime::parse_from_rfc3339)
        .transpose()?
        .map(|t| t.with_timezone(&Utc));
    let mut stdout = io::stdout().lock();

    match cli.command {
        Command::Apply {
            file,
            live,
            manager,
            subresource,
            force,
        } => {
            let config = read_object(&file)?;
            let live = live.as_deref().map(read_object).transpose()?;
            let fm = field_manager_for(&registry, &config, now);
            let request = ApplyRequest::new(live, config, manager)
                .with_subresource(subresource)
                .with_force(force);
            write_value(&mut stdout, &fm.apply(&request)?.object, cli.output)?;
        }
        Command::Update {
            file,
            live,
            manager,
            subresource,
        } => {
            let object = read_object(&file)?;
            let live = live.as_deref().map(read_object).transpose()?;
            let fm = field_manager_for(&registry, &object, now);
            let mut request = UpdateRequest::new(live, object).with_subresource(subresource);
            request.manager = manager;
            write_value(&mut stdout, &fm.update(&request)?.object, cli.output)?;
        }
        Command::Patch {
            file,
            live,
            patch_type,
            manager,
            subresource,
        } => {
            let patch = read_object(&file)?.to_json_value();
            let live = read_object(&live)?;
            let fm = field_manager_for(&registry, &live, now);
            let mut request =
                PatchRequest::new(live, patch_type.into(), patch).with_subresource(subresource);
            request.manager = manager;
            write_value(&mut stdout, &fm.patch(&request)?.object, cli.output)?;
        }
        Command::Fieldset { file } => {
            let object = typed(&registry, read_object(&file)?);
            let fields = object.to_field_set().to_fields_v1()?;
            write_value(&mut stdout, &Value::from(fields), cli.output)?;
        }
        Command::Compare { lhs, rhs } => {
            let lhs = typed(&registry, read_object(&lhs)?);
            let rhs = typed(&registry, read_object(&rhs)?);
            let comparison = lhs.compare(&rhs)?;
            if comparison.is_same() {
                writeln!(stdout, "Objects are identical")?;
            } else {
                write!(stdout, "{}", comparison)?;
            }
        }
    }
    Ok(())
}

fn read_object(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read file {:?}: {}", path, e))?;
    Ok(value::from_yaml(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))?)
}

fn write_value(
    output: &mut dyn Write,
    value: &Value,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = match format {
        Format::Json => serde_json::to_string_pretty(&value.to_json_value())? + "\n",
        Format::Yaml => value::to_yaml(value)?,
    };
    output.write_all(rendered.as_bytes())?;
    Ok(())
}

/// The resource an object belongs to: the registered one, or one without
/// a schema for kinds the configuration does not declare.
fn resource_for(registry: &ResourceRegistry, object: &Value) -> Resource {
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    match registry.get(kind) {
        Some(resource) => resource.clone(),
        None => {
            let api_version = object.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
            Resource::deduced(kind, api_version)
        }
    }
}

fn field_manager_for(
    registry: &ResourceRegistry,
    object: &Value,
    now: Option<DateTime<Utc>>,
) -> FieldManager {
    let fm = FieldManager::with_resource(registry, resource_for(registry, object));
    match now {
        Some(now) => fm.with_clock(Arc::new(FixedClock(now))),
        None => fm,
    }
}

fn typed(registry: &ResourceRegistry, object: Value) -> TypedValue {
    let type_ref = registry
        .get(object.get("kind").and_then(Value::as_str).unwrap_or_default())
        .map(|r| r.type_ref.clone())
        .unwrap_or_else(TypeRef::deduced);
    TypedValue::new(object, Arc::clone(&registry.schema), type_ref)
}
