//! promptvar - resolve `{{variables}}` in prompt templates.
//!
//! Usage:
//!   promptvar parse <FILE>              List the variables of a template
//!   promptvar render <FILE> [--copy]    Resolve a template and print or copy it
//!   promptvar handles list              Show registered file and directory handles
//!   promptvar handles register <PATH>   Remember a file or directory
//!   promptvar --help                    Show help

mod clipboard;
mod settings;

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use tracing_subscriber::EnvFilter;

use promptvar_core::{
    HandleEntry, HandleKind, HandleRef, SystemClock, TemplateParseResult, VariableEntry,
    VariableValue,
};
use promptvar_engine::{ResolutionOutcome, TracingNotifier, VariableEngine};
use promptvar_fs::{
    FileHandleRegistryEntry, FileResolver, GrantTable, HandleCache, HandleRegistry,
    JsonRegistryStore, LocalHandle, PermissionGate, RegistryStore,
};
use promptvar_parse::{CachedParser, DEFAULT_MEMO_CAPACITY, TemplateParser};

use crate::clipboard::SystemClipboard;
use crate::settings::{Settings, build_global_store, grant_table, open_kind, parse_globals_json};

#[derive(Parser)]
#[command(
    name = "promptvar",
    version,
    about = "Resolve {{variables}} in prompt templates",
    long_about = "promptvar fills `{{name:default:description}}` placeholders from \
                  command-line values, global variables, files and directories.\n\n\
                  Global variables and defaults are read from \
                  $CONFIG/promptvar/config.toml when present."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the variables found in a template
    Parse {
        /// Template file ("-" for stdin)
        file: PathBuf,

        /// Report `{{` sequences that do not form a placeholder
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Resolve a template and print or copy the result
    Render {
        /// Template file ("-" for stdin)
        file: PathBuf,

        /// Set a variable value
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Attach a file to a variable (repeat to attach several)
        #[arg(long = "file", value_name = "NAME=PATH")]
        files: Vec<String>,

        /// Attach a directory listing to a variable
        #[arg(long = "dir", value_name = "NAME=PATH")]
        dirs: Vec<String>,

        /// JSON file with additional global variables
        #[arg(short, long, value_name = "PATH")]
        globals: Option<PathBuf>,

        /// Copy the result to the clipboard instead of printing it
        #[arg(short, long)]
        copy: bool,

        /// Read files fresh, ignoring cached content
        #[arg(long)]
        no_cache: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage registered file and directory handles
    Handles {
        #[command(subcommand)]
        action: HandlesAction,
    },
}

#[derive(Subcommand)]
enum HandlesAction {
    /// List registered handles
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Register a file or directory
    Register {
        /// Path to register
        path: PathBuf,
    },

    /// Remove a registered handle
    Remove {
        /// Handle id
        id: String,
    },

    /// Remove every registered handle
    Clear,

    /// Check that registered handles can still be read
    Check {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Parse {
            file,
            strict,
            format,
        } => {
            run_parse(&settings, &file, strict, format)?;
        }
        Command::Render {
            file,
            set,
            files,
            dirs,
            globals,
            copy,
            no_cache,
            format,
        } => {
            let request = RenderRequest {
                set,
                files,
                dirs,
                globals,
                copy,
                no_cache,
                format,
            };
            run_render(&settings, &file, request).await?;
        }
        Command::Handles { action } => {
            run_handles(&settings, action).await?;
        }
    }

    Ok(())
}

/// Install the log subscriber; `RUST_LOG` overrides `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read a template from a file or stdin.
fn read_template(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read template from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Split a `NAME=VALUE` argument.
fn split_pair(arg: &str) -> Result<(&str, &str)> {
    arg.split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, value)| (name.trim(), value))
        .ok_or_else(|| eyre!("Expected NAME=VALUE, got '{arg}'"))
}

/// Parse a template and list its variables.
fn run_parse(settings: &Settings, file: &Path, strict: bool, format: OutputFormat) -> Result<()> {
    let template = read_template(file)?;
    let mut options = settings.parser;
    options.strict |= strict;
    let result = TemplateParser::with_options(options).parse(&template);

    match format {
        OutputFormat::Text => print_parse_result(&result),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    if result.has_errors() && options.strict {
        return Err(eyre!("{} parse error(s)", result.errors.len()));
    }
    Ok(())
}

fn print_parse_result(result: &TemplateParseResult) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" {} variable(s)", result.variables.len());
    println!("{}", "─".repeat(70));

    for variable in &result.variables {
        let marker = if variable.is_required { "*" } else { " " };
        let default = variable
            .default_value
            .as_deref()
            .map(|d| format!("= {d}"))
            .unwrap_or_default();
        println!(
            " {marker} {:<24} {:<20} {}",
            variable.name,
            truncate(&default, 20),
            variable.description.as_deref().unwrap_or("")
        );
    }

    if !result.errors.is_empty() {
        println!();
        for error in &result.errors {
            println!(" error: {error}");
        }
    }
    println!();
}

/// Truncate a string to at most `max_chars` characters.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Open the persistent registry and reopen its local handles.
fn open_registry(settings: &Settings, grants: &Arc<GrantTable>) -> Result<Arc<HandleRegistry>> {
    let store: Arc<dyn RegistryStore> = Arc::new(JsonRegistryStore::new(settings.registry_path()));
    let registry = HandleRegistry::open(store, Arc::new(SystemClock))?;

    let opener = |entry: &FileHandleRegistryEntry| {
        let locator = entry.locator.as_deref().ok_or_else(|| {
            promptvar_core::FsError::NotFound {
                name: entry.name.to_string(),
            }
        })?;
        LocalHandle::shared(locator, grants.clone())
    };
    let opened = registry.rehydrate(&opener);
    tracing::debug!(opened, total = registry.len(), "rehydrated handle registry");
    Ok(Arc::new(registry))
}

fn build_resolver(settings: &Settings, registry: Arc<HandleRegistry>) -> Arc<FileResolver> {
    Arc::new(FileResolver::new(
        PermissionGate::new(),
        Arc::new(HandleCache::new(settings.cache.clone())),
        registry,
        settings.resolver.clone(),
    ))
}

struct RenderRequest {
    set: Vec<String>,
    files: Vec<String>,
    dirs: Vec<String>,
    globals: Option<PathBuf>,
    copy: bool,
    no_cache: bool,
    format: OutputFormat,
}

/// Resolve a template and print or copy it.
async fn run_render(settings: &Settings, file: &Path, request: RenderRequest) -> Result<()> {
    let template = read_template(file)?;
    let grants = grant_table(settings);
    let registry = open_registry(settings, &grants)?;
    let resolver = build_resolver(settings, registry.clone());

    let parser = CachedParser::with_options(settings.parser, DEFAULT_MEMO_CAPACITY);
    let mut engine = VariableEngine::with_parser(resolver.clone(), parser);
    engine.load_template(template, HashMap::new());

    for arg in &request.set {
        let (name, value) = split_pair(arg)?;
        let state = engine.set_value(name, value)?;
        for error in &state.errors {
            tracing::warn!("{}", error.message);
        }
    }

    let mut attachments: BTreeMap<String, Vec<VariableEntry>> = BTreeMap::new();
    for (args, kind) in [
        (&request.files, HandleKind::File),
        (&request.dirs, HandleKind::Directory),
    ] {
        for arg in args {
            let (name, path) = split_pair(arg)?;
            let handle = open_kind(Path::new(path), kind, &grants)?;
            let entry = match kind {
                HandleKind::File => VariableEntry::file(handle),
                HandleKind::Directory => VariableEntry::directory(handle),
            };
            attachments.entry(name.to_string()).or_default().push(entry);
        }
    }
    for (name, entries) in attachments {
        engine.attach(&name, VariableValue::new(entries))?;
    }

    let mut specs = settings.globals.clone();
    if let Some(path) = &request.globals {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        specs.extend(parse_globals_json(&content)?);
    }
    let used = engine.used_variables();
    let globals = build_global_store(&specs, |name| used.contains(name), &grants, &registry);

    let mut options = resolver.resolve_options();
    if request.no_cache {
        options.use_cache = false;
    }

    // Running the command is the user's explicit request for access.
    let _gesture = resolver.gate().user_gesture();

    if request.copy {
        let report = engine
            .copy_to_clipboard(&globals, &SystemClipboard, &TracingNotifier, &options)
            .await?;
        match request.format {
            OutputFormat::Text => {
                eprintln!("Copied {} to the clipboard", format_size(report.text.len() as u64));
                if let ResolutionOutcome::Partial { diagnostics } = &report.outcome {
                    for diagnosis in diagnostics {
                        eprintln!("  {}", diagnosis.message());
                    }
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        return Ok(());
    }

    let resolution = engine.resolve(&globals, &options).await;
    match request.format {
        OutputFormat::Text => {
            for diagnosis in &resolution.diagnostics {
                eprintln!("warning: {}", diagnosis.message());
            }
            print!("{}", resolution.text);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolution)?),
    }
    Ok(())
}

/// Manage the persistent handle registry.
async fn run_handles(settings: &Settings, action: HandlesAction) -> Result<()> {
    let grants = grant_table(settings);
    let registry = open_registry(settings, &grants)?;

    match action {
        HandlesAction::List { format } => {
            let entries = registry.entries();
            match format {
                OutputFormat::Text => print_handles(&entries),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
            }
        }
        HandlesAction::Register { path } => {
            let handle = LocalHandle::shared(&path, grants.clone())?;
            let id = registry.register_handle(handle)?;
            println!("{id}");
        }
        HandlesAction::Remove { id } => {
            if !registry.remove_handle(&id)? {
                return Err(eyre!("No registered handle with id '{id}'"));
            }
            eprintln!("Removed {id}");
        }
        HandlesAction::Clear => {
            let count = registry.len();
            registry.clear_handles()?;
            eprintln!("Removed {count} handle(s)");
        }
        HandlesAction::Check { format } => {
            let resolver = build_resolver(settings, registry.clone());
            let entries: Vec<VariableEntry> = registry
                .entries()
                .into_iter()
                .map(|meta| {
                    let entry = HandleEntry::new(meta.name.as_str(), HandleRef::registered(meta.id));
                    match meta.kind {
                        HandleKind::File => VariableEntry::File(entry),
                        HandleKind::Directory => VariableEntry::Directory(entry),
                    }
                })
                .collect();
            let report = resolver.diagnose(&entries).await;
            match format {
                OutputFormat::Text => {
                    for diagnosis in &report {
                        let mark = if diagnosis.is_healthy() { "ok " } else { "!! " };
                        println!(" {mark} {}", diagnosis.message());
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }
    Ok(())
}

fn print_handles(entries: &[FileHandleRegistryEntry]) {
    if entries.is_empty() {
        println!(" No registered handles.");
        return;
    }

    for entry in entries {
        let size = entry
            .locator
            .as_deref()
            .and_then(|path| std::fs::metadata(path).ok())
            .filter(|meta| meta.is_file())
            .map(|meta| format_size(meta.len()))
            .unwrap_or_default();
        println!(
            " {:<40} {:<9} {:>10}  {}",
            truncate(&entry.id, 40),
            entry.kind,
            size,
            entry.locator.as_deref().unwrap_or(&entry.name)
        );
    }
}
