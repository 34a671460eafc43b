use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{miette, IntoDiagnostic, Result, WrapErr};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use manifestpatch::catalog::Catalog;
use manifestpatch::config::Config;
use manifestpatch::discovery::{FileFinder, ProjectLayout};
use manifestpatch::extract::{declared_permissions, extract_services, DocumentSources};
use manifestpatch::model::{PermissionValue, SaveRequest, ServiceEntry};
use manifestpatch::session::{self, load_sources, DocumentStore, FsStore, SaveContext, StoreError};

/// manifestpatch - declare permissions and SDK integrations in mobile projects
#[derive(Parser, Debug)]
#[command(name = "manifestpatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Patterns to exclude from discovery (can be specified multiple times)
    #[arg(short, long, global = true)]
    exclude: Vec<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite the project documents to match a desired state file
    ///
    /// What the documents configure now is taken as the previous state. Every
    /// usage-description key in Info.plist that the permission catalog knows
    /// is treated as managed, so it is deleted when `iosPermissions` leaves it
    /// out, even if another tool added it. Keys the catalog does not know are
    /// never deleted.
    Apply {
        /// Path to the project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Desired state (JSON or YAML)
        #[arg(short, long)]
        state: PathBuf,

        /// Show which documents would change without writing them
        #[arg(long)]
        dry_run: bool,

        /// Confirm each document before it is written
        #[arg(long)]
        interactive: bool,
    },

    /// Print the services currently configured in the project
    Extract {
        /// Path to the project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "terminal")]
        format: OutputFormat,
    },

    /// Print the permissions currently declared in the project
    Permissions {
        /// Path to the project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

impl Command {
    fn path(&self) -> &Path {
        match self {
            Command::Apply { path, .. } | Command::Extract { path, .. } | Command::Permissions { path } => path,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    info!("manifestpatch v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let root = cli.command.path();
    let catalog = Catalog::load(&config.catalog, root)?;
    let layout = FileFinder::new(&config).discover(root)?;
    log_layout(&layout);

    match &cli.command {
        Command::Apply {
            state,
            dry_run,
            interactive,
            ..
        } => run_apply(&config, &catalog, &layout, state, *dry_run, *interactive),
        Command::Extract { format, .. } => {
            let sources = load_sources(&layout, &FsStore);
            print_services(&extract_services(&sources, &catalog), *format)
        }
        Command::Permissions { .. } => {
            let sources = load_sources(&layout, &FsStore);
            print_permissions(&sources);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::from_default_locations(cli.command.path())?
    };

    if !cli.exclude.is_empty() {
        config.exclude.extend(cli.exclude.clone());
    }

    Ok(config)
}

fn log_layout(layout: &ProjectLayout) {
    let documents = [
        ("manifest", &layout.manifest),
        ("strings", &layout.strings),
        ("plist", &layout.plist),
        ("podfile", &layout.podfile),
        ("app delegate", &layout.app_delegate),
        ("entitlements", &layout.entitlements),
    ];
    for (name, path) in documents {
        match path {
            Some(path) => debug!("{}: {}", name, path.display()),
            None => debug!("{}: not found", name),
        }
    }
}

/// Read the desired state. `.json` files are JSON, everything else is YAML
/// (which also accepts JSON).
fn read_state(path: &Path) -> Result<SaveRequest> {
    let contents = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read state file: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .into_diagnostic()
            .wrap_err("Failed to parse JSON state"),
        _ => serde_yaml::from_str(&contents)
            .into_diagnostic()
            .wrap_err("Failed to parse YAML state"),
    }
}

fn run_apply(
    config: &Config,
    catalog: &Catalog,
    layout: &ProjectLayout,
    state: &Path,
    dry_run: bool,
    interactive: bool,
) -> Result<()> {
    let request = read_state(state)?;
    let sources = load_sources(layout, &FsStore);

    // What the documents configure now stands in for the previous save
    let previous_services = extract_services(&sources, catalog);
    let previous_ios_permissions = declared_permissions(&sources)
        .ios
        .into_iter()
        .map(|entry| entry.key)
        .filter(|key| catalog.permissions.ios_permission(key).is_some())
        .collect();
    info!("Found {} configured service(s)", previous_services.len());

    let ctx = SaveContext {
        catalog,
        previous_services,
        previous_ios_permissions,
        indent: config.indent.clone(),
    };

    let outcome = if dry_run {
        let mut store = DryRunStore::default();
        let outcome = session::save(&request, &ctx, layout, &mut store);
        for path in &store.pending {
            println!("  {} {}", "would update".yellow(), path.display());
        }
        outcome
    } else if interactive {
        session::save(&request, &ctx, layout, &mut InteractiveStore::default())
    } else {
        session::save(&request, &ctx, layout, &mut FsStore)
    };

    if !outcome.success {
        return Err(miette!("{}", outcome.message));
    }

    if !dry_run {
        for path in &outcome.written {
            println!("  {} {}", "updated".green(), path.display());
        }
    }
    println!("{}", outcome.message.bold());
    Ok(())
}

fn print_services(services: &[ServiceEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(services).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Terminal => {
            if services.is_empty() {
                println!("{}", "No configured services found.".yellow());
                return Ok(());
            }
            for service in services {
                println!("{}", service.id.cyan().bold());
                for (field, value) in &service.values {
                    println!("  {} {}", format!("{}:", field).dimmed(), value);
                }
            }
        }
    }
    Ok(())
}

fn print_permissions(sources: &DocumentSources) {
    let declared = declared_permissions(sources);

    println!("{}", "Android".cyan().bold());
    if declared.android.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for name in &declared.android {
        println!("  {}", name);
    }

    println!("{}", "iOS".cyan().bold());
    if declared.ios.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for entry in &declared.ios {
        let value = match &entry.value {
            Some(PermissionValue::Text(text)) => text.clone(),
            Some(PermissionValue::Flag(flag)) => flag.to_string(),
            None => String::new(),
        };
        println!("  {} {}", entry.key, value.dimmed());
    }
}

/// Reads the real files and records writes without performing them.
#[derive(Debug, Default)]
struct DryRunStore {
    pending: Vec<PathBuf>,
}

impl DocumentStore for DryRunStore {
    fn read(&self, path: &Path) -> Option<String> {
        FsStore.read(path)
    }

    fn write(&mut self, path: &Path, _content: &str) -> Result<(), StoreError> {
        self.pending.push(path.to_path_buf());
        Ok(())
    }
}

/// Asks before every write.
#[derive(Debug, Default)]
struct InteractiveStore {
    inner: FsStore,
}

impl DocumentStore for InteractiveStore {
    fn read(&self, path: &Path) -> Option<String> {
        self.inner.read(path)
    }

    fn write(&mut self, path: &Path, content: &str) -> Result<(), StoreError> {
        let prompt = format!("Write {}?", path.display());
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(&prompt)
            .default(true)
            .interact()
            .unwrap_or(false);

        if confirmed {
            self.inner.write(path, content)
        } else {
            Err(StoreError::Declined(path.to_path_buf()))
        }
    }
}
