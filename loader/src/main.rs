//! Shiftload CLI - load CSV and spreadsheet files into model records
//!
//! # Main Commands
//!
//! ```bash
//! shiftload load products.csv --schema model.yaml --class Product   # Load a file
//! shiftload operators --schema model.yaml --class Product            # List operators
//! shiftload map products.csv --schema model.yaml --class Product     # Check headers only
//! ```
//!
//! A `.env` file is read at startup; `SHIFTLOAD_CONFIG` names a default
//! configuration file for `load`.

use clap::{Args, Parser, Subcommand};
use shiftload::config::CONFIG_ENV;
use shiftload::logs::LOG_BROADCASTER;
use shiftload::{
    open_source, perform_load, ImportConfig, LoadOptions, LoadSession, MappingOptions,
    MemoryStore, ModelSchema, OperatorRegistry, RegistryOptions, SourceKind, ValueRules,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "shiftload")]
#[command(about = "Load CSV and spreadsheet files into model records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every row of a file into records of a class
    Load {
        /// Input file (.csv, .xlsx, .xls, .ods)
        input: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        mapping: MappingArgs,

        /// Related records to resolve associations against (YAML or JSON)
        #[arg(short, long)]
        fixtures: Option<PathBuf>,

        /// Configuration file (default: $SHIFTLOAD_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Loader name used for the loader-specific config section
        /// (default: csv or excel, by extension)
        #[arg(long)]
        loader: Option<String>,

        /// Stop at the first record that fails to save
        #[arg(long)]
        abort_on_failure: bool,

        /// Process every row but persist nothing
        #[arg(long)]
        dry_run: bool,

        /// Log every coercion attempt
        #[arg(short, long)]
        verbose: bool,

        /// Output file for loaded records (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the load report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the operators of a class
    Operators {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Map the header row of a file without loading any row
    Map {
        /// Input file (.csv, .xlsx, .xls, .ods)
        input: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        mapping: MappingArgs,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Model schema (YAML or JSON)
    #[arg(short, long)]
    schema: PathBuf,

    /// Target class
    #[arg(long)]
    class: String,

    /// Also discover virtual setters
    #[arg(long)]
    instance_methods: bool,
}

#[derive(Args)]
struct MappingArgs {
    /// Fail if any header cannot be mapped
    #[arg(long)]
    strict: bool,

    /// Operators that must have a column
    #[arg(long, value_delimiter = ',')]
    mandatory: Vec<String>,

    /// Headers to skip
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// Unmapped headers to carry through anyway
    #[arg(long = "force", value_delimiter = ',')]
    force_inclusion: Vec<String>,

    /// Carry every unmapped header through
    #[arg(long)]
    include_all: bool,
}

impl MappingArgs {
    /// Command-line flags win over the config file.
    fn apply_to(self, options: &mut MappingOptions) {
        options.strict |= self.strict;
        options.include_all |= self.include_all;
        if !self.mandatory.is_empty() {
            options.mandatory = self.mandatory;
        }
        if !self.ignore.is_empty() {
            options.ignore = self.ignore;
        }
        if !self.force_inclusion.is_empty() {
            options.force_inclusion = self.force_inclusion;
        }
    }
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Load {
            input,
            target,
            mapping,
            fixtures,
            config,
            loader,
            abort_on_failure,
            dry_run,
            verbose,
            output,
            report,
        } => {
            let flags = LoadFlags { abort_on_failure, dry_run, verbose };
            cmd_load(
                &input,
                target,
                mapping,
                fixtures.as_deref(),
                config,
                loader,
                flags,
                output.as_deref(),
                report.as_deref(),
            )
        }

        Commands::Operators { target } => cmd_operators(target),

        Commands::Map { input, target, mapping } => cmd_map(&input, target, mapping),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

struct LoadFlags {
    abort_on_failure: bool,
    dry_run: bool,
    verbose: bool,
}

#[allow(clippy::too_many_arguments)]
fn cmd_load(
    input: &Path,
    target: TargetArgs,
    mapping: MappingArgs,
    fixtures: Option<&Path>,
    config: Option<PathBuf>,
    loader: Option<String>,
    flags: LoadFlags,
    output: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Loading: {}", input.display());

    if output.is_none() {
        LOG_BROADCASTER.set_quiet(true);
    }

    let schema = Arc::new(ModelSchema::from_path(&target.schema)?);
    let loader_name = match loader {
        Some(name) => name,
        None => SourceKind::from_path(input)?.name().to_string(),
    };

    // Config first, command-line flags on top
    let mut options = LoadOptions::default();
    let mut rules = ValueRules::new();
    let config = config.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));
    if let Some(config_path) = config {
        eprintln!("   Config: {}", config_path.display());
        ImportConfig::from_path(&config_path)?.apply(&target.class, &loader_name, &mut rules, &mut options)?;
    }
    mapping.apply_to(&mut options.mapping);
    options.abort_on_failure |= flags.abort_on_failure;
    options.dry_run |= flags.dry_run;
    options.verbose |= flags.verbose;
    options.include_instance_methods |= target.instance_methods;

    let mut registry = OperatorRegistry::new(Arc::clone(&schema));
    let operators = registry.operators_for(&target.class, &options.registry_options())?;
    eprintln!("   Class: {} ({} operators)", target.class, operators.len());
    eprintln!("   Loader: {}", loader_name);

    let mut store = MemoryStore::with_schema(schema);
    if let Some(fixtures) = fixtures {
        let count = store.seed_from_path(fixtures)?;
        eprintln!("   Fixtures: {} related records", count);
    }

    let mut session = LoadSession::new(operators, options, store).with_rules(rules);
    let report = perform_load(input, &mut session)?;

    eprintln!("\n📊 {}", report.summary());
    for failure in report.failures.iter().take(5) {
        eprintln!("\n   ❌ Record {}:", failure.uid);
        for err in failure.errors.iter().take(3) {
            eprintln!("     - {}: {}", err.operator, err.message);
        }
    }

    let json = serde_json::to_string_pretty(session.loaded_records())?;
    write_output(&json, output)?;

    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        eprintln!("💾 Report written to: {}", path.display());
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_operators(target: TargetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let schema = ModelSchema::from_path(&target.schema)?;
    let mut registry = OperatorRegistry::new(schema);
    let operators = registry.operators_for(
        &target.class,
        &RegistryOptions { reload: false, include_instance_methods: target.instance_methods },
    )?;

    println!("📋 Operators of {} ({}):\n", target.class, operators.len());
    for op in operators.iter() {
        match &op.related_class {
            Some(related) => {
                let kind = if op.is_collection { "has many" } else { "belongs to" };
                let key = op.default_lookup_key.as_deref().unwrap_or("-");
                println!("  🔗 {} ({} {}, lookup key: {})", op.name, kind, related, key);
            }
            None => println!("  📄 {} ({:?})", op.name, op.setter),
        }
    }
    Ok(())
}

fn cmd_map(input: &Path, target: TargetArgs, mapping: MappingArgs) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Mapping headers: {}", input.display());

    let schema = ModelSchema::from_path(&target.schema)?;
    let mut registry = OperatorRegistry::new(schema);
    let operators = registry.operators_for(
        &target.class,
        &RegistryOptions { reload: false, include_instance_methods: target.instance_methods },
    )?;

    let mut options = MappingOptions::default();
    mapping.apply_to(&mut options);

    let headers = open_source(input)?.header_row()?;
    let column_map = shiftload::map_headers(&headers, &operators, &options)?;

    for m in column_map.mappings() {
        match (m.operator_name(), &m.lookup_key) {
            (Some(op), Some(key)) => println!("  ✅ {} -> {} (by {})", m.header, op, key),
            (Some(op), None) => println!("  ✅ {} -> {}", m.header, op),
            (None, _) if m.forced => println!("  ➕ {} (carried through)", m.header),
            (None, _) => println!("  ⚠️  {} (unmapped)", m.header),
        }
    }

    eprintln!(
        "\n📊 {} columns, {} unmapped",
        column_map.len(),
        column_map.unmapped_headers().len()
    );
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
