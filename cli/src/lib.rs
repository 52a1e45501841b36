use anyhow::{anyhow, Error, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use triplesplit::batch::ThresholdPolicy;
use triplesplit::config::{
    output_graph, parse_variables, Config, EndpointConfig, SplitSettings, DEFAULT_CONFIG_FILE,
};
use triplesplit::pipeline::{SplitConfig, SplitPipeline};
use triplesplit::registry::{normalize_prefix, RegistrySource};
use triplesplit::store::open_store;

#[derive(Debug, Parser)]
#[command(name = "triplesplit")]
#[command(about = "Split multi-valued literals in a triple store into one triple per value")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
    /// Configuration file, defaults to 'triplesplit.json' when it exists
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    /// Offline mode - will not download the prefix registry
    #[clap(long, short, action, default_value = "false", global = true)]
    offline: bool,
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// SPARQL query endpoint
    #[clap(long, short = 'e')]
    endpoint: Option<String>,
    /// SPARQL update endpoint, defaults to the query endpoint
    #[clap(long)]
    update_endpoint: Option<String>,
    /// Graph Store Protocol endpoint; bulk writes use it when given
    #[clap(long)]
    graph_store: Option<String>,
    /// Username for HTTP basic authentication
    #[clap(long, short = 'u')]
    username: Option<String>,
    /// Password for HTTP basic authentication
    #[clap(long, short = 'p')]
    password: Option<String>,
    /// Local oxigraph store directory, used instead of an endpoint
    #[clap(long)]
    store: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SplitArgs {
    /// IRI of the class whose instances are split
    #[clap(long)]
    class: Option<String>,
    /// IRI of the property holding the delimited values
    #[clap(long)]
    property: Option<String>,
    /// Regular expression separating values. ',"' splits only at commas followed by a quote
    #[clap(long)]
    delimiter: Option<String>,
    /// Token stripped once from the start and the end of every value
    #[clap(long)]
    trim: Option<String>,
    /// 'infer' to resolve prefix:id values through the prefix registry, or a namespace
    /// prepended to every value. Values stay literals when omitted
    #[clap(long)]
    uri_expansion: Option<String>,
    /// Delete the original triples after the split values are written
    #[clap(long, action, default_value = "false")]
    delete: bool,
    /// Variables as key:value, e.g. outputGraph:http://example.org/graph
    #[clap(long = "var", num_args = 1..)]
    vars: Vec<String>,
    /// Read and report, but write and delete nothing
    #[clap(long, action, default_value = "false")]
    dry_run: bool,
    /// Number of pending triples that triggers a write
    #[clap(long)]
    flush_threshold: Option<usize>,
    /// Output the report as JSON
    #[clap(long, action, default_value = "false")]
    json: bool,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Subcommand)]
enum RegistryCommands {
    /// Download the prefix registry and replace the cached copy
    Fetch,
    /// Print the namespace a prefix resolves to
    Lookup {
        /// Prefixes as they appear in values, e.g. 'KEGG Compound'
        prefixes: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Write a configuration file from the given options
    Init {
        /// Overwrite the configuration file if it already exists
        #[clap(long, default_value = "false")]
        overwrite: bool,
        #[command(flatten)]
        split: SplitArgs,
    },
    /// Print the effective configuration
    Show {
        /// Output JSON instead of text
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Split the matching values into one triple per value.
    ///
    /// Running a split twice without --delete writes the derived triples twice; the
    /// operation is not idempotent.
    Split(SplitArgs),
    /// Manage the cached prefix registry
    #[command(subcommand)]
    Registry(RegistryCommands),
    /// Manage the triplesplit configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Prints the version of the triplesplit binary
    Version,
}

pub fn run() -> Result<()> {
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn config_path(cmd: &Cli) -> PathBuf {
    cmd.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        return Config::from_file(path);
    }
    if explicit {
        return Err(anyhow!("Configuration file {} not found", path.display()));
    }
    Ok(Config::default())
}

/// Applies command-line store and run options on top of the file configuration.
fn apply_store_args(config: &mut Config, args: &SplitArgs) {
    let store = &args.store;
    if let Some(path) = &store.store {
        config.store_path = Some(path.clone());
    }
    if let Some(url) = &store.endpoint {
        let endpoint = config
            .endpoint
            .get_or_insert_with(|| EndpointConfig::new(url.clone()));
        endpoint.query_url = url.clone();
    }
    if let Some(endpoint) = config.endpoint.as_mut() {
        if store.update_endpoint.is_some() {
            endpoint.update_url = store.update_endpoint.clone();
        }
        if store.graph_store.is_some() {
            endpoint.graph_store_url = store.graph_store.clone();
        }
        if store.username.is_some() {
            endpoint.username = store.username.clone();
        }
        if store.password.is_some() {
            endpoint.password = store.password.clone();
        }
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(threshold) = args.flush_threshold {
        config.flush_threshold = threshold;
    }
}

/// Merges the split options given on the command line with the saved split job.
fn split_settings(args: &SplitArgs, saved: Option<&SplitSettings>) -> Result<SplitSettings> {
    let class = args
        .class
        .clone()
        .or_else(|| saved.map(|s| s.class_to_split.clone()))
        .ok_or_else(|| anyhow!("Missing --class and no split job in the configuration"))?;
    let property = args
        .property
        .clone()
        .or_else(|| saved.map(|s| s.property_to_split.clone()))
        .ok_or_else(|| anyhow!("Missing --property and no split job in the configuration"))?;
    let delimiter = match (&args.delimiter, saved) {
        (Some(d), _) => Regex::new(d)?,
        (None, Some(s)) => s.delimiter.clone(),
        (None, None) => {
            return Err(anyhow!(
                "Missing --delimiter and no split job in the configuration"
            ))
        }
    };
    Ok(SplitSettings {
        class_to_split: class,
        property_to_split: property,
        delimiter,
        delete_split_triples: args.delete || saved.is_some_and(|s| s.delete_split_triples),
        trim_delimiter: args
            .trim
            .clone()
            .or_else(|| saved.and_then(|s| s.trim_delimiter.clone())),
        uri_expansion: args
            .uri_expansion
            .clone()
            .or_else(|| saved.and_then(|s| s.uri_expansion.clone())),
    })
}

fn execute(cmd: Cli) -> Result<()> {
    // CLI flags for verbosity take precedence. If nothing is set, we default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    let path = config_path(&cmd);
    // init may create the file it is pointed at
    let creating = matches!(cmd.command, Commands::Config(ConfigCommands::Init { .. }));
    let mut config = load_config(&path, cmd.config.is_some() && !creating)?;
    if cmd.offline {
        config.registry.offline = true;
    }

    match cmd.command {
        Commands::Split(args) => {
            apply_store_args(&mut config, &args);
            let settings = split_settings(&args, config.split.as_ref())?;
            let vars = parse_variables(&args.vars)?;
            let split_config: SplitConfig = settings.to_split_config(output_graph(&vars)?)?;
            if cmd.verbose || cmd.debug {
                config.print();
            }

            let store = open_store(&config)?;
            let loader = config.registry.loader();
            let report = SplitPipeline::new(store.as_ref(), split_config)
                .with_registry(&loader)
                .with_flush_policy(Box::new(ThresholdPolicy::new(config.flush_threshold)))
                .run()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print();
            }
        }
        Commands::Registry(registry_cmd) => {
            let loader = config.registry.loader();
            match registry_cmd {
                RegistryCommands::Fetch => {
                    loader.refresh()?;
                    let registry = loader.load()?;
                    println!(
                        "Cached {} prefixes at {}",
                        registry.len(),
                        loader.cache_path.display()
                    );
                }
                RegistryCommands::Lookup { prefixes } => {
                    let registry = loader.load()?;
                    for raw in prefixes {
                        let normalized = normalize_prefix(&raw);
                        match registry.resolve(&normalized) {
                            Some(r) => println!("{raw}\t{}\t{}", r.prefix, r.stem),
                            None => println!("{raw}\t{normalized}\t<unresolved>"),
                        }
                    }
                }
            }
        }
        Commands::Config(ConfigCommands::Init { overwrite, split }) => {
            if path.exists() && !overwrite {
                return Err(anyhow!(
                    "{} already exists. Use --overwrite to replace it.",
                    path.display()
                ));
            }
            apply_store_args(&mut config, &split);
            if split.class.is_some() || split.property.is_some() || split.delimiter.is_some() {
                let settings = split_settings(&split, config.split.as_ref())?;
                // validate IRIs before saving
                settings.to_split_config(None)?;
                config.split = Some(settings);
            }
            config.save_to_file(&path)?;
            println!("Wrote configuration to {}", path.display());
        }
        Commands::Config(ConfigCommands::Show { json }) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                config.print();
            }
        }
        Commands::Version => {
            println!("triplesplit {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

