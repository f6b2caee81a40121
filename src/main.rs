//! swpolicy CLI
//!
//! Entry point for the `swpolicy` command-line tool.

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process;
use swpolicy::bootstrap::registration_script;
use swpolicy::compiler::{cache_name_conflicts, PolicyCompiler};
use swpolicy::config::{ConfigError, EffectiveConfig, DEFAULT_CONFIG_FILE};
use swpolicy::dev::{dev_worker_name, write_dev_worker};
use swpolicy::explain::explain;
use swpolicy::pipeline::{run_build, BuildError, BuildOutcome};
use swpolicy::routes::{load_routes, Route};
use swpolicy::rules::Destination;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swpolicy")]
#[command(about = "Compile caching policies into an offline service worker", version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to config file (default: swpolicy.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override cacheNamePrefix
    #[arg(long)]
    cache_name_prefix: Option<String>,

    /// Override the rule preset
    #[arg(long, value_parser = ["auto", "recommended", "none"])]
    preset: Option<String>,

    /// Override swName
    #[arg(long)]
    sw_name: Option<String>,

    /// Enable Workbox debug logging in the worker
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the production worker into a build output directory
    Build {
        /// Build output directory
        #[arg(long)]
        out_dir: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// JSON route list (default: enumerate HTML files in --out-dir)
        #[arg(long)]
        routes: Option<PathBuf>,

        /// Script appended to the generated worker
        #[arg(long)]
        custom_worker: Option<PathBuf>,

        /// Exit non-zero when generation fails
        #[arg(long)]
        strict: bool,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the no-op development worker
    Dev {
        /// Directory served as-is by the dev server
        #[arg(long)]
        public_dir: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the compiled program to stdout
    Compile {
        #[command(flatten)]
        config: ConfigArgs,

        /// JSON route list
        #[arg(long)]
        routes: Option<PathBuf>,
    },

    /// Explain which rule handles a request
    Explain {
        /// Request URL, absolute or site-relative
        #[arg(long)]
        url: String,

        #[arg(long, default_value = "GET")]
        method: String,

        /// Request destination (image, script, style, document, ...)
        #[arg(long, default_value = "")]
        destination: String,

        /// JSON route list, for precache decisions
        #[arg(long)]
        routes: Option<PathBuf>,

        /// Output in human-readable format instead of JSON
        #[arg(long)]
        human: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the page registration script
    Snippet {
        /// Site base path
        #[arg(long, default_value = "/")]
        base: String,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate the configuration and rule set
    Verify {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl ConfigArgs {
    fn overrides(&self, custom_worker: Option<&Path>) -> Option<Value> {
        let mut map = Map::new();
        if let Some(ref prefix) = self.cache_name_prefix {
            map.insert("cacheNamePrefix".to_string(), Value::from(prefix.clone()));
        }
        if let Some(ref preset) = self.preset {
            map.insert("preset".to_string(), Value::from(preset.clone()));
        }
        if let Some(ref name) = self.sw_name {
            map.insert("swName".to_string(), Value::from(name.clone()));
        }
        if self.debug {
            map.insert("debug".to_string(), Value::Bool(true));
        }
        if let Some(path) = custom_worker {
            map.insert(
                "customServiceWorker".to_string(),
                Value::from(path.to_string_lossy().to_string()),
            );
        }

        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }

    fn load(&self, custom_worker: Option<&Path>) -> Result<EffectiveConfig, ConfigError> {
        let path = match self.config {
            Some(ref path) if !path.exists() => {
                return Err(ConfigError::IoError(format!("{}: file not found", path.display())));
            }
            Some(ref path) => path.clone(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        EffectiveConfig::build(Some(&path), self.overrides(custom_worker))
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("SWPOLICY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Build {
            out_dir,
            config,
            routes,
            custom_worker,
            strict,
            json,
        } => run_build_command(&out_dir, &config, routes, custom_worker, strict, json),
        Commands::Dev { public_dir, config } => run_dev(&public_dir, &config),
        Commands::Compile { config, routes } => run_compile(&config, routes),
        Commands::Explain {
            url,
            method,
            destination,
            routes,
            human,
            config,
        } => run_explain(&url, &method, &destination, routes, human, &config),
        Commands::Snippet { base, config } => run_snippet(&base, &config),
        Commands::Verify { config, json } => run_verify(&config, json),
    }
}

fn load_or_exit(config: &ConfigArgs) -> EffectiveConfig {
    match config.load(None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn routes_or_exit(path: Option<PathBuf>) -> Vec<Route> {
    match path {
        Some(path) => match load_routes(&path) {
            Ok(routes) => routes,
            Err(e) => {
                eprintln!("Error loading routes: {}", e);
                process::exit(1);
            }
        },
        None => Vec::new(),
    }
}

fn run_build_command(
    out_dir: &Path,
    config: &ConfigArgs,
    routes_path: Option<PathBuf>,
    custom_worker: Option<PathBuf>,
    strict: bool,
    json: bool,
) {
    let prepared = config
        .load(custom_worker.as_deref())
        .map_err(BuildError::from)
        .and_then(|effective| {
            let routes = routes_path.map(|p| load_routes(&p)).transpose()?;
            Ok((effective.into_options(), routes))
        });

    let outcome = match prepared {
        Ok((options, routes)) => run_build(out_dir, &options, routes.as_deref()),
        Err(error) => {
            tracing::error!(error = %error, "error generating service worker");
            BuildOutcome::Skipped { error }
        }
    };

    match outcome {
        BuildOutcome::Generated(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(s) => println!("{}", s),
                    Err(e) => {
                        eprintln!("Error serializing report: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                println!("Generated {}", report.output.display());
                println!("  Rules: {}", report.rules);
                println!("  Precached routes/files: {}", report.precached);
                println!("  Hashed assets: {}", report.hashed_assets);
                println!("  Fingerprint: {}", report.fingerprint);
                for warning in &report.warnings {
                    println!("  Warning: {}", warning);
                }
            }
        }
        BuildOutcome::Skipped { .. } => {
            if strict {
                process::exit(1);
            }
        }
    }
}

fn run_dev(public_dir: &Path, config: &ConfigArgs) {
    let sw_name = dev_worker_name(config.load(None), config.sw_name.as_deref());
    match write_dev_worker(public_dir, &sw_name) {
        Ok(path) => println!("Created noop service worker at {}", path.display()),
        Err(e) => {
            eprintln!("Error writing development worker: {}", e);
            process::exit(1);
        }
    }
}

fn run_compile(config: &ConfigArgs, routes_path: Option<PathBuf>) {
    let effective = load_or_exit(config);
    let routes = routes_or_exit(routes_path);

    match PolicyCompiler::new(effective.options()).compile(&routes) {
        Ok(compilation) => print!("{}", compilation.program),
        Err(e) => {
            eprintln!("Compile error: {}", e);
            process::exit(1);
        }
    }
}

fn run_explain(
    url: &str,
    method: &str,
    destination: &str,
    routes_path: Option<PathBuf>,
    human: bool,
    config: &ConfigArgs,
) {
    let Some(destination) = Destination::parse(destination) else {
        eprintln!("Unknown destination: {}", destination);
        process::exit(1);
    };
    let effective = load_or_exit(config);
    let routes = routes_or_exit(routes_path);

    let rule_set = match PolicyCompiler::new(effective.options()).plan(&routes) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Compile error: {}", e);
            process::exit(1);
        }
    };

    let explanation = match explain(&rule_set, url, method, destination) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if human {
        println!("{}", explanation.to_human());
    } else {
        match explanation.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    }
}

fn run_snippet(base: &str, config: &ConfigArgs) {
    let effective = load_or_exit(config);
    print!("{}", registration_script(base, &effective.options().sw_name));
}

fn run_verify(config: &ConfigArgs, json: bool) {
    let effective = load_or_exit(config);
    let rule_set = match PolicyCompiler::new(effective.options()).plan(&[]) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    let conflicts = cache_name_conflicts(&rule_set);

    if json {
        match effective.to_json() {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error serializing config: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Configuration valid");
    println!();
    for source in &effective.sources {
        match (&source.path, &source.digest) {
            (Some(path), Some(digest)) => {
                println!("  Source: {:?} {} ({})", source.origin, path, &digest[..12])
            }
            _ => println!("  Source: {:?}", source.origin),
        }
    }
    println!("  Rules: {}", rule_set.rules.len());
    for (index, rule) in rule_set.rules.iter().enumerate() {
        println!(
            "    {}. [{}] {} -> {}",
            index,
            rule.origin.as_str(),
            rule.matcher.describe(),
            rule.strategy
        );
    }
    let caches = rule_set.declared_cache_names();
    if !caches.is_empty() {
        println!("  Caches: {}", caches.join(", "));
    }
    for conflict in &conflicts {
        println!("  Warning: {}", conflict);
    }
}
