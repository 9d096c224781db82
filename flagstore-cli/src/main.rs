mod load;

use std::process;

use clap::{Args as ClapArgs, Parser, Subcommand};
use flagstore::{FlagStore, FlagValue, FlagValueSource, StoreConfig, TokioDispatcher};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ffs")]
#[command(version)]
#[command(about = "Load feature flag sets into a flag store and resolve values", long_about = None)]
struct Args {
    /// Path to config file
    #[arg(short = 'c', long = "config", default_value = "flagstore.toml", global = true)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(ClapArgs, Debug)]
struct Input {
    /// JSON object of flag key to value (or {"value", "version"} record)
    #[arg(short = 'f', long = "flags")]
    flags: String,

    /// JSON-lines file of {"key", "value", "version"} updates applied after loading
    #[arg(short = 'u', long = "updates")]
    updates: Option<String>,

    /// Provenance of the loaded flag set
    #[arg(short = 's', long = "source", default_value = "cache")]
    source: FlagValueSource,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a single flag
    Get {
        #[command(flatten)]
        input: Input,

        /// Flag key to resolve
        key: String,

        /// JSON fallback; its type decides which stored types are accepted
        #[arg(long = "fallback")]
        fallback: Option<String>,
    },
    /// Print every flag in the store as JSON
    Dump {
        #[command(flatten)]
        input: Input,
    },
}

fn exit_with(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

async fn populate(input: &Input, config: &StoreConfig) -> FlagStore {
    let store = FlagStore::builder()
        .config(config)
        .dispatcher(TokioDispatcher::current())
        .build()
        .unwrap_or_else(|e| exit_with(e));

    let count = load::load_flags(&store, &input.flags, input.source)
        .await
        .unwrap_or_else(|e| exit_with(e));
    tracing::info!(count, path = %input.flags, "loaded flags");

    if let Some(path) = &input.updates {
        let submitted = load::apply_updates(&store, path, FlagValueSource::Server)
            .await
            .unwrap_or_else(|e| exit_with(e));
        tracing::info!(submitted, path = %path, "submitted updates");
    }

    store.flush().await;
    store
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = StoreConfig::load(&args.config).unwrap_or_else(|e| exit_with(e));
    config.apply_env_overrides();

    match args.cmd {
        Command::Get {
            input,
            key,
            fallback,
        } => {
            let fallback = fallback.map(|raw| {
                let parsed: serde_json::Value = serde_json::from_str(&raw)
                    .unwrap_or_else(|e| exit_with(format!("Invalid --fallback: {}", e)));
                FlagValue::from_json(&parsed)
                    .unwrap_or_else(|| exit_with("Invalid --fallback: null is not a flag value"))
            });
            let store = populate(&input, &config).await;
            match load::resolve(&store, &key, fallback) {
                (Some(value), source) => println!("{} ({})", value.to_json(), source),
                (None, source) => println!("<none> ({})", source),
            }
        }
        Command::Dump { input } => {
            let store = populate(&input, &config).await;
            match load::dump(&store).and_then(|out| serde_json::to_string_pretty(&out)) {
                Ok(out) => println!("{}", out),
                Err(e) => exit_with(e),
            }
        }
    }
}
