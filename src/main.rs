use anyhow::Context;
use clap::{Parser, Subcommand};
use csvql::executor::{Executor, ExecutorConfig};
use csvql::store::Store;
use csvql::{cli, generate, server};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// SQL over a directory of CSV tables
#[derive(Parser, Debug)]
#[command(name = "csvql")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding `<table>.csv` files
    #[arg(long, global = true, default_value = ".")]
    data: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Register index bits for approximate counts
    #[arg(long, global = true, default_value_t = 12)]
    hll_bits: u8,

    /// Hash width in bits for approximate counts
    #[arg(long, global = true, default_value_t = 128)]
    hll_digest: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve queries over TCP
    Serve {
        #[arg(long, default_value = "127.0.0.1:5432")]
        listen: String,
    },

    /// Interactive prompt on stdin
    Repl,

    /// Write a synthetic student table
    Generate {
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value_t = 10_000_000)]
        rows: u64,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).context("invalid --log-level")?,
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    let config = ExecutorConfig {
        bit_sample_size: args.hll_bits,
        digest_size: args.hll_digest,
    };
    // Reject bad estimator settings before any query needs them.
    csvql::estimator::Estimator::new(config.bit_sample_size, config.digest_size)?;

    match args.command {
        Command::Serve { listen } => {
            let store = Store::open(&args.data)?;
            let executor = Arc::new(Executor::new(store, config));
            let listener = TcpListener::bind(&listen)
                .await
                .with_context(|| format!("binding {listen}"))?;
            let local_addr = listener.local_addr()?;
            info!(data = %args.data.display(), "serving tables");
            eprintln!("csvql listening on {local_addr}");
            server::serve(listener, executor).await?;
        }
        Command::Repl => {
            let store = Store::open(&args.data)?;
            let executor = Executor::new(store, config);
            tokio::task::spawn_blocking(move || {
                let stdin = std::io::stdin();
                cli::run(&executor, stdin.lock(), std::io::stdout())
            })
            .await??;
        }
        Command::Generate { out, rows, seed } => {
            let file = File::create(&out).with_context(|| format!("creating {}", out.display()))?;
            generate::write_students(BufWriter::new(file), rows, seed)?;
            info!(path = %out.display(), rows, "generated table");
        }
    }
    Ok(())
}
