use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{CommandKind, ReleaseCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ReleaseCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let code = match &cli.command {
        CommandKind::Plan(args) => cli::plan(&cli, args)?,
        CommandKind::CheckRef(args) => cli::check_ref(&cli, args)?,
        CommandKind::Run(args) => {
            let pipeline = cli::build_pipeline(args)?;
            let token = pipeline.cancel_token().clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, cancelling release");
                    token.cancel("interrupted");
                }
            });
            let code = cli::run(&cli, args, &pipeline).await;
            interrupt.abort();
            code?
        }
    };

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("releaseflow={level},releaseflow_cli={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
