use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use topic_discovery::{run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|err| anyhow!("invalid log filter {:?}: {err}", cli.log_level))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = cli.build_config();
    let outcome = run(&config).map_err(|err| anyhow!("{} stage failed: {err}", err.stage()))?;

    println!("{}{}", outcome.nmf, outcome.lda);
    println!(
        "{} documents, LDA {:.1}s, total {:.1} min, report {}",
        outcome.documents,
        outcome.lda_duration.as_secs_f64(),
        outcome.total_duration.as_secs_f64() / 60.0,
        outcome.report.display()
    );
    Ok(())
}
