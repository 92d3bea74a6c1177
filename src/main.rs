use std::io::{self, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use foamtrack::cli::Args;
use foamtrack::config::Config;
use foamtrack::error::Result;
use foamtrack::ingest::IngestSession;
use foamtrack::{debug, output};

/// Restore default SIGPIPE so `foamtrack case | head` exits quietly
#[cfg(unix)]
fn setup_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

#[cfg(not(unix))]
fn setup_sigpipe() {}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() {
    setup_sigpipe();
    init_tracing();

    if let Err(e) = run() {
        eprintln!("foamtrack: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_args(&args)?;

    let mut session = IngestSession::new(config.case_dir.clone(), config.layout.clone(), config.ingest);
    session.load()?;

    let mut out = output::open_output(&config)?;
    output::write_report(&mut out, session.mesh()?, session.report()?, &config.frame)?;

    if config.dump_points {
        for entry in session.collection()?.ordered() {
            debug::dump_points(&mut out, &entry.timestep, &entry.snapshot)?;
        }
    }
    out.flush()?;

    Ok(())
}
