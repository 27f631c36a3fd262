use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser};
use jsfathom::cli::{Cli, Mode};
use jsfathom::output::{build_output_mode, finalize_output};
use jsfathom::patterns::load_user_patterns;
use jsfathom::scan::{collect_inputs, read_raw_stdin, run_inputs, run_raw, Scanner};
use log::{error, info, warn};
use rayon::ThreadPoolBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();

    // If run with no arguments, print help and exit.
    if std::env::args().len() <= 1 {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    let cli = Cli::parse();

    env_logger::Builder::from_default_env().format_timestamp(None).init();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    if cli.threads > 0 {
        match ThreadPoolBuilder::new().num_threads(cli.threads).build_global() {
            Ok(()) => info!("Set global thread pool to {} threads", cli.threads),
            Err(e) => warn!("Could not set global thread pool: {}. Continuing with default.", e),
        }
    }

    // Bad pattern files abort before anything is analyzed.
    let patterns = match (&cli.patterns, cli.mode) {
        (Some(path), Mode::Secrets) => load_user_patterns(path)
            .map_err(|e| format!("could not load patterns from {}: {}", path, e))?,
        _ => Vec::new(),
    };

    let scanner = match Scanner::from_cli(&cli, patterns) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let agent = ureq::AgentBuilder::new()
        .timeout_read(Duration::from_secs(15))
        .timeout_connect(Duration::from_secs(5))
        .build();

    let output_mode = build_output_mode(&cli);

    if cli.raw_input {
        let loaded = read_raw_stdin()?;
        run_raw(&scanner, &output_mode, &loaded);
    } else {
        let inputs = collect_inputs(&cli)?;
        run_inputs(&scanner, &output_mode, &agent, &cli, &inputs);
    }

    finalize_output(&output_mode, &cli);
    info!("Completed in {:.2?}", start_time.elapsed());

    Ok(())
}
