#[macro_use]
extern crate log;

use clap::Parser;
use humantime::format_duration;
use laertes_io::harvest::{HarvestConfig, Harvester};
use laertes_io::results;
use laertes_io::sparql::SparqlClient;
use laertes_io::EtlError;
use std::error;
use std::io::{self, Write};
use std::path;
use std::time::Instant;

/// Query a SPARQL endpoint for drug/condition associations.
#[derive(Parser, PartialEq, Debug)]
#[command(author, version, about, long_about = None)]
struct Options {
    /// YAML harvester configuration; built-in defaults when absent.
    #[arg(short, long)]
    config: Option<path::PathBuf>,

    #[arg(short, long)]
    endpoint: Option<String>,

    /// Semicolon separated list of drugs to search for.
    #[arg(short, long)]
    terms_file: Option<path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let start = Instant::now();
    env_logger::init();

    let options = Options::parse();
    debug!("{:?}", options);

    let mut config = match &options.config {
        Some(config_path) => HarvestConfig::load(config_path)?,
        None => HarvestConfig::default(),
    };
    if let Some(endpoint) = &options.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(terms_file) = &options.terms_file {
        config.terms_file = Some(terms_file.clone());
    }
    debug!("{:?}", config);

    let terms = config.resolve_terms()?;
    let client = SparqlClient::new(&config.endpoint)?;
    let mut failures: Vec<EtlError> = vec![];
    let log_file: Box<dyn Write> = match laertes_io::create_output_file(&config.log_file) {
        Ok(log_file) => Box::new(log_file),
        Err(e) => {
            error!("could not open {:?}, progress lines are dropped: {}", config.log_file, e);
            failures.push(EtlError::from(e));
            Box::new(io::sink())
        }
    };

    let mut harvester = Harvester::new(&client, &config, log_file);
    let found = harvester.harvest(&terms).await?;
    info!("{} of {} terms returned results after {} requests", found.len(), terms.len(), harvester.requests());
    if harvester.log_failures() > 0 {
        warn!("{} progress lines could not be written to {:?}", harvester.log_failures(), config.log_file);
    }

    let mut log_file = harvester.into_log();
    failures.extend(results::write_outputs(&found, &config.snapshot_file, &config.out_file, &mut log_file));

    info!("Duration: {}", format_duration(start.elapsed()).to_string());
    if !failures.is_empty() {
        failures.iter().for_each(|e| error!("{}", e));
        return Err(format!("{} of 3 outputs could not be written", failures.len()).into());
    }
    Ok(())
}
