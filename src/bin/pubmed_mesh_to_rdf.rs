#[macro_use]
extern crate log;

use clap::Parser;
use humantime::format_duration;
use laertes_io::annotation::AnnotationGraphBuilder;
use laertes_io::evidence::EvidenceReader;
use laertes_io::{rdf, terminology};
use std::error;
use std::path;
use std::time::Instant;

/// Convert a PubMed drug-HOI evidence search to Open Data Annotation RDF.
#[derive(Parser, PartialEq, Debug)]
#[command(author, version, about, long_about = None)]
struct Options {
    #[arg(short = 's', long, default_value = "drug-hoi-associations-from-mesh.tsv")]
    search_results: path::PathBuf,

    #[arg(short = 'd', long, default_value = "../terminology-mappings/RxNorm-to-MeSH/mesh-to-rxnorm-standard-vocab-v5.txt")]
    drug_mappings: path::PathBuf,

    #[arg(short = 'c', long, default_value = "../terminology-mappings/StandardVocabToMeSH/mesh-to-standard-vocab-v5.txt")]
    condition_mappings: path::PathBuf,

    #[arg(short = 'p', long, default_value = "../terminology-mappings/MeSHPharmocologicActionToSubstances/pa2015.xml")]
    pharmacologic_actions: path::PathBuf,

    #[arg(short = 'o', long, default_value = "drug-hoi-pubmed-mesh.rdf")]
    output: path::PathBuf,
}

fn main() -> Result<(), Box<dyn error::Error>> {
    let start = Instant::now();
    env_logger::init();

    let options = Options::parse();
    debug!("{:?}", options);

    let pharmacologic_actions = terminology::load_pharmacologic_actions(&options.pharmacologic_actions)?;
    let drugs = terminology::load_drug_crosswalk(&options.drug_mappings)?;
    let conditions = terminology::load_condition_crosswalk(&options.condition_mappings)?;
    debug!("{} pharmacologic action descriptors available", pharmacologic_actions.len());

    let mut builder = AnnotationGraphBuilder::new(&drugs, &conditions);
    builder.build(EvidenceReader::open(&options.search_results)?)?;
    info!("{} annotation items with {} bodies", builder.item_count(), builder.body_count());
    if !builder.diagnostics().is_empty() {
        warn!("skipped {} records without a terminology mapping", builder.diagnostics().len());
    }

    let graph = builder.into_graph();
    rdf::serialize_to_file(&graph, &options.output)?;
    info!("wrote {} triples to {:?}", graph.len(), options.output);

    info!("Duration: {}", format_duration(start.elapsed()).to_string());
    Ok(())
}
