use crate::error::{EtlError, Result};
use crate::sparql::Binding;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, info};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path;

pub const TSV_HEADER: [&str; 9] = [
    "drug",
    "trialLabel",
    "trialURI",
    "interventionLabel",
    "interventionURI",
    "conditionLabel",
    "conditionURI",
    "completionDate",
    "dataSource",
];

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub trial_label: Option<String>,
    #[serde(rename = "trialURI")]
    pub trial_uri: Option<String>,
    pub intervention_label: Option<String>,
    #[serde(rename = "interventionURI")]
    pub intervention_uri: Option<String>,
    pub condition_label: Option<String>,
    #[serde(rename = "conditionURI")]
    pub condition_uri: Option<String>,
    pub completion_date: Option<String>,
    pub data_source: Option<String>,
}

impl ResultRow {
    /// The intervention label is the queried term, not a binding.
    pub fn from_binding(binding: &Binding, term: &str, data_source: &str) -> Self {
        let value = |name: &str| binding.get(name).map(|b| b.value.clone());
        ResultRow {
            trial_label: value("trialLabel"),
            trial_uri: value("trialURI"),
            intervention_label: Some(term.to_string()),
            intervention_uri: value("interventionURI"),
            condition_label: value("conditionLabel"),
            condition_uri: value("conditionURI"),
            completion_date: value("completionDate"),
            data_source: Some(data_source.to_string()),
        }
    }

    fn columns(&self) -> [&str; 8] {
        [
            self.trial_label.as_deref().unwrap_or_default(),
            self.trial_uri.as_deref().unwrap_or_default(),
            self.intervention_label.as_deref().unwrap_or_default(),
            self.intervention_uri.as_deref().unwrap_or_default(),
            self.condition_label.as_deref().unwrap_or_default(),
            self.condition_uri.as_deref().unwrap_or_default(),
            self.completion_date.as_deref().unwrap_or_default(),
            self.data_source.as_deref().unwrap_or_default(),
        ]
    }
}

pub type ResultsByTerm = BTreeMap<String, Vec<ResultRow>>;

/// The snapshot is gzip compressed JSON.
pub fn write_snapshot(results: &ResultsByTerm, path: &path::Path) -> Result<()> {
    let writer = crate::create_output_file(path)?;
    let mut encoder = GzEncoder::new(writer, Compression::default());
    serde_json::to_writer(&mut encoder, results).map_err(io::Error::from)?;
    encoder.finish()?.flush()?;
    Ok(())
}

pub fn read_snapshot(path: &path::Path) -> Result<ResultsByTerm> {
    let decoder = GzDecoder::new(io::BufReader::new(fs::File::open(path)?));
    let results = serde_json::from_reader(io::BufReader::new(decoder)).map_err(io::Error::from)?;
    Ok(results)
}

pub fn write_tsv(results: &ResultsByTerm, path: &path::Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').quote_style(csv::QuoteStyle::Never).from_writer(crate::create_output_file(path)?);
    writer.write_record(TSV_HEADER).map_err(io::Error::from)?;
    for (term, rows) in results.iter() {
        for row in rows.iter() {
            let mut record = vec![term.as_str()];
            record.extend(row.columns());
            writer.write_record(record).map_err(io::Error::from)?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary<W: Write>(results: &ResultsByTerm, snapshot: Option<&path::Path>, log: &mut W) -> Result<()> {
    for (term, rows) in results.iter() {
        writeln!(log, "{} trials found for drug {}", rows.len(), term)?;
    }
    if let Some(snapshot) = snapshot {
        writeln!(log, "mapping data saved to {}", snapshot.display())?;
    }
    log.flush()?;
    Ok(())
}

/// Writes the snapshot, the TSV table and the log summary. Every output is
/// attempted; the failures are logged and returned.
pub fn write_outputs<W: Write>(results: &ResultsByTerm, snapshot: &path::Path, tsv: &path::Path, log: &mut W) -> Vec<EtlError> {
    let mut failures = vec![];

    let snapshot_written = match write_snapshot(results, snapshot) {
        Ok(_) => {
            info!("wrote snapshot to {:?}", snapshot);
            true
        }
        Err(e) => {
            error!("could not write snapshot {:?}: {}", snapshot, e);
            failures.push(e);
            false
        }
    };

    match write_tsv(results, tsv) {
        Ok(_) => info!("wrote {:?}", tsv),
        Err(e) => {
            error!("could not write {:?}: {}", tsv, e);
            failures.push(e);
        }
    }

    if let Err(e) = write_summary(results, snapshot_written.then_some(snapshot), log) {
        error!("could not write summary to log: {}", e);
        failures.push(e);
    }

    failures
}

#[cfg(test)]
mod test {
    use crate::results::*;
    use crate::sparql::BindingValue;
    use std::collections::HashMap;

    fn results() -> ResultsByTerm {
        let mut binding: Binding = HashMap::new();
        binding.insert("trialLabel".to_string(), BindingValue { kind: "literal".into(), value: "Omalizumab in asthma".into(), ..Default::default() });
        binding.insert("trialURI".to_string(), BindingValue { kind: "uri".into(), value: "http://bio2rdf.org/clinicaltrials:NCT00001".into(), ..Default::default() });
        binding.insert("conditionLabel".to_string(), BindingValue { kind: "literal".into(), value: "Asthma".into(), ..Default::default() });

        let mut results = ResultsByTerm::new();
        results.insert(
            "Omalizumab".to_string(),
            vec![ResultRow::from_binding(&binding, "Omalizumab", "http://example.org/sparql"), ResultRow::from_binding(&HashMap::new(), "Omalizumab", "http://example.org/sparql")],
        );
        results
    }

    #[test]
    fn row_from_binding() {
        let results = results();
        let rows = &results["Omalizumab"];
        assert_eq!(rows[0].trial_label.as_deref(), Some("Omalizumab in asthma"));
        assert_eq!(rows[0].intervention_label.as_deref(), Some("Omalizumab"));
        assert_eq!(rows[0].data_source.as_deref(), Some("http://example.org/sparql"));
        assert_eq!(rows[0].completion_date, None);
        assert_eq!(rows[1].trial_uri, None);
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("results.pickle");
        write_snapshot(&results(), &snapshot).unwrap();
        assert_eq!(read_snapshot(&snapshot).unwrap(), results());
    }

    #[test]
    fn tsv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("results.tsv");
        write_tsv(&results(), &tsv).unwrap();
        let content = std::fs::read_to_string(&tsv).unwrap();
        let lines = content.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "drug\ttrialLabel\ttrialURI\tinterventionLabel\tinterventionURI\tconditionLabel\tconditionURI\tcompletionDate\tdataSource");
        assert_eq!(lines[1], "Omalizumab\tOmalizumab in asthma\thttp://bio2rdf.org/clinicaltrials:NCT00001\tOmalizumab\t\tAsthma\t\t\thttp://example.org/sparql");
        assert_eq!(lines[2].split('\t').count(), 9);
    }

    #[test]
    fn failed_output_does_not_block_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let snapshot = blocker.join("results.pickle");
        let tsv = dir.path().join("results.tsv");

        let mut log = vec![];
        let failures = write_outputs(&results(), &snapshot, &tsv, &mut log);
        assert_eq!(failures.len(), 1);
        assert!(tsv.exists());

        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("2 trials found for drug Omalizumab"));
        assert!(!log.contains("mapping data saved to"));
    }
}
