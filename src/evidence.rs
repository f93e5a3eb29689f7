use crate::error::{EtlError, Result};
use itertools::Itertools;
use std::fs;
use std::io::{self, BufRead};
use std::path;

const EVIDENCE_FIELDS: usize = 7;

/// One drug/HOI association mined from the MeSH indexing of a PubMed record.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EvidenceRecord {
    pub pmid: String,
    pub drug_label: String,
    pub drug_mesh_id: String,
    pub hoi_label: String,
    pub hoi_mesh_id: String,
    pub publication_type: String,
    pub publication_type_mesh_id: String,
}

impl EvidenceRecord {
    fn from_fields(fields: Vec<&str>) -> Self {
        EvidenceRecord {
            pmid: fields[0].to_string(),
            drug_label: fields[1].to_string(),
            drug_mesh_id: fields[2].to_string(),
            hoi_label: fields[3].to_string(),
            hoi_mesh_id: fields[4].to_string(),
            publication_type: fields[5].to_string(),
            publication_type_mesh_id: fields[6].to_string(),
        }
    }
}

/// Lazily yields the records of a tab-separated evidence file.
pub struct EvidenceReader<R> {
    lines: io::Lines<R>,
    source: String,
    line_number: usize,
}

impl EvidenceReader<io::BufReader<fs::File>> {
    pub fn open(path: &path::Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        Ok(EvidenceReader::new(io::BufReader::new(file), &path.to_string_lossy()))
    }
}

impl<R: BufRead> EvidenceReader<R> {
    pub fn new(reader: R, source: &str) -> Self {
        EvidenceReader { lines: reader.lines(), source: source.to_string(), line_number: 0 }
    }
}

impl<R: BufRead> Iterator for EvidenceReader<R> {
    type Item = Result<EvidenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            // Surrounding whitespace goes, but tabs stay so empty edge columns still count.
            let fields = line.trim_matches(|c: char| c.is_whitespace() && c != '\t').split('\t').collect_vec();
            if fields.len() != EVIDENCE_FIELDS {
                return Some(Err(EtlError::parse(
                    self.source.as_str(),
                    self.line_number,
                    format!("expected {} tab separated fields, found {}", EVIDENCE_FIELDS, fields.len()),
                )));
            }
            return Some(Ok(EvidenceRecord::from_fields(fields)));
        }
    }
}
