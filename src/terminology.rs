use crate::error::{EtlError, Result};
use itertools::Itertools;
use log::{debug, info};
use serde_derive::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, BufRead};
use std::path;

const DRUG_CROSSWALK_FIELDS: usize = 6;
const CONDITION_CROSSWALK_FIELDS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Substance {
    pub code: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PharmacologicActionEntry {
    pub descriptor_code: String,
    pub descriptor_name: String,
    pub substances: Vec<Substance>,
}

/// MeSH pharmacologic actions keyed by descriptor code.
#[derive(Clone, Debug, Default)]
pub struct PharmacologicActions {
    by_descriptor: BTreeMap<String, PharmacologicActionEntry>,
    by_substance: HashMap<String, Vec<String>>,
}

impl PharmacologicActions {
    pub fn insert(&mut self, entry: PharmacologicActionEntry) {
        for substance in entry.substances.iter() {
            let descriptors = self.by_substance.entry(substance.code.clone()).or_default();
            if !descriptors.contains(&entry.descriptor_code) {
                descriptors.push(entry.descriptor_code.clone());
            }
        }
        self.by_descriptor.insert(entry.descriptor_code.clone(), entry);
    }

    pub fn get(&self, descriptor_code: &str) -> Option<&PharmacologicActionEntry> {
        self.by_descriptor.get(descriptor_code)
    }

    /// Pharmacologic-action descriptors that list the substance.
    pub fn descriptors_for_substance(&self, substance_code: &str) -> Vec<&PharmacologicActionEntry> {
        match self.by_substance.get(substance_code) {
            Some(codes) => codes.iter().filter_map(|c| self.by_descriptor.get(c)).collect_vec(),
            None => vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.by_descriptor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_descriptor.is_empty()
    }

    pub fn substance_count(&self) -> usize {
        self.by_substance.len()
    }
}

#[derive(Debug, Deserialize)]
struct PharmacologicalActionSet {
    #[serde(rename = "PharmacologicalAction", default)]
    actions: Vec<PharmacologicalAction>,
}

#[derive(Debug, Deserialize)]
struct PharmacologicalAction {
    #[serde(rename = "DescriptorReferredTo")]
    descriptor: ReferredTo,
    #[serde(rename = "PharmacologicalActionSubstanceList", default)]
    substance_list: Option<SubstanceList>,
}

#[derive(Debug, Deserialize)]
struct ReferredTo {
    #[serde(rename = "DescriptorUI")]
    ui: String,
    #[serde(rename = "DescriptorName")]
    name: NameString,
}

#[derive(Debug, Deserialize)]
struct SubstanceList {
    #[serde(rename = "Substance", default)]
    substances: Vec<SubstanceElement>,
}

#[derive(Debug, Deserialize)]
struct SubstanceElement {
    #[serde(rename = "RecordUI")]
    ui: String,
    #[serde(rename = "RecordName")]
    name: NameString,
}

#[derive(Debug, Deserialize)]
struct NameString {
    #[serde(rename = "String")]
    value: String,
}

pub fn load_pharmacologic_actions(path: &path::Path) -> Result<PharmacologicActions> {
    let reader = io::BufReader::new(fs::File::open(path)?);
    let actions = pharmacologic_actions_from_reader(reader, &path.to_string_lossy())?;
    info!("loaded {} pharmacologic actions covering {} substances from {:?}", actions.len(), actions.substance_count(), path);
    Ok(actions)
}

/// The deserializer pulls events from the reader as it goes, so there is no
/// document size or nesting limit to raise for the full MeSH release.
pub fn pharmacologic_actions_from_reader<R: BufRead>(reader: R, source: &str) -> Result<PharmacologicActions> {
    let set: PharmacologicalActionSet = quick_xml::de::from_reader(reader).map_err(|e| EtlError::Xml { path: source.to_string(), source: e })?;

    let mut actions = PharmacologicActions::default();
    for action in set.actions.into_iter() {
        let substances = action
            .substance_list
            .map(|l| l.substances)
            .unwrap_or_default()
            .into_iter()
            .map(|s| Substance { code: s.ui.trim().to_string(), name: s.name.value.trim().to_string() })
            .collect_vec();
        actions.insert(PharmacologicActionEntry {
            descriptor_code: action.descriptor.ui.trim().to_string(),
            descriptor_name: action.descriptor.name.value.trim().to_string(),
            substances,
        });
    }
    Ok(actions)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrugCrosswalkEntry {
    pub rxnorm_code: String,
    pub synonyms: Vec<String>,
    pub standard_vocab_id: String,
}

/// MeSH drug code -> RxNorm and standard vocabulary.
#[derive(Clone, Debug, Default)]
pub struct DrugCrosswalk {
    entries: HashMap<String, DrugCrosswalkEntry>,
}

impl DrugCrosswalk {
    /// A repeated MeSH code only contributes another synonym.
    pub fn insert(&mut self, mesh: &str, preferred_term: &str, rxnorm_code: &str, standard_vocab_id: &str) {
        match self.entries.get_mut(mesh) {
            Some(entry) => entry.synonyms.push(preferred_term.to_string()),
            None => {
                self.entries.insert(
                    mesh.to_string(),
                    DrugCrosswalkEntry {
                        rxnorm_code: rxnorm_code.to_string(),
                        synonyms: vec![preferred_term.to_string()],
                        standard_vocab_id: standard_vocab_id.to_string(),
                    },
                );
            }
        }
    }

    pub fn get(&self, mesh: &str) -> Option<&DrugCrosswalkEntry> {
        self.entries.get(mesh)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// MeSH condition code -> standard vocabulary id, last value wins.
#[derive(Clone, Debug, Default)]
pub struct ConditionCrosswalk {
    entries: HashMap<String, String>,
}

impl ConditionCrosswalk {
    pub fn insert(&mut self, mesh: &str, standard_vocab_id: &str) {
        self.entries.insert(mesh.to_string(), standard_vocab_id.to_string());
    }

    pub fn get(&self, mesh: &str) -> Option<&str> {
        self.entries.get(mesh).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Skips the header, stops at the first blank line and hands each row's
/// trimmed fields to `f`.
fn for_each_crosswalk_row<R, F>(reader: R, source: &str, expected: usize, mut f: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&[&str]),
{
    for (idx, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            debug!("{}: blank line {}, done", source, idx + 1);
            break;
        }
        let fields = line.split('|').map(|f| f.trim()).collect_vec();
        if fields.len() != expected {
            return Err(EtlError::parse(source, idx + 1, format!("expected {} '|' separated fields, found {}", expected, fields.len())));
        }
        f(&fields);
    }
    Ok(())
}

pub fn load_drug_crosswalk(path: &path::Path) -> Result<DrugCrosswalk> {
    let reader = io::BufReader::new(fs::File::open(path)?);
    let drugs = drug_crosswalk_from_reader(reader, &path.to_string_lossy())?;
    info!("loaded {} MeSH drug mappings from {:?}", drugs.len(), path);
    Ok(drugs)
}

pub fn drug_crosswalk_from_reader<R: BufRead>(reader: R, source: &str) -> Result<DrugCrosswalk> {
    let mut drugs = DrugCrosswalk::default();
    // mesh | preferred term | rxcui | concept name | standard vocab id | concept class
    for_each_crosswalk_row(reader, source, DRUG_CROSSWALK_FIELDS, |fields| {
        drugs.insert(fields[0], fields[1], fields[2], fields[4]);
    })?;
    Ok(drugs)
}

pub fn load_condition_crosswalk(path: &path::Path) -> Result<ConditionCrosswalk> {
    let reader = io::BufReader::new(fs::File::open(path)?);
    let conditions = condition_crosswalk_from_reader(reader, &path.to_string_lossy())?;
    info!("loaded {} MeSH condition mappings from {:?}", conditions.len(), path);
    Ok(conditions)
}

pub fn condition_crosswalk_from_reader<R: BufRead>(reader: R, source: &str) -> Result<ConditionCrosswalk> {
    let mut conditions = ConditionCrosswalk::default();
    // standard vocab id | label | mesh
    for_each_crosswalk_row(reader, source, CONDITION_CROSSWALK_FIELDS, |fields| {
        conditions.insert(fields[2], fields[0]);
    })?;
    Ok(conditions)
}
