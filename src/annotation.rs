use crate::error::{EtlError, Result};
use crate::evidence::EvidenceRecord;
use crate::rdf::{Term, TripleGraph, AO_OLD, DCTERMS, DCTYPES, MESH, OA, OHDSI, POC, PUBMED, RDF, RDFS, RXNORM, SIO, XSD};
use crate::terminology::{ConditionCrosswalk, DrugCrosswalk};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use log::{debug, warn};
use std::collections::HashMap;
use uuid::Uuid;

pub const ANNOTATOR: &str = "http://www.pitt.edu/~rdb20/triads-lab.xml#TRIADS";

lazy_static! {
    /// Publication types that tag the annotation target with a study type.
    pub static ref STUDY_TYPES: HashMap<&'static str, StudyType> = HashMap::from([
        ("Clinical Trial", StudyType::ClinicalTrial),
        ("Case Reports", StudyType::CaseReports),
        ("Meta-Analysis", StudyType::Other),
    ]);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StudyType {
    ClinicalTrial,
    CaseReports,
    Other,
}

impl StudyType {
    /// Exact match only; unknown publication types stay untagged.
    pub fn classify(publication_type: &str) -> Option<StudyType> {
        STUDY_TYPES.get(publication_type).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            StudyType::ClinicalTrial => "clinical trial (publication type)",
            StudyType::CaseReports => "case reports (publication type)",
            StudyType::Other => "other (publication type)",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationItem {
    pub iri: String,
    pub target: String,
    pub study_type: Option<StudyType>,
}

/// A record dropped because a crosswalk had no entry for one of its codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupMiss {
    pub pmid: String,
    pub vocabulary: &'static str,
    pub code: String,
}

impl From<LookupMiss> for EtlError {
    fn from(miss: LookupMiss) -> Self {
        EtlError::LookupMiss { vocabulary: miss.vocabulary, code: miss.code }
    }
}

/// The crosswalk codes a record resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Resolved {
    rxnorm_code: String,
    drug_standard_vocab_id: String,
    hoi_standard_vocab_id: String,
}

/// Joins evidence records against the crosswalks and assembles the
/// Open Annotation graph. One item per PubMed id, one body per record.
pub struct AnnotationGraphBuilder<'a> {
    drugs: &'a DrugCrosswalk,
    conditions: &'a ConditionCrosswalk,
    graph: TripleGraph,
    annotation_set: String,
    annotated_at: NaiveDate,
    item_counter: usize,
    body_counter: usize,
    items: HashMap<String, AnnotationItem>,
    diagnostics: Vec<LookupMiss>,
}

impl<'a> AnnotationGraphBuilder<'a> {
    pub fn new(drugs: &'a DrugCrosswalk, conditions: &'a ConditionCrosswalk) -> Self {
        Self::with_date(drugs, conditions, chrono::Local::now().date_naive())
    }

    pub fn with_date(drugs: &'a DrugCrosswalk, conditions: &'a ConditionCrosswalk, annotated_at: NaiveDate) -> Self {
        let mut builder = AnnotationGraphBuilder {
            drugs,
            conditions,
            graph: TripleGraph::new(),
            annotation_set: POC.term("ohdsi-pubmed-mesh-annotation-set-1"),
            annotated_at,
            item_counter: 0,
            body_counter: 0,
            items: HashMap::new(),
            diagnostics: vec![],
        };
        builder.add_vocabulary();

        let set = builder.annotation_set.clone();
        let annotated_at = builder.annotated_at_literal();
        builder.graph.add(set.as_str(), RDF.term("type"), Term::iri(OA.term("DataAnnotation")));
        builder.graph.add(set.as_str(), OA.term("annotatedAt"), annotated_at);
        builder.graph.add(set.as_str(), OA.term("annotatedBy"), Term::iri(ANNOTATOR));
        builder
    }

    fn add_vocabulary(&mut self) {
        let described = [
            (DCTYPES.term("Collection"), "Collection", "A collection is described as a group; its parts may also be separately described. See http://dublincore.org/documents/dcmi-type-vocabulary/#H7"),
            (OA.term("Annotation"), "Annotation", "Typically an Annotation has a single Body (oa:hasBody), which is the comment or other descriptive resource, and a single Target (oa:hasTarget) that the Body is somehow 'about'. The Body provides the information which is annotating the Target. See  http://www.w3.org/ns/oa#Annotation"),
            (OA.term("TextQuoteSelector"), "TextQuoteSelector", "A Selector that describes a textual segment by means of quoting it, plus passages before or after it. See http://www.w3.org/ns/oa#TextQuoteSelector"),
            (OA.term("hasSelector"), "hasSelector", "The relationship between a oa:SpecificResource and a oa:Selector. See http://www.w3.org/ns/oa#hasSelector"),
            (OA.term("SpecificResource"), "SpecificResource", "A resource identifies part of another Source resource, a particular representation of a resource, a resource with styling hints for renders, or any combination of these. See http://www.w3.org/ns/oa#SpecificResource"),
            (SIO.term("SIO_000628"), "refers to", "refers to is a relation between one entity and the entity that it makes reference to."),
            (SIO.term("SIO_000563"), "describes", "describes is a relation between one entity and another entity that it provides a description (detailed account of)"),
            (SIO.term("SIO_000338"), "specifies", "A relation between an information content entity and a product that it (directly/indirectly) specifies"),
            (POC.term("MeshDrug"), "MeSH Drug code", "Drug code in the MeSH vocabulary."),
            (POC.term("RxnormDrug"), "Rxnorm Drug code", "Drug code in the Rxnorm vocabulary."),
            (POC.term("MeshHoi"), "MeSH HOI code", "HOI code in the MeSH vocabulary."),
            (POC.term("MeddraHoi"), "Meddra HOI code", "HOI code in the Meddra vocabulary."),
        ];
        for (subject, label, description) in described.into_iter() {
            self.graph.add(subject.as_str(), RDFS.term("label"), Term::literal(label));
            self.graph.add(subject.as_str(), DCTERMS.term("description"), Term::literal(description));
        }

        self.graph.add(OA.term("annotatedBy"), RDFS.term("label"), Term::literal("annotatedBy"));
        self.graph.add(OA.term("annotatedBy"), RDF.term("type"), Term::iri(OA.term("objectproperties")));
        self.graph.add(OA.term("annotatedAt"), RDFS.term("label"), Term::literal("annotatedAt"));
        self.graph.add(OA.term("annotatedAt"), RDF.term("type"), Term::iri(OA.term("dataproperties")));
    }

    fn annotated_at_literal(&self) -> Term {
        Term::typed_literal(self.annotated_at.format("%Y-%m-%d").to_string(), XSD.term("date"))
    }

    fn resolve(&self, record: &EvidenceRecord) -> std::result::Result<Resolved, LookupMiss> {
        let drug = match self.drugs.get(&record.drug_mesh_id) {
            Some(drug) => drug,
            None => return Err(LookupMiss { pmid: record.pmid.clone(), vocabulary: "RxNorm", code: record.drug_mesh_id.clone() }),
        };
        let hoi = match self.conditions.get(&record.hoi_mesh_id) {
            Some(hoi) => hoi,
            None => return Err(LookupMiss { pmid: record.pmid.clone(), vocabulary: "OHDSI/IMEDS", code: record.hoi_mesh_id.clone() }),
        };
        Ok(Resolved {
            rxnorm_code: drug.rxnorm_code.clone(),
            drug_standard_vocab_id: drug.standard_vocab_id.clone(),
            hoi_standard_vocab_id: hoi.to_string(),
        })
    }

    fn item_for(&mut self, record: &EvidenceRecord) -> AnnotationItem {
        if let Some(item) = self.items.get(&record.pmid) {
            return item.clone();
        }

        self.item_counter += 1;
        let item = AnnotationItem {
            iri: POC.term(&format!("ohdsi-pubmed-mesh-annotation-item-{}", self.item_counter)),
            target: format!("urn:uuid:{}", Uuid::new_v4()),
            study_type: StudyType::classify(&record.publication_type),
        };
        debug!("new annotation item {} for PMID {}", item.iri, record.pmid);

        let annotated_at = self.annotated_at_literal();
        let i = item.iri.as_str();
        let target = item.target.as_str();
        self.graph.add(self.annotation_set.as_str(), AO_OLD.term("item"), Term::iri(i));
        self.graph.add(i, RDF.term("type"), Term::iri(OA.term("DataAnnotation")));
        self.graph.add(i, RDF.term("type"), Term::iri(OHDSI.term("PubMedDrugHOIAnnotation")));
        self.graph.add(i, OA.term("annotatedAt"), annotated_at);
        self.graph.add(i, OA.term("annotatedBy"), Term::iri(ANNOTATOR));
        self.graph.add(i, OA.term("motivatedBy"), Term::iri(OA.term("tagging")));
        self.graph.add(i, OA.term("hasTarget"), Term::iri(target));
        self.graph.add(target, RDF.term("type"), Term::iri(OA.term("SpecificResource")));
        self.graph.add(target, OA.term("hasSource"), Term::iri(PUBMED.term(&record.pmid)));
        if let Some(study_type) = item.study_type {
            self.graph.add(target, OHDSI.term("MeshStudyType"), Term::literal(study_type.label()));
        }

        self.items.insert(record.pmid.clone(), item.clone());
        item
    }

    /// Adds the item (first sighting of the PubMed id) and a new body for the
    /// record. A crosswalk miss drops the whole record: nothing is written,
    /// the miss is kept as a diagnostic and returned.
    pub fn add_record(&mut self, record: &EvidenceRecord) -> Result<String> {
        let resolved = match self.resolve(record) {
            Ok(resolved) => resolved,
            Err(miss) => {
                warn!("no {} equivalent to the MeSH code {}, skipping PMID {}", miss.vocabulary, miss.code, miss.pmid);
                self.diagnostics.push(miss.clone());
                return Err(miss.into());
            }
        };

        let item = self.item_for(record);

        self.body_counter += 1;
        let body = POC.term(&format!("ohdsi-pubmed-mesh-annotation-annotation-body-{}", self.body_counter));
        let b = body.as_str();
        self.graph.add(item.iri.as_str(), OA.term("hasBody"), Term::iri(b));
        self.graph.add(b, RDFS.term("label"), Term::literal(format!("Drug-HOI tag for {}", record.pmid)));
        self.graph.add(b, RDF.term("type"), Term::iri(OHDSI.term("OHDSIMeshTags")));
        self.graph.add(
            b,
            DCTERMS.term("description"),
            Term::literal(format!(
                "Drug-HOI body from MEDLINE PMID {} using MESH drug {} ({}) and HOI {} ({})",
                record.pmid, record.drug_label, record.drug_mesh_id, record.hoi_label, record.hoi_mesh_id
            )),
        );
        self.graph.add(b, OHDSI.term("MeshDrug"), Term::iri(MESH.term(&record.drug_mesh_id)));
        self.graph.add(b, OHDSI.term("RxnormDrug"), Term::iri(RXNORM.term(&resolved.rxnorm_code)));
        self.graph.add(b, OHDSI.term("ImedsDrug"), Term::iri(OHDSI.term(&resolved.drug_standard_vocab_id)));
        self.graph.add(b, OHDSI.term("ImedsHoi"), Term::iri(OHDSI.term(&resolved.hoi_standard_vocab_id)));
        self.graph.add(b, OHDSI.term("MeshHoi"), Term::iri(MESH.term(&record.hoi_mesh_id)));

        Ok(body)
    }

    /// Lookup misses are recovered; anything else (a malformed evidence line)
    /// aborts the build.
    pub fn build<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<EvidenceRecord>>,
    {
        for record in records.into_iter() {
            match self.add_record(&record?) {
                Ok(_) => {}
                Err(e) if e.is_lookup_miss() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn graph(&self) -> &TripleGraph {
        &self.graph
    }

    pub fn into_graph(self) -> TripleGraph {
        self.graph
    }

    pub fn item(&self, pmid: &str) -> Option<&AnnotationItem> {
        self.items.get(pmid)
    }

    pub fn item_count(&self) -> usize {
        self.item_counter
    }

    pub fn body_count(&self) -> usize {
        self.body_counter
    }

    pub fn diagnostics(&self) -> &[LookupMiss] {
        &self.diagnostics
    }
}
