use crate::error::{EtlError, Result};
use log::debug;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, BufRead, Write};
use std::path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Namespace(&'static str);

impl Namespace {
    pub const fn new(iri: &'static str) -> Self {
        Namespace(iri)
    }

    pub fn iri(&self) -> &'static str {
        self.0
    }

    pub fn term(&self, local: &str) -> String {
        format!("{}{}", self.0, local)
    }
}

pub const RDF: Namespace = Namespace::new("http://www.w3.org/1999/02/22-rdf-syntax-ns#");
pub const RDFS: Namespace = Namespace::new("http://www.w3.org/2000/01/rdf-schema#");
pub const XSD: Namespace = Namespace::new("http://www.w3.org/2001/XMLSchema#");
pub const DCTERMS: Namespace = Namespace::new("http://purl.org/dc/terms/");
pub const PAV: Namespace = Namespace::new("http://purl.org/pav");
pub const DCTYPES: Namespace = Namespace::new("http://purl.org/dc/dcmitype/");
pub const SIO: Namespace = Namespace::new("http://semanticscience.org/resource/");
pub const OA: Namespace = Namespace::new("http://www.w3.org/ns/oa#");
pub const AO_OLD: Namespace = Namespace::new("http://purl.org/ao/core/");
pub const CNT: Namespace = Namespace::new("http://www.w3.org/2011/content#");
pub const SIOCNS: Namespace = Namespace::new("http://rdfs.org/sioc/ns#");
pub const SWANDE: Namespace = Namespace::new("http://purl.org/swan/1.2/discourse-elements#");
pub const NCBIT: Namespace = Namespace::new("http://ncicb.nci.nih.gov/xml/owl/EVS/Thesaurus.owl#");
pub const MESH: Namespace = Namespace::new("http://purl.bioontology.org/ontology/MESH/");
pub const MEDDRA: Namespace = Namespace::new("http://purl.bioontology.org/ontology/MEDDRA/");
pub const RXNORM: Namespace = Namespace::new("http://purl.bioontology.org/ontology/RXNORM/");
pub const PUBMED: Namespace = Namespace::new("http://www.ncbi.nlm.nih.gov/pubmed/");
pub const OHDSI: Namespace = Namespace::new("http://purl.org/net/ohdsi#");
pub const POC: Namespace = Namespace::new("http://purl.org/net/nlprepository/ohdsi-pubmed-mesh-poc#");

/// Prefixes bound in every serialized graph.
pub const PREFIXES: [(&str, Namespace); 19] = [
    ("rdf", RDF),
    ("rdfs", RDFS),
    ("xsd", XSD),
    ("dcterms", DCTERMS),
    ("pav", PAV),
    ("dctypes", DCTYPES),
    ("sio", SIO),
    ("oa", OA),
    ("aoOld", AO_OLD),
    ("cnt", CNT),
    ("siocns", SIOCNS),
    ("swande", SWANDE),
    ("ncbit", NCBIT),
    ("mesh", MESH),
    ("meddra", MEDDRA),
    ("rxnorm", RXNORM),
    ("pubmed", PUBMED),
    ("ohdsi", OHDSI),
    ("poc", POC),
];

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Literal { value: String, datatype: Option<String> },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal { value: value.into(), datatype: None }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal { value: value.into(), datatype: Some(datatype.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

/// Append-only triple set. Iteration follows insertion order.
#[derive(Clone, Debug, Default)]
pub struct TripleGraph {
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
}

impl TripleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the triple was already present.
    pub fn add(&mut self, subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> bool {
        let triple = Triple { subject: subject.into(), predicate: predicate.into(), object };
        if self.seen.contains(&triple) {
            return false;
        }
        self.seen.insert(triple.clone());
        self.triples.push(triple);
        true
    }

    pub fn contains(&self, subject: &str, predicate: &str, object: &Term) -> bool {
        self.seen.contains(&Triple { subject: subject.to_string(), predicate: predicate.to_string(), object: object.clone() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn objects<'a>(&'a self, subject: &'a str, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples.iter().filter(move |t| t.subject == subject && t.predicate == predicate).map(|t| &t.object)
    }

    pub fn subjects_with<'a>(&'a self, predicate: &'a str, object: &'a Term) -> impl Iterator<Item = &'a str> + 'a {
        self.triples.iter().filter(move |t| t.predicate == predicate && &t.object == object).map(|t| t.subject.as_str())
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn as_set(&self) -> &HashSet<Triple> {
        &self.seen
    }
}

fn is_ncname(local: &str) -> bool {
    let mut chars = local.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.'),
        _ => false,
    }
}

/// Maps predicate IRIs to element names, inventing `nsN` prefixes for
/// namespaces missing from `PREFIXES`.
struct QNames {
    bound: Vec<(String, String)>,
}

impl QNames {
    fn for_graph(graph: &TripleGraph) -> Result<Self> {
        let mut bound = PREFIXES.iter().map(|(p, ns)| (p.to_string(), ns.iri().to_string())).collect::<Vec<_>>();
        let mut generated = 0;
        for triple in graph.iter() {
            if Self::lookup(&bound, &triple.predicate).is_some() {
                continue;
            }
            let split = triple.predicate.rfind(['#', '/']).map(|i| i + 1).unwrap_or(0);
            let (ns, local) = triple.predicate.split_at(split);
            if ns.is_empty() || !is_ncname(local) {
                return Err(EtlError::RdfXml(format!("predicate {} can not be written as an XML element name", triple.predicate)));
            }
            generated += 1;
            debug!("binding ns{} to {}", generated, ns);
            bound.push((format!("ns{}", generated), ns.to_string()));
        }
        Ok(QNames { bound })
    }

    fn lookup(bound: &[(String, String)], iri: &str) -> Option<String> {
        bound
            .iter()
            .filter(|(_, ns)| iri.starts_with(ns.as_str()) && is_ncname(&iri[ns.len()..]))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{}:{}", prefix, &iri[ns.len()..]))
    }

    fn qname(&self, iri: &str) -> Result<String> {
        Self::lookup(&self.bound, iri).ok_or_else(|| EtlError::RdfXml(format!("no prefix bound for {}", iri)))
    }
}

/// Writes the graph as RDF/XML, one `rdf:Description` per subject.
pub fn write_rdf_xml<W: Write>(graph: &TripleGraph, out: W) -> Result<()> {
    let qnames = QNames::for_graph(graph)?;

    let mut by_subject: BTreeMap<usize, (&str, Vec<&Triple>)> = BTreeMap::new();
    let mut subject_order: HashMap<&str, usize> = HashMap::new();
    for triple in graph.iter() {
        let next = subject_order.len();
        let position = *subject_order.entry(triple.subject.as_str()).or_insert(next);
        by_subject.entry(position).or_insert_with(|| (triple.subject.as_str(), vec![])).1.push(triple);
    }

    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("rdf:RDF");
    for (prefix, ns) in qnames.bound.iter() {
        root.push_attribute((format!("xmlns:{}", prefix).as_str(), ns.as_str()));
    }
    writer.write_event(Event::Start(root))?;

    for (_, (subject, triples)) in by_subject.into_iter() {
        let mut description = BytesStart::new("rdf:Description");
        description.push_attribute(("rdf:about", subject));
        writer.write_event(Event::Start(description))?;

        for triple in triples.into_iter() {
            let name = qnames.qname(&triple.predicate)?;
            match &triple.object {
                Term::Iri(iri) => {
                    let mut property = BytesStart::new(name.as_str());
                    property.push_attribute(("rdf:resource", iri.as_str()));
                    writer.write_event(Event::Empty(property))?;
                }
                Term::Literal { value, datatype } => {
                    let mut property = BytesStart::new(name.as_str());
                    if let Some(dt) = datatype {
                        property.push_attribute(("rdf:datatype", dt.as_str()));
                    }
                    writer.write_event(Event::Start(property))?;
                    writer.write_event(Event::Text(BytesText::new(value)))?;
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
        }

        writer.write_event(Event::End(BytesEnd::new("rdf:Description")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("rdf:RDF")))?;
    writer.into_inner().write_all(b"\n")?;
    Ok(())
}

pub fn serialize_to_file(graph: &TripleGraph, path: &path::Path) -> Result<()> {
    let mut writer = crate::create_output_file(path)?;
    write_rdf_xml(graph, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn expand(namespaces: &HashMap<String, String>, qname: &str) -> Result<String> {
    let (prefix, local) = qname.split_once(':').ok_or_else(|| EtlError::RdfXml(format!("unprefixed element {}", qname)))?;
    let ns = namespaces.get(prefix).ok_or_else(|| EtlError::RdfXml(format!("undeclared prefix {}", prefix)))?;
    Ok(format!("{}{}", ns, local))
}

struct OpenProperty {
    predicate: String,
    datatype: Option<String>,
    text: String,
}

/// Reads back the RDF/XML shape produced by [`write_rdf_xml`]: node elements
/// carrying `rdf:about` and property elements with either `rdf:resource` or
/// literal text.
pub fn read_rdf_xml<R: BufRead>(input: R) -> Result<TripleGraph> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut graph = TripleGraph::new();
    let mut namespaces: HashMap<String, String> = HashMap::new();
    let mut depth = 0;
    let mut subject: Option<String> = None;
    let mut property: Option<OpenProperty> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let mut attributes = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    attributes.insert(String::from_utf8_lossy(attr.key.as_ref()).to_string(), attr.unescape_value()?.to_string());
                }
                match depth {
                    1 => {
                        for (key, value) in attributes.into_iter() {
                            if let Some(prefix) = key.strip_prefix("xmlns:") {
                                namespaces.insert(prefix.to_string(), value);
                            }
                        }
                    }
                    2 => {
                        let about = attributes.remove("rdf:about").ok_or_else(|| EtlError::RdfXml(format!("{} without rdf:about", name)))?;
                        subject = Some(about);
                    }
                    3 => {
                        property = Some(OpenProperty { predicate: expand(&namespaces, &name)?, datatype: attributes.remove("rdf:datatype"), text: String::new() });
                    }
                    _ => return Err(EtlError::RdfXml(format!("unexpected nested element {}", name))),
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let current = subject.as_ref().filter(|_| depth == 2).ok_or_else(|| EtlError::RdfXml(format!("property {} outside a description", name)))?;
                let mut resource = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"rdf:resource" {
                        resource = Some(attr.unescape_value()?.to_string());
                    }
                }
                let object = match resource {
                    Some(iri) => Term::iri(iri),
                    None => Term::literal(""),
                };
                graph.add(current.clone(), expand(&namespaces, &name)?, object);
            }
            Event::Text(t) => {
                if let Some(open) = property.as_mut() {
                    open.text.push_str(&t.unescape()?);
                }
            }
            Event::End(_) => {
                if depth == 3 {
                    if let (Some(open), Some(current)) = (property.take(), subject.as_ref()) {
                        graph.add(current.clone(), open.predicate, Term::Literal { value: open.text, datatype: open.datatype });
                    }
                }
                if depth == 2 {
                    subject = None;
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(EtlError::RdfXml("unexpected end of document".to_string()));
    }
    Ok(graph)
}

pub fn read_rdf_xml_file(path: &path::Path) -> Result<TripleGraph> {
    let reader = io::BufReader::new(std::fs::File::open(path)?);
    read_rdf_xml(reader)
}

#[cfg(test)]
mod test {
    use crate::rdf::*;
    use std::io::Cursor;

    fn sample_graph() -> TripleGraph {
        let mut graph = TripleGraph::new();
        let body = POC.term("ohdsi-pubmed-mesh-annotation-annotation-body-1");
        graph.add(body.clone(), RDF.term("type"), Term::iri(OHDSI.term("OHDSIMeshTags")));
        graph.add(body.clone(), RDFS.term("label"), Term::literal("Drug-HOI tag for 100"));
        graph.add(body.clone(), DCTERMS.term("description"), Term::literal("Süßstoff & <Ödem> \"quoted\" 日本語"));
        graph.add(body.clone(), OHDSI.term("MeshDrug"), Term::iri(MESH.term("D001241")));
        graph.add("urn:uuid:6f1c1d8e-0d3e-4c55-9f57-0f1c2b3d4e5f", OA.term("hasSource"), Term::iri(PUBMED.term("100")));
        graph.add(POC.term("set-1"), OA.term("annotatedAt"), Term::typed_literal("2015-03-01", XSD.term("date")));
        graph.add(body, "http://example.org/vocab/extra", Term::literal("  padded  "));
        graph
    }

    #[test]
    fn add_is_idempotent() {
        let mut graph = TripleGraph::new();
        assert!(graph.add("http://a", "http://p", Term::literal("x")));
        assert!(!graph.add("http://a", "http://p", Term::literal("x")));
        assert!(graph.add("http://a", "http://p", Term::typed_literal("x", XSD.term("string"))));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn round_trip() {
        let graph = sample_graph();
        let mut out = vec![];
        write_rdf_xml(&graph, &mut out).unwrap();
        let xml = String::from_utf8(out.clone()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("xmlns:ohdsi=\"http://purl.org/net/ohdsi#\""));
        assert!(xml.contains("xmlns:ns1=\"http://example.org/vocab/\""));
        assert!(xml.contains("Süßstoff"));
        assert!(xml.contains("日本語"));

        let reread = read_rdf_xml(Cursor::new(out)).unwrap();
        assert_eq!(reread.as_set(), graph.as_set());
    }

    #[test]
    fn one_description_per_subject() {
        let graph = sample_graph();
        let mut out = vec![];
        write_rdf_xml(&graph, &mut out).unwrap();
        let xml = String::from_utf8(out).unwrap();
        assert_eq!(xml.matches("<rdf:Description ").count(), 3);
    }

    #[test]
    fn unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, "x").unwrap();
        let ret = serialize_to_file(&sample_graph(), &blocker.join("out.rdf"));
        assert!(matches!(ret, Err(EtlError::Io(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("graph.rdf");
        let graph = sample_graph();
        serialize_to_file(&graph, &output).unwrap();
        assert_eq!(read_rdf_xml_file(&output).unwrap().as_set(), graph.as_set());
    }
}
