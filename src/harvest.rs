use crate::error::{EtlError, Result};
use crate::results::{ResultRow, ResultsByTerm};
use crate::sparql::{query_string, SparqlClient};
use itertools::Itertools;
use log::{debug, error, info, warn};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path;

pub const SIDER_SPARQL: &str = "http://s2.semanticscience.org:12050/sparql";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub endpoint: String,
    pub terms: Vec<String>,
    /// Semicolon separated drug names; replaces `terms` when set.
    pub terms_file: Option<path::PathBuf>,
    pub offset: u64,
    pub limit: u64,
    /// No page is requested at or past this offset.
    pub max_offset: Option<u64>,
    pub log_file: path::PathBuf,
    pub out_file: path::PathBuf,
    pub snapshot_file: path::PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfig {
            endpoint: SIDER_SPARQL.to_string(),
            terms: vec!["Omalizumab".to_string()],
            terms_file: None,
            offset: 0,
            limit: 5000,
            max_offset: Some(20000),
            log_file: path::PathBuf::from("sider_gov_queryresults.log"),
            out_file: path::PathBuf::from("sider__gov_queryresults.tsv"),
            snapshot_file: path::PathBuf::from("sider_gov_queryresults.pickle"),
        }
    }
}

impl HarvestConfig {
    pub fn load(path: &path::Path) -> Result<Self> {
        let reader = io::BufReader::new(fs::File::open(path)?);
        serde_yml::from_reader(reader).map_err(|e| EtlError::Config { path: path.to_path_buf(), message: e.to_string() })
    }

    /// The configured terms, or the contents of `terms_file` when one is set.
    pub fn resolve_terms(&self) -> Result<Vec<String>> {
        match &self.terms_file {
            Some(terms_file) => {
                let content = fs::read_to_string(terms_file)?;
                Ok(parse_terms(&content))
            }
            None => Ok(self.terms.clone()),
        }
    }
}

pub fn parse_terms(content: &str) -> Vec<String> {
    content.trim().split(';').map(|t| t.trim()).filter(|t| !t.is_empty()).map(String::from).collect_vec()
}

/// Pages through the endpoint one term at a time, writing progress lines to
/// `log` as it goes. Progress lines are best effort: a failing log never
/// stops the harvest.
pub struct Harvester<'a, W: Write> {
    client: &'a SparqlClient,
    config: &'a HarvestConfig,
    log: W,
    requests: usize,
    log_failures: usize,
}

impl<'a, W: Write> Harvester<'a, W> {
    pub fn new(client: &'a SparqlClient, config: &'a HarvestConfig, log: W) -> Self {
        Harvester { client, config, log, requests: 0, log_failures: 0 }
    }

    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Progress lines that could not be written.
    pub fn log_failures(&self) -> usize {
        self.log_failures
    }

    fn log_line(&mut self, line: fmt::Arguments<'_>) {
        if let Err(e) = self.log.write_fmt(line).and_then(|_| self.log.write_all(b"\n")) {
            self.log_failures += 1;
            error!("could not write to harvest log: {}", e);
        }
    }

    pub fn into_log(self) -> W {
        self.log
    }

    /// Returns the number of rows added for the term. A term with no rows on
    /// its first page gets no entry in `results`.
    pub async fn harvest_term(&mut self, term: &str, results: &mut ResultsByTerm) -> Result<usize> {
        let mut offset = self.config.offset;
        let mut added = 0;
        loop {
            if let Some(max_offset) = self.config.max_offset {
                if offset >= max_offset {
                    info!("reached maximum offset {} for {}", max_offset, term);
                    self.log_line(format_args!("INFO: reached maximum offset {} for drug {}", max_offset, term));
                    break;
                }
            }

            let query = query_string(term, offset, self.config.limit);
            self.requests += 1;
            let page = self.client.query(&query).await?;
            let bindings = page.bindings();
            debug!("{} rows for {} at offset {}", bindings.len(), term, offset);

            if bindings.is_empty() {
                if added == 0 {
                    self.log_line(format_args!("INFO: no results for drug {}", term));
                }
                break;
            }

            let rows = results.entry(term.to_string()).or_default();
            rows.extend(bindings.iter().map(|b| ResultRow::from_binding(b, term, self.client.endpoint())));
            added += bindings.len();
            offset += self.config.limit;
        }
        Ok(added)
    }

    /// Transport failures end the current term and the harvester moves on to
    /// the next one; rows already received are kept.
    pub async fn harvest(&mut self, terms: &[String]) -> Result<ResultsByTerm> {
        let mut results = ResultsByTerm::new();
        for term in terms.iter() {
            info!("trying symbol {}", term);
            self.log_line(format_args!("INFO: trying symbol {}", term));
            match self.harvest_term(term, &mut results).await {
                Ok(count) => info!("{} rows for {}", count, term),
                Err(e) if e.is_transport() => {
                    error!("giving up on {}: {}", term, e);
                    self.log_line(format_args!("ERROR: giving up on drug {}: {}", term, e));
                }
                Err(e) => return Err(e),
            }
        }
        if results.is_empty() {
            warn!("no results for any of {} terms", terms.len());
        }
        if let Err(e) = self.log.flush() {
            self.log_failures += 1;
            error!("could not flush harvest log: {}", e);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod test {
    use crate::harvest::*;
    use serde_json::{json, Value};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(rows: usize) -> Value {
        let bindings = (0..rows)
            .map(|i| {
                json!({
                    "trialLabel": {"type": "literal", "value": format!("trial {}", i)},
                    "trialURI": {"type": "uri", "value": format!("http://bio2rdf.org/clinicaltrials:NCT{:08}", i)},
                    "conditionLabel": {"type": "literal", "value": "Asthma"}
                })
            })
            .collect::<Vec<_>>();
        json!({"head": {"vars": ["trialLabel", "trialURI", "conditionLabel"]}, "results": {"bindings": bindings}})
    }

    fn config(terms: &[&str]) -> HarvestConfig {
        HarvestConfig { terms: terms.iter().map(|t| t.to_string()).collect(), ..Default::default() }
    }

    #[tokio::test]
    async fn pages_until_empty() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(5000))).up_to_n_times(1).expect(1).mount(&mock_server).await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(0))).expect(1).mount(&mock_server).await;

        let client = SparqlClient::new(&mock_server.uri()).unwrap();
        let config = config(&["Omalizumab"]);
        let mut harvester = Harvester::new(&client, &config, vec![]);
        let results = harvester.harvest(&config.terms).await.unwrap();

        assert_eq!(results["Omalizumab"].len(), 5000);
        assert_eq!(harvester.requests(), 2);
        assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
        assert_eq!(results["Omalizumab"][42].trial_label.as_deref(), Some("trial 42"));
        assert_eq!(results["Omalizumab"][42].intervention_label.as_deref(), Some("Omalizumab"));

        let log = String::from_utf8(harvester.into_log()).unwrap();
        assert!(!log.contains("no results"));
    }

    #[tokio::test]
    async fn empty_first_page() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(0))).expect(1).mount(&mock_server).await;

        let client = SparqlClient::new(&mock_server.uri()).unwrap();
        let config = config(&["Nothingumab"]);
        let mut harvester = Harvester::new(&client, &config, vec![]);
        let results = harvester.harvest(&config.terms).await.unwrap();

        assert!(!results.contains_key("Nothingumab"));
        let log = String::from_utf8(harvester.into_log()).unwrap();
        assert!(log.contains("INFO: no results for drug Nothingumab"));
    }

    #[tokio::test]
    async fn max_offset_is_a_hard_stop() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(10))).mount(&mock_server).await;

        let client = SparqlClient::new(&mock_server.uri()).unwrap();
        let config = HarvestConfig { limit: 10, max_offset: Some(30), ..config(&["Omalizumab"]) };
        let mut harvester = Harvester::new(&client, &config, vec![]);
        let results = harvester.harvest(&config.terms).await.unwrap();

        assert_eq!(harvester.requests(), 3);
        assert_eq!(results["Omalizumab"].len(), 30);
        let log = String::from_utf8(harvester.into_log()).unwrap();
        assert!(log.contains("reached maximum offset 30"));
    }

    #[tokio::test]
    async fn transport_failure_moves_on_to_next_term() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)).up_to_n_times(1).mount(&mock_server).await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(3))).up_to_n_times(1).mount(&mock_server).await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(0))).mount(&mock_server).await;

        let client = SparqlClient::new(&mock_server.uri()).unwrap();
        let config = config(&["Broken", "Omalizumab"]);
        let mut harvester = Harvester::new(&client, &config, vec![]);
        let results = harvester.harvest(&config.terms).await.unwrap();

        assert!(!results.contains_key("Broken"));
        assert_eq!(results["Omalizumab"].len(), 3);
        let log = String::from_utf8(harvester.into_log()).unwrap();
        assert!(log.contains("ERROR: giving up on drug Broken"));
        assert!(log.contains("INFO: trying symbol Omalizumab"));
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[tokio::test]
    async fn failing_log_keeps_results() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(1))).up_to_n_times(1).mount(&mock_server).await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(page(0))).mount(&mock_server).await;

        let client = SparqlClient::new(&mock_server.uri()).unwrap();
        let config = config(&["Omalizumab", "Nothingumab"]);
        let mut harvester = Harvester::new(&client, &config, FullDisk);
        let results = harvester.harvest(&config.terms).await.unwrap();

        assert_eq!(harvester.requests(), 3);
        assert_eq!(results["Omalizumab"].len(), 1);
        assert!(!results.contains_key("Nothingumab"));
        // two "trying symbol" lines, one "no results" line, the final flush
        assert_eq!(harvester.log_failures(), 4);
    }

    #[test]
    fn terms_file() {
        assert_eq!(parse_terms(" Omalizumab;Aspirin ; ;Warfarin\n"), vec!["Omalizumab", "Aspirin", "Warfarin"]);

        let dir = tempfile::tempdir().unwrap();
        let terms_file = dir.path().join("drugsToSearch.txt");
        std::fs::write(&terms_file, "Omalizumab;Aspirin").unwrap();
        let config = HarvestConfig { terms_file: Some(terms_file), ..Default::default() };
        assert_eq!(config.resolve_terms().unwrap(), vec!["Omalizumab", "Aspirin"]);
        assert_eq!(HarvestConfig::default().resolve_terms().unwrap(), vec!["Omalizumab"]);
    }

    #[test]
    fn yaml_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("harvest.yaml");
        std::fs::write(&config_path, "endpoint: http://localhost:8890/sparql\nterms:\n  - Aspirin\n  - Warfarin\nlimit: 100\n").unwrap();

        let config = HarvestConfig::load(&config_path).unwrap();
        assert_eq!(config.endpoint, "http://localhost:8890/sparql");
        assert_eq!(config.terms, vec!["Aspirin", "Warfarin"]);
        assert_eq!(config.limit, 100);
        assert_eq!(config.max_offset, Some(20000));
        assert_eq!(config.snapshot_file, path::PathBuf::from("sider_gov_queryresults.pickle"));
    }

    #[test]
    fn bad_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("harvest.yaml");
        std::fs::write(&config_path, "limit: [not, a, number]\n").unwrap();
        assert!(matches!(HarvestConfig::load(&config_path), Err(EtlError::Config { .. })));
    }
}
