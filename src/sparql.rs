use crate::error::{EtlError, Result};
use log::debug;
use reqwest::header;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

/// Interventions are matched on their label; the term is pasted into the
/// query as is, so quotes or braces in it break the query.
pub fn query_string(term: &str, offset: u64, limit: u64) -> String {
    format!(
        r#"
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX ct: <http://bio2rdf.org/clinicaltrials_vocabulary:>

SELECT ?trialLabel ?trialURI ?interventionURI ?conditionLabel ?conditionURI ?completionDate
WHERE {{
 ?trialURI a ct:Clinical-Study;
    rdfs:label ?trialLabel;
    ct:intervention ?interventionURI;
    ct:condition ?conditionURI.

 ?interventionURI ct:intervention-name ?interventionName.
 FILTER(lcase(str(?interventionName)) = lcase("{}"))

 ?conditionURI rdfs:label ?conditionLabel.
 OPTIONAL {{ ?trialURI ct:completion-date ?completionDate. }}
}}
OFFSET {}
LIMIT {}
"#,
        term, offset, limit
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BindingValue {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

pub type Binding = HashMap<String, BindingValue>;

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub vars: Vec<String>,
}

/// SPARQL 1.1 JSON results document.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct SparqlResults {
    #[serde(default)]
    pub head: Head,
    pub results: ResultSet,
}

impl SparqlResults {
    pub fn bindings(&self) -> &[Binding] {
        &self.results.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.results.bindings.is_empty()
    }
}

pub struct SparqlClient {
    client: reqwest::Client,
    endpoint: String,
}

impl SparqlClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| EtlError::Transport { endpoint: endpoint.to_string(), source: e })?;
        Ok(SparqlClient { client, endpoint: endpoint.to_string() })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// One GET with the query in the `query` parameter. No retries.
    pub async fn query(&self, query: &str) -> Result<SparqlResults> {
        debug!("query string: {}", query);
        let transport = |e: reqwest::Error| EtlError::Transport { endpoint: self.endpoint.clone(), source: e };
        let response = self.client.get(self.endpoint.as_str()).query(&[("query", query)]).send().await.map_err(transport)?;
        let body = response.error_for_status().map_err(transport)?.text().await.map_err(transport)?;
        serde_json::from_str(&body).map_err(|e| EtlError::Decode { endpoint: self.endpoint.clone(), source: e })
    }
}
