use std::io;
use std::path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    /// A delimited input line did not split into the expected number of fields.
    #[error("could not parse {path}, line {line}: {message}")]
    Parse { path: String, line: usize, message: String },

    #[error("could not parse XML document {path}: {source}")]
    Xml {
        path: String,
        #[source]
        source: quick_xml::de::DeError,
    },

    #[error("could not read RDF/XML: {0}")]
    RdfXml(String),

    /// A crosswalk had no entry for the code; the record is dropped.
    #[error("no {vocabulary} equivalent to the MeSH code {code}")]
    LookupMiss { vocabulary: &'static str, code: String },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not decode SPARQL results from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not load configuration {path}: {message}")]
    Config { path: path::PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EtlError {
    pub fn parse(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        EtlError::Parse { path: path.into(), line, message: message.into() }
    }

    /// HTTP and JSON failures while talking to a SPARQL endpoint.
    pub fn is_transport(&self) -> bool {
        matches!(self, EtlError::Transport { .. } | EtlError::Decode { .. })
    }

    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, EtlError::LookupMiss { .. })
    }
}

impl From<quick_xml::Error> for EtlError {
    fn from(e: quick_xml::Error) -> Self {
        EtlError::RdfXml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for EtlError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        EtlError::RdfXml(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use crate::error::EtlError;

    #[test]
    fn lookup_miss_message_names_code() {
        let e = EtlError::LookupMiss { vocabulary: "RxNorm", code: "D000082".to_string() };
        assert!(e.is_lookup_miss());
        assert!(!e.is_transport());
        assert_eq!(e.to_string(), "no RxNorm equivalent to the MeSH code D000082");
    }

    #[test]
    fn parse_message_has_line() {
        let e = EtlError::parse("drugs.txt", 4, "expected 6 fields, found 2");
        assert_eq!(e.to_string(), "could not parse drugs.txt, line 4: expected 6 fields, found 2");
    }
}
