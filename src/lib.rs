extern crate env_logger;
extern crate log;

use log::debug;
use std::{fs, io, path};

pub mod annotation;
pub mod error;
pub mod evidence;
pub mod harvest;
pub mod rdf;
pub mod results;
pub mod sparql;
pub mod terminology;

pub use error::{EtlError, Result};

/// Creates (or truncates) an output file, making its parent directory first.
pub fn create_output_file(path: &path::Path) -> io::Result<io::BufWriter<fs::File>> {
    if let Some(parent_dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        debug!("writing output to: {:?}", parent_dir);
        fs::create_dir_all(parent_dir)?;
    }
    Ok(io::BufWriter::new(fs::File::create(path)?))
}
