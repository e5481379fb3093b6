//! Bulk dataset engine error taxonomy (spec §4.5, §7 "Dataset refresh
//! failure: logged; previous dataset remains active").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to download {0}: {1}")]
    Download(&'static str, String),

    #[error("failed to decompress {0}: {1}")]
    Decompress(&'static str, String),

    #[error("malformed row in {0} at line {1}: {2}")]
    MalformedRow(&'static str, usize, String),

    #[error("missing required column {0} in {1} header")]
    MissingColumn(&'static str, &'static str),

    #[error("dataset has not completed an initial refresh yet")]
    NotReady,
}
