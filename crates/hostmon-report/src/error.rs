/// Errors raised while reading a snapshot stream.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read snapshot stream '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed snapshot after {parsed} records: {source}")]
    Parse {
        parsed: usize,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ReportError>;
