use std::path::PathBuf;

/// Hard failures of an extraction pass. Malformed lines are never errors.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("failed to read transcript {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
