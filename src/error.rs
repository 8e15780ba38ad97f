// src/error.rs
// Failure taxonomy for the digest pipeline. Variant choice decides blast
// radius: SourceFetch is recovered inline, Aggregation/Delivery kill the
// current run, Configuration kills startup.

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// Required credentials or files absent at startup. Fatal, the pipeline
    /// does not start.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// One source's invocation failed or timed out. Logged, the source is
    /// excluded from the run, the run continues.
    // Field is `name`, not `source`: thiserror treats a `source` field as
    // the error's cause and would require it to be an Error itself.
    #[error("source '{name}' failed: {reason}")]
    SourceFetch { name: String, reason: String },

    /// The consolidation invocation failed or there was nothing to
    /// consolidate. Fatal to the current run only.
    #[error("aggregation failed: {0}")]
    Aggregation(String),

    /// The delivery channel rejected a chunk. Earlier chunks may already be
    /// out; the run is still recorded as failed.
    #[error("delivery failed on chunk {chunk}: {reason}")]
    Delivery { chunk: usize, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_fetch_display_names_the_source() {
        let err = DigestError::SourceFetch {
            name: "Rust Blog".into(),
            reason: "agent timed out after 300s".into(),
        };
        assert_eq!(
            err.to_string(),
            "source 'Rust Blog' failed: agent timed out after 300s"
        );
        // No cause chain: the reason is plain context, not a nested error.
        assert!(std::error::Error::source(&err).is_none());
    }
}
