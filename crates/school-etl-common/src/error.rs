//! Error kinds reported by pipeline stages

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Every way a run can fail.
///
/// Row-level quality drops are not represented here: records that fail the
/// status, category or coordinate checks are filtered out, never raised.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Transport failure or non-success HTTP status while extracting
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Expected structural element absent or malformed in the source payload
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A field required for derivation is absent on a surviving record
    #[error("Field missing: {field} (record {index})")]
    FieldMissing { field: String, index: usize },

    /// Destination store unreachable or a statement failed during load
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EtlError {
    /// Stable identifier for logs and run reports
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::SourceUnavailable(_) => "source_unavailable",
            EtlError::SchemaMismatch(_) => "schema_mismatch",
            EtlError::FieldMissing { .. } => "field_missing",
            EtlError::SinkUnavailable(_) => "sink_unavailable",
            EtlError::Config(_) => "config",
        }
    }

    pub fn field_missing(field: impl Into<String>, index: usize) -> Self {
        EtlError::FieldMissing {
            field: field.into(),
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(EtlError::SourceUnavailable("x".into()).kind(), "source_unavailable");
        assert_eq!(EtlError::SchemaMismatch("x".into()).kind(), "schema_mismatch");
        assert_eq!(EtlError::field_missing("sekolah", 3).kind(), "field_missing");
        assert_eq!(EtlError::SinkUnavailable("x".into()).kind(), "sink_unavailable");
        assert_eq!(EtlError::Config("x".into()).kind(), "config");
    }

    #[test]
    fn test_field_missing_message() {
        let err = EtlError::field_missing("alamat_jalan", 7);
        assert_eq!(err.to_string(), "Field missing: alamat_jalan (record 7)");
    }
}
