use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Resume not confirmed by operator")]
    ResumeDeclined,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Run interrupted before all barcodes were processed")]
    Interrupted,
}

impl LookupError {
    /// Fatal errors abort before any starting ledger exists, so no checkpoint
    /// is written for them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LookupError::Configuration(_) | LookupError::ResumeDeclined
        )
    }

    /// Errors raised while resolving a single barcode. These never leave the
    /// worker; they are folded into a skipped result.
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            LookupError::BrowserLaunch(_)
                | LookupError::Navigation(_)
                | LookupError::Timeout(_)
                | LookupError::Extraction(_)
                | LookupError::TaskPanicked(_)
        )
    }
}

impl From<std::io::Error> for LookupError {
    fn from(err: std::io::Error) -> Self {
        LookupError::Io(err.to_string())
    }
}

impl From<csv::Error> for LookupError {
    fn from(err: csv::Error) -> Self {
        LookupError::Output(err.to_string())
    }
}

impl From<url::ParseError> for LookupError {
    fn from(err: url::ParseError) -> Self {
        LookupError::Navigation(format!("invalid lookup URL: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(LookupError::Configuration("missing".to_string()).is_fatal());
        assert!(LookupError::ResumeDeclined.is_fatal());
        assert!(!LookupError::Interrupted.is_fatal());
        assert!(!LookupError::Timeout(Duration::from_secs(1)).is_fatal());
    }

    #[test]
    fn test_task_local_errors() {
        assert!(LookupError::Navigation("dns".to_string()).is_task_local());
        assert!(LookupError::Timeout(Duration::from_secs(3)).is_task_local());
        assert!(LookupError::TaskPanicked("boom".to_string()).is_task_local());
        assert!(!LookupError::Io("disk".to_string()).is_task_local());
        assert!(!LookupError::Interrupted.is_task_local());
    }

    #[test]
    fn test_io_conversion() {
        let err: LookupError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "barcodes.txt").into();
        assert!(matches!(err, LookupError::Io(_)));
        assert!(!err.is_fatal());
    }
}
