//! CLI error type.

use std::fmt;
use std::process::ExitCode;

/// Errors surfaced to the command line.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or missing settings.
    Config(String),
    /// Logging could not be set up.
    Logging(String),
    /// The async runtime could not be started.
    Runtime(String),
    /// The run itself failed.
    Run(earthmesh::Error),
}

impl CliError {
    /// Exit status reported for this error.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::FAILURE
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging setup failed: {}", msg),
            CliError::Runtime(msg) => write!(f, "Failed to start runtime: {}", msg),
            CliError::Run(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Run(e) => Some(e),
            _ => None,
        }
    }
}

impl From<earthmesh::Error> for CliError {
    fn from(e: earthmesh::Error) -> Self {
        match e {
            earthmesh::Error::Config(msg) => CliError::Config(msg),
            other => CliError::Run(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_unwrapped() {
        let err: CliError = earthmesh::Error::Config("origin needs exactly 3 components".into()).into();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: origin needs exactly 3 components"
        );
    }

    #[test]
    fn test_run_errors_keep_source() {
        let err: CliError = earthmesh::Error::transport("https://x/root.json", "HTTP 403").into();
        assert!(matches!(err, CliError::Run(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
