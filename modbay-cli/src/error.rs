//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and the documented exit codes: 0 ok, 1 generic error, 2 unsatisfied
//! relationships, 3 conflicts.

use modbay::repository::UpdateError;
use modbay::resolver::ResolverError;
use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Repository update failure
    Update(UpdateError),
    /// A requested module does not exist in any repository
    NotFound(String),
    /// Dependencies could not be satisfied
    Unsatisfied { traces: Vec<String> },
    /// The requested set conflicts with itself or the installed state
    Conflicts { reasons: Vec<String> },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Unsatisfied { .. } => 2,
            CliError::Conflicts { .. } => 3,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Unsatisfied { traces } => {
                eprintln!();
                eprintln!("These requirements could not be met:");
                for trace in traces {
                    eprintln!("  {}", trace);
                }
            }
            CliError::Conflicts { reasons } => {
                eprintln!();
                eprintln!("Conflicting modules:");
                for reason in reasons {
                    eprintln!("  {}", reason);
                }
            }
            CliError::Update(_) => {
                eprintln!();
                eprintln!("Nothing was changed; re-run 'modbay update' to retry.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "configuration error: {}", msg),
            CliError::Update(e) => write!(f, "repository update failed: {}", e),
            CliError::NotFound(identifier) => {
                write!(f, "module '{}' not found in any repository", identifier)
            }
            CliError::Unsatisfied { traces } => {
                write!(f, "{} requirement(s) could not be satisfied", traces.len())
            }
            CliError::Conflicts { reasons } => {
                write!(f, "{} conflict(s) prevent installation", reasons.len())
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Update(e) => Some(e),
            _ => None,
        }
    }
}

impl From<UpdateError> for CliError {
    fn from(e: UpdateError) -> Self {
        CliError::Update(e)
    }
}

impl From<ResolverError> for CliError {
    fn from(e: ResolverError) -> Self {
        match e {
            ResolverError::UnmetDependencies { traces } => CliError::Unsatisfied {
                traces: traces
                    .iter()
                    .map(|path| {
                        path.iter()
                            .map(|node| node.to_string())
                            .collect::<Vec<_>>()
                            .join(" -> ")
                    })
                    .collect(),
            },
            ResolverError::Conflicts { pairs } => CliError::Conflicts {
                reasons: pairs
                    .iter()
                    .map(|record| format!("{} (via {})", record.source, record.descriptor))
                    .collect(),
            },
        }
    }
}
