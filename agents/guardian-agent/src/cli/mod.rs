//! CLI module for the Guardian agent
//!
//! Signal intake, issue rendering, and patch proposal generation and checks.

pub mod commands;
pub mod output;

pub use commands::{GuardianCli, GuardianCommands};
pub use output::OutputFormat;

use crate::error::{AgentError, Result};

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// A transition was blocked, or a patch proposal failed its checks
    Rejected = 1,
    /// The care-case is not eligible for a patch proposal
    NotEligible = 2,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Exit code for an error that ended the command
    pub fn from_error(err: &AgentError) -> Self {
        match err {
            AgentError::FileError(_) => ExitCode::FileError,
            e if e.is_user_error() => ExitCode::InvalidInput,
            _ => ExitCode::InternalError,
        }
    }
}

/// Run a parsed command line
pub async fn run(cli: GuardianCli) -> Result<ExitCode> {
    match cli.command {
        GuardianCommands::Intake {
            signals,
            out,
            events,
            metrics,
            at,
            config,
            format,
        } => commands::execute_intake(signals, out, events, metrics, at, config, format).await,
        GuardianCommands::Render { case, title, .. } => commands::execute_render(case, title),
        GuardianCommands::Patch { case, write, pr } => commands::execute_patch(case, write, pr),
        GuardianCommands::CheckPatch {
            paths,
            branch,
            format,
        } => commands::execute_check_patch(paths, branch, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::GateError;

    #[test]
    fn test_exit_code_conversion() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::Rejected), 1);
        assert_eq!(i32::from(ExitCode::NotEligible), 2);
        assert_eq!(i32::from(ExitCode::InvalidInput), 3);
        assert_eq!(i32::from(ExitCode::InternalError), 10);
    }

    #[test]
    fn test_exit_code_from_error() {
        assert_eq!(
            ExitCode::from_error(&AgentError::file_error("gone")),
            ExitCode::FileError
        );
        assert_eq!(
            ExitCode::from_error(&GateError::validation("severity", "unknown").into()),
            ExitCode::InvalidInput
        );
        assert_eq!(
            ExitCode::from_error(&AgentError::InternalError("bug".into())),
            ExitCode::InternalError
        );
    }
}
