//! Process exit codes
//!
//! Scripts rely on these values; they must stay stable across releases.

use s3tk_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Everything succeeded
    Success = 0,
    /// Partial failure or unexpected error
    GeneralError = 1,
    /// Bad arguments or configuration
    UsageError = 2,
    /// Network or transport failure
    NetworkError = 3,
    /// Bucket or object not found
    NotFound = 5,
}

impl ExitCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Exit code for a fatal engine error
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Config(_) | Error::InvalidPath(_) | Error::TomlParse(_) => ExitCode::UsageError,
            Error::Network(_) => ExitCode::NetworkError,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Auth(_) | Error::Service { .. } | Error::Io(_) | Error::General(_) => {
                ExitCode::GeneralError
            }
        }
    }

    /// Success unless the operation reported per-item failures
    pub fn from_outcome(has_errors: bool) -> Self {
        if has_errors {
            ExitCode::GeneralError
        } else {
            ExitCode::Success
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ExitCode::from_error(&Error::Config("overlap".into())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from_error(&Error::Network("reset".into())),
            ExitCode::NetworkError
        );
        assert_eq!(
            ExitCode::from_error(&Error::NotFound("s3://b/k".into())),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_error(&Error::Service {
                code: "InternalError".into(),
                message: "boom".into()
            }),
            ExitCode::GeneralError
        );
    }

    #[test]
    fn test_outcome() {
        assert_eq!(ExitCode::from_outcome(false).as_u8(), 0);
        assert_eq!(ExitCode::from_outcome(true).as_u8(), 1);
    }
}
