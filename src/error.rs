use thiserror::Error;

#[derive(Error, Debug)]
pub enum FwArchiveError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("Decryption of {path} failed: {message}")]
    Decryption { path: String, message: String },

    #[error("External tool `{tool}` failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Unrecognized archive format of the module file: {path}")]
    UnrecognizedArchive { path: String },

    #[error("Archive {path} is damaged: {message}")]
    Archive { path: String, message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for FwArchiveError {
    fn user_message(&self) -> String {
        match self {
            FwArchiveError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            FwArchiveError::InvalidPath { path } => {
                format!("Invalid file path: {}", path)
            }
            FwArchiveError::Decryption { path, message } => {
                format!("Could not decrypt {}: {}", path, message)
            }
            FwArchiveError::ExternalTool { tool, message } => {
                format!("Running `{}` failed: {}", tool, message)
            }
            FwArchiveError::UnrecognizedArchive { path } => {
                format!("Unrecognized archive format of the module file: {}", path)
            }
            FwArchiveError::Archive { path, message } => {
                format!("Archive {} could not be extracted: {}", path, message)
            }
            FwArchiveError::Cancelled => "Operation was cancelled by user".to_string(),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            FwArchiveError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all patterns are valid regular expressions.".to_string()
            ),
            FwArchiveError::Decryption { .. } => Some(
                "Verify the passphrase with --passphrase, or try --backend command to use the openssl binary.".to_string()
            ),
            FwArchiveError::ExternalTool { .. } => Some(
                "Make sure the openssl binary is installed and on PATH, or use --backend openssl.".to_string()
            ),
            FwArchiveError::UnrecognizedArchive { .. } => Some(
                "If this module family is known to be undecryptable or damaged, add its name pattern to extract.extra_unknown_format_patterns.".to_string()
            ),
            FwArchiveError::InvalidPath { .. } => Some(
                "Check that --input-root points at the directory produced by the firmware unpacking step.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<openssl::error::ErrorStack> for FwArchiveError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        let message = error
            .errors()
            .iter()
            .map(|e| e.reason().unwrap_or("No reason given").to_string())
            .collect::<Vec<_>>()
            .join(", ");

        FwArchiveError::Decryption {
            path: "envelope".to_string(),
            message: if message.is_empty() {
                error.to_string()
            } else {
                message
            },
        }
    }
}

impl From<zip::result::ZipError> for FwArchiveError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(e) => FwArchiveError::Io(e),
            other => FwArchiveError::Archive {
                path: "zip".to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<toml::de::Error> for FwArchiveError {
    fn from(error: toml::de::Error) -> Self {
        FwArchiveError::Config {
            message: error.to_string(),
        }
    }
}

impl From<regex::Error> for FwArchiveError {
    fn from(error: regex::Error) -> Self {
        FwArchiveError::Config {
            message: format!("Invalid pattern: {}", error),
        }
    }
}

pub type Result<T> = std::result::Result<T, FwArchiveError>;
