use nhaml_parser::ParseError;
use thiserror::Error;

/// Errors raised while loading a template from a file system
#[derive(Error, Debug)]
pub enum CommonError {
    /// The file was read but is not a valid template
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommonError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CommonError::Io(io) if io.kind() == std::io::ErrorKind::NotFound)
    }
}
