use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed tag on line {line} : {message}")]
    MalformedTag { line: usize, message: String },

    #[error("Malformed variable on line {line} : {variable}")]
    MalformedVariable { line: usize, variable: String },
}

impl ParseError {
    pub fn malformed_tag(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedTag {
            line,
            message: message.into(),
        }
    }

    pub fn malformed_variable(line: usize, variable: impl Into<String>) -> Self {
        Self::MalformedVariable {
            line,
            variable: variable.into(),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            ParseError::MalformedTag { line, .. } | ParseError::MalformedVariable { line, .. } => {
                *line
            }
        }
    }
}
