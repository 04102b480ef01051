//! # NHaml Parser
//!
//! Turns whitespace-significant NHaml markup into the read-only node tree
//! consumed by the compiler.
//!
//! ```rust
//! use nhaml_parser::{parse, Node};
//!
//! let doc = parse("%p Hello #{model.name}").unwrap();
//! assert!(matches!(doc.children[0], Node::Tag(_)));
//! ```

pub mod ast;
pub mod error;
pub mod parser;

pub use ast::{Document, Node, TagNode};
pub use error::{ParseError, ParseResult};
pub use parser::{parse, Parser};
