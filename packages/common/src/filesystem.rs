use crate::result::CommonResult;
use nhaml_parser::Document;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// File system abstraction for template loading and testing
pub trait TemplateFileSystem: Send + Sync {
    /// Check if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Read a template file to a string
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Read and parse a template file
    fn load_document(&self, path: &Path) -> CommonResult<Document> {
        let source = self.read_to_string(path)?;
        Ok(nhaml_parser::parse(&source)?)
    }
}

/// Real file system implementation
pub struct RealFileSystem;

impl TemplateFileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory file system for testing
#[derive(Debug, Default)]
pub struct MockFileSystem {
    pub files: HashMap<PathBuf, String>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        self.add_file(path, source);
        self
    }
}

impl TemplateFileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommonError;

    #[test]
    fn test_mock_file_system_loads_document() {
        let fs = MockFileSystem::new().with_file("/views/index.haml", "%p hi");
        assert!(fs.exists(Path::new("/views/index.haml")));
        let doc = fs.load_document(Path::new("/views/index.haml")).unwrap();
        assert_eq!(doc.children.len(), 1);
    }

    #[test]
    fn test_mock_file_system_missing_file() {
        let fs = MockFileSystem::new();
        let err = fs.load_document(Path::new("/nope.haml")).unwrap_err();
        match err {
            CommonError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {:?}", other),
        }
        assert!(fs.load_document(Path::new("/nope.haml")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_parse_errors_surface() {
        let fs = MockFileSystem::new().with_file("/bad.haml", "%a(href=\"x\"");
        let err = fs.load_document(Path::new("/bad.haml")).unwrap_err();
        assert!(matches!(err, CommonError::Parse(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_real_file_system() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.haml");
        std::fs::write(&path, "%h1 Title").unwrap();

        let fs = RealFileSystem;
        assert!(fs.exists(&path));
        assert!(!fs.exists(&dir.path().join("missing.haml")));
        assert_eq!(fs.load_document(&path).unwrap().children.len(), 1);
    }
}
