use crate::error::{CompileError, CompileResult};
use nhaml_common::TemplateFileSystem;
use nhaml_parser::Document;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Layout root, main template and partial lookup for one view
///
/// Partials are parsed on first use and memoised. The memo lock is held
/// while parsing so two walks never parse the same partial twice.
pub struct RenderContext {
    layout: Option<Arc<Document>>,
    main: Arc<Document>,
    main_dir: PathBuf,
    extension: String,
    fs: Arc<dyn TemplateFileSystem>,
    partials: Mutex<HashMap<PathBuf, Arc<Document>>>,
}

impl RenderContext {
    /// Parse the layout (if any) and main template from `fs`
    pub fn load(
        layout_path: Option<&Path>,
        main_path: &Path,
        fs: Arc<dyn TemplateFileSystem>,
        extension: impl Into<String>,
    ) -> CompileResult<Self> {
        let layout = layout_path
            .map(|path| load_document(fs.as_ref(), path))
            .transpose()?;
        let main = load_document(fs.as_ref(), main_path)?;
        let main_dir = main_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self::from_documents(layout, main, main_dir, fs, extension))
    }

    /// Build from already parsed trees. Partials still resolve through `fs`
    /// relative to `main_dir`.
    pub fn from_documents(
        layout: Option<Document>,
        main: Document,
        main_dir: impl Into<PathBuf>,
        fs: Arc<dyn TemplateFileSystem>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            layout: layout.map(Arc::new),
            main: Arc::new(main),
            main_dir: main_dir.into(),
            extension: extension.into(),
            fs,
            partials: Mutex::new(HashMap::new()),
        }
    }

    pub fn layout(&self) -> Option<&Arc<Document>> {
        self.layout.as_ref()
    }

    pub fn main_template(&self) -> &Arc<Document> {
        &self.main
    }

    /// Tree the walk starts from: the layout, or the main template when
    /// there is no layout
    pub fn root(&self) -> &Arc<Document> {
        self.layout.as_ref().unwrap_or(&self.main)
    }

    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    /// File path a `render 'name'` directive refers to
    pub fn partial_path(&self, name: &str) -> PathBuf {
        let relative = Path::new(name);
        let mut file_name = relative
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let suffix = format!(".{}", self.extension.trim_start_matches('.'));
        if suffix.len() > 1 && !file_name.ends_with(&suffix) {
            file_name.push_str(&suffix);
        }
        file_name.insert(0, '_');

        match relative.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => self.main_dir.join(dir).join(file_name),
            _ => self.main_dir.join(file_name),
        }
    }

    /// Resolve and parse a partial, memoised by path
    pub fn resolve_partial(&self, name: &str) -> CompileResult<(PathBuf, Arc<Document>)> {
        let path = self.partial_path(name);
        let mut partials = self
            .partials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(doc) = partials.get(&path) {
            return Ok((path, doc.clone()));
        }

        if !self.fs.exists(&path) {
            return Err(CompileError::PartialNotFound { path });
        }

        debug!(path = %path.display(), "parsing partial");
        let doc = Arc::new(load_document(self.fs.as_ref(), &path)?);
        partials.insert(path.clone(), doc.clone());
        Ok((path, doc))
    }

    /// Number of partials parsed so far
    pub fn parsed_partials(&self) -> usize {
        self.partials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn load_document(fs: &dyn TemplateFileSystem, path: &Path) -> CompileResult<Document> {
    fs.load_document(path)
        .map_err(|err| CompileError::from_load(path.to_path_buf(), err))
}
