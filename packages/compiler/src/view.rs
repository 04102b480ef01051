use crate::code_host::ExpressionCompiler;
use crate::context::RenderContext;
use crate::error::{CompileError, CompileResult, RenderError, ViewError};
use crate::options::CompileOptions;
use crate::renderer::Renderer;
use crate::walker::Walker;
use nhaml_common::TemplateFileSystem;
use serde::Serialize;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Walk, batch compile and assemble a view for `model_type`
///
/// Blocking. Exactly one call is made into `backend`.
#[instrument(skip(context, backend, options))]
pub fn compile_view(
    context: &RenderContext,
    backend: &dyn ExpressionCompiler,
    options: &CompileOptions,
    model_type: &str,
) -> CompileResult<Renderer> {
    let walk = Walker::new(context, model_type, options.unit_sharing).walk_view()?;
    let units = walk.host.compile(backend, &options.references)?;
    let renderer = Renderer::assemble(model_type, &walk.ops, &units)?;

    info!(
        model_type,
        units = renderer.unit_count(),
        partials = context.parsed_partials(),
        "compiled view"
    );
    Ok(renderer)
}

type CompileTask = JoinHandle<CompileResult<Renderer>>;

/// Cache entry for one model type
#[derive(Default)]
struct Slot {
    renderer: OnceCell<Arc<Renderer>>,
    /// Compile that outlived a timed out request; the next request joins it
    in_flight: AsyncMutex<Option<CompileTask>>,
}

type CacheSlot = Arc<Slot>;

/// A layout + main template pair with its per-model-type routine cache
///
/// The first render for a model type compiles; concurrent first renders
/// wait on the same slot. Failed compiles are not cached. A compile that
/// times out keeps running and later requests wait on it instead of
/// starting another.
pub struct View {
    context: Arc<RenderContext>,
    backend: Arc<dyn ExpressionCompiler>,
    options: CompileOptions,
    cache: Mutex<HashMap<TypeId, CacheSlot>>,
}

impl View {
    pub fn new(
        context: RenderContext,
        backend: Arc<dyn ExpressionCompiler>,
        options: CompileOptions,
    ) -> Self {
        Self {
            context: Arc::new(context),
            backend,
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Parse `layout` (optional) and `main` from `fs` and build a view
    pub fn load(
        layout: Option<&Path>,
        main: &Path,
        fs: Arc<dyn TemplateFileSystem>,
        backend: Arc<dyn ExpressionCompiler>,
        options: CompileOptions,
    ) -> CompileResult<Self> {
        let context = RenderContext::load(layout, main, fs, options.template_extension.clone())?;
        Ok(Self::new(context, backend, options))
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Cached routine for `M`, compiling it on first use
    pub async fn renderer<M: 'static>(&self) -> CompileResult<Arc<Renderer>> {
        let slot = self.slot(TypeId::of::<M>());
        let renderer = slot
            .renderer
            .get_or_try_init(|| self.compile_detached(&slot.in_flight, type_name::<M>()))
            .await?;
        Ok(renderer.clone())
    }

    /// Render `model` into `sink`
    pub async fn render<M: Serialize + 'static>(
        &self,
        model: &M,
        sink: &mut (dyn fmt::Write + Send),
    ) -> Result<(), ViewError> {
        let renderer = self.renderer::<M>().await?;
        let value = serde_json::to_value(model).map_err(RenderError::from)?;
        renderer.render(sink, &value)?;
        Ok(())
    }

    pub async fn render_to_string<M: Serialize + 'static>(
        &self,
        model: &M,
    ) -> Result<String, ViewError> {
        let mut out = String::new();
        self.render(model, &mut out).await?;
        Ok(out)
    }

    /// Number of model types with a cached routine
    pub fn compiled_types(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.renderer.initialized())
            .count()
    }

    fn slot(&self, key: TypeId) -> CacheSlot {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    async fn compile_detached(
        &self,
        in_flight: &AsyncMutex<Option<CompileTask>>,
        model_type: &'static str,
    ) -> CompileResult<Arc<Renderer>> {
        let limit = self.options.compile_timeout();
        let mut in_flight = in_flight.lock().await;

        if in_flight.is_some() {
            debug!(model_type, "joining compile already in flight");
        }
        let task = in_flight.get_or_insert_with(|| self.spawn_compile(model_type));

        let joined = match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(model_type, ?limit, "view compile timed out");
                return Err(CompileError::Timeout(limit));
            }
        };
        *in_flight = None;

        match joined {
            Ok(result) => result.map(Arc::new).map_err(|err| {
                warn!(model_type, error = %err, "view compile failed");
                err
            }),
            Err(join) => {
                warn!(model_type, error = %join, "view compile task aborted");
                Err(CompileError::Aborted(join.to_string()))
            }
        }
    }

    fn spawn_compile(&self, model_type: &'static str) -> CompileTask {
        let context = self.context.clone();
        let backend = self.backend.clone();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            compile_view(&context, backend.as_ref(), &options, model_type)
        })
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("options", &self.options)
            .field("compiled_types", &self.compiled_types())
            .finish()
    }
}
