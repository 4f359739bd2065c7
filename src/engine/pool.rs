//! Image Model Pool
//!
//! Compiles OpenVINO models on first use and drops them again after they sit
//! idle, so a long-running service only holds the networks it is using.
//! The OpenVINO core itself is created lazily as well: a host without the
//! runtime still starts, and image requests report the load failure.

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use openvino::{CompiledModel, Core, InferRequest};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::{InferenceConfig, ModelsConfig};

/// OpenVINO core handle that may be moved between threads
struct SharedCore(Core);
unsafe impl Send for SharedCore {}

impl Deref for SharedCore {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SharedCore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Compiled model shared across request threads
#[derive(Clone)]
pub struct LoadedModel(Arc<Mutex<CompiledModel>>);
unsafe impl Send for LoadedModel {}
unsafe impl Sync for LoadedModel {}

impl LoadedModel {
    /// Create a fresh inference request. Requests are independent, the lock
    /// only covers the call into the compiled model.
    pub fn create_infer_request(&self) -> anyhow::Result<InferRequest> {
        let mut compiled = self.0.lock();
        compiled
            .create_infer_request()
            .context("failed to create inference request")
    }
}

/// Models served by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Detector,
    Emotion,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Detector, ModelKind::Emotion];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Detector => "detector",
            ModelKind::Emotion => "emotion",
        }
    }
}

struct ModelSlot {
    path: PathBuf,
    cached: RwLock<Option<(LoadedModel, Instant)>>,
}

impl ModelSlot {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cached: RwLock::new(None),
        }
    }

    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        match *self.cached.read() {
            Some((_, last_access)) => now.duration_since(last_access) > timeout,
            None => false,
        }
    }
}

/// Lazily loading, idle-unloading pool of OpenVINO models
pub struct ModelPool {
    core: Mutex<Option<SharedCore>>,
    device: String,
    idle_timeout: Duration,
    detector: ModelSlot,
    emotion: ModelSlot,
    shutdown: Notify,
}

impl ModelPool {
    pub fn new(inference: &InferenceConfig, models: &ModelsConfig) -> Self {
        Self {
            core: Mutex::new(None),
            device: inference.device.clone(),
            idle_timeout: Duration::from_secs(inference.model_idle_timeout),
            detector: ModelSlot::new(models.detector.clone()),
            emotion: ModelSlot::new(models.emotion.clone()),
            shutdown: Notify::new(),
        }
    }

    fn slot(&self, kind: ModelKind) -> &ModelSlot {
        match kind {
            ModelKind::Detector => &self.detector,
            ModelKind::Emotion => &self.emotion,
        }
    }

    /// Get a compiled model, compiling it on first use
    pub fn get_model(&self, kind: ModelKind) -> anyhow::Result<LoadedModel> {
        let slot = self.slot(kind);

        {
            let mut guard = slot.cached.write();
            if let Some((model, last_access)) = guard.as_mut() {
                *last_access = Instant::now();
                return Ok(model.clone());
            }
        }

        // Compile outside the slot lock; a concurrent loader may win the race
        let model = self.compile(kind, slot)?;

        let mut guard = slot.cached.write();
        if let Some((existing, last_access)) = guard.as_mut() {
            *last_access = Instant::now();
            return Ok(existing.clone());
        }
        *guard = Some((model.clone(), Instant::now()));
        Ok(model)
    }

    fn compile(&self, kind: ModelKind, slot: &ModelSlot) -> anyhow::Result<LoadedModel> {
        let path = slot
            .path
            .to_str()
            .with_context(|| format!("model path {:?} is not valid UTF-8", slot.path))?;

        info!("Loading {} model from {}", kind.as_str(), path);
        let start = Instant::now();

        let mut core_guard = self.core.lock();
        if core_guard.is_none() {
            let core = Core::new().context("failed to initialise OpenVINO runtime")?;
            *core_guard = Some(SharedCore(core));
        }
        let core = core_guard
            .as_mut()
            .context("OpenVINO runtime unavailable")?;

        let model = core
            .read_model_from_file(path, "")
            .with_context(|| format!("failed to read {} model", kind.as_str()))?;
        let compiled = core
            .compile_model(&model, self.device.as_str().into())
            .with_context(|| format!("failed to compile {} model for {}", kind.as_str(), self.device))?;

        info!("Model {} loaded in {:?}", kind.as_str(), start.elapsed());
        Ok(LoadedModel(Arc::new(Mutex::new(compiled))))
    }

    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        self.slot(kind).cached.read().is_some()
    }

    pub fn status(&self) -> Vec<(ModelKind, bool)> {
        ModelKind::ALL
            .iter()
            .map(|&kind| (kind, self.is_loaded(kind)))
            .collect()
    }

    fn cleanup_idle_models(&self) {
        let now = Instant::now();
        for kind in ModelKind::ALL {
            let slot = self.slot(kind);
            if slot.is_idle(now, self.idle_timeout) {
                info!("Unloading idle model: {}", kind.as_str());
                *slot.cached.write() = None;
            }
        }
    }

    /// Periodically unload idle models until shutdown is signalled
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let check_interval = Duration::from_secs(60);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {
                    debug!("Running model cleanup check");
                    self.cleanup_idle_models();
                }
                _ = self.shutdown.notified() => {
                    info!("Model pool cleanup task shutting down");
                    break;
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for ModelPool {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}
