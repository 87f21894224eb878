#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;
use tokio::runtime::Handle;
use tokio::sync::watch;
use sdui_app::{ArtifactWriter, Generator, ImageDatabase, MetadataStore, Outcome, RequestHandle, SortOrder};
use sdui_core::{DiffusionEngine, EngineError, Error, GenerationInput, ImageRecord, ProgressCallback, RequestId};

/// Engine that replays a fixed list of progress steps.
pub struct ScriptedEngine {
    steps: Vec<u32>,
    failure: Option<EngineError>,
    no_images: bool,
    honor_cancel: bool,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    barrier: Option<Arc<Barrier>>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    /// Reports every step from 1 to `step_count` and returns one red image per requested image.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            failure: None,
            no_images: false,
            honor_cancel: false,
            gate: None,
            barrier: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_steps(mut self, steps: &[u32]) -> Self {
        self.steps = steps.to_vec();
        self
    }

    pub fn failing(mut self, err: EngineError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn without_images(mut self) -> Self {
        self.no_images = true;
        self
    }

    pub fn honoring_cancel(mut self) -> Self {
        self.honor_cancel = true;
        self
    }

    /// Blocks after the first reported step until the returned sender fires.
    pub fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(Mutex::new(rx));
        (self, tx)
    }

    /// Holds every call until `parties` calls are in flight at once.
    pub fn meeting_at(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DiffusionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        input: &GenerationInput<'_>,
        progress: &mut dyn ProgressCallback,
    ) -> Result<Vec<DynamicImage>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(barrier) = &self.barrier {
            barrier.wait();
        }

        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([200, 20, 20])));
        let steps: Vec<u32> = if self.steps.is_empty() {
            (1..=input.step_count).collect()
        } else {
            self.steps.clone()
        };

        for (i, step) in steps.into_iter().enumerate() {
            let keep_going = progress.on_progress(step, input.step_count, Some(&image));
            if !keep_going && self.honor_cancel {
                return Err(EngineError::Cancelled);
            }
            if i == 0 {
                if let Some(gate) = &self.gate {
                    let _ = gate.lock().unwrap().recv();
                }
            }
        }

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.no_images {
            return Ok(Vec::new());
        }

        Ok((0..input.image_count).map(|_| image.clone()).collect())
    }
}

/// Store whose appends always fail; reads go to a real database.
pub struct RejectingStore {
    pub inner: ImageDatabase,
}

#[async_trait]
impl MetadataStore for RejectingStore {
    async fn append(&self, _record: &ImageRecord) -> Result<(), Error> {
        Err(Error::Persistence("disk full".to_string()))
    }

    async fn list_ordered(&self, order: SortOrder) -> Result<Vec<ImageRecord>, Error> {
        self.inner.list_ordered(order).await
    }

    async fn get(&self, id: RequestId) -> Result<Option<ImageRecord>, Error> {
        self.inner.get(id).await
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.subscribe()
    }
}

pub struct Fixture {
    pub root: TempDir,
    pub engine: Arc<ScriptedEngine>,
    pub store: Arc<dyn MetadataStore>,
    pub artifacts: ArtifactWriter,
    pub generator: Generator,
}

impl Fixture {
    pub async fn new(engine: ScriptedEngine) -> Self {
        let store: Arc<dyn MetadataStore> = Arc::new(ImageDatabase::in_memory().await.unwrap());
        Self::with_store(engine, store)
    }

    pub fn with_store(engine: ScriptedEngine, store: Arc<dyn MetadataStore>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let artifacts = ArtifactWriter::under_pictures(root.path());
        let engine = Arc::new(engine);
        let generator = Generator::with_parts(
            Ok(engine.clone() as Arc<dyn DiffusionEngine>),
            artifacts.clone(),
            store.clone(),
            Handle::current(),
        );

        Self {
            root,
            engine,
            store,
            artifacts,
            generator,
        }
    }

    pub fn artifact_count(&self) -> usize {
        match std::fs::read_dir(self.artifacts.dir()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

pub async fn finish(handle: RequestHandle) -> Outcome {
    tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("generation did not finish")
}

/// Waits for the first progress event, so the engine is known to be running.
pub async fn first_step(handle: &mut RequestHandle) -> u32 {
    let event = tokio::time::timeout(Duration::from_secs(10), handle.next_event())
        .await
        .expect("no progress reported");
    match event {
        Some(sdui_app::GenEvent::Progress(progress)) => progress.step,
        other => panic!("expected progress, got {other:?}"),
    }
}
