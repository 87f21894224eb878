use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use sdui_core::{Error, GenerationRequest, GenerationStatus, Progress, RequestId};
use crate::events::{GenEvent, Outcome};

/// Lifecycle state of one in-flight request, shared between the caller's
/// handle, the progress bridge and the background task.
#[derive(Debug)]
pub(crate) struct RequestState {
    inner: Mutex<StateInner>,
    // Read on the engine thread without taking the lock
    cancel_requested: AtomicBool,
    last_step: AtomicU32,
}

#[derive(Debug)]
struct StateInner {
    request: GenerationRequest,
    committing: bool,
}

impl RequestState {
    pub(crate) fn new(request: GenerationRequest) -> Self {
        Self {
            inner: Mutex::new(StateInner {
                request,
                committing: false,
            }),
            cancel_requested: AtomicBool::new(false),
            last_step: AtomicU32::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> GenerationStatus {
        self.lock().request.status()
    }

    pub(crate) fn request(&self) -> GenerationRequest {
        self.lock().request.clone()
    }

    /// Marks the request Cancelled unless its result is already being committed.
    pub(crate) fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.committing {
            return false;
        }
        let cancelled = inner.request.advance(GenerationStatus::Cancelled);
        if cancelled {
            self.cancel_requested.store(true, Ordering::Release);
        }
        cancelled
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Claims the right to persist. Fails if the request is no longer Running.
    pub(crate) fn begin_commit(&self) -> bool {
        let mut inner = self.lock();
        if inner.request.status() != GenerationStatus::Running {
            return false;
        }
        inner.committing = true;
        true
    }

    pub(crate) fn finish(&self, status: GenerationStatus) {
        let mut inner = self.lock();
        inner.request.advance(status);
        inner.committing = false;
    }

    /// Raises the recorded step. Returns false when `step` would not move it forward.
    pub(crate) fn raise_step(&self, step: u32) -> bool {
        self.last_step.fetch_max(step, Ordering::AcqRel) < step
    }
}

/// Caller's view of a submitted request.
///
/// Events arrive over a single-consumer channel, so the handle can be drained
/// from any thread or task at its own pace.
pub struct RequestHandle {
    id: RequestId,
    seed: u32,
    state: Arc<RequestState>,
    events: UnboundedReceiver<GenEvent>,
}

impl RequestHandle {
    pub(crate) fn new(state: Arc<RequestState>, events: UnboundedReceiver<GenEvent>) -> Self {
        let request = state.request();
        Self {
            id: request.id(),
            seed: request.seed(),
            state,
            events,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Seed the request was dispatched with.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn status(&self) -> GenerationStatus {
        self.state.status()
    }

    pub fn request(&self) -> GenerationRequest {
        self.state.request()
    }

    /// Advisory cancellation. The engine may keep running, but its result is
    /// discarded instead of persisted. Returns false if it is too late.
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }

    /// Non-blocking poll, for callers that drain once per frame.
    pub fn try_next_event(&mut self) -> Option<GenEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub async fn next_event(&mut self) -> Option<GenEvent> {
        self.events.recv().await
    }

    pub async fn wait(self) -> Outcome {
        self.wait_with_progress(|_| {}).await
    }

    /// Drains progress into `on_progress` until the terminal outcome arrives.
    pub async fn wait_with_progress(mut self, mut on_progress: impl FnMut(&Progress)) -> Outcome {
        while let Some(event) = self.events.recv().await {
            match event {
                GenEvent::Progress(progress) => on_progress(&progress),
                GenEvent::Finished(outcome) => return outcome,
            }
        }

        Outcome::Failed(Error::Inference(
            "generation task ended without reporting an outcome".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use sdui_core::{ProgressCallback, SamplingParams};
    use crate::generator::progress::ProgressBridge;

    fn running_state() -> RequestState {
        let mut request = GenerationRequest::new(SamplingParams::new("x"), 1);
        request.advance(GenerationStatus::Running);
        RequestState::new(request)
    }

    #[test]
    fn test_cancel_blocks_commit() {
        let state = running_state();
        assert!(state.cancel());
        assert!(state.is_cancelled());
        assert_eq!(state.status(), GenerationStatus::Cancelled);
        assert!(!state.begin_commit());
    }

    #[test]
    fn test_commit_blocks_cancel() {
        let state = running_state();
        assert!(state.begin_commit());
        assert!(!state.cancel());
        assert!(!state.is_cancelled());

        state.finish(GenerationStatus::Succeeded);
        assert_eq!(state.status(), GenerationStatus::Succeeded);
        assert!(!state.cancel());
    }

    #[test]
    fn test_raise_step_is_monotonic() {
        let state = running_state();
        assert!(state.raise_step(2));
        assert!(!state.raise_step(1));
        assert!(!state.raise_step(2));
        assert!(state.raise_step(5));
        assert!(!state.raise_step(4));
    }

    #[test]
    fn test_try_next_event_drains_until_finished() {
        let state = Arc::new(running_state());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut handle = RequestHandle::new(state.clone(), rx);
        let mut bridge = ProgressBridge::new(handle.id(), 3, state.clone(), tx);

        // Nothing reported yet
        assert!(handle.try_next_event().is_none());

        bridge.on_progress(1, 3, None);
        bridge.on_progress(3, 3, None);
        assert!(handle.cancel());
        bridge.finish(Outcome::Cancelled);
        drop(bridge);

        let mut steps = Vec::new();
        let outcome = loop {
            match handle.try_next_event() {
                Some(GenEvent::Progress(progress)) => steps.push(progress.step),
                Some(GenEvent::Finished(outcome)) => break outcome,
                None => panic!("handle drained before the outcome arrived"),
            }
        };

        assert_eq!(steps, vec![1, 3]);
        assert!(matches!(outcome, Outcome::Cancelled));
        assert!(handle.try_next_event().is_none());
        assert_eq!(handle.status(), GenerationStatus::Cancelled);
    }
}
