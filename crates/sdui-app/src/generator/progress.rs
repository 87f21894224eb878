use std::sync::Arc;
use image::DynamicImage;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;
use sdui_core::{ProgressCallback, Progress, RequestId};
use crate::events::{GenEvent, Outcome};
use crate::generator::handle::RequestState;

/// Engine-side end of a request's event channel.
///
/// Called synchronously on the engine thread. Sending never blocks (the
/// channel is unbounded) and steps that would move backwards are dropped, so
/// the handle only ever sees a non-decreasing sequence capped at `step_count`.
#[derive(Clone)]
pub struct ProgressBridge {
    request_id: RequestId,
    step_count: u32,
    state: Arc<RequestState>,
    events: UnboundedSender<GenEvent>,
}

impl ProgressBridge {
    pub(crate) fn new(
        request_id: RequestId,
        step_count: u32,
        state: Arc<RequestState>,
        events: UnboundedSender<GenEvent>,
    ) -> Self {
        Self {
            request_id,
            step_count,
            state,
            events,
        }
    }

    fn publish(&self, event: GenEvent) {
        // A dropped handle just means nobody is watching
        let _ = self.events.send(event);
    }

    /// Delivers the terminal event. On success, first tops progress up to
    /// `step_count` if the engine stopped reporting early.
    pub(crate) fn finish(&self, outcome: Outcome) {
        if matches!(outcome, Outcome::Succeeded(_)) && self.state.raise_step(self.step_count) {
            self.publish(GenEvent::Progress(Progress::new(self.step_count, self.step_count)));
        }
        self.publish(GenEvent::Finished(outcome));
    }
}

impl ProgressCallback for ProgressBridge {
    fn on_progress(&mut self, step: u32, _step_count: u32, preview: Option<&DynamicImage>) -> bool {
        let step = step.min(self.step_count);

        if self.state.raise_step(step) {
            trace!(request_id = %self.request_id, step, "Progress");
            self.publish(GenEvent::Progress(Progress {
                step,
                step_count: self.step_count,
                preview: preview.map(|image| Arc::new(image.clone())),
            }));
        }

        !self.state.is_cancelled()
    }
}
