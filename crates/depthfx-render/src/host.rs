//! Host integration points: frame scheduling and lifecycle events.

use std::sync::{Arc, Mutex};

/// Handle of a requested display frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(pub u64);

/// The host's per-display-frame callback.
///
/// The renderer requests exactly one frame at a time and cancels the
/// outstanding request when it is disposed or loses its context.
pub trait FrameScheduler: Send {
    fn request_frame(&mut self) -> FrameRequestId;
    fn cancel_frame(&mut self, id: FrameRequestId);
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: u64,
    pending: Option<FrameRequestId>,
    requested: u64,
    cancelled: u64,
}

/// Scheduler driven by an explicit loop, for headless hosts and tests.
///
/// Clones share state, so the host can keep one handle while the renderer
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ManualState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// The outstanding request, if any.
    pub fn pending(&self) -> Option<FrameRequestId> {
        self.with_state(|s| s.pending)
    }

    /// Consume the outstanding request before running a frame.
    pub fn take_pending(&self) -> Option<FrameRequestId> {
        self.with_state(|s| s.pending.take())
    }

    pub fn requested_count(&self) -> u64 {
        self.with_state(|s| s.requested)
    }

    pub fn cancelled_count(&self) -> u64 {
        self.with_state(|s| s.cancelled)
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameRequestId {
        self.with_state(|s| {
            s.next_id += 1;
            s.requested += 1;
            let id = FrameRequestId(s.next_id);
            s.pending = Some(id);
            id
        })
    }

    fn cancel_frame(&mut self, id: FrameRequestId) {
        self.with_state(|s| {
            if s.pending == Some(id) {
                s.pending = None;
                s.cancelled += 1;
            }
        })
    }
}

/// Lifecycle notifications for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// Initialization finished. `duration` is `None` for live media.
    Ready {
        width: u32,
        height: u32,
        duration: Option<f64>,
    },
    FrameAdvanced {
        frame: u64,
        time: f64,
    },
    Error {
        message: String,
    },
}

pub trait EventSink: Send {
    fn emit(&mut self, event: RendererEvent);
}

impl<F> EventSink for F
where
    F: FnMut(RendererEvent) + Send,
{
    fn emit(&mut self, event: RendererEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_scheduler_tracks_single_pending_request() {
        let host = ManualScheduler::new();
        let mut renderer_side = host.clone();

        let first = renderer_side.request_frame();
        assert_eq!(host.pending(), Some(first));
        assert_eq!(host.take_pending(), Some(first));
        assert_eq!(host.pending(), None);

        let second = renderer_side.request_frame();
        assert_ne!(first, second);
        renderer_side.cancel_frame(second);
        assert_eq!(host.pending(), None);
        assert_eq!(host.requested_count(), 2);
        assert_eq!(host.cancelled_count(), 1);
    }

    #[test]
    fn test_cancel_of_stale_request_is_ignored() {
        let mut scheduler = ManualScheduler::new();
        let stale = scheduler.request_frame();
        let current = scheduler.request_frame();
        scheduler.cancel_frame(stale);
        assert_eq!(scheduler.pending(), Some(current));
        assert_eq!(scheduler.cancelled_count(), 0);
    }

    #[test]
    fn test_closure_event_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |event: RendererEvent| seen.push(event);
            sink.emit(RendererEvent::Error {
                message: "boom".into(),
            });
        }
        assert_eq!(seen.len(), 1);
    }
}
