//! An in-process `MediaStreamSource`.
//!
//! `PullSource` is what gets activated when a caller doesn't bring its own MSS.
//! It records everything the adapter publishes and lets the caller drive the
//! session by raising the four events itself:
//! - `start` → `Starting`
//! - `request_sample` → `SampleRequested`
//! - `switch_streams` → `SwitchStreamsRequested`
//! - `close` → `Closed`
//!
//! Handlers are never invoked while the source's own lock is held, since they
//! call back into the source.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::codec::MediaType;
use crate::metadata::{MediaProperties, Thumbnail};
use crate::mss::{
    ClosedHandler, ErrorStatus, EventKind, EventToken, MediaSample, MediaStreamSource,
    SampleRequest, SampleRequestedHandler, StartingHandler, StartingRequest, StreamDescriptor,
    SwitchStreamsRequest, SwitchStreamsRequestedHandler,
};

type Shared<F> = Arc<F>;

#[derive(Default)]
struct Handlers {
    starting: Vec<(u64, Shared<dyn Fn(&mut StartingRequest) + Send + Sync>)>,
    sample_requested: Vec<(u64, Shared<dyn Fn(&mut SampleRequest) + Send + Sync>)>,
    switch_streams_requested: Vec<(u64, Shared<dyn Fn(&SwitchStreamsRequest) + Send + Sync>)>,
    closed: Vec<(u64, Shared<dyn Fn() + Send + Sync>)>,
}

impl Handlers {
    fn len(&self) -> usize {
        self.starting.len()
            + self.sample_requested.len()
            + self.switch_streams_requested.len()
            + self.closed.len()
    }

    fn remove(&mut self, token: EventToken) {
        let id = token.id;
        match token.kind {
            EventKind::Starting => self.starting.retain(|(i, _)| *i != id),
            EventKind::SampleRequested => self.sample_requested.retain(|(i, _)| *i != id),
            EventKind::SwitchStreamsRequested => {
                self.switch_streams_requested.retain(|(i, _)| *i != id)
            }
            EventKind::Closed => self.closed.retain(|(i, _)| *i != id),
        }
    }
}

#[derive(Default)]
struct SourceState {
    descriptors: Vec<StreamDescriptor>,
    selected: Vec<StreamDescriptor>,
    duration: Option<i64>,
    can_seek: bool,
    buffer_time: Option<i64>,
    thumbnail: Option<Thumbnail>,
    properties: Option<MediaProperties>,
    errors: Vec<ErrorStatus>,
    handlers: Handlers,
    next_token: u64,
    closed: bool,
}

/// The in-process host.
pub struct PullSource {
    state: Mutex<SourceState>,
    timed_metadata: bool,
}

impl Default for PullSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PullSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SourceState::default()),
            timed_metadata: true,
        }
    }

    /// A host without timed-metadata (subtitle) stream support.
    pub fn without_timed_metadata() -> Self {
        Self {
            timed_metadata: false,
            ..Self::new()
        }
    }

    // The state is plain data; a panic elsewhere can't leave it half-updated in a
    // way that matters, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise `Starting`. `None` resumes from the current position.
    pub fn start(&self, start_position: Option<i64>) -> StartingRequest {
        let mut request = StartingRequest::new(start_position);
        let handlers: Vec<_> = {
            let state = self.lock();
            if state.closed {
                return request;
            }
            state.handlers.starting.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in handlers {
            handler(&mut request);
        }
        request
    }

    /// Raise `SampleRequested` for one stream and return the delivered sample.
    pub fn request_sample(&self, descriptor: &StreamDescriptor) -> Option<MediaSample> {
        let mut request = SampleRequest::new(descriptor.clone());
        let handlers: Vec<_> = {
            let state = self.lock();
            if state.closed {
                return None;
            }
            state
                .handlers
                .sample_requested
                .iter()
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };
        for handler in handlers {
            handler(&mut request);
        }
        request.into_sample()
    }

    /// Raise `SwitchStreamsRequested` and update the host's selection.
    pub fn switch_streams(&self, old: Option<&StreamDescriptor>, new: Option<&StreamDescriptor>) {
        let request = SwitchStreamsRequest::new(old.cloned(), new.cloned());
        let handlers: Vec<_> = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            if let Some(old) = old {
                state.selected.retain(|d| d != old);
            }
            if let Some(new) = new {
                state.selected.push(new.clone());
            }
            state
                .handlers
                .switch_streams_requested
                .iter()
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };
        for handler in handlers {
            handler(&request);
        }
    }

    /// Raise `Closed`. Further events are ignored.
    pub fn close(&self) {
        let handlers: Vec<_> = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.handlers.closed.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in handlers {
            handler();
        }
    }

    pub fn stream_descriptors(&self) -> Vec<StreamDescriptor> {
        self.lock().descriptors.clone()
    }

    /// Streams the host currently plays: the first descriptor of each media
    /// type, as changed by `switch_streams`.
    pub fn selected_streams(&self) -> Vec<StreamDescriptor> {
        self.lock().selected.clone()
    }

    pub fn duration(&self) -> Option<i64> {
        self.lock().duration
    }

    pub fn can_seek(&self) -> bool {
        self.lock().can_seek
    }

    pub fn buffer_time(&self) -> Option<i64> {
        self.lock().buffer_time
    }

    pub fn thumbnail(&self) -> Option<Thumbnail> {
        self.lock().thumbnail.clone()
    }

    pub fn media_properties(&self) -> Option<MediaProperties> {
        self.lock().properties.clone()
    }

    pub fn errors(&self) -> Vec<ErrorStatus> {
        self.lock().errors.clone()
    }

    /// Number of registered handlers across all four events.
    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn next_token(state: &mut SourceState, kind: EventKind) -> EventToken {
        state.next_token += 1;
        EventToken {
            kind,
            id: state.next_token,
        }
    }
}

impl MediaStreamSource for PullSource {
    fn add_stream_descriptor(&self, descriptor: StreamDescriptor) {
        let mut state = self.lock();
        let media_type = descriptor.media_type();
        let first_of_type = media_type != MediaType::Subtitle
            && !state.descriptors.iter().any(|d| d.media_type() == media_type);
        if first_of_type {
            state.selected.push(descriptor.clone());
        }
        state.descriptors.push(descriptor);
    }

    fn set_duration(&self, duration_hns: i64) {
        self.lock().duration = Some(duration_hns);
    }

    fn set_can_seek(&self, can_seek: bool) {
        self.lock().can_seek = can_seek;
    }

    fn set_buffer_time(&self, buffer_time_hns: i64) {
        self.lock().buffer_time = Some(buffer_time_hns);
    }

    fn set_thumbnail(&self, thumbnail: Thumbnail) {
        self.lock().thumbnail = Some(thumbnail);
    }

    fn set_media_properties(&self, properties: MediaProperties) {
        self.lock().properties = Some(properties);
    }

    fn notify_error(&self, status: ErrorStatus) {
        debug!(?status, "media stream source error");
        self.lock().errors.push(status);
    }

    fn supports_timed_metadata(&self) -> bool {
        self.timed_metadata
    }

    fn on_starting(&self, handler: StartingHandler) -> EventToken {
        let mut state = self.lock();
        let token = Self::next_token(&mut state, EventKind::Starting);
        state.handlers.starting.push((token.id, Arc::from(handler)));
        token
    }

    fn on_sample_requested(&self, handler: SampleRequestedHandler) -> EventToken {
        let mut state = self.lock();
        let token = Self::next_token(&mut state, EventKind::SampleRequested);
        state
            .handlers
            .sample_requested
            .push((token.id, Arc::from(handler)));
        token
    }

    fn on_switch_streams_requested(&self, handler: SwitchStreamsRequestedHandler) -> EventToken {
        let mut state = self.lock();
        let token = Self::next_token(&mut state, EventKind::SwitchStreamsRequested);
        state
            .handlers
            .switch_streams_requested
            .push((token.id, Arc::from(handler)));
        token
    }

    fn on_closed(&self, handler: ClosedHandler) -> EventToken {
        let mut state = self.lock();
        let token = Self::next_token(&mut state, EventKind::Closed);
        state.handlers.closed.push((token.id, Arc::from(handler)));
        token
    }

    fn remove_handler(&self, token: EventToken) {
        self.lock().handlers.remove(token);
    }
}
