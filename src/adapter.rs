//! The adapter core: one media session between a codec library and an MSS.
//!
//! `Interop` is the entry point. It opens the input, enumerates streams into
//! sample providers, publishes them to the MSS and subscribes to the four MSS
//! events. From then on the session is driven by the host:
//! - `Starting` seeks (or resumes)
//! - `SampleRequested` pulls one sample through the stream's provider
//! - `SwitchStreamsRequested` deselects / selects providers
//! - `Closed` releases the byte source and unsubscribes
//!
//! Ownership: the MSS owns the handlers, the handlers own the adapter, and the
//! adapter only holds a weak reference back to the MSS. Unsubscribing on
//! `Closed` is what lets the adapter drop.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, info_span, warn};

use crate::backends::symphonia::SymphoniaLibrary;
use crate::byte_source::{ByteSource, ByteSourceHandle};
use crate::codec::{CodecLibrary, Discard, FormatContext, MediaType, SeekFlags};
use crate::config::Config;
use crate::metadata::{MediaProperties, thumbnail_from_stream};
use crate::mss::{
    ErrorStatus, EventToken, MediaStreamSource, SampleRequest, StartingRequest, StreamDescriptor,
    SwitchStreamsRequest,
};
use crate::open::{open_with_stream, open_with_uri};
use crate::reader::Reader;
use crate::sample_provider::SampleProvider;
use crate::stream_factory::{DefaultStreamFactory, StreamFactory, StreamPair};
use crate::time::{TIME_BASE, from_codec_time, to_codec_time};
use crate::{Error, Result};

/// Creates media sessions.
///
/// Holds the codec library that opens inputs and the factory that turns
/// streams into sample providers. One `Interop` can create any number of
/// independent sessions.
pub struct Interop<L = SymphoniaLibrary, F = DefaultStreamFactory> {
    library: L,
    factory: F,
}

impl Interop {
    /// The built-in symphonia library with the pass-through stream factory.
    pub fn new() -> Self {
        Self::with_library(SymphoniaLibrary::default())
    }
}

impl Default for Interop {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: CodecLibrary> Interop<L> {
    pub fn with_library(library: L) -> Self {
        Self {
            library,
            factory: DefaultStreamFactory,
        }
    }
}

impl<L: CodecLibrary, F: StreamFactory> Interop<L, F> {
    /// Swap the stream factory, keeping the codec library.
    pub fn with_stream_factory<G: StreamFactory>(self, factory: G) -> Interop<L, G> {
        Interop {
            library: self.library,
            factory,
        }
    }

    /// Start a session reading from a host byte source.
    ///
    /// When `mss` is `None` a default one is activated. Either way the MSS is
    /// returned on success. On failure the MSS is notified with
    /// `ErrorStatus::UnsupportedMediaFormat` and the error is returned.
    pub fn create_from_stream<M>(
        &self,
        source: impl ByteSource + 'static,
        mss: Option<Arc<M>>,
        config: Option<&Config>,
    ) -> Result<Arc<M>>
    where
        M: MediaStreamSource + Default + 'static,
    {
        self.create_from_stream_with(source, mss.unwrap_or_default(), config)
    }

    /// `create_from_stream` for a host-supplied MSS, which need not be `Default`.
    pub fn create_from_stream_with<M>(
        &self,
        source: impl ByteSource + 'static,
        mss: Arc<M>,
        config: Option<&Config>,
    ) -> Result<Arc<M>>
    where
        M: MediaStreamSource + 'static,
    {
        let span = info_span!("create_from_stream");
        let _enter = span.enter();

        let handle = ByteSourceHandle::new(source);
        let result = open_with_stream(&self.library, &handle, config)
            .and_then(|format| self.start_session(&mss, format, Some(handle), config));

        finish_creation(mss, result)
    }

    /// Start a session over a url the codec library opens by itself.
    ///
    /// Same contract as `create_from_stream`.
    pub fn create_from_uri<M>(
        &self,
        uri: &str,
        mss: Option<Arc<M>>,
        config: Option<&Config>,
    ) -> Result<Arc<M>>
    where
        M: MediaStreamSource + Default + 'static,
    {
        self.create_from_uri_with(uri, mss.unwrap_or_default(), config)
    }

    /// `create_from_uri` for a host-supplied MSS.
    pub fn create_from_uri_with<M>(
        &self,
        uri: &str,
        mss: Arc<M>,
        config: Option<&Config>,
    ) -> Result<Arc<M>>
    where
        M: MediaStreamSource + 'static,
    {
        let span = info_span!("create_from_uri", uri);
        let _enter = span.enter();

        let result = open_with_uri(&self.library, uri, config)
            .and_then(|format| self.start_session(&mss, format, None, config));

        finish_creation(mss, result)
    }

    fn start_session<M>(
        &self,
        mss: &Arc<M>,
        format: Box<dyn FormatContext>,
        byte_source: Option<ByteSourceHandle>,
        config: Option<&Config>,
    ) -> Result<()>
    where
        M: MediaStreamSource + 'static,
    {
        let mss: Arc<dyn MediaStreamSource> = mss.clone();
        let state = initialize(mss.as_ref(), &self.factory, format, byte_source, config)?;
        Adapter::subscribe(&mss, state)
    }
}

fn finish_creation<M: MediaStreamSource>(mss: Arc<M>, result: Result<()>) -> Result<Arc<M>> {
    match result {
        Ok(()) => Ok(mss),
        Err(err) => {
            warn!(error = %err, "media session could not be created");
            mss.notify_error(ErrorStatus::UnsupportedMediaFormat);
            Err(err)
        }
    }
}

/// Everything reached from MSS handlers. Only ever touched under `Adapter::state`.
struct State {
    reader: Reader,
    byte_source: Option<ByteSourceHandle>,
    // Stream index → descriptor of its provider, for every registered stream.
    stream_ids: BTreeMap<usize, StreamDescriptor>,
    providers: HashMap<StreamDescriptor, Box<dyn SampleProvider>>,
    tokens: Vec<EventToken>,
}

impl State {
    fn seek(&mut self, hns: i64) -> Result<()> {
        let format = self.reader.format();
        let duration_hns = from_codec_time(format.duration().unwrap_or(0), TIME_BASE);
        if !(0..=duration_hns).contains(&hns) {
            return Err(Error::InvalidTimestamp(format!(
                "seek to {hns} is outside 0..={duration_hns}"
            )));
        }

        let mut target = to_codec_time(hns, TIME_BASE);
        if let Some(start_time) = format.start_time() {
            target = target.saturating_add(start_time);
        }

        info!(event = "seek", seek_time_hns = hns, codec_ts = target, "seeking");
        self.reader
            .seek(None, i64::MIN, target, target, SeekFlags::NONE)?;

        for descriptor in self.stream_ids.values() {
            if let Some(provider) = self.providers.get_mut(descriptor) {
                provider.on_seek(hns);
            }
        }
        Ok(())
    }

    fn get_sample(&mut self, request: &mut SampleRequest) -> Result<()> {
        let descriptor = request.stream_descriptor().clone();
        let provider = self
            .providers
            .get_mut(&descriptor)
            .ok_or(Error::UnknownStream)?;
        provider.get_sample(&mut self.reader, request)
    }

    fn notify_eof(&mut self) {
        for descriptor in self.stream_ids.values() {
            if let Some(provider) = self.providers.get_mut(descriptor) {
                provider.notify_eof();
            }
        }
    }

    fn switch_streams(&mut self, request: &SwitchStreamsRequest) -> Result<()> {
        if let Some(old) = request.old_stream_descriptor() {
            let provider = self.providers.get_mut(old).ok_or(Error::UnknownStream)?;
            provider.deselect(&mut self.reader);
        }
        if let Some(new) = request.new_stream_descriptor() {
            let provider = self.providers.get_mut(new).ok_or(Error::UnknownStream)?;
            provider.select(&mut self.reader);
        }
        Ok(())
    }
}

/// Per-type bookkeeping while enumerating streams.
struct TypeSlot {
    preferred: Option<usize>,
    has_stream: bool,
    // Streams seen before the preferred one, registered right after it.
    pending: Vec<StreamPair>,
}

impl TypeSlot {
    fn new(preferred: Option<usize>) -> Self {
        Self {
            preferred,
            has_stream: false,
            pending: Vec::new(),
        }
    }

    fn registers_now(&self, index: usize) -> bool {
        self.has_stream || self.preferred.is_none_or(|p| p == index)
    }

    /// Register the deferred streams in discovery order. The first one is
    /// selected when the type has no stream yet.
    fn flush(&mut self, state: &mut State, mss: &dyn MediaStreamSource) {
        for pair in self.pending.drain(..) {
            let select = !self.has_stream;
            self.has_stream = true;
            register(state, mss, pair, select);
        }
    }
}

/// Build the session state and publish the streams to the MSS.
fn initialize(
    mss: &dyn MediaStreamSource,
    factory: &dyn StreamFactory,
    format: Box<dyn FormatContext>,
    byte_source: Option<ByteSourceHandle>,
    config: Option<&Config>,
) -> Result<State> {
    let mut state = State {
        reader: Reader::new(format),
        byte_source,
        stream_ids: BTreeMap::new(),
        providers: HashMap::new(),
        tokens: Vec::new(),
    };

    let streams = state.reader.format().streams().to_vec();

    // Nothing is read until a provider is selected.
    for stream in &streams {
        state.reader.set_discard(stream.index, Discard::All);
    }

    // Cover art never counts as the preferred video.
    let preferred = |media_type| {
        state
            .reader
            .format()
            .find_best_stream(media_type)
            .filter(|&i| streams.get(i).is_some_and(|s| !s.is_attached_pic()))
    };
    let mut audio = TypeSlot::new(preferred(MediaType::Audio));
    let mut video = TypeSlot::new(preferred(MediaType::Video));

    for stream in &streams {
        let index = stream.index;
        match stream.media_type() {
            MediaType::Video if stream.is_attached_pic() => {
                if let Some(thumbnail) = thumbnail_from_stream(stream) {
                    debug!(stream_index = index, content_type = %thumbnail.content_type, "cover art");
                    mss.set_thumbnail(thumbnail);
                }
            }
            media_type @ (MediaType::Audio | MediaType::Video) => {
                let format = state.reader.format();
                let (created, slot) = if media_type == MediaType::Audio {
                    (factory.create_audio_stream(format, stream, config), &mut audio)
                } else {
                    (factory.create_video_stream(format, stream, config), &mut video)
                };
                let pair = match created {
                    Ok(pair) => pair,
                    Err(err @ Error::UnsupportedStream { .. }) => {
                        info!(event = "unsupported_stream", stream_index = index, error = %err);
                        // A rejected preferred stream hands its place to the
                        // streams deferred behind it.
                        if slot.preferred == Some(index) {
                            slot.preferred = None;
                            slot.flush(&mut state, mss);
                        }
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                if !slot.registers_now(index) {
                    slot.pending.push(pair);
                } else if slot.has_stream {
                    register(&mut state, mss, pair, false);
                } else {
                    slot.has_stream = true;
                    register(&mut state, mss, pair, true);
                    slot.flush(&mut state, mss);
                }
            }
            MediaType::Subtitle => {
                if !mss.supports_timed_metadata() {
                    info!(event = "no_subtitle_support", stream_index = index);
                    continue;
                }
                match factory.create_subtitle_stream(state.reader.format(), stream) {
                    Ok(pair) => register(&mut state, mss, pair, false),
                    Err(err) => {
                        info!(event = "unsupported_subtitle_stream", stream_index = index, error = %err);
                    }
                }
            }
            media_type => {
                info!(event = "unsupported_stream", stream_index = index, ?media_type);
            }
        }
    }

    debug_assert!(
        audio.pending.is_empty() && video.pending.is_empty(),
        "preferred stream was never enumerated"
    );

    let format = state.reader.format();
    match format.duration().filter(|&d| d > 0) {
        Some(duration) => {
            mss.set_duration(from_codec_time(duration, TIME_BASE));
            mss.set_can_seek(true);
        }
        None => mss.set_buffer_time(0),
    }

    mss.set_media_properties(MediaProperties::from_tags(format.metadata()));

    debug!(
        streams = state.stream_ids.len(),
        "media session initialized"
    );
    Ok(state)
}

fn register(state: &mut State, mss: &dyn MediaStreamSource, pair: StreamPair, select: bool) {
    let (mut provider, descriptor) = pair;
    if select {
        provider.select(&mut state.reader);
    }
    state
        .stream_ids
        .insert(provider.stream_index(), descriptor.clone());
    state.providers.insert(descriptor.clone(), provider);
    mss.add_stream_descriptor(descriptor);
}

/// The live session, owned by the MSS event handlers.
struct Adapter {
    mss: Weak<dyn MediaStreamSource>,
    state: Mutex<State>,
}

impl Adapter {
    /// Wrap `state` and subscribe to the MSS events.
    fn subscribe(mss: &Arc<dyn MediaStreamSource>, state: State) -> Result<()> {
        let adapter = Arc::new(Adapter {
            mss: Arc::downgrade(mss),
            state: Mutex::new(state),
        });

        // Hold the lock so no event is handled before the tokens are stored.
        let mut state = adapter.lock()?;
        let tokens = vec![
            mss.on_starting(Box::new({
                let adapter = Arc::clone(&adapter);
                move |request| adapter.on_starting(request)
            })),
            mss.on_sample_requested(Box::new({
                let adapter = Arc::clone(&adapter);
                move |request| adapter.on_sample_requested(request)
            })),
            mss.on_switch_streams_requested(Box::new({
                let adapter = Arc::clone(&adapter);
                move |request| adapter.on_switch_streams_requested(request)
            })),
            mss.on_closed(Box::new({
                let adapter = Arc::clone(&adapter);
                move || adapter.on_closed()
            })),
        ];
        state.tokens = tokens;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::msg("adapter state mutex poisoned"))
    }

    fn report(&self, status: ErrorStatus) {
        if let Some(mss) = self.mss.upgrade() {
            mss.notify_error(status);
        }
    }

    fn on_starting(&self, request: &mut StartingRequest) {
        let span = info_span!("on_starting");
        let _enter = span.enter();

        let result = self.lock().and_then(|mut state| {
            let Some(position) = request.start_position() else {
                debug!(event = "resume", "starting without a position");
                return Ok(());
            };
            state.seek(position)?;
            request.set_actual_start_position(position);
            Ok(())
        });

        if let Err(err) = result {
            warn!(error = %err, "starting failed");
            self.report(ErrorStatus::Other);
        }
    }

    fn on_sample_requested(&self, request: &mut SampleRequest) {
        let span = info_span!("on_sample_requested");
        let _enter = span.enter();

        let mut state = match self.lock() {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "sample request failed");
                self.report(ErrorStatus::Other);
                return;
            }
        };

        match state.get_sample(request) {
            Ok(()) => {}
            Err(Error::EndOfStream) => {
                debug!(event = "end_of_stream", "input exhausted");
                state.notify_eof();
            }
            Err(err) => {
                warn!(error = %err, "sample request failed");
                self.report(ErrorStatus::Other);
            }
        }
    }

    fn on_switch_streams_requested(&self, request: &SwitchStreamsRequest) {
        let span = info_span!("on_switch_streams_requested");
        let _enter = span.enter();

        let result = self
            .lock()
            .and_then(|mut state| state.switch_streams(request));

        if let Err(err) = result {
            warn!(error = %err, "stream switch failed");
            self.report(ErrorStatus::Other);
        }
    }

    fn on_closed(&self) {
        let span = info_span!("on_closed");
        let _enter = span.enter();

        let mut state = match self.lock() {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "close failed");
                return;
            }
        };

        state.byte_source = None;
        let tokens = std::mem::take(&mut state.tokens);
        match self.mss.upgrade() {
            Some(mss) => tokens.into_iter().for_each(|token| mss.remove_handler(token)),
            None => debug!("media stream source already released"),
        }
    }
}
