//! The host's pull-model media stream source (MSS).
//!
//! The MSS owns the playback session. It learns about streams through
//! `add_stream_descriptor`, then pulls data by raising four events:
//! - `Starting` (play or seek)
//! - `SampleRequested` (one sample for one stream)
//! - `SwitchStreamsRequested` (track change)
//! - `Closed` (teardown; always last)
//!
//! `PullSource` is the in-process implementation; real hosts implement
//! `MediaStreamSource` over their own object model.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use crate::codec::MediaType;
use crate::metadata::{MediaProperties, Thumbnail};
use crate::time::Rational;

/// Audio stream encoding as advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioEncoding {
    pub subtype: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u32,
    pub bitrate: u64,
}

/// Video stream encoding as advertised to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoEncoding {
    pub subtype: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<(i32, i32)>,
    pub bitrate: u64,
}

impl VideoEncoding {
    pub fn frame_rate(&self) -> Option<Rational> {
        self.frame_rate.map(|(num, den)| Rational::new(num, den))
    }
}

/// Timed-metadata (subtitle) stream encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedMetadataEncoding {
    pub subtype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncodingProperties {
    Audio(AudioEncoding),
    Video(VideoEncoding),
    TimedMetadata(TimedMetadataEncoding),
}

#[derive(Debug, Serialize)]
struct DescriptorInner {
    encoding: EncodingProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

/// Opaque host-side identity of a registered stream.
///
/// Clones share identity: equality and hashing are by identity, never by
/// content, so two streams with identical encodings stay distinct.
#[derive(Clone)]
pub struct StreamDescriptor(Arc<DescriptorInner>);

impl StreamDescriptor {
    pub fn new(encoding: EncodingProperties, name: Option<String>, language: Option<String>) -> Self {
        Self(Arc::new(DescriptorInner {
            encoding,
            name,
            language,
        }))
    }

    pub fn encoding(&self) -> &EncodingProperties {
        &self.0.encoding
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.0.language.as_deref()
    }

    pub fn media_type(&self) -> MediaType {
        match self.0.encoding {
            EncodingProperties::Audio(_) => MediaType::Audio,
            EncodingProperties::Video(_) => MediaType::Video,
            EncodingProperties::TimedMetadata(_) => MediaType::Subtitle,
        }
    }
}

impl PartialEq for StreamDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for StreamDescriptor {}

impl Hash for StreamDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDescriptor")
            .field("encoding", &self.0.encoding)
            .field("name", &self.0.name)
            .field("language", &self.0.language)
            .finish()
    }
}

impl Serialize for StreamDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// A compressed sample delivered to the host. Times are in HNS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSample {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub timestamp: i64,
    pub duration: i64,
    pub keyframe: bool,
    pub discontinuous: bool,
}

/// Status codes for `MediaStreamSource::notify_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorStatus {
    /// Raised when a session cannot be constructed.
    UnsupportedMediaFormat,
    /// Raised when a handler fails at runtime.
    Other,
}

/// `Starting` event payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartingRequest {
    start_position: Option<i64>,
    actual_start_position: Option<i64>,
}

impl StartingRequest {
    /// `None` means "resume from the current position".
    pub fn new(start_position: Option<i64>) -> Self {
        Self {
            start_position,
            actual_start_position: None,
        }
    }

    pub fn start_position(&self) -> Option<i64> {
        self.start_position
    }

    pub fn set_actual_start_position(&mut self, hns: i64) {
        self.actual_start_position = Some(hns);
    }

    pub fn actual_start_position(&self) -> Option<i64> {
        self.actual_start_position
    }
}

/// `SampleRequested` event payload.
#[derive(Debug, Clone)]
pub struct SampleRequest {
    descriptor: StreamDescriptor,
    sample: Option<MediaSample>,
}

impl SampleRequest {
    pub fn new(descriptor: StreamDescriptor) -> Self {
        Self {
            descriptor,
            sample: None,
        }
    }

    pub fn stream_descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn set_sample(&mut self, sample: MediaSample) {
        self.sample = Some(sample);
    }

    pub fn sample(&self) -> Option<&MediaSample> {
        self.sample.as_ref()
    }

    pub fn into_sample(self) -> Option<MediaSample> {
        self.sample
    }
}

/// `SwitchStreamsRequested` event payload. At most one side is `None`.
#[derive(Debug, Clone)]
pub struct SwitchStreamsRequest {
    old: Option<StreamDescriptor>,
    new: Option<StreamDescriptor>,
}

impl SwitchStreamsRequest {
    pub fn new(old: Option<StreamDescriptor>, new: Option<StreamDescriptor>) -> Self {
        Self { old, new }
    }

    pub fn old_stream_descriptor(&self) -> Option<&StreamDescriptor> {
        self.old.as_ref()
    }

    pub fn new_stream_descriptor(&self) -> Option<&StreamDescriptor> {
        self.new.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Starting,
    SampleRequested,
    SwitchStreamsRequested,
    Closed,
}

/// Identifies one handler registration, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken {
    pub kind: EventKind,
    pub id: u64,
}

pub type StartingHandler = Box<dyn Fn(&mut StartingRequest) + Send + Sync>;
pub type SampleRequestedHandler = Box<dyn Fn(&mut SampleRequest) + Send + Sync>;
pub type SwitchStreamsRequestedHandler = Box<dyn Fn(&SwitchStreamsRequest) + Send + Sync>;
pub type ClosedHandler = Box<dyn Fn() + Send + Sync>;

/// The host contract the adapter consumes.
///
/// Handlers may be invoked from any thread and may race each other. A host
/// must not hold its own locks while a handler runs: handlers call back into
/// the MSS (`notify_error`, `remove_handler`).
pub trait MediaStreamSource: Send + Sync {
    fn add_stream_descriptor(&self, descriptor: StreamDescriptor);

    fn set_duration(&self, duration_hns: i64);

    fn set_can_seek(&self, can_seek: bool);

    fn set_buffer_time(&self, buffer_time_hns: i64);

    fn set_thumbnail(&self, thumbnail: Thumbnail);

    fn set_media_properties(&self, properties: MediaProperties);

    fn notify_error(&self, status: ErrorStatus);

    /// Whether the host can present timed-metadata (subtitle) streams.
    fn supports_timed_metadata(&self) -> bool {
        true
    }

    fn on_starting(&self, handler: StartingHandler) -> EventToken;

    fn on_sample_requested(&self, handler: SampleRequestedHandler) -> EventToken;

    fn on_switch_streams_requested(&self, handler: SwitchStreamsRequestedHandler) -> EventToken;

    fn on_closed(&self, handler: ClosedHandler) -> EventToken;

    fn remove_handler(&self, token: EventToken);
}
