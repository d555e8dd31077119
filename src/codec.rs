//! The codec-library boundary.
//!
//! The adapter never demuxes by itself. It talks to a codec library through
//! these traits: a `CodecLibrary` opens inputs into a `FormatContext`, and the
//! format context owns all demuxer state (streams, packets, seeking).
//!
//! `backends::symphonia` is the built-in implementation.

use serde::Serialize;

use crate::Result;
use crate::config::Dictionary;
use crate::io_context::IoContext;
use crate::time::Rational;

/// The kind of media carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

/// Stream disposition bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disposition(u32);

impl Disposition {
    pub const NONE: Disposition = Disposition(0);
    pub const DEFAULT: Disposition = Disposition(0x0001);
    pub const FORCED: Disposition = Disposition(0x0040);
    /// The stream is a still image attached to the file (album/cover art).
    pub const ATTACHED_PIC: Disposition = Disposition(0x0400);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Disposition) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for Disposition {
    type Output = Disposition;

    fn bitor(self, rhs: Self) -> Self::Output {
        Disposition(self.0 | rhs.0)
    }
}

/// Demuxer-level packet discard policy for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discard {
    /// Deliver packets.
    #[default]
    Default,
    /// Drop every packet of this stream.
    All,
}

/// Flags for `FormatContext::seek_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekFlags(u32);

impl SeekFlags {
    pub const NONE: SeekFlags = SeekFlags(0);
    pub const BACKWARD: SeekFlags = SeekFlags(0x1);
    pub const BYTE: SeekFlags = SeekFlags(0x2);
    pub const ANY: SeekFlags = SeekFlags(0x4);

    pub const fn contains(self, other: SeekFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

/// Codec parameters discovered by probing.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    pub media_type: MediaType,
    /// Short codec name (`"aac"`, `"h264"`, `"subrip"`, ...).
    pub codec_id: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bits_per_sample: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<Rational>,
    pub bit_rate: Option<u64>,
    pub extradata: Vec<u8>,
}

impl CodecParameters {
    pub fn new(media_type: MediaType, codec_id: impl Into<String>) -> Self {
        Self {
            media_type,
            codec_id: codec_id.into(),
            sample_rate: None,
            channels: None,
            bits_per_sample: None,
            width: None,
            height: None,
            frame_rate: None,
            bit_rate: None,
            extradata: Vec::new(),
        }
    }
}

/// One demuxed stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub codec: CodecParameters,
    pub time_base: Rational,
    pub disposition: Disposition,
    pub language: Option<String>,
    pub title: Option<String>,
    /// The still image for `ATTACHED_PIC` streams.
    pub attached_pic: Option<Packet>,
}

impl StreamInfo {
    pub fn media_type(&self) -> MediaType {
        self.codec.media_type
    }

    pub fn is_attached_pic(&self) -> bool {
        self.disposition.contains(Disposition::ATTACHED_PIC)
    }
}

/// A demuxed, still-compressed packet. Timestamps are in the stream's time base.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub keyframe: bool,
    pub data: Vec<u8>,
}

/// Demuxer state for one opened input.
///
/// Not reentrant: the adapter serializes every call behind its mutex.
pub trait FormatContext: Send {
    /// Streams in discovery order; `streams()[i].index == i`.
    fn streams(&self) -> &[StreamInfo];

    /// Probe codec parameters for every stream.
    fn find_stream_info(&mut self) -> Result<()>;

    /// The library's preferred stream of `media_type`, if any.
    fn find_best_stream(&self, media_type: MediaType) -> Option<usize>;

    /// Container duration in `time::TIME_BASE` units.
    fn duration(&self) -> Option<i64>;

    /// Timestamp of the first frame in `time::TIME_BASE` units.
    fn start_time(&self) -> Option<i64>;

    /// Container-level metadata tags.
    fn metadata(&self) -> &Dictionary;

    fn set_discard(&mut self, stream_index: usize, discard: Discard);

    fn discard(&self, stream_index: usize) -> Discard;

    /// Read the next packet of any non-discarded stream. `Ok(None)` means end of file.
    fn read_frame(&mut self) -> Result<Option<Packet>>;

    /// Seek so the next packet read lands in `[min_ts, max_ts]`, as close to `ts`
    /// as possible. With `stream_index == None`, timestamps are in `time::TIME_BASE`.
    fn seek_file(
        &mut self,
        stream_index: Option<usize>,
        min_ts: i64,
        ts: i64,
        max_ts: i64,
        flags: SeekFlags,
    ) -> Result<()>;
}

/// A codec library able to open inputs.
pub trait CodecLibrary: Send + Sync {
    /// Open `url`, or the custom I/O context when `io` is provided (`url` is then empty).
    ///
    /// The I/O context is consumed either way; on failure the callee has already
    /// released everything it was handed. Recognized options are removed from
    /// `options`; the rest are left for the caller to report.
    fn open_input(
        &self,
        url: &str,
        io: Option<IoContext>,
        options: &mut Dictionary,
    ) -> Result<Box<dyn FormatContext>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_contains_checks_bits() {
        let d = Disposition::DEFAULT | Disposition::ATTACHED_PIC;
        assert!(d.contains(Disposition::ATTACHED_PIC));
        assert!(d.contains(Disposition::DEFAULT));
        assert!(!Disposition::DEFAULT.contains(Disposition::ATTACHED_PIC));
        assert!(!d.contains(Disposition::NONE));
    }
}
