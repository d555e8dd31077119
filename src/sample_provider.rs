//! Per-stream sample providers.
//!
//! A sample provider turns demuxed packets of exactly one stream into host
//! samples. The adapter only ever sees the `SampleProvider` capability set; the
//! concrete variant (audio, video, subtitle) is chosen by the stream factory.
//!
//! Providers get the reader passed in rather than holding on to it: the reader
//! lives behind the adapter mutex, and so does every provider call.

use tracing::trace;

use crate::codec::{Discard, Packet, StreamInfo};
use crate::mss::{MediaSample, SampleRequest};
use crate::reader::Reader;
use crate::time::{Rational, TIME_BASE, from_codec_time, rescale};
use crate::{Error, Result};

/// Capabilities every per-stream provider offers the adapter.
pub trait SampleProvider: Send {
    /// The stream this provider is bound to.
    fn stream_index(&self) -> usize;

    fn is_selected(&self) -> bool;

    /// Start delivering: clears the stream's demuxer-level discard.
    fn select(&mut self, reader: &mut Reader);

    /// Stop delivering: discards every packet of the stream.
    fn deselect(&mut self, reader: &mut Reader);

    /// Attach the next sample of this stream to `request`.
    ///
    /// Returns `Error::EndOfStream` when the reader runs out of packets. After
    /// `notify_eof`, requests complete without a sample instead.
    fn get_sample(&mut self, reader: &mut Reader, request: &mut SampleRequest) -> Result<()>;

    /// The container was repositioned to `hns_time` (the time the host asked for).
    fn on_seek(&mut self, hns_time: i64);

    /// Some stream hit the end of the input; stop delivering.
    fn notify_eof(&mut self);
}

/// State shared by every provider variant.
#[derive(Debug)]
struct ProviderCore {
    stream_index: usize,
    time_base: Rational,
    // Container start time, expressed in the stream's time base.
    start_offset: i64,
    selected: bool,
    eof: bool,
    discontinuous: bool,
    // Where the previous sample ended, for packets without timestamps.
    next_timestamp: Option<i64>,
}

impl ProviderCore {
    fn new(stream: &StreamInfo, container_start_time: Option<i64>) -> Self {
        let start_offset = container_start_time
            .map(|start| rescale(start, TIME_BASE, stream.time_base))
            .unwrap_or(0);

        Self {
            stream_index: stream.index,
            time_base: stream.time_base,
            start_offset,
            selected: false,
            eof: false,
            discontinuous: false,
            next_timestamp: None,
        }
    }

    fn select(&mut self, reader: &mut Reader) {
        self.selected = true;
        reader.set_discard(self.stream_index, Discard::Default);
    }

    fn deselect(&mut self, reader: &mut Reader) {
        self.selected = false;
        reader.set_discard(self.stream_index, Discard::All);
    }

    fn on_seek(&mut self) {
        self.eof = false;
        self.discontinuous = true;
        self.next_timestamp = None;
    }

    fn next_packet(&mut self, reader: &mut Reader) -> Result<Packet> {
        reader
            .read_next_packet(self.stream_index)?
            .ok_or(Error::EndOfStream)
    }

    /// Presentation time in HNS: pts, else dts, else where the last sample ended.
    fn timestamp(&self, packet: &Packet) -> Option<i64> {
        packet
            .pts
            .or(packet.dts)
            .map(|ts| from_codec_time(ts - self.start_offset, self.time_base))
            .or(self.next_timestamp)
    }

    fn make_sample(&mut self, packet: Packet, timestamp: i64) -> MediaSample {
        let duration = from_codec_time(packet.duration.max(0), self.time_base);
        self.next_timestamp = Some(timestamp + duration);

        MediaSample {
            data: packet.data,
            timestamp,
            duration,
            keyframe: packet.keyframe,
            discontinuous: std::mem::take(&mut self.discontinuous),
        }
    }
}

/// Delivers compressed audio frames one packet per sample.
#[derive(Debug)]
pub struct AudioSampleProvider {
    core: ProviderCore,
}

impl AudioSampleProvider {
    pub fn new(stream: &StreamInfo, container_start_time: Option<i64>) -> Self {
        Self {
            core: ProviderCore::new(stream, container_start_time),
        }
    }
}

impl SampleProvider for AudioSampleProvider {
    fn stream_index(&self) -> usize {
        self.core.stream_index
    }

    fn is_selected(&self) -> bool {
        self.core.selected
    }

    fn select(&mut self, reader: &mut Reader) {
        self.core.select(reader);
    }

    fn deselect(&mut self, reader: &mut Reader) {
        self.core.deselect(reader);
    }

    fn get_sample(&mut self, reader: &mut Reader, request: &mut SampleRequest) -> Result<()> {
        if self.core.eof {
            return Ok(());
        }

        let packet = self.core.next_packet(reader)?;
        let timestamp = self.core.timestamp(&packet).unwrap_or(0);
        request.set_sample(self.core.make_sample(packet, timestamp));
        Ok(())
    }

    fn on_seek(&mut self, _hns_time: i64) {
        self.core.on_seek();
    }

    fn notify_eof(&mut self) {
        self.core.eof = true;
    }
}

/// Delivers compressed video frames.
///
/// After a seek, frames are skipped until the next keyframe so the host's
/// decoder always starts from a decodable picture.
#[derive(Debug)]
pub struct VideoSampleProvider {
    core: ProviderCore,
    awaiting_keyframe: bool,
}

impl VideoSampleProvider {
    pub fn new(stream: &StreamInfo, container_start_time: Option<i64>) -> Self {
        Self {
            core: ProviderCore::new(stream, container_start_time),
            awaiting_keyframe: false,
        }
    }
}

impl SampleProvider for VideoSampleProvider {
    fn stream_index(&self) -> usize {
        self.core.stream_index
    }

    fn is_selected(&self) -> bool {
        self.core.selected
    }

    fn select(&mut self, reader: &mut Reader) {
        self.core.select(reader);
    }

    fn deselect(&mut self, reader: &mut Reader) {
        self.core.deselect(reader);
    }

    fn get_sample(&mut self, reader: &mut Reader, request: &mut SampleRequest) -> Result<()> {
        if self.core.eof {
            return Ok(());
        }

        loop {
            let packet = self.core.next_packet(reader)?;
            if self.awaiting_keyframe && !packet.keyframe {
                trace!(stream_index = self.core.stream_index, "skipping frame before keyframe");
                continue;
            }
            self.awaiting_keyframe = false;

            let timestamp = self.core.timestamp(&packet).unwrap_or(0);
            request.set_sample(self.core.make_sample(packet, timestamp));
            return Ok(());
        }
    }

    fn on_seek(&mut self, _hns_time: i64) {
        self.core.on_seek();
        self.awaiting_keyframe = true;
    }

    fn notify_eof(&mut self) {
        self.core.eof = true;
    }
}

/// Delivers text subtitle cues as timed-metadata samples.
///
/// A cue without a presentation time can't be placed on the timeline and is
/// dropped.
#[derive(Debug)]
pub struct SubtitleSampleProvider {
    core: ProviderCore,
}

impl SubtitleSampleProvider {
    pub fn new(stream: &StreamInfo, container_start_time: Option<i64>) -> Self {
        Self {
            core: ProviderCore::new(stream, container_start_time),
        }
    }
}

impl SampleProvider for SubtitleSampleProvider {
    fn stream_index(&self) -> usize {
        self.core.stream_index
    }

    fn is_selected(&self) -> bool {
        self.core.selected
    }

    fn select(&mut self, reader: &mut Reader) {
        self.core.select(reader);
    }

    fn deselect(&mut self, reader: &mut Reader) {
        self.core.deselect(reader);
    }

    fn get_sample(&mut self, reader: &mut Reader, request: &mut SampleRequest) -> Result<()> {
        if self.core.eof {
            return Ok(());
        }

        loop {
            let packet = self.core.next_packet(reader)?;
            let Some(pts) = packet.pts else {
                trace!(stream_index = self.core.stream_index, "dropping cue without pts");
                continue;
            };

            let timestamp = from_codec_time(pts - self.core.start_offset, self.core.time_base);
            request.set_sample(self.core.make_sample(packet, timestamp));
            return Ok(());
        }
    }

    fn on_seek(&mut self, _hns_time: i64) {
        self.core.on_seek();
    }

    fn notify_eof(&mut self) {
        self.core.eof = true;
    }
}
