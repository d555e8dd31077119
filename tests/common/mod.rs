//! Shared fixtures: a scripted codec library and a stream factory that records
//! every provider call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use mss_bridge::ByteSource;
use mss_bridge::codec::{
    CodecLibrary, CodecParameters, Discard, Disposition, FormatContext, MediaType, Packet,
    SeekFlags, StreamInfo,
};
use mss_bridge::config::{Config, Dictionary};
use mss_bridge::io_context::IoContext;
use mss_bridge::mss::{SampleRequest, StreamDescriptor};
use mss_bridge::reader::Reader;
use mss_bridge::sample_provider::SampleProvider;
use mss_bridge::stream_factory::{DefaultStreamFactory, StreamFactory, StreamPair};
use mss_bridge::time::Rational;
use mss_bridge::{Error, Result};

pub fn stream(index: usize, media_type: MediaType, codec_id: &str) -> StreamInfo {
    let mut codec = CodecParameters::new(media_type, codec_id);
    match media_type {
        MediaType::Audio => {
            codec.sample_rate = Some(44_100);
            codec.channels = Some(2);
        }
        MediaType::Video => {
            codec.width = Some(1920);
            codec.height = Some(1080);
        }
        _ => {}
    }

    StreamInfo {
        index,
        codec,
        time_base: Rational::new(1, 1000),
        disposition: Disposition::NONE,
        language: None,
        title: None,
        attached_pic: None,
    }
}

pub fn cover_art(index: usize, jpeg: Vec<u8>) -> StreamInfo {
    let mut s = stream(index, MediaType::Video, "mjpeg");
    s.disposition = Disposition::ATTACHED_PIC;
    s.attached_pic = Some(Packet {
        stream_index: index,
        pts: None,
        dts: None,
        duration: 0,
        keyframe: true,
        data: jpeg,
    });
    s
}

pub fn packet(stream_index: usize, pts: i64) -> Packet {
    Packet {
        stream_index,
        pts: Some(pts),
        dts: Some(pts),
        duration: 40,
        keyframe: true,
        data: vec![0xAB; 8],
    }
}

/// One `seek_file` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekCall {
    pub stream_index: Option<usize>,
    pub min_ts: i64,
    pub ts: i64,
    pub max_ts: i64,
    pub flags: SeekFlags,
}

/// One `open_input` call.
#[derive(Debug, Clone)]
pub struct OpenCall {
    pub url: String,
    pub io_head: Option<Vec<u8>>,
    pub options: Vec<(String, String)>,
}

/// Everything the fakes observe, shared with the test body.
#[derive(Default)]
pub struct Journal {
    pub events: Vec<String>,
    pub seeks: Vec<SeekCall>,
    pub opens: Vec<OpenCall>,
    pub discard: HashMap<usize, Discard>,
    /// Descriptor → stream index, in creation order.
    pub descriptors: Vec<(StreamDescriptor, usize)>,
}

#[derive(Clone, Default)]
pub struct SharedJournal(Arc<Mutex<Journal>>);

impl SharedJournal {
    pub fn lock(&self) -> MutexGuard<'_, Journal> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, event: impl Into<String>) {
        self.lock().events.push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn seeks(&self) -> Vec<SeekCall> {
        self.lock().seeks.clone()
    }

    pub fn discard(&self, stream_index: usize) -> Discard {
        self.lock()
            .discard
            .get(&stream_index)
            .copied()
            .unwrap_or_default()
    }

    /// Stream index behind a descriptor handed to the host.
    pub fn index_of(&self, descriptor: &StreamDescriptor) -> Option<usize> {
        self.lock()
            .descriptors
            .iter()
            .find(|(d, _)| d == descriptor)
            .map(|(_, i)| *i)
    }
}

/// What a scripted input looks like once opened.
#[derive(Clone)]
pub struct Script {
    pub streams: Vec<StreamInfo>,
    pub packets: Vec<Packet>,
    pub best_audio: Option<usize>,
    pub best_video: Option<usize>,
    pub duration: Option<i64>,
    pub start_time: Option<i64>,
    pub metadata: Dictionary,
    pub fail_open: bool,
    pub fail_probe: bool,
    pub overlap: Arc<Overlap>,
}

impl Script {
    pub fn new(streams: Vec<StreamInfo>) -> Self {
        Self {
            streams,
            packets: Vec::new(),
            best_audio: None,
            best_video: None,
            duration: Some(10_000_000),
            start_time: None,
            metadata: Dictionary::new(),
            fail_open: false,
            fail_probe: false,
            overlap: Arc::default(),
        }
    }
}

/// Flags calls into a format context that start while another is running.
#[derive(Default)]
pub struct Overlap {
    busy: AtomicBool,
    seen: AtomicBool,
}

impl Overlap {
    fn enter(&self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.seen.store(true, Ordering::SeqCst);
        }
        // Widen the window for a racing caller.
        thread::sleep(Duration::from_micros(50));
    }

    fn exit(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    pub fn observed(&self) -> bool {
        self.seen.load(Ordering::SeqCst)
    }
}

/// A codec library that opens every input as the same script.
pub struct ScriptedLibrary {
    pub script: Script,
    pub journal: SharedJournal,
}

impl ScriptedLibrary {
    pub fn new(script: Script, journal: &SharedJournal) -> Self {
        Self {
            script,
            journal: journal.clone(),
        }
    }
}

impl CodecLibrary for ScriptedLibrary {
    fn open_input(
        &self,
        url: &str,
        io: Option<IoContext>,
        options: &mut Dictionary,
    ) -> Result<Box<dyn FormatContext>> {
        let mut io = io;
        let io_head = match io.as_mut() {
            Some(io) => {
                let mut head = [0u8; 4];
                let n = io.read(&mut head).map_err(Error::ExternalIo)?;
                io.seek(SeekFrom::Start(0)).map_err(Error::ExternalIo)?;
                Some(head[..n].to_vec())
            }
            None => None,
        };

        self.journal.lock().opens.push(OpenCall {
            url: url.to_string(),
            io_head,
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        // The fake understands exactly one option.
        options.take("probesize");

        if self.script.fail_open {
            return Err(Error::Message("invalid data found when processing input".into()));
        }

        Ok(Box::new(ScriptedFormat {
            script: self.script.clone(),
            cursor: 0,
            journal: self.journal.clone(),
            _io: io,
        }))
    }
}

pub struct ScriptedFormat {
    script: Script,
    cursor: usize,
    journal: SharedJournal,
    _io: Option<IoContext>,
}

impl FormatContext for ScriptedFormat {
    fn streams(&self) -> &[StreamInfo] {
        &self.script.streams
    }

    fn find_stream_info(&mut self) -> Result<()> {
        if self.script.fail_probe {
            return Err(Error::Message("could not find codec parameters".into()));
        }
        Ok(())
    }

    fn find_best_stream(&self, media_type: MediaType) -> Option<usize> {
        match media_type {
            MediaType::Audio => self.script.best_audio,
            MediaType::Video => self.script.best_video,
            _ => None,
        }
    }

    fn duration(&self) -> Option<i64> {
        self.script.duration
    }

    fn start_time(&self) -> Option<i64> {
        self.script.start_time
    }

    fn metadata(&self) -> &Dictionary {
        &self.script.metadata
    }

    fn set_discard(&mut self, stream_index: usize, discard: Discard) {
        self.journal.lock().discard.insert(stream_index, discard);
    }

    fn discard(&self, stream_index: usize) -> Discard {
        self.journal.discard(stream_index)
    }

    fn read_frame(&mut self) -> Result<Option<Packet>> {
        self.script.overlap.enter();
        let mut next = None;
        while let Some(packet) = self.script.packets.get(self.cursor) {
            self.cursor += 1;
            if self.discard(packet.stream_index) == Discard::Default {
                next = Some(packet.clone());
                break;
            }
        }
        self.script.overlap.exit();
        Ok(next)
    }

    fn seek_file(
        &mut self,
        stream_index: Option<usize>,
        min_ts: i64,
        ts: i64,
        max_ts: i64,
        flags: SeekFlags,
    ) -> Result<()> {
        self.script.overlap.enter();
        self.journal.lock().seeks.push(SeekCall {
            stream_index,
            min_ts,
            ts,
            max_ts,
            flags,
        });
        self.cursor = 0;
        self.script.overlap.exit();
        Ok(())
    }
}

/// Wraps the default factory and journals every provider call.
pub struct RecordingFactory {
    pub journal: SharedJournal,
    /// Audio or video stream turned down as `UnsupportedStream`.
    pub reject: Option<usize>,
}

impl RecordingFactory {
    pub fn new(journal: &SharedJournal) -> Self {
        Self {
            journal: journal.clone(),
            reject: None,
        }
    }

    pub fn rejecting(journal: &SharedJournal, stream_index: usize) -> Self {
        Self {
            reject: Some(stream_index),
            ..Self::new(journal)
        }
    }

    fn check(&self, stream: &StreamInfo) -> Result<()> {
        if self.reject == Some(stream.index) {
            return Err(Error::UnsupportedStream {
                index: stream.index,
                reason: "rejected by the test factory".into(),
            });
        }
        Ok(())
    }

    fn wrap(&self, created: Result<StreamPair>) -> Result<StreamPair> {
        let (inner, descriptor) = created?;
        let index = inner.stream_index();
        self.journal
            .lock()
            .descriptors
            .push((descriptor.clone(), index));
        let provider = RecordingProvider {
            inner,
            journal: self.journal.clone(),
        };
        Ok((Box::new(provider), descriptor))
    }
}

impl StreamFactory for RecordingFactory {
    fn create_audio_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
        config: Option<&Config>,
    ) -> Result<StreamPair> {
        self.check(stream)?;
        self.wrap(DefaultStreamFactory.create_audio_stream(format, stream, config))
    }

    fn create_video_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
        config: Option<&Config>,
    ) -> Result<StreamPair> {
        self.check(stream)?;
        self.wrap(DefaultStreamFactory.create_video_stream(format, stream, config))
    }

    fn create_subtitle_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
    ) -> Result<StreamPair> {
        self.wrap(DefaultStreamFactory.create_subtitle_stream(format, stream))
    }
}

struct RecordingProvider {
    inner: Box<dyn SampleProvider>,
    journal: SharedJournal,
}

impl SampleProvider for RecordingProvider {
    fn stream_index(&self) -> usize {
        self.inner.stream_index()
    }

    fn is_selected(&self) -> bool {
        self.inner.is_selected()
    }

    fn select(&mut self, reader: &mut Reader) {
        self.journal.record(format!("select {}", self.stream_index()));
        self.inner.select(reader);
    }

    fn deselect(&mut self, reader: &mut Reader) {
        self.journal
            .record(format!("deselect {}", self.stream_index()));
        self.inner.deselect(reader);
    }

    fn get_sample(&mut self, reader: &mut Reader, request: &mut SampleRequest) -> Result<()> {
        self.inner.get_sample(reader, request)
    }

    fn on_seek(&mut self, hns_time: i64) {
        self.journal
            .record(format!("on_seek {} {hns_time}", self.stream_index()));
        self.inner.on_seek(hns_time);
    }

    fn notify_eof(&mut self) {
        self.journal
            .record(format!("notify_eof {}", self.stream_index()));
        self.inner.notify_eof();
    }
}

impl Drop for RecordingProvider {
    fn drop(&mut self) {
        self.journal.record(format!("drop {}", self.stream_index()));
    }
}

/// An in-memory byte source that reports when it is dropped.
pub struct TrackedSource {
    inner: Cursor<Vec<u8>>,
    dropped: Arc<AtomicBool>,
}

impl TrackedSource {
    pub fn new(bytes: Vec<u8>) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = Self {
            inner: Cursor::new(bytes),
            dropped: Arc::clone(&dropped),
        };
        (source, dropped)
    }
}

impl Read for TrackedSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for TrackedSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl ByteSource for TrackedSource {}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

pub fn was_dropped(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
