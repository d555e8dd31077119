//! Scripted demuxer used by unit tests.

use std::collections::HashMap;

use crate::Result;
use crate::codec::{
    CodecParameters, Discard, Disposition, FormatContext, MediaType, Packet, SeekFlags, StreamInfo,
};
use crate::config::Dictionary;
use crate::time::Rational;

pub(crate) fn stream(index: usize, media_type: MediaType, codec_id: &str) -> StreamInfo {
    let mut codec = CodecParameters::new(media_type, codec_id);
    match media_type {
        MediaType::Audio => {
            codec.sample_rate = Some(48_000);
            codec.channels = Some(2);
        }
        MediaType::Video => {
            codec.width = Some(1280);
            codec.height = Some(720);
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

pub(crate) fn packet(stream_index: usize, pts: i64, keyframe: bool) -> Packet {
    Packet {
        stream_index,
        pts: Some(pts),
        dts: Some(pts),
        duration: 20,
        keyframe,
        data: vec![stream_index as u8; 4],
    }
}

/// Plays back a fixed packet list, honoring discard and rewinding on seek.
pub(crate) struct ScriptedFormat {
    pub streams: Vec<StreamInfo>,
    pub packets: Vec<Packet>,
    pub cursor: usize,
    pub discard: HashMap<usize, Discard>,
    pub metadata: Dictionary,
}

impl ScriptedFormat {
    pub(crate) fn new(streams: Vec<StreamInfo>, packets: Vec<Packet>) -> Self {
        Self {
            streams,
            packets,
            cursor: 0,
            discard: HashMap::new(),
            metadata: Dictionary::new(),
        }
    }
}

impl FormatContext for ScriptedFormat {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn find_stream_info(&mut self) -> Result<()> {
        Ok(())
    }

    fn find_best_stream(&self, media_type: MediaType) -> Option<usize> {
        self.streams
            .iter()
            .find(|s| s.media_type() == media_type)
            .map(|s| s.index)
    }

    fn duration(&self) -> Option<i64> {
        Some(10_000_000)
    }

    fn start_time(&self) -> Option<i64> {
        None
    }

    fn metadata(&self) -> &Dictionary {
        &self.metadata
    }

    fn set_discard(&mut self, stream_index: usize, discard: Discard) {
        self.discard.insert(stream_index, discard);
    }

    fn discard(&self, stream_index: usize) -> Discard {
        self.discard.get(&stream_index).copied().unwrap_or_default()
    }

    fn read_frame(&mut self) -> Result<Option<Packet>> {
        while let Some(packet) = self.packets.get(self.cursor) {
            self.cursor += 1;
            if self.discard(packet.stream_index) == Discard::Default {
                return Ok(Some(packet.clone()));
            }
        }
        Ok(None)
    }

    fn seek_file(
        &mut self,
        _stream_index: Option<usize>,
        _min_ts: i64,
        _ts: i64,
        _max_ts: i64,
        _flags: SeekFlags,
    ) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}
