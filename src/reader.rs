//! The packet loop over the session's single format context.
//!
//! Sample providers ask the reader for "the next packet of my stream". The
//! demuxer produces packets interleaved across streams, so the reader parks
//! packets of other active streams in per-stream queues until their provider
//! asks for them.
//!
//! The reader is owned by the adapter state and is only ever reached through
//! the adapter mutex, so it needs no lock of its own.
//!
//! Queues are unbounded: a selected stream the host never pulls keeps every
//! packet read on behalf of its siblings. Each time a queue grows by another
//! `BACKLOG_WARN_LEN` packets a warning is logged.

use std::collections::{HashMap, VecDeque};

use tracing::{trace, warn};

use crate::Result;
use crate::codec::{Discard, FormatContext, Packet, SeekFlags};

/// Queue length at which a stream's backlog is reported.
pub const BACKLOG_WARN_LEN: usize = 1024;

pub struct Reader {
    format: Box<dyn FormatContext>,
    queues: HashMap<usize, VecDeque<Packet>>,
}

impl Reader {
    pub fn new(format: Box<dyn FormatContext>) -> Self {
        Self {
            format,
            queues: HashMap::new(),
        }
    }

    pub fn format(&self) -> &dyn FormatContext {
        self.format.as_ref()
    }

    /// Return the next packet of `stream_index`, or `Ok(None)` at end of file.
    ///
    /// Packets of other streams read along the way are queued for their own
    /// providers, unless those streams are discarded.
    pub fn read_next_packet(&mut self, stream_index: usize) -> Result<Option<Packet>> {
        if let Some(packet) = self
            .queues
            .get_mut(&stream_index)
            .and_then(VecDeque::pop_front)
        {
            return Ok(Some(packet));
        }

        while let Some(packet) = self.format.read_frame()? {
            if packet.stream_index == stream_index {
                return Ok(Some(packet));
            }

            if self.format.discard(packet.stream_index) == Discard::All {
                trace!(stream_index = packet.stream_index, "dropping packet of discarded stream");
                continue;
            }

            let queued_for = packet.stream_index;
            let queue = self.queues.entry(queued_for).or_default();
            queue.push_back(packet);
            if queue.len() % BACKLOG_WARN_LEN == 0 {
                warn!(
                    stream_index = queued_for,
                    queued = queue.len(),
                    "selected stream is not being pulled"
                );
            }
        }

        Ok(None)
    }

    /// Change the demuxer-level discard policy of a stream.
    ///
    /// Discarding a stream also drops whatever was already queued for it.
    pub fn set_discard(&mut self, stream_index: usize, discard: Discard) {
        self.format.set_discard(stream_index, discard);
        if discard == Discard::All {
            self.queues.remove(&stream_index);
        }
    }

    /// Seek the format context and drop every queued packet.
    pub fn seek(
        &mut self,
        stream_index: Option<usize>,
        min_ts: i64,
        ts: i64,
        max_ts: i64,
        flags: SeekFlags,
    ) -> Result<()> {
        self.format
            .seek_file(stream_index, min_ts, ts, max_ts, flags)?;
        self.flush();
        Ok(())
    }

    pub fn flush(&mut self) {
        self.queues.clear();
    }

    pub fn queued(&self, stream_index: usize) -> usize {
        self.queues.get(&stream_index).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MediaType;
    use crate::test_support::{ScriptedFormat, packet, stream};

    fn reader() -> Reader {
        let streams = vec![
            stream(0, MediaType::Video, "h264"),
            stream(1, MediaType::Audio, "aac"),
            stream(2, MediaType::Audio, "aac"),
        ];
        let packets = vec![
            packet(1, 0, true),
            packet(2, 0, true),
            packet(0, 0, true),
            packet(1, 20, true),
            packet(0, 40, false),
        ];
        Reader::new(Box::new(ScriptedFormat::new(streams, packets)))
    }

    #[test]
    fn interleaved_packets_are_queued_for_their_stream() -> anyhow::Result<()> {
        let mut reader = reader();

        let first = reader.read_next_packet(0)?.map(|p| p.pts);
        assert_eq!(first, Some(Some(0)));
        assert_eq!(reader.queued(1), 1);
        assert_eq!(reader.queued(2), 1);

        assert_eq!(reader.read_next_packet(1)?.and_then(|p| p.pts), Some(0));
        assert_eq!(reader.read_next_packet(1)?.and_then(|p| p.pts), Some(20));
        assert_eq!(reader.queued(0), 0);
        Ok(())
    }

    #[test]
    fn discarded_streams_are_neither_read_nor_queued() -> anyhow::Result<()> {
        let mut reader = reader();
        reader.set_discard(2, Discard::All);

        reader.read_next_packet(0)?;
        assert_eq!(reader.queued(2), 0);
        assert_eq!(reader.queued(1), 1);

        // Discarding after the fact drops the queue too.
        reader.set_discard(1, Discard::All);
        assert_eq!(reader.queued(1), 0);
        Ok(())
    }

    #[test]
    fn end_of_file_is_none_and_seek_flushes() -> anyhow::Result<()> {
        let mut reader = reader();
        reader.set_discard(1, Discard::All);
        reader.set_discard(2, Discard::All);

        assert!(reader.read_next_packet(0)?.is_some());
        assert!(reader.read_next_packet(0)?.is_some());
        assert!(reader.read_next_packet(0)?.is_none());

        reader.set_discard(1, Discard::Default);
        reader.seek(None, i64::MIN, 0, 0, SeekFlags::NONE)?;
        assert_eq!(reader.read_next_packet(0)?.and_then(|p| p.pts), Some(0));
        assert_eq!(reader.queued(1), 1);
        Ok(())
    }

    #[test]
    fn an_unpulled_stream_keeps_its_whole_backlog() -> anyhow::Result<()> {
        let streams = vec![
            stream(0, MediaType::Video, "h264"),
            stream(1, MediaType::Subtitle, "subrip"),
        ];
        let backlog = BACKLOG_WARN_LEN + 5;
        let mut packets: Vec<_> = (0..backlog as i64).map(|pts| packet(1, pts, true)).collect();
        packets.push(packet(0, 0, true));
        let mut reader = Reader::new(Box::new(ScriptedFormat::new(streams, packets)));

        assert!(reader.read_next_packet(0)?.is_some());
        assert_eq!(reader.queued(1), backlog);
        for pts in 0..backlog as i64 {
            assert_eq!(reader.read_next_packet(1)?.and_then(|p| p.pts), Some(pts));
        }
        assert_eq!(reader.queued(1), 0);
        Ok(())
    }
}
