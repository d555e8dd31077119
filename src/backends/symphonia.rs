// src/backends/symphonia.rs

//! Codec library backed by Symphonia.
//!
//! Symphonia demuxes audio containers (WAV, FLAC, MP3, MP4/M4A, MKV/WebM, OGG, ...)
//! without decoding, which is all the adapter needs. Every track becomes a
//! stream; a front-cover picture in the container tags becomes an extra video
//! stream flagged `ATTACHED_PIC`, the way cover art usually shows up.
//!
//! Recognized options:
//! - `format`: container hint (file extension, e.g. `"mp3"`)
//! - `enable_gapless`: `true`/`false`/`1`/`0`
//! - `prebuild_seek_index`: `true`/`false`/`1`/`0`
//! - `seek_index_fill_rate`: seconds between seek index entries

use std::fs::File;
use std::io;
use std::path::Path;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey};
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

use crate::codec::{
    CodecLibrary, CodecParameters, Discard, Disposition, FormatContext, MediaType, Packet,
    SeekFlags, StreamInfo,
};
use crate::config::Dictionary;
use crate::io_context::IoContext;
use crate::time::{Rational, TIME_BASE, rescale};
use crate::{Error, Result};

/// Opens inputs with Symphonia's default probe and codec registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaLibrary;

impl CodecLibrary for SymphoniaLibrary {
    fn open_input(
        &self,
        url: &str,
        io: Option<IoContext>,
        options: &mut Dictionary,
    ) -> Result<Box<dyn FormatContext>> {
        let (mut hint_extension, format_opts) = take_options(options)?;

        let source: Box<dyn MediaSource> = match io {
            Some(io) => Box::new(io),
            None => {
                let path = local_path(url)?;
                if hint_extension.is_none() {
                    hint_extension = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(str::to_string);
                }
                let file = File::open(path).map_err(Error::ExternalIo)?;
                Box::new(file)
            }
        };

        let format = SymphoniaFormat::probe(source, hint_extension.as_deref(), format_opts)?;
        Ok(Box::new(format))
    }
}

fn take_options(options: &mut Dictionary) -> Result<(Option<String>, FormatOptions)> {
    let mut format_opts = FormatOptions::default();

    let hint = options.take("format");
    if let Some(value) = options.take("enable_gapless") {
        format_opts.enable_gapless = parse_bool("enable_gapless", &value)?;
    }
    if let Some(value) = options.take("prebuild_seek_index") {
        format_opts.prebuild_seek_index = parse_bool("prebuild_seek_index", &value)?;
    }
    if let Some(value) = options.take("seek_index_fill_rate") {
        format_opts.seek_index_fill_rate = value.trim().parse().map_err(|_| {
            Error::unsupported_format(format!("invalid seek_index_fill_rate: {value:?}"))
        })?;
    }

    Ok((hint, format_opts))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::unsupported_format(format!("invalid {key}: {value:?}"))),
    }
}

/// Local paths and `file://` urls. Network protocols are the host's business.
fn local_path(url: &str) -> Result<&Path> {
    match url.split_once("://") {
        None => Ok(Path::new(url)),
        Some(("file", path)) => Ok(Path::new(path)),
        Some((scheme, _)) => Err(Error::unsupported_format(format!(
            "unsupported protocol: {scheme}"
        ))),
    }
}

/// A probed Symphonia format reader.
pub struct SymphoniaFormat {
    reader: Box<dyn FormatReader>,
    streams: Vec<StreamInfo>,
    // Symphonia track id per stream; `None` for the cover-art stream.
    track_ids: Vec<Option<u32>>,
    default_stream: Option<usize>,
    discard: Vec<Discard>,
    metadata: Dictionary,
    duration: Option<i64>,
    start_time: Option<i64>,
}

impl SymphoniaFormat {
    fn probe(
        source: Box<dyn MediaSource>,
        hint_extension: Option<&str>,
        format_opts: FormatOptions,
    ) -> Result<Self> {
        let mss_opts = MediaSourceStreamOptions {
            // Symphonia expects a power-of-two buffer > 32KiB for good probing behavior.
            buffer_len: 256 * 1024,
        };
        let mss = MediaSourceStream::new(source, mss_opts);

        let mut hint = Hint::new();
        if let Some(ext) = hint_extension {
            hint.with_extension(ext);
        }

        let metadata_opts: MetadataOptions = Default::default();
        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::unsupported_format(format!("failed to probe media stream: {e}")))?;

        let mut metadata = Dictionary::new();
        let mut cover = None;

        // Tags found ahead of the container (e.g. ID3v2 in MP3), then the container's own.
        if let Some(probed_meta) = probed.metadata.get() {
            if let Some(revision) = probed_meta.current() {
                collect_revision(revision, &mut metadata, &mut cover);
            }
        }
        let mut reader = probed.format;
        {
            let container_meta = reader.metadata();
            if let Some(revision) = container_meta.current() {
                collect_revision(revision, &mut metadata, &mut cover);
            }
        }

        let default_track_id = reader.default_track().map(|t| t.id);
        let mut streams = Vec::new();
        let mut track_ids = Vec::new();
        let mut default_stream = None;

        for (index, track) in reader.tracks().iter().enumerate() {
            let mut info = track_stream(index, track);
            if Some(track.id) == default_track_id {
                info.disposition = info.disposition | Disposition::DEFAULT;
                default_stream = Some(index);
            }
            streams.push(info);
            track_ids.push(Some(track.id));
        }

        if let Some((media_type, data)) = cover {
            let index = streams.len();
            trace!(stream_index = index, %media_type, "cover art stream");
            streams.push(cover_stream(index, &media_type, data));
            track_ids.push(None);
        }

        let (duration, start_time) = default_stream
            .map(|i| timing(&reader.tracks()[i]))
            .unwrap_or((None, None));

        debug!(
            streams = streams.len(),
            ?duration,
            ?start_time,
            "symphonia input opened"
        );

        Ok(Self {
            reader,
            discard: vec![Discard::Default; streams.len()],
            streams,
            track_ids,
            default_stream,
            metadata,
            duration,
            start_time,
        })
    }

    fn stream_of_track(&self, track_id: u32) -> Option<usize> {
        self.track_ids.iter().position(|id| *id == Some(track_id))
    }
}

fn track_time_base(track: &Track) -> Option<Rational> {
    let params = &track.codec_params;
    let from_time_base = params.time_base.and_then(|tb| {
        Some(Rational::new(
            i32::try_from(tb.numer).ok()?,
            i32::try_from(tb.denom).ok()?,
        ))
    });
    from_time_base
        .or_else(|| {
            let rate = i32::try_from(params.sample_rate?).ok()?;
            Some(Rational::new(1, rate))
        })
        .filter(Rational::is_valid)
}

fn track_stream(index: usize, track: &Track) -> StreamInfo {
    let params = &track.codec_params;

    let (media_type, codec_id) = if params.codec == CODEC_TYPE_NULL {
        (MediaType::Unknown, "none".to_string())
    } else {
        let codec_id = symphonia::default::get_codecs()
            .get_codec(params.codec)
            .map(|d| d.short_name.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        (MediaType::Audio, codec_id)
    };

    let mut codec = CodecParameters::new(media_type, codec_id);
    codec.sample_rate = params.sample_rate;
    codec.channels = params
        .channels
        .and_then(|c| u16::try_from(c.count()).ok());
    codec.bits_per_sample = params.bits_per_sample;
    codec.extradata = params.extra_data.as_deref().map(<[u8]>::to_vec).unwrap_or_default();

    StreamInfo {
        index,
        codec,
        time_base: track_time_base(track).unwrap_or(TIME_BASE),
        disposition: Disposition::NONE,
        language: track.language.clone(),
        title: None,
        attached_pic: None,
    }
}

fn cover_stream(index: usize, media_type: &str, data: Vec<u8>) -> StreamInfo {
    let codec_id = match media_type {
        "image/jpeg" | "image/jpg" => "mjpeg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "unknown",
    };

    StreamInfo {
        index,
        codec: CodecParameters::new(MediaType::Video, codec_id),
        time_base: TIME_BASE,
        disposition: Disposition::ATTACHED_PIC,
        language: None,
        title: None,
        attached_pic: Some(Packet {
            stream_index: index,
            pts: None,
            dts: None,
            duration: 0,
            keyframe: true,
            data,
        }),
    }
}

/// Container duration and start time of a track, in `TIME_BASE` units.
fn timing(track: &Track) -> (Option<i64>, Option<i64>) {
    let Some(base) = track_time_base(track) else {
        return (None, None);
    };
    let params = &track.codec_params;
    let to_base = |ts: u64| i64::try_from(ts).ok().map(|ts| rescale(ts, base, TIME_BASE));

    (params.n_frames.and_then(to_base), to_base(params.start_ts))
}

fn collect_revision(
    revision: &MetadataRevision,
    tags: &mut Dictionary,
    cover: &mut Option<(String, Vec<u8>)>,
) {
    for tag in revision.tags() {
        let key = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => "title",
            Some(StandardTagKey::Artist) => "artist",
            Some(StandardTagKey::AlbumArtist) => "album_artist",
            Some(StandardTagKey::Album) => "album",
            Some(StandardTagKey::Genre) => "genre",
            Some(StandardTagKey::Date) => "date",
            Some(StandardTagKey::TrackNumber) => "track",
            Some(StandardTagKey::Composer) => "composer",
            Some(StandardTagKey::Comment) => "comment",
            _ => tag.key.as_str(),
        };
        if tags.get(key).is_none() {
            tags.set(key, tag.value.to_string());
        }
    }

    if cover.is_none() {
        let visuals = revision.visuals();
        let front = visuals
            .iter()
            .find(|v| v.usage == Some(StandardVisualKey::FrontCover))
            .or_else(|| visuals.first());
        if let Some(visual) = front {
            *cover = Some((visual.media_type.clone(), visual.data.to_vec()));
        }
    }
}

fn from_symphonia(err: SymphoniaError) -> Error {
    match err {
        SymphoniaError::IoError(err) => Error::ExternalIo(err),
        SymphoniaError::SeekError(SeekErrorKind::OutOfRange) => {
            Error::InvalidTimestamp("seek target out of range".to_string())
        }
        other => Error::msg(other.to_string()),
    }
}

impl FormatContext for SymphoniaFormat {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn find_stream_info(&mut self) -> Result<()> {
        // Symphonia reads codec parameters while probing.
        if self.track_ids.iter().all(Option::is_none) {
            return Err(Error::unsupported_format("no tracks found"));
        }
        Ok(())
    }

    fn find_best_stream(&self, media_type: MediaType) -> Option<usize> {
        self.default_stream
            .filter(|&i| self.streams[i].media_type() == media_type)
            .or_else(|| {
                self.streams
                    .iter()
                    .find(|s| s.media_type() == media_type && !s.is_attached_pic())
                    .map(|s| s.index)
            })
    }

    fn duration(&self) -> Option<i64> {
        self.duration
    }

    fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    fn metadata(&self) -> &Dictionary {
        &self.metadata
    }

    fn set_discard(&mut self, stream_index: usize, discard: Discard) {
        if let Some(slot) = self.discard.get_mut(stream_index) {
            *slot = discard;
        }
    }

    fn discard(&self, stream_index: usize) -> Discard {
        self.discard.get(stream_index).copied().unwrap_or_default()
    }

    fn read_frame(&mut self) -> Result<Option<Packet>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                // The reader signals the end of the input with an unexpected-EOF I/O error.
                Err(SymphoniaError::IoError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    trace!(error = %err, "end of input");
                    return Ok(None);
                }
                Err(err) => return Err(from_symphonia(err)),
            };

            let Some(stream_index) = self.stream_of_track(packet.track_id()) else {
                continue;
            };
            if self.discard(stream_index) == Discard::All {
                continue;
            }

            let pts = i64::try_from(packet.ts()).ok();
            return Ok(Some(Packet {
                stream_index,
                pts,
                dts: pts,
                duration: i64::try_from(packet.dur()).unwrap_or(0),
                keyframe: true,
                data: packet.buf().to_vec(),
            }));
        }
    }

    fn seek_file(
        &mut self,
        stream_index: Option<usize>,
        _min_ts: i64,
        ts: i64,
        max_ts: i64,
        flags: SeekFlags,
    ) -> Result<()> {
        if flags.contains(SeekFlags::BYTE) {
            return Err(Error::msg("byte seeking is not supported"));
        }

        let target_stream = self
            .default_stream
            .ok_or_else(|| Error::msg("input has no seekable track"))?;
        let track_id = self.track_ids[target_stream]
            .ok_or_else(|| Error::msg("input has no seekable track"))?;

        // Bring the target into the default track's time base.
        let from_base = stream_index
            .and_then(|i| self.streams.get(i))
            .map_or(TIME_BASE, |s| s.time_base);
        let to_base = self.streams[target_stream].time_base;
        let target = rescale(ts, from_base, to_base).max(0);

        // Landing at or before `ts` needs an accurate seek.
        let mode = if max_ts == ts {
            SeekMode::Accurate
        } else {
            SeekMode::Coarse
        };

        let seeked = self
            .reader
            .seek(
                mode,
                SeekTo::TimeStamp {
                    ts: target.unsigned_abs(),
                    track_id,
                },
            )
            .map_err(from_symphonia)?;

        trace!(
            required_ts = seeked.required_ts,
            actual_ts = seeked.actual_ts,
            "symphonia seek"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_options_are_consumed() -> anyhow::Result<()> {
        let mut options: Dictionary = [
            ("format", "mp3"),
            ("enable_gapless", "1"),
            ("probesize", "32"),
            ("seek_index_fill_rate", "5"),
        ]
        .into_iter()
        .collect();

        let (hint, opts) = take_options(&mut options)?;
        assert_eq!(hint.as_deref(), Some("mp3"));
        assert!(opts.enable_gapless);
        assert_eq!(opts.seek_index_fill_rate, 5);
        assert_eq!(options.keys().collect::<Vec<_>>(), ["probesize"]);
        Ok(())
    }

    #[test]
    fn invalid_option_values_fail() {
        let mut options: Dictionary = [("enable_gapless", "maybe")].into_iter().collect();
        assert!(matches!(
            take_options(&mut options),
            Err(Error::UnsupportedMediaFormat(_))
        ));
    }

    #[test]
    fn only_local_urls_are_opened() {
        assert!(local_path("/tmp/a.wav").is_ok());
        assert_eq!(
            local_path("file:///tmp/a.wav").ok(),
            Some(Path::new("/tmp/a.wav"))
        );
        assert!(matches!(
            local_path("https://example.com/a.mp3"),
            Err(Error::UnsupportedMediaFormat(_))
        ));
    }
}
