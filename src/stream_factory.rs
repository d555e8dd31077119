//! Builds a sample provider and a host stream descriptor for each demuxed stream.
//!
//! The factory is the only place providers are constructed; the adapter never
//! needs to know which concrete variant it got back.

use crate::codec::{FormatContext, StreamInfo};
use crate::config::Config;
use crate::mss::{
    AudioEncoding, EncodingProperties, StreamDescriptor, TimedMetadataEncoding, VideoEncoding,
};
use crate::sample_provider::{
    AudioSampleProvider, SampleProvider, SubtitleSampleProvider, VideoSampleProvider,
};
use crate::{Error, Result};

/// A provider paired with the descriptor the host will know it by.
pub type StreamPair = (Box<dyn SampleProvider>, StreamDescriptor);

/// Pluggable construction of per-stream providers.
pub trait StreamFactory: Send + Sync {
    fn create_audio_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
        config: Option<&Config>,
    ) -> Result<StreamPair>;

    fn create_video_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
        config: Option<&Config>,
    ) -> Result<StreamPair>;

    /// Fails with `Error::UnsupportedStream` for subtitle codecs the host can't show.
    fn create_subtitle_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
    ) -> Result<StreamPair>;
}

/// Passes compressed packets through to the host untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStreamFactory;

impl StreamFactory for DefaultStreamFactory {
    fn create_audio_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
        _config: Option<&Config>,
    ) -> Result<StreamPair> {
        let codec = &stream.codec;
        let (Some(sample_rate), Some(channels)) = (codec.sample_rate, codec.channels) else {
            return Err(Error::unsupported_format(format!(
                "audio stream {} ({}) has no sample rate or channel layout",
                stream.index, codec.codec_id
            )));
        };

        let encoding = EncodingProperties::Audio(AudioEncoding {
            subtype: audio_subtype(&codec.codec_id),
            sample_rate,
            channels,
            bits_per_sample: codec.bits_per_sample.unwrap_or(0),
            bitrate: codec.bit_rate.unwrap_or(0),
        });

        let provider = AudioSampleProvider::new(stream, format.start_time());
        Ok((Box::new(provider), descriptor(encoding, stream)))
    }

    fn create_video_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
        _config: Option<&Config>,
    ) -> Result<StreamPair> {
        let codec = &stream.codec;
        let (Some(width), Some(height)) = (codec.width, codec.height) else {
            return Err(Error::unsupported_format(format!(
                "video stream {} ({}) has no dimensions",
                stream.index, codec.codec_id
            )));
        };

        let encoding = EncodingProperties::Video(VideoEncoding {
            subtype: video_subtype(&codec.codec_id),
            width,
            height,
            frame_rate: codec
                .frame_rate
                .filter(|r| r.is_valid())
                .map(|r| (r.num, r.den)),
            bitrate: codec.bit_rate.unwrap_or(0),
        });

        let provider = VideoSampleProvider::new(stream, format.start_time());
        Ok((Box::new(provider), descriptor(encoding, stream)))
    }

    fn create_subtitle_stream(
        &self,
        format: &dyn FormatContext,
        stream: &StreamInfo,
    ) -> Result<StreamPair> {
        let Some(subtype) = subtitle_subtype(&stream.codec.codec_id) else {
            return Err(Error::UnsupportedStream {
                index: stream.index,
                reason: format!("subtitle codec {} is not text based", stream.codec.codec_id),
            });
        };

        let encoding = EncodingProperties::TimedMetadata(TimedMetadataEncoding {
            subtype: subtype.to_string(),
        });

        let provider = SubtitleSampleProvider::new(stream, format.start_time());
        Ok((Box::new(provider), descriptor(encoding, stream)))
    }
}

fn descriptor(encoding: EncodingProperties, stream: &StreamInfo) -> StreamDescriptor {
    StreamDescriptor::new(encoding, stream.title.clone(), stream.language.clone())
}

fn audio_subtype(codec_id: &str) -> String {
    match codec_id {
        "aac" => "AAC".into(),
        "mp3" | "mp3float" => "MP3".into(),
        "mp2" | "mp1" => "MPEG".into(),
        "ac3" => "AC3".into(),
        "eac3" => "EAC3".into(),
        "flac" => "FLAC".into(),
        "alac" => "ALAC".into(),
        "opus" => "OPUS".into(),
        "vorbis" => "VORBIS".into(),
        id if id.starts_with("pcm_f") => "Float".into(),
        id if id.starts_with("pcm_") => "PCM".into(),
        other => other.to_ascii_uppercase(),
    }
}

fn video_subtype(codec_id: &str) -> String {
    match codec_id {
        "h264" => "H264".into(),
        "hevc" | "h265" => "HEVC".into(),
        "mpeg4" => "MP4V".into(),
        "mpeg2video" => "MPEG2".into(),
        "mjpeg" => "MJPG".into(),
        "wmv3" => "WMV3".into(),
        "vc1" => "WVC1".into(),
        "vp8" => "VP80".into(),
        "vp9" => "VP90".into(),
        "av1" => "AV01".into(),
        other => other.to_ascii_uppercase(),
    }
}

fn subtitle_subtype(codec_id: &str) -> Option<&'static str> {
    match codec_id {
        "subrip" | "srt" => Some("SRT"),
        "ass" | "ssa" => Some("SSA"),
        "webvtt" => Some("VTT"),
        "mov_text" => Some("TX3G"),
        "text" => Some("TEXT"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MediaType;
    use crate::test_support::{ScriptedFormat, stream};

    #[test]
    fn audio_descriptor_carries_encoding_and_language() -> anyhow::Result<()> {
        let mut s = stream(0, MediaType::Audio, "aac");
        s.language = Some("jpn".into());
        s.title = Some("Commentary".into());
        let format = ScriptedFormat::new(vec![s.clone()], Vec::new());

        let (provider, desc) = DefaultStreamFactory.create_audio_stream(&format, &s, None)?;
        assert_eq!(provider.stream_index(), 0);
        assert!(!provider.is_selected());
        assert_eq!(desc.language(), Some("jpn"));
        assert_eq!(desc.name(), Some("Commentary"));
        match desc.encoding() {
            EncodingProperties::Audio(a) => {
                assert_eq!(a.subtype, "AAC");
                assert_eq!(a.sample_rate, 48_000);
                assert_eq!(a.channels, 2);
            }
            other => panic!("unexpected encoding {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn audio_without_layout_is_unsupported() {
        let mut s = stream(0, MediaType::Audio, "aac");
        s.codec.channels = None;
        let format = ScriptedFormat::new(vec![s.clone()], Vec::new());

        let err = DefaultStreamFactory
            .create_audio_stream(&format, &s, None)
            .err()
            .expect("error");
        assert!(matches!(err, Error::UnsupportedMediaFormat(_)));
    }

    #[test]
    fn bitmap_subtitles_are_rejected() {
        let s = stream(3, MediaType::Subtitle, "hdmv_pgs_subtitle");
        let format = ScriptedFormat::new(vec![s.clone()], Vec::new());

        let err = DefaultStreamFactory
            .create_subtitle_stream(&format, &s)
            .err()
            .expect("error");
        assert!(matches!(err, Error::UnsupportedStream { index: 3, .. }));
    }

    #[test]
    fn subtypes_map_common_codecs() {
        assert_eq!(audio_subtype("pcm_s16le"), "PCM");
        assert_eq!(audio_subtype("pcm_f32le"), "Float");
        assert_eq!(video_subtype("hevc"), "HEVC");
        assert_eq!(video_subtype("theora"), "THEORA");
        assert_eq!(subtitle_subtype("mov_text"), Some("TX3G"));
    }
}
