//! Container metadata and cover art, in the shape the host displays them.

use serde::Serialize;

use crate::codec::StreamInfo;
use crate::config::Dictionary;

/// Display properties published to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaProperties {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub composer: Option<String>,
    pub comment: Option<String>,
    /// Tags without a dedicated property, in container order.
    pub other: Vec<(String, String)>,
}

impl MediaProperties {
    /// Build properties from container tags.
    ///
    /// Keys match case-insensitively. The first value wins when a container
    /// repeats a key.
    pub fn from_tags(tags: &Dictionary) -> Self {
        let mut props = MediaProperties::default();

        for (key, value) in tags.iter() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            let slot = match key.to_ascii_lowercase().as_str() {
                "title" => &mut props.title,
                "artist" | "author" => &mut props.artist,
                "album_artist" | "album artist" => &mut props.album_artist,
                "album" => &mut props.album,
                "genre" => &mut props.genre,
                "composer" => &mut props.composer,
                "comment" | "description" => &mut props.comment,
                "date" | "year" => {
                    if props.year.is_none() {
                        props.year = parse_year(value);
                    }
                    continue;
                }
                "track" | "tracknumber" => {
                    if props.track_number.is_none() {
                        props.track_number = parse_track(value);
                    }
                    continue;
                }
                _ => {
                    props.other.push((key.to_string(), value.to_string()));
                    continue;
                }
            };

            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }

        props
    }
}

// "2004-05-01" and "2004" both carry the year up front.
fn parse_year(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

// "3/12" → 3
fn parse_track(value: &str) -> Option<u32> {
    value.split('/').next()?.trim().parse().ok()
}

/// A still image shown by the host while nothing else is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thumbnail {
    pub content_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// The cover art carried by an attached-picture stream, if it has any bytes.
pub fn thumbnail_from_stream(stream: &StreamInfo) -> Option<Thumbnail> {
    let pic = stream.attached_pic.as_ref()?;
    if pic.data.is_empty() {
        return None;
    }

    Some(Thumbnail {
        content_type: sniff_image_type(&pic.data).to_string(),
        data: pic.data.clone(),
    })
}

fn sniff_image_type(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'B', b'M', ..] => "image/bmp",
        _ => "application/octet-stream",
    }
}
