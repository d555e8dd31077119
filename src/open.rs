// src/open.rs

//! Open / probe stage.
//!
//! Both entry points end in the same `open(url, config)` path:
//! - `open_with_stream` wraps the host byte source in the I/O shim and opens an empty url
//! - `open_with_uri` hands the url to the codec library as-is
//!
//! Every failure here is construction-time and surfaces as
//! `Error::UnsupportedMediaFormat`.

use tracing::{debug, warn};

use crate::byte_source::ByteSourceHandle;
use crate::codec::{CodecLibrary, FormatContext};
use crate::config::{Config, Dictionary};
use crate::io_context::IoContext;
use crate::{Error, Result};

/// Open the codec library over the host byte source.
pub(crate) fn open_with_stream(
    library: &dyn CodecLibrary,
    source: &ByteSourceHandle,
    config: Option<&Config>,
) -> Result<Box<dyn FormatContext>> {
    let io = IoContext::new(source);
    open(library, "", Some(io), config)
}

/// Open a url the codec library understands natively.
pub(crate) fn open_with_uri(
    library: &dyn CodecLibrary,
    uri: &str,
    config: Option<&Config>,
) -> Result<Box<dyn FormatContext>> {
    open(library, uri, None, config)
}

fn open(
    library: &dyn CodecLibrary,
    url: &str,
    io: Option<IoContext>,
    config: Option<&Config>,
) -> Result<Box<dyn FormatContext>> {
    let mut options = config
        .map(|c| c.ffmpeg_options.clone())
        .unwrap_or_else(Dictionary::new);

    let mut format = library
        .open_input(url, io, &mut options)
        .map_err(|err| into_unsupported("open_input failed", err))?;

    if !options.is_empty() {
        let unused: Vec<&str> = options.keys().collect();
        warn!(?unused, "codec library ignored options");
    }

    format
        .find_stream_info()
        .map_err(|err| into_unsupported("find_stream_info failed", err))?;

    debug!(streams = format.streams().len(), "input probed");
    Ok(format)
}

fn into_unsupported(context: &str, err: Error) -> Error {
    match err {
        Error::UnsupportedMediaFormat(_) => err,
        other => Error::unsupported_format(format!("{context}: {other}")),
    }
}
