use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::Serialize;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use mss_bridge::config::Config;
use mss_bridge::logging;
use mss_bridge::metadata::{MediaProperties, Thumbnail};
use mss_bridge::mss::{ErrorStatus, MediaSample, StreamDescriptor};
use mss_bridge::time::HNS_PER_SEC;
use mss_bridge::{Interop, PullSource};

fn main() -> Result<()> {
    logging::init();
    let params = get_params()?;
    let config = get_config(&params)?;

    let interop = Interop::new();
    let mss: Arc<PullSource> = if params.uri {
        interop.create_from_uri(&params.input, None, Some(&config))?
    } else {
        let file = File::open(&params.input)
            .with_context(|| format!("failed to open input: {}", params.input))?;
        interop.create_from_stream(file, None, Some(&config))?
    };

    let start_hns = params.seek_ms.map(|ms| ms * (HNS_PER_SEC / 1000));
    mss.start(start_hns);

    let selected = mss.selected_streams();
    let streams = mss
        .stream_descriptors()
        .into_iter()
        .map(|descriptor| {
            let is_selected = selected.contains(&descriptor);
            let samples = if is_selected {
                pull_samples(&mss, &descriptor, params.samples)
            } else {
                Vec::new()
            };
            StreamReport {
                descriptor,
                selected: is_selected,
                samples,
            }
        })
        .collect();

    let report = Report {
        streams,
        duration_hns: mss.duration(),
        can_seek: mss.can_seek(),
        buffer_time_hns: mss.buffer_time(),
        properties: mss.media_properties(),
        thumbnail: mss.thumbnail(),
        errors: mss.errors(),
    };
    mss.close();

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn pull_samples(mss: &PullSource, descriptor: &StreamDescriptor, limit: usize) -> Vec<SampleReport> {
    (0..limit)
        .map_while(|_| mss.request_sample(descriptor))
        .map(|sample| SampleReport {
            size: sample.data.len(),
            sample,
        })
        .collect()
}

#[derive(Serialize)]
struct Report {
    streams: Vec<StreamReport>,
    duration_hns: Option<i64>,
    can_seek: bool,
    buffer_time_hns: Option<i64>,
    properties: Option<MediaProperties>,
    thumbnail: Option<Thumbnail>,
    errors: Vec<ErrorStatus>,
}

#[derive(Serialize)]
struct StreamReport {
    descriptor: StreamDescriptor,
    selected: bool,
    samples: Vec<SampleReport>,
}

#[derive(Serialize)]
struct SampleReport {
    #[serde(flatten)]
    sample: MediaSample,
    size: usize,
}

#[derive(Parser, Debug)]
#[command(name = "mss-probe")]
#[command(about = "Open a media file through the adapter and dump its streams and first samples as JSON")]
struct Params {
    /// Path to the input (or a url with `--uri`).
    #[arg(short = 'i', long = "input")]
    pub input: String,

    /// Let the codec library open the input itself instead of reading it as a byte stream.
    #[arg(long = "uri", default_value_t = false)]
    pub uri: bool,

    /// Samples to pull from every selected stream.
    #[arg(short = 'n', long = "samples", default_value_t = 5)]
    pub samples: usize,

    /// Seek before pulling samples (milliseconds).
    #[arg(short = 's', long = "seek-ms")]
    pub seek_ms: Option<i64>,

    /// JSON config document (`{"FFmpegOptions": {...}}`).
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Extra codec-library option, `key=value`. Repeatable; applied after `--config`.
    #[arg(short = 'o', long = "option")]
    pub options: Vec<String>,
}

fn get_params() -> Result<Params> {
    Ok(Params::parse())
}

fn get_config(params: &Params) -> Result<Config> {
    let mut config = match &params.config_path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {path}"))?;
            Config::from_json(&json)?
        }
        None => Config::default(),
    };

    for option in &params.options {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| anyhow!("option must be key=value, got {option:?}"))?;
        config.ffmpeg_options.set(key, value);
    }
    Ok(config)
}
