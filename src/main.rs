// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Plays a synthetic stream through the output pipeline into an in-memory sink.

use std::sync::Arc;
use std::sync::PoisonError;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Context;
use argh::FromArgs;
use log::debug;
use log::info;
use video_output::decoder::raw::RawDecoder;
use video_output::format::CodecId;
use video_output::format::Fourcc;
use video_output::format::PixelFormat;
use video_output::format::StreamFormat;
use video_output::lateness::MonotonicClock;
use video_output::sink::memory::MemorySinkFactory;
use video_output::sink::PresentationContext;
use video_output::source::QueueSource;
use video_output::DecodeSession;
use video_output::Parameters;
use video_output::StopSignals;

/// Delay before the first frame is due, leaving room for sink creation.
const START_DELAY_US: u64 = 100_000;

#[derive(FromArgs)]
/// Decode a uniform gray stream and present it on a memory sink.
struct Args {
    /// picture width
    #[argh(option, default = "320")]
    width: u32,

    /// picture height
    #[argh(option, default = "240")]
    height: u32,

    /// number of frames to play
    #[argh(option, default = "100")]
    frames: u32,

    /// frames per second
    #[argh(option, default = "25")]
    fps: u32,

    /// decoder output pixel format (yuv420p, yuv410p, ...)
    #[argh(option, default = "PixelFormat::Yuv420p")]
    format: PixelFormat,

    /// number of buffers allocated by the sink
    #[argh(option, default = "4")]
    buffers: usize,

    /// JSON file holding decoder parameters
    #[argh(option)]
    config: Option<String>,
}

fn gray_stream(args: &Args) -> QueueSource {
    let len = args
        .format
        .planes(args.width, args.height)
        .iter()
        .map(|plane| plane.width * plane.lines)
        .sum();
    let interval = 1_000_000 / u64::from(args.fps.max(1));
    let mut source = QueueSource::new();
    for i in 0..u64::from(args.frames) {
        source.push(vec![128u8; len], START_DELAY_US + i * interval);
    }
    source
}

/// Scans out every presented picture until `signals` asks to stop.
fn spawn_presenter(factory: MemorySinkFactory, signals: StopSignals) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let mut shown = 0;
        while !signals.should_stop() {
            for sink in factory.sinks() {
                let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                while let Some(frame) = sink.display_next() {
                    debug!("displayed picture at {}", frame.timestamp);
                    shown += 1;
                }
            }
            thread::sleep(Duration::from_millis(5));
        }
        shown
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    let params = match &args.config {
        Some(path) => Parameters::from_json_file(path)?,
        None => Parameters::default(),
    };

    let format = StreamFormat {
        codec: CodecId::RawVideo,
        fourcc: Fourcc::new(b"RAWV"),
        width: args.width,
        height: args.height,
        aspect_code: 1,
        pixel_format: args.format,
        extra_data: Vec::new(),
    };

    let factory = MemorySinkFactory::new(args.buffers);
    let context = Arc::new(PresentationContext::new(factory.clone()));
    let signals = StopSignals::new();
    let presenter = spawn_presenter(factory, signals.clone());

    let result = DecodeSession::new(
        format,
        params,
        Box::new(RawDecoder::new()),
        Box::new(gray_stream(&args)),
        context.clone(),
        signals.clone(),
        Box::new(MonotonicClock::new()),
    )
    .and_then(|mut session| session.run());

    signals.request_shutdown();
    let shown = presenter
        .join()
        .map_err(|_| anyhow!("presenter thread panicked"))?;
    context.destroy_unowned();

    let stats = result.context("decode session failed")?;
    info!("{} pictures scanned out", shown);
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}
