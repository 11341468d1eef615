//! canvasd - depth canvas daemon
//!
//! This daemon:
//! 1. Loads the config and the shape templates
//! 2. Opens the depth source (fatal on failure)
//! 3. Runs every frame through the pipeline for the selected tool
//! 4. Publishes frame payloads and background lifecycle events
//! 5. On exit, publishes removals for everything still known downstream

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use depth_canvas::ingest::{open_source, DepthSource};
use depth_canvas::transport::{deliver, EventSink, MqttSink, NullSink};
use depth_canvas::{CanvasConfig, Pipeline, TemplateManager, Tool};

const IDLE_SLEEP: Duration = Duration::from_millis(10);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Interpret sand-table depth frames into canvas events")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "CANVAS_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Active tool: 1-3 draw strokes, 4 places objects.
    #[arg(long, env = "CANVAS_TOOL", default_value = "4")]
    tool: Tool,

    /// Depth source (stub://name, replay://dir or a capture directory).
    #[arg(long)]
    source: Option<String>,

    /// Do not connect to the broker; events are dropped.
    #[arg(long)]
    bypass_transport: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = CanvasConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.sensor.source = source;
    }
    if args.bypass_transport {
        cfg.transport.bypass = true;
    }

    let templates = TemplateManager::load(&cfg.template_dir, &cfg.matching)
        .with_context(|| format!("loading templates from {}", cfg.template_dir.display()))?;
    if templates.is_empty() {
        log::warn!(
            "no templates in {}: objects cannot be classified",
            cfg.template_dir.display()
        );
    }

    let mut source = open_source(&cfg.sensor, cfg.roi)?;
    let mut sink: Box<dyn EventSink> = if cfg.transport.bypass {
        log::warn!("transport bypassed: events are not published");
        Box::new(NullSink)
    } else {
        Box::new(MqttSink::connect(&cfg.transport)?)
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .expect("error setting Ctrl-C handler");
    }

    let mut pipeline = Pipeline::new(&cfg, Arc::new(templates), args.tool);
    log::info!(
        "canvasd running. source={} tool={} roi={}x{}",
        source.name(),
        args.tool,
        cfg.roi.width(),
        cfg.roi.height()
    );

    let result = run(source.as_mut(), &mut pipeline, sink.as_mut(), &stop);
    if let Err(e) = &result {
        log::error!("frame loop stopped: {:#}", e);
    }

    let sent = deliver(sink.as_mut(), &pipeline.shutdown_report());
    log::info!("shutdown: {} messages published", sent);
    source.close();
    if let Err(e) = sink.close() {
        log::warn!("closing transport failed: {}", e);
    }
    result
}

fn run(
    source: &mut dyn DepthSource,
    pipeline: &mut Pipeline,
    sink: &mut dyn EventSink,
    stop: &AtomicBool,
) -> Result<()> {
    let mut frames = 0u64;
    let mut published = 0usize;
    let mut last_health_log = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        if !source.has_new_frame() {
            if source.is_exhausted() {
                log::info!("source {} exhausted", source.name());
                break;
            }
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }

        let frame = source.get_frame()?;
        let report = pipeline.process(&frame)?;
        published += deliver(sink, &report);
        frames += 1;

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::info!(
                "frames={} published={} calibrated={}",
                frames,
                published,
                pipeline.is_calibrated()
            );
            last_health_log = Instant::now();
        }
        std::thread::yield_now();
    }
    Ok(())
}
