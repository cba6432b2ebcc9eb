// src/main.rs
//
// Offline replay harness: feeds a JSONL detection dump (one frame per line)
// through the fall pipeline and logs what a live deployment would render.
// Video decoding and the detector itself live upstream; this binary only
// exercises the core.

use anyhow::{bail, Context, Result};
use fall_detection::{Config, FallPipeline, FallState, FrameRecord};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::{info, warn};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let frames_path = match args.next() {
        Some(p) => p,
        None => bail!("usage: fall_detection <frames.jsonl> [config.yaml]"),
    };
    let config_path = args.next().unwrap_or_else(|| "config.yaml".to_string());

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("fall_detection={}", config.logging.level)),
        )
        .init();

    info!("🎥 Fall Detection System Starting");
    info!(
        "Thresholds: iou={:.2}, angle={:.0}°, velocity={:.0}, confirm_frames={}",
        config.tracking.iou_threshold,
        config.evidence.angle_threshold,
        config.evidence.velocity_threshold,
        config.fall.confirm_frames
    );

    let file = File::open(&frames_path)
        .with_context(|| format!("cannot open frame dump {frames_path}"))?;
    let reader = BufReader::new(file);

    let mut pipeline: Option<FallPipeline> = None;
    let mut fallen_tracks: HashSet<u64> = HashSet::new();
    let mut total_detections = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: FrameRecord = serde_json::from_str(&line)
            .with_context(|| format!("bad frame record on line {}", line_no + 1))?;

        let pipeline = pipeline
            .get_or_insert_with(|| FallPipeline::new(config.clone(), frame.width, frame.height));

        total_detections += frame.detections.len();
        let views = pipeline.process_frame(&frame.detections);

        for view in &views {
            if view.state == FallState::Fallen && fallen_tracks.insert(view.id) {
                warn!(
                    "🚨 FALL: track {} at [{:.0},{:.0},{:.0},{:.0}]",
                    view.id, view.bbox[0], view.bbox[1], view.bbox[2], view.bbox[3]
                );
            }
        }

        if (line_no + 1) % 30 == 0 {
            info!("Processed {} frames", line_no + 1);
        }
    }

    match pipeline {
        Some(pipeline) => {
            // Falls confirmed while occluded never surfaced in a view
            for id in pipeline.store().ids() {
                if let Some(track) = pipeline.store().get(id) {
                    if track.fall_detected {
                        fallen_tracks.insert(id);
                    }
                }
            }

            info!("✓ Replay finished");
            info!("  Frames processed: {}", pipeline.frames_processed());
            info!("  Detections seen: {}", total_detections);
            info!("  Tracks created: {}", pipeline.store().tracks_created());
            if fallen_tracks.is_empty() {
                info!("  Falls detected: 0");
            } else {
                warn!("  🚨 Falls detected: {}", fallen_tracks.len());
            }
        }
        None => warn!("No frames found in {frames_path}"),
    }

    Ok(())
}
