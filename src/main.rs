// Demo runner: feeds a synthetic depth scene through the detector and prints every
// non-empty frame result as JSON.
//
// Usage: sls_vision [config.toml] [--dump <dir>]

use anyhow::Context;
use sls_vision::{
    AnomalyDetector, DepthFrame, DetectionType, DetectorConfig, DetectorEvent, Joint, JointType,
    PointCloud, Skeleton, Vector3, image_helper,
};
use std::path::PathBuf;
use tracing::info;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const WALL_MM: u16 = 2500;
const FRAMES: u32 = 12;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sls_vision=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut dump_dir = None;
    while let Some(arg) = args.next() {
        if arg == "--dump" {
            dump_dir = Some(PathBuf::from(args.next().context("--dump needs a directory")?));
        } else {
            config_path = Some(PathBuf::from(arg));
        }
    }

    let config = match &config_path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            DetectorConfig::load(path)?
        }
        None => DetectorConfig::default(),
    };

    let mut detector = AnomalyDetector::new(config);
    detector.subscribe(|event: &DetectorEvent| {
        let detection = event.detection();
        info!(
            id = detection.id,
            kind = %detection.detection_type,
            confidence = detection.confidence(),
            "{}",
            detection.description
        );
    });

    if let Some(dir) = &dump_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for n in 0..FRAMES {
        let frame = synthetic_frame(n);
        let cloud = (n == 6).then(dense_cube);
        let skeletons = (n == 8).then(|| vec![stretched_skeleton()]);

        let result = detector.process_frame(&frame, cloud.as_ref(), skeletons.as_deref())?;
        if !result.is_empty() {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        if let Some(dir) = &dump_dir {
            image_helper::save_depth_png(dir.join(format!("frame_{n:03}.png")), &frame)?;
        }
    }

    if let (Some(dir), Some(background)) = (&dump_dir, detector.background_model()) {
        image_helper::save_background_png(dir.join("background.png"), background)?;
    }

    let stats = detector.stats();
    for detection_type in DetectionType::ALL {
        let count = stats.count(detection_type);
        if count > 0 {
            info!(kind = %detection_type, count, "detections by type");
        }
    }
    info!(
        frames = stats.frames_processed,
        detections = stats.detections_reported,
        events = stats.events_published,
        "run complete"
    );
    Ok(())
}

/// A flat wall with a little deterministic texture. From frame 4 on, a box stands
/// 600mm in front of it.
fn synthetic_frame(n: u32) -> DepthFrame {
    let mut frame = DepthFrame::filled(WIDTH, HEIGHT, WALL_MM, f64::from(n) * 33.3, n);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let i = frame.index(x, y);
            frame.depth_data[i] = WALL_MM + ((x * 7 + y * 13 + n) % 5) as u16;
            if n >= 4 && (64..104).contains(&x) && (40..80).contains(&y) {
                frame.depth_data[i] = WALL_MM - 600;
            }
        }
    }
    frame
}

/// 216 points packed 10mm apart: far denser than a real surface at that size.
fn dense_cube() -> PointCloud {
    let mut points = Vec::new();
    for i in 0..6 {
        for j in 0..6 {
            for k in 0..6 {
                points.push(Vector3::new(
                    i as f32 * 10.0,
                    j as f32 * 10.0,
                    1800.0 + k as f32 * 10.0,
                ));
            }
        }
    }
    PointCloud::from_points(&points)
}

fn stretched_skeleton() -> Skeleton {
    let joint = |joint_type, x, y| Joint {
        joint_type,
        position: Vector3::new(x, y, 2200.0),
        tracked: true,
    };
    Skeleton {
        id: 1,
        joints: vec![
            joint(JointType::SpineShoulder, 0.0, 0.0),
            joint(JointType::ShoulderLeft, -180.0, 0.0),
            joint(JointType::ElbowLeft, -1500.0, 0.0),
            joint(JointType::WristLeft, -1750.0, 0.0),
        ],
        confidence: 0.9,
        center_of_mass: None,
    }
}
