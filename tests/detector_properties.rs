use sls_vision::{
    AnomalyDetector, AnomalyKind, DepthFrame, DetectionDetails, DetectionType, DetectorConfig,
    DetectorService, FrameInput, Joint, JointType, PointCloud, Skeleton, ThresholdUpdate, Vector3,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn config() -> DetectorConfig {
    DetectorConfig {
        parallel_regions: false,
        ..DetectorConfig::default()
    }
}

fn wall(n: u32) -> DepthFrame {
    DepthFrame::filled(WIDTH, HEIGHT, 2000, f64::from(n) * 33.3, n)
}

fn with_box(n: u32, x0: u32, y0: u32, size: u32, depth: u16) -> DepthFrame {
    let mut frame = wall(n);
    for y in y0..y0 + size {
        for x in x0..x0 + size {
            let i = frame.index(x, y);
            frame.depth_data[i] = depth;
        }
    }
    frame
}

/// A wall whose columns alternate between 2000mm and 2120mm.
fn ribbed_wall(n: u32) -> DepthFrame {
    let mut frame = wall(n);
    for y in 0..HEIGHT {
        for x in (1..WIDTH).step_by(2) {
            let i = frame.index(x, y);
            frame.depth_data[i] = 2120;
        }
    }
    frame
}

fn cube(origin: Vector3, per_side: u32, spacing: f32) -> Vec<Vector3> {
    let mut points = Vec::new();
    for i in 0..per_side {
        for j in 0..per_side {
            for k in 0..per_side {
                points.push(Vector3::new(
                    origin.x + i as f32 * spacing,
                    origin.y + j as f32 * spacing,
                    origin.z + k as f32 * spacing,
                ));
            }
        }
    }
    points
}

/// A two-joint skeleton whose only bone is 1.5m long, anchored at `x`.
fn stretched(id: u32, x: f32) -> Skeleton {
    Skeleton {
        id,
        joints: vec![
            Joint {
                joint_type: JointType::ShoulderLeft,
                position: Vector3::new(x, 0.0, 2000.0),
                tracked: true,
            },
            Joint {
                joint_type: JointType::ElbowLeft,
                position: Vector3::new(x, 1500.0, 2000.0),
                tracked: true,
            },
        ],
        confidence: 0.9,
        center_of_mass: Some(Vector3::new(x, 0.0, 2000.0)),
    }
}

#[test]
fn unchanged_scene_yields_nothing() {
    let mut detector = AnomalyDetector::new(config());
    for n in 0..5 {
        let result = detector.process_frame(&wall(n), None, None).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }
    assert!(detector.detection_history().is_empty());
}

#[test]
fn box_in_front_of_wall_is_one_mass() {
    let mut detector = AnomalyDetector::new(config());
    detector.process_frame(&wall(0), None, None).unwrap();
    let result = detector
        .process_frame(&with_box(1, 320, 240, 40, 1700), None, None)
        .unwrap();

    assert_eq!(result.detections.len(), 1);
    let mass = &result.detections[0];
    assert_eq!(mass.detection_type, DetectionType::Anomaly);
    assert_eq!(mass.anomaly().map(|a| a.kind), Some(AnomalyKind::Mass));
    assert!(mass.confidence() >= 0.5);
    assert!(mass.description.contains("merged from 4 detections"));
}

#[test]
fn ribbed_background_does_not_hide_a_mass() {
    let mut nearer = ribbed_wall(1);
    for y in 0..32 {
        for x in 0..32 {
            let i = nearer.index(x, y);
            nearer.depth_data[i] -= 200;
        }
    }

    let mut detector = AnomalyDetector::new(config());
    detector.process_frame(&ribbed_wall(0), None, None).unwrap();
    let spatial = detector.noise_profile().map(|n| n.spatial).unwrap();
    assert!((spatial - 120.0).abs() < 1e-3);

    let result = detector.process_frame(&nearer, None, None).unwrap();
    assert_eq!(result.detections.len(), 1);
    let mass = &result.detections[0];
    assert_eq!(mass.anomaly().map(|a| a.kind), Some(AnomalyKind::Mass));
    assert!((mass.confidence() - 0.4).abs() < 1e-6);

    // Opting into noise reduction lifts the per-pixel gate to 360mm.
    let mut filtered = AnomalyDetector::new(config());
    filtered
        .update_thresholds(&ThresholdUpdate {
            noise_reduction: Some(true),
            ..ThresholdUpdate::default()
        })
        .unwrap();
    filtered.process_frame(&ribbed_wall(0), None, None).unwrap();
    assert!(filtered.process_frame(&nearer, None, None).unwrap().is_empty());
}

#[test]
fn every_confidence_is_a_probability() {
    let mut detector = AnomalyDetector::new(config());
    let mut cloud_points = cube(Vector3::new(0.0, 0.0, 1500.0), 6, 5.0);
    cloud_points.extend(cube(Vector3::new(900.0, 0.0, 1500.0), 6, 5.0));
    let cloud = PointCloud::from_points(&cloud_points);
    let skeletons = vec![stretched(1, -1500.0)];

    let frames = [
        wall(0),
        with_box(1, 100, 100, 64, 900),
        with_box(2, 100, 100, 64, 950),
        with_box(3, 400, 300, 50, 3500),
    ];
    for frame in &frames {
        let result = detector
            .process_frame(frame, Some(&cloud), Some(&skeletons))
            .unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
        for detection in &result.detections {
            assert!((0.0..=1.0).contains(&detection.confidence()), "{detection:?}");
        }
    }
    assert!(!detector.detection_history().is_empty());
}

#[test]
fn separated_point_clusters_are_reported_separately() {
    let mut points = cube(Vector3::new(0.0, 0.0, 1500.0), 5, 20.0);
    points.extend(cube(Vector3::new(800.0, 0.0, 1500.0), 5, 20.0));
    let cloud = PointCloud::from_points(&points);

    let mut detector = AnomalyDetector::new(config());
    let result = detector.process_frame(&wall(0), Some(&cloud), None).unwrap();
    let manifestations: Vec<_> = result
        .detections
        .iter()
        .filter(|d| d.detection_type == DetectionType::Manifestation)
        .collect();
    assert_eq!(manifestations.len(), 2);
    assert!(manifestations.iter().all(|d| matches!(d.details, DetectionDetails::Manifestation(_))));
}

#[test]
fn close_findings_merge_and_distant_ones_do_not() {
    let mut detector = AnomalyDetector::new(config());
    let close = [stretched(1, 0.0), stretched(2, 50.0)];
    let result = detector.process_frame(&wall(0), None, Some(&close)).unwrap();
    assert_eq!(result.detections.len(), 1);
    assert!((result.detections[0].position.x - 25.0).abs() < 1e-3);

    let apart = [stretched(1, 0.0), stretched(2, 500.0)];
    let result = detector.process_frame(&wall(1), None, Some(&apart)).unwrap();
    assert_eq!(result.detections.len(), 2);
    let owners: Vec<u32> = result
        .detections
        .iter()
        .filter_map(|d| d.skeleton().map(|s| s.id))
        .collect();
    assert_eq!(owners, vec![1, 2]);
}

#[test]
fn frame_and_detection_windows_are_bounded() {
    let mut detector = AnomalyDetector::new(config());
    detector.process_frame(&wall(0), None, None).unwrap();
    for n in 1..=110 {
        let result = detector
            .process_frame(&with_box(n, 0, 0, 32, 1500), None, None)
            .unwrap();
        assert_eq!(result.detections.len(), 1, "frame {n}");
    }

    assert_eq!(detector.frame_count(), 30);
    let history = detector.detection_history();
    assert_eq!(history.len(), 100);
    assert_eq!(history.first().map(|d| d.id), Some(11));
    assert_eq!(history.last().map(|d| d.id), Some(110));
    assert!(history.windows(2).all(|w| w[0].frame_number < w[1].frame_number));
}

#[test]
fn intensity_above_one_is_clamped() {
    let mut detector = AnomalyDetector::new(config());
    detector
        .update_thresholds(&ThresholdUpdate::anomaly_intensity(1.1))
        .unwrap();
    assert_eq!(detector.thresholds().anomaly_intensity, 1.0);
}

#[test]
fn reset_behaves_like_a_fresh_detector() {
    let sequence = [wall(0), with_box(1, 64, 64, 64, 1400), with_box(2, 64, 64, 64, 1400)];

    let mut used = AnomalyDetector::new(config());
    for frame in [with_box(7, 300, 200, 80, 1000), wall(8), wall(9)] {
        used.process_frame(&frame, None, None).unwrap();
    }
    used.reset();

    let mut fresh = AnomalyDetector::new(config());
    for frame in &sequence {
        assert_eq!(
            used.process_frame(frame, None, None).unwrap(),
            fresh.process_frame(frame, None, None).unwrap()
        );
    }
    assert_eq!(used.detection_history(), fresh.detection_history());
    assert_eq!(used.stats(), fresh.stats());
}

#[tokio::test]
async fn service_matches_direct_processing() {
    let frames = vec![wall(0), with_box(1, 320, 240, 40, 1700), with_box(2, 320, 240, 40, 1700)];

    let mut direct = AnomalyDetector::new(config());
    let expected: Vec<_> = frames
        .iter()
        .map(|f| direct.process_frame(f, None, None).unwrap())
        .collect();

    let service = DetectorService::spawn(config());
    let results = service
        .submit_batch(frames.into_iter().map(FrameInput::depth_only).collect())
        .await
        .unwrap();
    assert_eq!(results, expected);
    service.shutdown().await.unwrap();
}
