//! End-to-end calibration of a synthetic rig.
//!
//! Usage: `synthetic_calibration [session_config.json] [profile_out.json]`
//!
//! Renders a known camera looking at the configured chessboard from a few
//! poses, accumulates the views, solves, estimates a held-out pose, fits the
//! turntable center and prints a JSON report.

use std::{env, path::PathBuf};

use nalgebra::Point2;
use rig_calib::core::{CameraParams, Distortion, ImageSize, Intrinsics};
use rig_calib::synthetic::{board_poses, project_views, tagged_frame, TableDetector, MISS_TAG};
use rig_calib::{CalibrationSession, SessionConfig};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Report {
    views: usize,
    camera_matrix: [[f64; 3]; 3],
    distortion: Vec<f64>,
    rms: f64,
    mean_error: f64,
    held_out_translation: Option<[f64; 3]>,
    turntable_center: [f64; 2],
    turntable_radius: f64,
}

fn init_logging() {
    #[cfg(feature = "tracing")]
    rig_calib::init_tracing(false);
    #[cfg(not(feature = "tracing"))]
    let _ = rig_calib::init_from_env();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => SessionConfig::load_json(path)?,
        None => SessionConfig::default(),
    };
    let profile_out = args.get(2).map(PathBuf::from);

    let frame_size = ImageSize::new(960, 1280);
    let camera = CameraParams::new(
        Intrinsics {
            fx: 1150.0,
            fy: 1150.0,
            cx: 481.0,
            cy: 636.0,
        },
        Distortion {
            k1: -0.07,
            k2: 0.02,
            ..Distortion::default()
        },
    );

    let mut session = CalibrationSession::new(config)?;
    let poses = board_poses(session.object_points(), 6, 330.0, 0.35);
    let detector = TableDetector::new(project_views(session.object_points(), &poses, &camera));

    // the last pose is kept back for pose estimation
    for tag in (0..5u8).chain([MISS_TAG]) {
        let frame = tagged_frame(frame_size, tag);
        let outcome = session.try_add_view(&detector, &frame.view())?;
        log::info!("frame {tag}: accepted={}", outcome.accepted);
    }

    let result = session.solve()?.clone();
    let held_out = session.estimate_pose(&detector, &tagged_frame(frame_size, 5).view())?;

    // markers on the turntable, seen edge-on in the (x, z) plane
    let markers: Vec<Point2<f64>> = (0..24)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / 24.0;
            Point2::new(4.0 + 75.0 * a.cos(), 312.0 + 75.0 * a.sin())
        })
        .collect();
    let center = session.fit_center(&markers)?;
    session.set_extrinsic(center.center.x, 0.0, center.center.y);

    let k = result.camera_matrix();
    let report = Report {
        views: result.view_count(),
        camera_matrix: [
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ],
        distortion: result.distortion_vector(),
        rms: result.rms,
        mean_error: result.mean_error,
        held_out_translation: held_out.map(|p| [p.tvec.x, p.tvec.y, p.tvec.z]),
        turntable_center: [center.center.x, center.center.y],
        turntable_radius: center.mean_radius,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(path) = profile_out {
        session.capture_profile()?;
        session.save_profile(&path)?;
    }
    Ok(())
}
