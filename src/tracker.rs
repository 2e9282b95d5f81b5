//! Visual hand-pose tracking.
//!
//! Per video frame the (external) estimator yields 21 hand landmarks; the
//! tracker reduces them to one flexion ratio per digit from the wrist to
//! fingertip distance, normalized against calibrated finger lengths. The
//! thumb is measured in a fixed plane, the other digits in full 3-D. A
//! frame with no detected hand is skipped silently.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::HandError;
use crate::mailbox::Mailbox;
use crate::worker::RunFlag;

/// Landmark indices follow the common 21-point hand model.
pub const WRIST: usize = 0;
pub const FINGERTIPS: [usize; 5] = [4, 8, 12, 16, 20];

pub type Landmarks = [[f64; 3]; 21];

/// Frame source. Opening failures are fatal to the tracking worker.
pub trait FrameCaptureDevice: Send {
    type Frame: Send;

    /// Block until the next frame at the camera's native cadence.
    fn next_frame(&mut self) -> Result<Self::Frame, HandError>;
}

/// External pose estimator; `None` means no hand in the frame.
pub trait HandPoseEstimator<F>: Send {
    fn detect(&mut self, frame: &F) -> Option<Landmarks>;
}

/// Normalized closure per digit: 0 = fully open, 1 = fully closed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlexionRatios {
    pub thumb: f64,
    pub index: f64,
    pub middle: f64,
    pub ring: f64,
    pub pinky: f64,
}

/// Calibrated (min, max) wrist-to-fingertip lengths per digit.
#[derive(Debug, Clone, Copy)]
pub struct FingerCalibration {
    pub thumb: (f64, f64),
    pub index: (f64, f64),
    pub middle: (f64, f64),
    pub ring: (f64, f64),
    pub pinky: (f64, f64),
}

impl Default for FingerCalibration {
    fn default() -> Self {
        Self {
            thumb: (0.02, 0.09),
            index: (0.09, 0.17),
            middle: (0.09, 0.18),
            ring: (0.07, 0.17),
            pinky: (0.08, 0.14),
        }
    }
}

fn normalize(length: f64, (min, max): (f64, f64)) -> f64 {
    ((length - min) / (max - min)).clamp(0.0, 1.0)
}

fn norm3(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Reduce landmarks to per-digit flexion ratios.
pub fn flexion_from_landmarks(joints: &Landmarks, cal: &FingerCalibration) -> FlexionRatios {
    let wrist = joints[WRIST];
    let tip = |i: usize| -> [f64; 3] {
        let t = joints[FINGERTIPS[i]];
        [t[0] - wrist[0], t[1] - wrist[1], t[2] - wrist[2]]
    };

    // Thumb length is measured in a fixed plane: x and z are dropped.
    let mut thumb_vec = tip(0);
    thumb_vec[0] = 0.0;
    thumb_vec[2] = 0.0;

    FlexionRatios {
        thumb: 1.0 - normalize(norm3(thumb_vec), cal.thumb),
        index: 1.0 - normalize(norm3(tip(1)), cal.index),
        middle: 1.0 - normalize(norm3(tip(2)), cal.middle),
        ring: 1.0 - normalize(norm3(tip(3)), cal.ring),
        pinky: 1.0 - normalize(norm3(tip(4)), cal.pinky),
    }
}

/// Tracking worker: capture, estimate, reduce, publish. Ratios go to the
/// fusion loop, frames to any display layer; the mailboxes' overwrite
/// semantics are the only frame-drop handling needed.
pub fn run_tracker_loop<C, E>(
    mut camera: C,
    mut estimator: E,
    calibration: FingerCalibration,
    ratios_out: Mailbox<FlexionRatios>,
    frames_out: Mailbox<C::Frame>,
    run: RunFlag,
) where
    C: FrameCaptureDevice,
    E: HandPoseEstimator<C::Frame>,
{
    info!("Hand tracking running");
    while run.is_set() {
        let frame = match camera.next_frame() {
            Ok(f) => f,
            Err(e) => {
                error!("Frame capture failed: {}", e);
                break;
            }
        };

        let Some(joints) = estimator.detect(&frame) else {
            continue; // no hand this frame
        };

        ratios_out.publish(flexion_from_landmarks(&joints, &calibration));
        frames_out.publish(frame);
    }
    info!("Hand tracking stopped");
}
