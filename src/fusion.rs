//! The fusion loop: freshest command, gesture, and pose win.
//!
//! A single thread polls the command, resolver, and tracker mailboxes at a
//! fixed interval, converts the active gesture's open/close profile plus
//! the latest flexion ratios into a target joint vector, and dispatches it
//! to the actuator. It never blocks on a producer; any upstream failure
//! shows up only as the absence of a mailbox update and the hand keeps
//! tracking the last known-good target.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::actuator::HandActuator;
use crate::catalog::{GestureCatalog, GestureProfile};
use crate::joints::{Pose, JOINT_COUNT};
use crate::mailbox::Mailbox;
use crate::tracker::FlexionRatios;
use crate::worker::RunFlag;

/// Poll cycle period.
pub const CYCLE: Duration = Duration::from_millis(10);

/// Digits with independent joint groups on this hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Digit {
    Index,
    Middle,
    Ring,
    Thumb,
}

/// Digit owning a hardware joint index.
///
/// The hand exposes four independently driven groups; the pinky ratio is
/// computed by the tracker but has no joints of its own here — a known
/// simplification of this hardware, kept deliberately.
pub fn digit_of_joint(joint: usize) -> Option<Digit> {
    match joint {
        0..=3 => Some(Digit::Index),
        4..=7 => Some(Digit::Middle),
        8..=11 => Some(Digit::Ring),
        12..=15 => Some(Digit::Thumb),
        _ => None,
    }
}

/// Interpolate each joint between the gesture's open and close poses,
/// weighted by the flexion of the digit that joint belongs to. Joints
/// outside every digit group stay at the open value.
pub fn synthesize_pose(profile: &GestureProfile, ratios: &FlexionRatios) -> Pose {
    let mut target = [0.0; JOINT_COUNT];
    for (i, slot) in target.iter_mut().enumerate() {
        let ratio = match digit_of_joint(i) {
            Some(Digit::Index) => ratios.index,
            Some(Digit::Middle) => ratios.middle,
            Some(Digit::Ring) => ratios.ring,
            Some(Digit::Thumb) => ratios.thumb,
            None => 0.0,
        };
        *slot = profile.open[i] * (1.0 - ratio) + profile.close[i] * ratio;
    }
    target
}

/// Snapshot of fusion state for display layers.
#[derive(Debug, Clone, Default)]
pub struct FusionView {
    pub active_gesture: String,
    pub last_ratios: Option<FlexionRatios>,
}

/// The single-threaded orchestrator.
pub struct FusionLoop {
    catalog: GestureCatalog,
    actuator: HandActuator,
    active: GestureProfile,
    switch_prefix: String,

    /// Command text from recognition and typed input, polled in order.
    command_sources: Vec<Mailbox<String>>,
    /// Queries forwarded to the intent resolver.
    queries: Mailbox<String>,
    /// Resolved gesture ids back from the resolver.
    resolved: Mailbox<String>,
    /// Flexion ratios from the tracker.
    ratios: Mailbox<FlexionRatios>,

    view: Arc<Mutex<FusionView>>,
}

impl FusionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: GestureCatalog,
        actuator: HandActuator,
        initial: GestureProfile,
        switch_prefix: String,
        command_sources: Vec<Mailbox<String>>,
        queries: Mailbox<String>,
        resolved: Mailbox<String>,
        ratios: Mailbox<FlexionRatios>,
    ) -> Self {
        let view = Arc::new(Mutex::new(FusionView {
            active_gesture: initial.id.clone(),
            last_ratios: None,
        }));
        Self {
            catalog,
            actuator,
            active: initial,
            switch_prefix,
            command_sources,
            queries,
            resolved,
            ratios,
            view,
        }
    }

    /// Shared read-only view for the pipeline API.
    pub fn view(&self) -> Arc<Mutex<FusionView>> {
        Arc::clone(&self.view)
    }

    pub fn active_gesture_id(&self) -> &str {
        &self.active.id
    }

    fn switch_gesture(&mut self, id: &str) {
        match self.catalog.load_profile(id) {
            Ok(profile) => {
                info!("Switching gesture: {} -> {}", self.active.id, profile.id);
                self.active = profile;
                let mut view = self.view.lock().unwrap_or_else(|e| e.into_inner());
                view.active_gesture = self.active.id.clone();
            }
            Err(e) => {
                // Non-fatal: the active gesture stays unchanged.
                warn!("Gesture switch to '{}' rejected: {}", id, e);
            }
        }
    }

    fn handle_command(&mut self, text: &str) {
        if let Some(name) = text.strip_prefix(&self.switch_prefix) {
            self.switch_gesture(name.trim());
        } else {
            self.queries.publish(text.to_string());
        }
    }

    /// One poll cycle; split out for tests.
    pub fn cycle(&mut self) {
        // 1. Command text: direct switch or forward to the resolver.
        for source in self.command_sources.clone() {
            if let Some(text) = source.take_if_present() {
                info!("Command: '{}'", text);
                self.handle_command(&text);
            }
        }

        // 2. Resolver results.
        if let Some(id) = self.resolved.take_if_present() {
            if id != self.active.id {
                self.switch_gesture(&id);
            }
        }

        // 3. Flexion ratios -> target pose.
        if let Some(ratios) = self.ratios.take_if_present() {
            {
                let mut view = self.view.lock().unwrap_or_else(|e| e.into_inner());
                view.last_ratios = Some(ratios);
            }
            let target = synthesize_pose(&self.active, &ratios);
            if let Err(e) = self.actuator.set_target(&target) {
                warn!("Actuator dispatch failed: {}", e);
            }
        }
    }

    /// Poll until the run flag clears.
    pub fn run(&mut self, run: RunFlag) {
        info!("Fusion loop running (cycle {:?})", CYCLE);
        while run.is_set() {
            self.cycle();
            thread::sleep(CYCLE);
        }
        info!("Fusion loop stopped");
    }
}
