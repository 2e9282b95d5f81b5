//! Pipeline assembly and lifecycle.
//!
//! Wires the acquisition workers to the fusion loop over mailboxes and
//! owns every worker handle, so shutdown is one place: clear the master
//! run flag, join each worker with a bounded timeout, release devices.
//! Acquisition sources are optional attachments; the fusion loop runs the
//! same way whichever of them are present.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use crate::actuator::{
    ActuatorTransport, ComplianceController, ComplianceSettings, HandActuator,
};
use crate::asr::{run_recognition_loop, SpeechRecognitionService};
use crate::audio::AudioCapture;
use crate::catalog::GestureCatalog;
use crate::config::Config;
use crate::error::HandResult;
use crate::fusion::{FusionLoop, FusionView};
use crate::input::{run_typed_input_loop, KeyPress};
use crate::mailbox::Mailbox;
use crate::resolver::{run_resolver_loop, Classifier, IntentResolver};
use crate::tracker::{
    run_tracker_loop, FingerCalibration, FlexionRatios, FrameCaptureDevice, HandPoseEstimator,
};
use crate::vad::run_capture_loop;
use crate::worker::{RunFlag, Worker};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The assembled teleoperation pipeline.
pub struct Pipeline {
    config: Config,
    run: RunFlag,
    workers: Vec<Worker>,

    asr_commands: Mailbox<String>,
    typed_commands: Mailbox<String>,
    queries: Mailbox<String>,
    resolved: Mailbox<String>,
    ratios: Mailbox<FlexionRatios>,

    actuator: HandActuator,
    compliance: ComplianceController,
    fusion: FusionLoop,
    view: Arc<Mutex<FusionView>>,
}

impl Pipeline {
    /// Build the core: catalog, actuator, resolver worker, fusion loop.
    /// Acquisition sources are attached separately.
    pub fn new(
        config: Config,
        transport: Box<dyn ActuatorTransport>,
        classifier: Box<dyn Classifier>,
    ) -> HandResult<Self> {
        config.validate()?;

        let catalog = GestureCatalog::load(&config.library_root(), &config.category)?;
        let initial = catalog.load_profile(&config.initial_gesture)?;
        let entries = catalog.entries().to_vec();

        let actuator = HandActuator::new(transport, &config.actuator)?;
        let compliance =
            ComplianceController::new(actuator.clone(), ComplianceSettings::default());

        let asr_commands = Mailbox::new();
        let typed_commands = Mailbox::new();
        let queries = Mailbox::new();
        let resolved = Mailbox::new();
        let ratios = Mailbox::new();

        let fusion = FusionLoop::new(
            catalog,
            actuator.clone(),
            initial,
            config.switch_prefix.clone(),
            vec![asr_commands.clone(), typed_commands.clone()],
            queries.clone(),
            resolved.clone(),
            ratios.clone(),
        );
        let view = fusion.view();

        let mut pipeline = Self {
            config,
            run: RunFlag::new(),
            workers: Vec::new(),
            asr_commands,
            typed_commands,
            queries,
            resolved,
            ratios,
            actuator,
            compliance,
            fusion,
            view,
        };
        pipeline.spawn_resolver(entries, classifier);
        Ok(pipeline)
    }

    fn spawn_resolver(&mut self, entries: Vec<crate::catalog::GestureMeta>, classifier: Box<dyn Classifier>) {
        let resolver = IntentResolver::new(entries, classifier);
        let queries = self.queries.clone();
        let resolved = self.resolved.clone();
        let interval = Duration::from_secs_f64(self.config.resolver.poll_interval);
        self.workers.push(Worker::spawn("intent-resolver", move |run| {
            run_resolver_loop(resolver, queries, resolved, interval, run);
        }));
    }

    /// Attach the typed command source fed by decoded key events.
    pub fn attach_typed_input(&mut self, keys: Receiver<KeyPress>) {
        let commands = self.typed_commands.clone();
        let exit_keywords = self.config.exit_keywords.clone();
        let pipeline_run = self.run.clone();
        self.workers.push(Worker::spawn("typed-input", move |run| {
            run_typed_input_loop(keys, commands, &exit_keywords, pipeline_run, run);
        }));
    }

    /// Attach audio capture, VAD segmentation, and the recognition worker.
    pub fn attach_audio<S>(&mut self, capture: AudioCapture, service: S)
    where
        S: SpeechRecognitionService + 'static,
    {
        let (utterance_tx, utterance_rx) = mpsc::channel();
        let audio_cfg = self.config.audio.clone();
        self.workers.push(Worker::spawn("audio-vad", move |run| {
            run_capture_loop(capture, &audio_cfg, utterance_tx, run);
        }));

        let commands = self.asr_commands.clone();
        self.workers.push(Worker::spawn("recognition", move |run| {
            run_recognition_loop(service, utterance_rx, commands, run);
        }));
    }

    /// Attach the visual hand tracker; returns the display-frame mailbox.
    pub fn attach_tracker<C, E>(
        &mut self,
        camera: C,
        estimator: E,
        calibration: FingerCalibration,
    ) -> Mailbox<C::Frame>
    where
        C: FrameCaptureDevice + 'static,
        E: HandPoseEstimator<C::Frame> + 'static,
    {
        let ratios = self.ratios.clone();
        let frames = Mailbox::new();
        let frames_out = frames.clone();
        self.workers.push(Worker::spawn("hand-tracker", move |run| {
            run_tracker_loop(camera, estimator, calibration, ratios, frames_out, run);
        }));
        frames
    }

    /// Run the fusion loop on the calling thread until shutdown is
    /// requested (typed exit keyword or `shutdown()` from elsewhere).
    pub fn run(&mut self) {
        self.fusion.run(self.run.clone());
        self.shutdown();
    }

    /// Stop every worker; bounded joins, best effort.
    pub fn shutdown(&mut self) {
        if self.compliance.is_active() {
            let _ = self.compliance.disable();
        }
        self.run.clear();
        for worker in &self.workers {
            worker.stop();
        }
        for worker in &mut self.workers {
            worker.join(JOIN_TIMEOUT);
        }
        self.workers.clear();
        info!("Pipeline stopped");
    }

    /// Handle for requesting shutdown from another thread.
    pub fn run_flag(&self) -> RunFlag {
        self.run.clone()
    }

    /// Lightweight handle usable from other threads while `run()` owns
    /// the pipeline (display layers, remote adapters, tests).
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            commands: self.typed_commands.clone(),
            view: Arc::clone(&self.view),
            run: self.run.clone(),
        }
    }

    // Operator-facing surface.

    /// Inject command text as if it came from an ASR or typed adapter.
    pub fn submit_command_text(&self, text: &str) {
        self.typed_commands.publish(text.to_string());
    }

    /// Latest flexion estimate, if the tracker has produced one.
    pub fn current_pose_estimate(&self) -> Option<FlexionRatios> {
        self.view.lock().unwrap_or_else(|e| e.into_inner()).last_ratios
    }

    pub fn active_gesture_id(&self) -> String {
        self.view
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_gesture
            .clone()
    }

    pub fn enable_compliance_mode(&mut self) -> HandResult<()> {
        self.compliance.enable()
    }

    pub fn disable_compliance_mode(&mut self) -> HandResult<()> {
        self.compliance.disable()
    }

    pub fn actuator(&self) -> &HandActuator {
        &self.actuator
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable operator surface detached from the pipeline's lifetime.
#[derive(Clone)]
pub struct PipelineHandle {
    commands: Mailbox<String>,
    view: Arc<Mutex<FusionView>>,
    run: RunFlag,
}

impl PipelineHandle {
    pub fn submit_command_text(&self, text: &str) {
        self.commands.publish(text.to_string());
    }

    pub fn current_pose_estimate(&self) -> Option<FlexionRatios> {
        self.view.lock().unwrap_or_else(|e| e.into_inner()).last_ratios
    }

    pub fn active_gesture_id(&self) -> String {
        self.view
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_gesture
            .clone()
    }

    pub fn request_shutdown(&self) {
        self.run.clear();
    }
}
