//! Handpilot - gesture-retrieval teleoperation runner
//!
//! Wires typed command input, intent resolution, and the fusion loop over
//! a loopback actuator transport. Hardware motor-bus and camera adapters
//! plug in through the `ActuatorTransport` and `FrameCaptureDevice`
//! traits; speech input additionally needs a `SpeechRecognitionService`
//! adapter for the cloud engine of choice.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use handpilot::actuator::LoopbackTransport;
use handpilot::audio::{calibrate_silence_threshold, AudioCapture};
use handpilot::config::Config;
use handpilot::input::spawn_key_listener;
use handpilot::pipeline::Pipeline;
use handpilot::resolver::ChatClassifier;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Audio input device index
    #[arg(short, long)]
    device: Option<usize>,

    /// Sample ambient audio and print suggested silence thresholds
    #[arg(long)]
    calibrate: bool,

    /// Gesture selected at startup (overrides config)
    #[arg(short, long)]
    gesture: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Handpilot v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load()?;
    if let Some(gesture) = args.gesture {
        config.initial_gesture = gesture;
    }

    if args.calibrate {
        let capture = AudioCapture::start(&config.audio, args.device)?;
        let suggestions =
            calibrate_silence_threshold(&capture, std::time::Duration::from_secs(5))?;
        info!("Suggested silence thresholds:");
        info!("  1. Quiet environment:  {:.1}", suggestions.quiet);
        info!("  2. Normal environment: {:.1}", suggestions.normal);
        info!("  3. Noisy environment:  {:.1}", suggestions.noisy);
        return Ok(());
    }

    let classifier = Box::new(ChatClassifier::new(&config.resolver));
    let mut pipeline = Pipeline::new(config, Box::new(LoopbackTransport::default()), classifier)?;

    pipeline.attach_typed_input(spawn_key_listener());

    info!("Ready - type a command, '/<gesture>' to switch directly, 'quit' to exit");
    pipeline.run();

    Ok(())
}
