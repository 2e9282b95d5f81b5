//! Handpilot gesture recorder
//!
//! Puts the hand into free-drag mode so an operator can physically pose
//! it, then records open/close positions and saves them as a catalog
//! profile. Run with: cargo run --bin handpilot-record

use std::io::{self, BufRead, Write};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use handpilot::actuator::{
    ComplianceController, ComplianceSettings, HandActuator, LoopbackTransport,
};
use handpilot::catalog::GestureCatalog;
use handpilot::config::Config;
use handpilot::joints::{JointMap, Pose};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Catalog category to save into (overrides config)
    #[arg(short, long)]
    category: Option<String>,
}

struct Recorder {
    actuator: HandActuator,
    catalog: GestureCatalog,
    joints: JointMap,
    open_pos: Option<Pose>,
    close_pos: Option<Pose>,
}

impl Recorder {
    fn current_canonical(&self) -> Result<Pose> {
        let measured = self.actuator.read_position()?;
        Ok(self.joints.to_canonical(&measured))
    }

    fn record_open(&mut self) -> Result<()> {
        let pos = self.current_canonical()?;
        println!("OPEN position recorded: {:?}", pos);
        self.open_pos = Some(pos);
        Ok(())
    }

    fn record_close(&mut self) -> Result<()> {
        let pos = self.current_canonical()?;
        println!("CLOSE position recorded: {:?}", pos);
        self.close_pos = Some(pos);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let (Some(open), Some(close)) = (self.open_pos, self.close_pos) else {
            println!("Record both OPEN (ro) and CLOSE (rc) positions first");
            return Ok(());
        };

        let name = prompt("Enter gesture name: ")?;
        if name.is_empty() {
            println!("Gesture name cannot be empty");
            return Ok(());
        }

        match self.catalog.save_profile(&name, &open, &close, false) {
            Ok(path) => println!("Gesture saved to: {}", path.display()),
            Err(_) => {
                let confirm = prompt(&format!("Gesture '{}' already exists. Overwrite? (y/n): ", name))?;
                if confirm.eq_ignore_ascii_case("y") {
                    let path = self.catalog.save_profile(&name, &open, &close, true)?;
                    println!("Gesture saved to: {}", path.display());
                } else {
                    println!("Save cancelled");
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.open_pos = None;
        self.close_pos = None;
        println!("All recordings reset");
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_help() {
    println!("\nAvailable commands:");
    println!("  ro     - Record OPEN position (first line)");
    println!("  rc     - Record CLOSE position (second line)");
    println!("  save   - Save gesture to file");
    println!("  reset  - Reset all recordings");
    println!("  help   - Display this help message");
    println!("  quit   - Exit");
    println!();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = Config::load()?;
    if let Some(category) = args.category {
        config.category = category;
    }

    let catalog = GestureCatalog::load(&config.library_root(), &config.category)?;
    let actuator = HandActuator::new(Box::new(LoopbackTransport::default()), &config.actuator)?;

    let mut compliance =
        ComplianceController::new(actuator.clone(), ComplianceSettings::default());
    compliance.enable()?;
    info!("Hand entered free-drag mode; pose it by hand and record");

    let mut recorder = Recorder {
        actuator,
        catalog,
        joints: JointMap::new(),
        open_pos: None,
        close_pos: None,
    };

    print_help();
    loop {
        let command = prompt("> ")?;
        let result = match command.as_str() {
            "ro" => recorder.record_open(),
            "rc" => recorder.record_close(),
            "save" => recorder.save(),
            "reset" => {
                recorder.reset();
                Ok(())
            }
            "help" => {
                print_help();
                Ok(())
            }
            "quit" | "exit" => break,
            "" => Ok(()),
            other => {
                println!("Unknown command '{}'; type 'help'", other);
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("Error: {}", e);
        }
    }

    compliance.disable()?;
    info!("Free-drag mode disabled, exiting");
    Ok(())
}
