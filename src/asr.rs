//! Speech recognition worker.
//!
//! Recognition runs apart from capture: the VAD worker queues complete
//! utterances, this worker blocks on that queue, performs the (external)
//! recognition call, and publishes non-empty text to the command mailbox,
//! replacing any prior unconsumed text.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{info, warn};

use crate::mailbox::Mailbox;
use crate::vad::Utterance;
use crate::worker::RunFlag;

/// Outcome of one recognition call, matched explicitly by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    Text(String),
    Empty,
    TransportError(String),
}

/// External speech-to-text service.
pub trait SpeechRecognitionService: Send {
    fn recognize(&mut self, samples: &[i16], sample_rate: u32) -> RecognitionOutcome;
}

/// Drain the utterance queue, recognize, publish command text.
pub fn run_recognition_loop<S: SpeechRecognitionService>(
    mut service: S,
    utterances: Receiver<Utterance>,
    commands: Mailbox<String>,
    run: RunFlag,
) {
    info!("Recognition worker running");
    while run.is_set() {
        let utterance = match utterances.recv_timeout(Duration::from_millis(200)) {
            Ok(u) => u,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match service.recognize(&utterance.samples, utterance.sample_rate) {
            RecognitionOutcome::Text(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                info!("Recognized: '{}'", text);
                commands.publish(text);
            }
            RecognitionOutcome::Empty => {}
            RecognitionOutcome::TransportError(e) => {
                // Treated as "no result this round"; the loop continues.
                warn!("Recognition call failed: {}", e);
            }
        }
    }
    info!("Recognition worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    struct ScriptedService {
        outcomes: Vec<RecognitionOutcome>,
    }

    impl SpeechRecognitionService for ScriptedService {
        fn recognize(&mut self, _samples: &[i16], _rate: u32) -> RecognitionOutcome {
            self.outcomes.remove(0)
        }
    }

    fn utterance() -> Utterance {
        Utterance {
            samples: vec![1000; 16000],
            sample_rate: 16000,
        }
    }

    fn run_to_completion(service: ScriptedService, count: usize, commands: Mailbox<String>) {
        let (tx, rx) = mpsc::channel();
        for _ in 0..count {
            tx.send(utterance()).unwrap();
        }
        drop(tx); // worker exits once the queue drains

        let run = RunFlag::new();
        run_recognition_loop(service, rx, commands, run);
    }

    #[test]
    fn test_text_result_is_published() {
        let commands = Mailbox::new();
        let service = ScriptedService {
            outcomes: vec![RecognitionOutcome::Text("grab the box".into())],
        };
        run_to_completion(service, 1, commands.clone());
        assert_eq!(commands.take_if_present(), Some("grab the box".to_string()));
    }

    #[test]
    fn test_later_result_overwrites_unconsumed_text() {
        let commands = Mailbox::new();
        let service = ScriptedService {
            outcomes: vec![
                RecognitionOutcome::Text("first".into()),
                RecognitionOutcome::Text("second".into()),
            ],
        };
        run_to_completion(service, 2, commands.clone());
        assert_eq!(commands.take_if_present(), Some("second".to_string()));
        assert_eq!(commands.take_if_present(), None);
    }

    #[test]
    fn test_empty_and_error_outcomes_publish_nothing() {
        let commands = Mailbox::new();
        let service = ScriptedService {
            outcomes: vec![
                RecognitionOutcome::Empty,
                RecognitionOutcome::TransportError("timeout".into()),
                RecognitionOutcome::Text("   ".into()),
            ],
        };
        run_to_completion(service, 3, commands.clone());
        assert_eq!(commands.take_if_present(), None);
    }

    #[test]
    fn test_worker_honors_run_flag() {
        let (_tx, rx) = mpsc::channel::<Utterance>();
        let run = RunFlag::new();
        run.clear();
        let start = Instant::now();
        run_recognition_loop(
            ScriptedService { outcomes: vec![] },
            rx,
            Mailbox::new(),
            run,
        );
        assert!(start.elapsed() < Duration::from_millis(250));
    }
}
