//! Typed command input.
//!
//! A global rdev listener feeds raw key events to a line editor that
//! accumulates them into commands. The editor itself is transport
//! independent so the line discipline can be tested without a keyboard:
//! Enter submits a trimmed non-empty line, Backspace edits, an exit
//! keyword requests pipeline shutdown instead of being published.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::mailbox::Mailbox;
use crate::worker::RunFlag;

/// A decoded keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPress {
    Char(char),
    Enter,
    Backspace,
}

/// Result of feeding one keystroke to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete command line was submitted.
    Command(String),
    /// An exit keyword was typed; the pipeline should shut down.
    Exit,
}

/// Line-buffer state machine for typed commands.
pub struct LineEditor {
    buffer: String,
    exit_keywords: Vec<String>,
}

impl LineEditor {
    pub fn new(exit_keywords: &[String]) -> Self {
        Self {
            buffer: String::new(),
            exit_keywords: exit_keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn push_key(&mut self, key: KeyPress) -> Option<LineEvent> {
        match key {
            KeyPress::Char(c) => {
                self.buffer.push(c);
                None
            }
            KeyPress::Backspace => {
                self.buffer.pop();
                None
            }
            KeyPress::Enter => {
                let line = self.buffer.trim().to_string();
                self.buffer.clear();
                if line.is_empty() {
                    return None;
                }
                if self.exit_keywords.contains(&line.to_lowercase()) {
                    return Some(LineEvent::Exit);
                }
                Some(LineEvent::Command(line))
            }
        }
    }
}

/// Consume decoded keys, publish complete commands, clear the pipeline
/// run flag on an exit keyword.
pub fn run_typed_input_loop(
    keys: Receiver<KeyPress>,
    commands: Mailbox<String>,
    exit_keywords: &[String],
    pipeline_run: RunFlag,
    run: RunFlag,
) {
    let mut editor = LineEditor::new(exit_keywords);
    info!("Typed input ready (type a command, Enter to send)");

    while run.is_set() {
        let key = match keys.recv_timeout(Duration::from_millis(200)) {
            Ok(k) => k,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match editor.push_key(key) {
            Some(LineEvent::Command(line)) => {
                debug!("Typed command: '{}'", line);
                commands.publish(line);
            }
            Some(LineEvent::Exit) => {
                info!("Exit keyword typed, shutting down");
                pipeline_run.clear();
                break;
            }
            None => {}
        }
    }
    info!("Typed input stopped");
}

/// Start the global key listener on its own thread.
///
/// rdev's listen callback cannot be cancelled; the thread is detached and
/// reclaimed at process exit, while the consumer side shuts down cleanly
/// through its run flag.
pub fn spawn_key_listener() -> Receiver<KeyPress> {
    let (tx, rx): (Sender<KeyPress>, Receiver<KeyPress>) = mpsc::channel();

    thread::spawn(move || {
        let result = rdev::listen(move |event| {
            let key = match event.event_type {
                rdev::EventType::KeyPress(rdev::Key::Return) => Some(KeyPress::Enter),
                rdev::EventType::KeyPress(rdev::Key::Backspace) => Some(KeyPress::Backspace),
                rdev::EventType::KeyPress(_) => event
                    .name
                    .as_ref()
                    .and_then(|s| s.chars().next())
                    .filter(|c| !c.is_control())
                    .map(KeyPress::Char),
                _ => None,
            };
            if let Some(key) = key {
                let _ = tx.send(key);
            }
        });
        if let Err(e) = result {
            warn!("Key listener failed: {:?}", e);
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_line(editor: &mut LineEditor, line: &str) -> Option<LineEvent> {
        for c in line.chars() {
            assert!(editor.push_key(KeyPress::Char(c)).is_none());
        }
        editor.push_key(KeyPress::Enter)
    }

    fn exit_keywords() -> Vec<String> {
        vec!["quit".to_string(), "exit".to_string()]
    }

    #[test]
    fn test_enter_submits_trimmed_line() {
        let mut editor = LineEditor::new(&exit_keywords());
        let event = type_line(&mut editor, "  grab the box  ");
        assert_eq!(event, Some(LineEvent::Command("grab the box".to_string())));
    }

    #[test]
    fn test_empty_line_is_ignored() {
        let mut editor = LineEditor::new(&exit_keywords());
        assert_eq!(editor.push_key(KeyPress::Enter), None);
        assert_eq!(type_line(&mut editor, "   "), None);
    }

    #[test]
    fn test_backspace_edits_buffer() {
        let mut editor = LineEditor::new(&exit_keywords());
        for c in "boxx".chars() {
            editor.push_key(KeyPress::Char(c));
        }
        editor.push_key(KeyPress::Backspace);
        assert_eq!(
            editor.push_key(KeyPress::Enter),
            Some(LineEvent::Command("box".to_string()))
        );
    }

    #[test]
    fn test_backspace_on_empty_buffer() {
        let mut editor = LineEditor::new(&exit_keywords());
        assert_eq!(editor.push_key(KeyPress::Backspace), None);
        assert_eq!(type_line(&mut editor, "ok"), Some(LineEvent::Command("ok".to_string())));
    }

    #[test]
    fn test_exit_keyword_signals_shutdown() {
        let mut editor = LineEditor::new(&exit_keywords());
        assert_eq!(type_line(&mut editor, "QUIT"), Some(LineEvent::Exit));
    }

    #[test]
    fn test_typed_loop_publishes_and_exits() {
        let (tx, rx) = mpsc::channel();
        for c in "open".chars() {
            tx.send(KeyPress::Char(c)).unwrap();
        }
        tx.send(KeyPress::Enter).unwrap();
        for c in "quit".chars() {
            tx.send(KeyPress::Char(c)).unwrap();
        }
        tx.send(KeyPress::Enter).unwrap();

        let commands = Mailbox::new();
        let pipeline_run = RunFlag::new();
        run_typed_input_loop(
            rx,
            commands.clone(),
            &exit_keywords(),
            pipeline_run.clone(),
            RunFlag::new(),
        );

        assert_eq!(commands.take_if_present(), Some("open".to_string()));
        assert!(!pipeline_run.is_set());
    }
}
