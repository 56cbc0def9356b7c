//! Keyboard input from stdin.
//!
//! A plain thread reads stdin so a pending read never holds up runtime
//! shutdown.

use motion_grid::PipelineEvent;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Event(PipelineEvent),
    Quit,
}

/// Maps one line of input to a command. `b`, `space` and an empty line
/// capture the background; `q` quits.
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "b" | "space" => Some(Command::Event(PipelineEvent::CaptureBackground)),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

pub fn spawn_stdin_reader(
    events: mpsc::UnboundedSender<PipelineEvent>,
    shutdown: watch::Sender<bool>,
) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(Command::Event(event)) => {
                    debug!(?event, "keyboard event");
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Some(Command::Quit) => {
                    info!("quit requested");
                    shutdown.send(true).ok();
                    break;
                }
                None => debug!(line = line.trim(), "ignoring unknown command"),
            }
        }
    });
}
