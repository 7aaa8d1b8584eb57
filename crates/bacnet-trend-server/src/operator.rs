//! Operator console commands.
//!
//! Commands are single keypresses. On a terminal, keys are read with
//! crossterm in raw mode; when stdin is not a terminal every non-blank
//! character of the input counts as one keypress. Either way input is read
//! on a detached thread so a blocked read never holds up shutdown.

use std::fmt;
use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long one key poll waits before checking whether the loop went away.
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A command given on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Version,
    Increment,
    Decrement,
    BackupTrendLog,
    BackupTrendLogMultiple,
    Quit,
    Help,
}

impl OperatorCommand {
    /// Map a character key. Unknown keys ask for help.
    pub fn from_char(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'v' => Self::Version,
            '+' | 'u' => Self::Increment,
            '-' | 'd' => Self::Decrement,
            'b' => Self::BackupTrendLog,
            's' => Self::BackupTrendLogMultiple,
            'q' => Self::Quit,
            _ => Self::Help,
        }
    }

    /// Map a terminal key event. Only presses count.
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        let command = match key.code {
            // Raw mode swallows SIGINT.
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Self::Quit,
            KeyCode::F(1) => Self::Version,
            KeyCode::Up => Self::Increment,
            KeyCode::Down => Self::Decrement,
            KeyCode::Char(c) => Self::from_char(c),
            KeyCode::Modifier(_) => return None,
            _ => Self::Help,
        };
        Some(command)
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Version => "version",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::BackupTrendLog => "backup-trend-log",
            Self::BackupTrendLogMultiple => "backup-trend-log-multiple",
            Self::Quit => "quit",
            Self::Help => "help",
        };
        f.write_str(name)
    }
}

/// Console usage.
pub fn help_text() -> &'static str {
    "Keys:\n\
     \x20 F1, v      Display version information\n\
     \x20 Up, +      Increment Analog Input 2 by 0.01\n\
     \x20 Down, -    Decrement Analog Input 2 by 0.01\n\
     \x20 b          Back up the trend log to a new file\n\
     \x20 s          Back up the trend log multiple to a new file\n\
     \x20 q          Quit\n\
     \x20 h          Display this help"
}

/// Keeps the terminal in raw mode until dropped.
#[derive(Debug)]
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!(error = %e, "Failed to restore terminal mode");
        }
    }
}

/// Read single keypresses from the terminal.
///
/// The thread stops after forwarding quit or once the receiver is dropped.
pub fn spawn_key_reader() -> io::Result<mpsc::Receiver<OperatorCommand>> {
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new()
        .name("operator-keys".to_string())
        .spawn(move || read_keys(&tx))?;
    Ok(rx)
}

/// Treat every non-blank character of `reader` as a keypress.
///
/// Used when stdin is a pipe or file rather than a terminal.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<OperatorCommand>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || read_lines(reader, &tx))?;
    Ok(rx)
}

/// Send a command to the loop; false when reading should stop.
fn forward(tx: &mpsc::Sender<OperatorCommand>, command: OperatorCommand) -> bool {
    debug!(%command, "Operator input");
    tx.blocking_send(command).is_ok() && command != OperatorCommand::Quit
}

fn read_keys(tx: &mpsc::Sender<OperatorCommand>) {
    while !tx.is_closed() {
        match event::poll(KEY_POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(error = %e, "Failed to poll operator keys");
                return;
            }
        }
        let command = match event::read() {
            Ok(Event::Key(key)) => OperatorCommand::from_key(&key),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read operator key");
                return;
            }
        };
        if let Some(command) = command {
            if !forward(tx, command) {
                return;
            }
        }
    }
}

fn read_lines<R: BufRead>(reader: R, tx: &mpsc::Sender<OperatorCommand>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read operator input");
                return;
            }
        };
        for c in line.chars().filter(|c| !c.is_whitespace()) {
            if !forward(tx, OperatorCommand::from_char(c)) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn drain(rx: &mut mpsc::Receiver<OperatorCommand>) -> Vec<OperatorCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    #[test]
    fn test_from_key() {
        let cases = [
            (KeyCode::F(1), OperatorCommand::Version),
            (KeyCode::Up, OperatorCommand::Increment),
            (KeyCode::Down, OperatorCommand::Decrement),
            (KeyCode::Char('b'), OperatorCommand::BackupTrendLog),
            (KeyCode::Char('S'), OperatorCommand::BackupTrendLogMultiple),
            (KeyCode::Char('q'), OperatorCommand::Quit),
            (KeyCode::Char('h'), OperatorCommand::Help),
            (KeyCode::Char('x'), OperatorCommand::Help),
            (KeyCode::Enter, OperatorCommand::Help),
        ];
        for (code, expected) in cases {
            assert_eq!(OperatorCommand::from_key(&press(code)), Some(expected), "{:?}", code);
        }
    }

    #[test]
    fn test_from_key_ignores_releases() {
        let release = KeyEvent::new_with_kind(KeyCode::Up, KeyModifiers::NONE, KeyEventKind::Release);
        assert_eq!(OperatorCommand::from_key(&release), None);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(OperatorCommand::from_key(&key), Some(OperatorCommand::Quit));
    }

    #[test]
    fn test_from_char() {
        assert_eq!(OperatorCommand::from_char('+'), OperatorCommand::Increment);
        assert_eq!(OperatorCommand::from_char('-'), OperatorCommand::Decrement);
        assert_eq!(OperatorCommand::from_char('V'), OperatorCommand::Version);
        assert_eq!(OperatorCommand::from_char('?'), OperatorCommand::Help);
    }

    #[test]
    fn test_piped_input_is_one_command_per_character() {
        let (tx, mut rx) = mpsc::channel(16);
        read_lines(Cursor::new("+ +\n\nx\n-\n"), &tx);

        assert_eq!(
            drain(&mut rx),
            [
                OperatorCommand::Increment,
                OperatorCommand::Increment,
                OperatorCommand::Help,
                OperatorCommand::Decrement,
            ]
        );
    }

    #[test]
    fn test_reading_stops_at_quit() {
        let (tx, mut rx) = mpsc::channel(16);
        read_lines(Cursor::new("bq\nh\n"), &tx);

        assert_eq!(
            drain(&mut rx),
            [OperatorCommand::BackupTrendLog, OperatorCommand::Quit]
        );
    }

    #[test]
    fn test_line_reader_thread_closes_channel() {
        let mut rx = spawn_line_reader(Cursor::new("s\n")).unwrap();

        assert_eq!(rx.blocking_recv(), Some(OperatorCommand::BackupTrendLogMultiple));
        assert_eq!(rx.blocking_recv(), None);
    }

    #[test]
    fn test_help_lists_every_key() {
        let help = help_text();
        for key in ["F1", "Up", "Down", " b ", " s ", " q ", " h "] {
            assert!(help.contains(key), "missing {:?}", key);
        }
    }
}
