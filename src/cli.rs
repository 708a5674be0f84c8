//! Command-line REPL acting as a terminal input source
//!
//! Terminals do not report key releases, so presses and releases are typed
//! as commands. `move` updates the polled pointer and also delivers one
//! sample immediately.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::oneshot;

use crate::input::{EngineClock, InputCallback, InputEvent, ManualPointer};
use crate::mapping::{KeyCode, KeyMappingSet};
use crate::observer::SharedObserver;

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Down(Vec<KeyCode>),
    Up(Vec<KeyCode>),
    /// Press then release each key
    Tap(Vec<KeyCode>),
    Move(f32, f32),
    /// Re-anchor gesture tracking at a position
    Anchor(f32, f32),
    Keys,
    History,
    Clear,
    /// Clear the log and key highlighting
    Reset,
    Help,
    Quit,
}

/// Parse a REPL line; `Ok(None)` for blank input
pub fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    let keys = |args: &[&str]| -> std::result::Result<Vec<KeyCode>, String> {
        let keys: Vec<KeyCode> = args.iter().flat_map(|a| a.chars()).map(KeyCode::from_char).collect();
        if keys.is_empty() {
            Err(format!("usage: {} <keys>", verb))
        } else {
            Ok(keys)
        }
    };
    let point = |args: &[&str]| -> std::result::Result<(f32, f32), String> {
        match args {
            [x, y] => {
                let x = x.parse::<f32>().map_err(|_| format!("invalid x: {}", x))?;
                let y = y.parse::<f32>().map_err(|_| format!("invalid y: {}", y))?;
                Ok((x, y))
            }
            _ => Err(format!("usage: {} <x> <y>", verb)),
        }
    };

    let command = match verb.to_lowercase().as_str() {
        "down" | "d" => Command::Down(keys(&args)?),
        "up" | "u" => Command::Up(keys(&args)?),
        "tap" | "t" => Command::Tap(keys(&args)?),
        "move" | "m" => {
            let (x, y) = point(&args)?;
            Command::Move(x, y)
        }
        "anchor" => {
            let (x, y) = point(&args)?;
            Command::Anchor(x, y)
        }
        "keys" => Command::Keys,
        "history" | "h" => Command::History,
        "clear" => Command::Clear,
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(Some(command))
}

/// Interactive terminal session
pub struct Repl {
    callback: InputCallback,
    pointer: ManualPointer,
    clock: EngineClock,
    mapping: KeyMappingSet,
    observer: SharedObserver,
}

impl Repl {
    pub fn new(
        callback: InputCallback,
        pointer: ManualPointer,
        clock: EngineClock,
        mapping: KeyMappingSet,
        observer: SharedObserver,
    ) -> Self {
        Self {
            callback,
            pointer,
            clock,
            mapping,
            observer,
        }
    }

    /// Blocking read loop; returns on `quit`, EOF or Ctrl-C
    pub fn run(self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        println!("{}", "Type 'help' for commands.".dimmed());

        loop {
            match rl.readline("stradella> ") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match parse_command(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => self.execute(command),
                        Ok(None) => {}
                        Err(e) => println!("{}", e.red()),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Apply one command
    pub fn execute(&self, command: Command) {
        match command {
            Command::Down(keys) => keys.into_iter().for_each(|k| (self.callback)(InputEvent::KeyDown(k))),
            Command::Up(keys) => keys.into_iter().for_each(|k| (self.callback)(InputEvent::KeyUp(k))),
            Command::Tap(keys) => {
                for key in keys {
                    (self.callback)(InputEvent::KeyDown(key));
                    (self.callback)(InputEvent::KeyUp(key));
                }
            }
            Command::Move(x, y) => {
                self.pointer.set(x, y);
                (self.callback)(InputEvent::Pointer(self.clock.sample(x, y)));
            }
            Command::Anchor(x, y) => {
                self.pointer.set(x, y);
                (self.callback)(InputEvent::PointerReset(self.clock.sample(x, y)));
            }
            Command::Keys => self.print_keys(),
            Command::History => {
                let observer = self.observer.lock();
                if observer.history_len() == 0 {
                    println!("{}", "(no messages)".dimmed());
                }
                for line in observer.history() {
                    println!("{}", line);
                }
            }
            Command::Clear => {
                self.observer.lock().clear();
                println!("{}", "History cleared".dimmed());
            }
            Command::Reset => {
                self.observer.lock().reset();
                println!("{}", "History and highlighting reset".dimmed());
            }
            Command::Help => print_help(),
            Command::Quit => {}
        }
    }

    fn print_keys(&self) {
        let highlighted = self.observer.lock().highlighted().clone();

        println!("\n{}", "=== Keyboard Layout ===".bold().cyan());
        for (group, mappings) in self.mapping.rows() {
            println!("  {}", format!("{:?}", group).yellow());
            for mapping in mappings {
                let key = mapping.key().to_string();
                let key = if highlighted.contains(&mapping.key()) {
                    key.green().bold()
                } else {
                    key.normal()
                };
                println!("    {} {:<10} {:?}", key, mapping.label(), mapping.notes());
            }
        }
        println!();
    }
}

/// Run `repl` on a detached thread; the receiver yields its result.
///
/// The thread is never joined, so a session blocked in readline does not
/// hold up runtime teardown after a shutdown signal.
pub fn spawn_repl(repl: Repl) -> std::io::Result<oneshot::Receiver<Result<()>>> {
    run_detached("repl", move || repl.run())
}

fn run_detached<T, F>(name: &str, f: F) -> std::io::Result<oneshot::Receiver<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new().name(name.to_string()).spawn(move || {
        let _ = tx.send(f());
    })?;
    Ok(rx)
}

fn print_help() {
    println!("\n{}", "=== Commands ===".bold().cyan());
    println!("  {:<18} press keys (e.g. 'down f', 'down fq')", "down <keys>");
    println!("  {:<18} release keys", "up <keys>");
    println!("  {:<18} press and release keys", "tap <keys>");
    println!("  {:<18} move the pointer", "move <x> <y>");
    println!("  {:<18} re-anchor gesture tracking", "anchor <x> <y>");
    println!("  {:<18} show the key layout", "keys");
    println!("  {:<18} show the message log", "history");
    println!("  {:<18} clear the message log", "clear");
    println!("  {:<18} clear the log and key highlighting", "reset");
    println!("  {:<18} exit", "quit");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchQueue;
    use crate::input::channel_callback;
    use crate::midi::MidiMessage;
    use crate::observer::{ObservedEvent, Observer};
    use crossbeam::channel::unbounded;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_parse_key_commands() {
        let f = KeyCode::from_char('F');
        assert_eq!(parse_command("down f").unwrap(), Some(Command::Down(vec![f])));
        assert_eq!(parse_command("UP F").unwrap(), Some(Command::Up(vec![f])));
        assert_eq!(
            parse_command("tap fq").unwrap(),
            Some(Command::Tap(vec![f, KeyCode::from_char('Q')]))
        );
        assert!(parse_command("down").is_err());
    }

    #[test]
    fn test_parse_pointer_commands() {
        assert_eq!(parse_command("move 10 20.5").unwrap(), Some(Command::Move(10.0, 20.5)));
        assert_eq!(parse_command("anchor 0 0").unwrap(), Some(Command::Anchor(0.0, 0.0)));
        assert!(parse_command("move 10").is_err());
        assert!(parse_command("move a b").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("quit").unwrap(), Some(Command::Quit));
        assert_eq!(parse_command("history").unwrap(), Some(Command::History));
        assert_eq!(parse_command("clear").unwrap(), Some(Command::Clear));
        assert_eq!(parse_command("Reset").unwrap(), Some(Command::Reset));
        assert!(parse_command("bogus").is_err());
    }

    #[test]
    fn test_execute_sends_events() {
        let (tx, rx) = unbounded();
        let pointer = ManualPointer::new();
        let observer = Observer::new(Arc::new(DispatchQueue::new())).shared();
        let repl = Repl::new(
            channel_callback(tx),
            pointer.clone(),
            EngineClock::new(),
            KeyMappingSet::default(),
            observer,
        );

        let f = KeyCode::from_char('F');
        repl.execute(Command::Tap(vec![f]));
        repl.execute(Command::Move(5.0, 6.0));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events[0], InputEvent::KeyDown(f));
        assert_eq!(events[1], InputEvent::KeyUp(f));
        assert!(matches!(events[2], InputEvent::Pointer(s) if s.position.x == 5.0));
        assert!(crate::input::PointerProbe::position(&pointer).is_some());
    }

    #[test]
    fn test_reset_command_clears_observer() {
        let (tx, _rx) = unbounded();
        let queue = Arc::new(DispatchQueue::new());
        let observer = Observer::new(queue.clone()).shared();
        let repl = Repl::new(
            channel_callback(tx),
            ManualPointer::new(),
            EngineClock::new(),
            KeyMappingSet::default(),
            observer.clone(),
        );

        let f = KeyCode::from_char('F');
        queue.enqueue(ObservedEvent::highlight(f, true));
        queue.enqueue(ObservedEvent::midi(MidiMessage::note_on(0, 36, 100), true));
        observer.lock().drain();

        repl.execute(Command::Clear);
        assert!(observer.lock().highlighted().contains(&f));

        repl.execute(Command::Reset);
        assert_eq!(observer.lock().history_len(), 0);
        assert!(observer.lock().highlighted().is_empty());
    }

    #[test]
    fn test_detached_session_does_not_block_runtime_drop() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let runtime = tokio::runtime::Runtime::new().unwrap();

        let rx = run_detached("blocked", move || release_rx.recv().is_ok()).unwrap();
        let timed_out = runtime.block_on(async { tokio::time::timeout(Duration::from_millis(20), rx).await.is_err() });
        assert!(timed_out);

        drop(runtime);
        release_tx.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_detached_result_delivered() {
        let rx = run_detached("done", || 7).unwrap();
        assert_eq!(rx.await.unwrap(), 7);
    }
}
