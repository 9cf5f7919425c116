//! The operator front-end: reads line-oriented commands from stdin and
//! turns them into [`router_core::OperatorCommand`]s, or a shutdown
//! request. Per spec.md §6, three forms are recognized:
//!
//! - `<dest>;<payload>` — submit a text message for delivery to `dest`.
//! - `R` — print the current table.
//! - `sair` / `exit` / `quit` — request shutdown.
//!
//! This is external-collaborator glue, not core engine logic: stdin is
//! read on a dedicated blocking thread (`tokio::task::spawn_blocking`,
//! mirroring the reference implementation's `input_thread`/`cmd_queue`
//! pair) and bridged to the engine over an `mpsc` channel.

use std::net::IpAddr;

use router_core::OperatorCommand;
use tokio::sync::mpsc;

/// One line of operator input, parsed.
enum Event {
    Command(OperatorCommand),
    Shutdown,
}

fn parse_line(line: &str) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.eq_ignore_ascii_case("r") {
        return Some(Event::Command(OperatorCommand::PrintTable));
    }
    let lower = line.to_ascii_lowercase();
    if lower == "sair" || lower == "exit" || lower == "quit" {
        return Some(Event::Shutdown);
    }
    let Some((dest, payload)) = line.split_once(';') else {
        tracing::warn!("invalid format; use '<dest>;<message>' or 'R' to print the table");
        return None;
    };
    let (dest, payload) = (dest.trim(), payload.trim());
    if dest.is_empty() || payload.is_empty() {
        tracing::warn!("empty destination or message");
        return None;
    }
    match dest.parse::<IpAddr>() {
        Ok(dest) => Some(Event::Command(OperatorCommand::SendText {
            dest,
            payload: payload.to_string(),
        })),
        Err(err) => {
            tracing::warn!(dest, %err, "destination is not a valid IP address");
            None
        }
    }
}

/// Run the operator loop until stdin closes or a shutdown command arrives.
/// `operator_tx` feeds the running engine; `shutdown_tx` wakes up `main`'s
/// select loop so it can call `Handle::shutdown`.
pub async fn run(operator_tx: mpsc::Sender<OperatorCommand>, shutdown_tx: mpsc::Sender<()>) {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);

    tokio::task::spawn_blocking(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        match parse_line(&line) {
            Some(Event::Command(cmd)) => {
                if operator_tx.send(cmd).await.is_err() {
                    break;
                }
            }
            Some(Event::Shutdown) => {
                let _ = shutdown_tx.send(()).await;
                break;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_print_case_insensitively() {
        assert!(matches!(parse_line("r"), Some(Event::Command(OperatorCommand::PrintTable))));
        assert!(matches!(parse_line("R"), Some(Event::Command(OperatorCommand::PrintTable))));
    }

    #[test]
    fn parses_shutdown_aliases() {
        for word in ["sair", "exit", "quit", "EXIT"] {
            assert!(matches!(parse_line(word), Some(Event::Shutdown)));
        }
    }

    #[test]
    fn parses_send_text() {
        match parse_line(" 10.0.0.3 ; hello world ") {
            Some(Event::Command(OperatorCommand::SendText { dest, payload })) => {
                assert_eq!(dest, "10.0.0.3".parse::<IpAddr>().unwrap());
                assert_eq!(payload, "hello world");
            }
            _ => panic!("expected SendText"),
        }
    }

    #[test]
    fn rejects_missing_semicolon() {
        assert!(parse_line("not-a-command").is_none());
    }

    #[test]
    fn rejects_bad_destination() {
        assert!(parse_line("not-an-ip;hello").is_none());
    }

    #[test]
    fn blank_line_is_ignored() {
        assert!(parse_line("   ").is_none());
    }
}
