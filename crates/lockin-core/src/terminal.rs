//! Interactive terminal mode.
//!
//! Reads one line at a time, sends it as a command and prints the decoded
//! status flags and any response, until the operator types `STOP`.

use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::debug;

use crate::events::SessionObserver;
use crate::protocol::TERMINAL_STOP;
use crate::session::{CommandSession, Reply};

/// What happened during one terminal run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSummary {
    pub commands_sent: usize,
    pub failures: usize,
}

/// Print decoded status, overload flags and the response text.
pub fn write_reply<W: Write>(out: &mut W, reply: &Reply) -> std::io::Result<()> {
    for line in reply.status.describe() {
        writeln!(out, "{line}")?;
    }
    if let Some(overload) = reply.overload {
        for line in overload.describe() {
            writeln!(out, "{line}")?;
        }
    }
    if reply.response.is_empty() {
        writeln!(out)
    } else {
        writeln!(out, "Command response: {}\n", reply.response)
    }
}

/// Run terminal mode until `STOP` or end of input.
///
/// A failed command is reported on `out` and the loop keeps going.
pub fn run_terminal<O, R, W>(
    session: &mut CommandSession<O>,
    mut input: R,
    mut out: W,
) -> Result<TerminalSummary>
where
    O: SessionObserver,
    R: BufRead,
    W: Write,
{
    let mut summary = TerminalSummary::default();
    let mut raw = Vec::new();

    loop {
        raw.clear();
        if input.read_until(b'\n', &mut raw)? == 0 {
            debug!("End of input");
            break;
        }
        let bytes = raw.strip_suffix(b"\n").unwrap_or(&raw[..]);
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        let Ok(command) = std::str::from_utf8(bytes) else {
            summary.failures += 1;
            writeln!(out, "Error: Input line is not valid UTF-8\n")?;
            out.flush()?;
            continue;
        };

        if command == TERMINAL_STOP {
            break;
        }

        summary.commands_sent += 1;
        match session.send(command) {
            Ok(reply) => write_reply(&mut out, &reply)?,
            Err(e) => {
                summary.failures += 1;
                writeln!(out, "Error: {e}\n")?;
            }
        }
        out.flush()?;
    }

    Ok(summary)
}
