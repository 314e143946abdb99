//! Operator stop signals.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Why the bridge is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop` was typed on stdin
    Command,
    /// Ctrl-C
    Interrupt,
}

/// Resolve on Ctrl-C or a `stop` line on stdin.
///
/// A closed stdin (e.g. running under a service manager) is not a stop request.
pub async fn wait_for_stop() -> StopReason {
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        _ = tokio::signal::ctrl_c() => StopReason::Interrupt,
        _ = wait_for_stop_command(stdin) => StopReason::Command,
    }
}

/// Resolves once `reader` yields a line that reads `stop`; pends forever after EOF.
pub async fn wait_for_stop_command<R>(reader: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case("stop") => return,
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    tracing::info!(input = %line.trim(), "unknown command, type 'stop' to exit");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                break;
            }
        }
    }
    std::future::pending::<()>().await
}
