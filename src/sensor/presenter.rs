//! Operator-facing rendering of reading batches
//!
//! Output is plain text for a human at a terminal and is not meant to be
//! parsed. The border follows the current terminal width; when the width
//! cannot be queried (output redirected, no tty) [`FALLBACK_WIDTH`] is used.

use std::io::{self, Write};
use tracing::{debug, warn};

use super::ReadingBatch;

/// Border width used when the terminal size is unavailable
pub const FALLBACK_WIDTH: u16 = 80;

/// Destination for rendered batches.
///
/// The emission loop only talks to this trait so the console can be
/// swapped for a recorder in tests.
pub trait BatchSink: Send + Sync + 'static {
    fn emit(&self, batch: &ReadingBatch);
}

/// Writes batches to standard output framed by a terminal-wide border
#[derive(Debug, Default, Clone, Copy)]
pub struct Presenter;

impl Presenter {
    pub fn render(batch: &ReadingBatch, width: u16) -> String {
        let values = batch
            .values()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let border = border(width);
        format!("{border}\n   [Data: {{{values}}}]\n{border}\n")
    }

    pub fn output_width() -> u16 {
        match crossterm::terminal::size() {
            Ok((columns, _)) if columns > 0 => columns,
            Ok(_) => FALLBACK_WIDTH,
            Err(e) => {
                debug!("Terminal size unavailable, using {}: {}", FALLBACK_WIDTH, e);
                FALLBACK_WIDTH
            }
        }
    }
}

impl BatchSink for Presenter {
    fn emit(&self, batch: &ReadingBatch) {
        let text = Self::render(batch, Self::output_width());
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("Failed to write readings to stdout: {}", e);
        }
    }
}

fn border(width: u16) -> String {
    let inner = usize::from(width).saturating_sub(2);
    format!("#{}#", "-".repeat(inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_frames_comma_separated_values() {
        let batch: ReadingBatch = [1u16, 22, 333].into_iter().collect();

        let text = Presenter::render(&batch, 10);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["#--------#", "   [Data: {1, 22, 333}]", "#--------#"]);
    }

    #[test]
    fn border_never_underflows_on_tiny_widths() {
        assert_eq!(border(0), "##");
        assert_eq!(border(1), "##");
        assert_eq!(border(2), "##");
    }

    #[test]
    fn border_spans_the_full_width() {
        assert_eq!(border(FALLBACK_WIDTH).chars().count(), usize::from(FALLBACK_WIDTH));
    }
}
