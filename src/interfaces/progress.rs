use console::{Term, style};

use crate::core::timing::ProgressReporter;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Single-line countdown redrawn in place, e.g. `| Waiting 12 seconds to start farming |`.
pub struct ConsoleProgress {
    term: Term,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn countdown_line(remaining_secs: u64, label: &str) -> String {
    let glyph = SPINNER[(remaining_secs % SPINNER.len() as u64) as usize];
    format!(
        "{} Waiting {} seconds to {} {}",
        glyph, remaining_secs, label, glyph
    )
}

impl ProgressReporter for ConsoleProgress {
    fn tick(&self, remaining_secs: u64, label: &str) {
        if !self.term.is_term() {
            return;
        }
        let line = countdown_line(remaining_secs, label);
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&style(line).cyan().bold().to_string());
    }

    fn finish(&self) {
        if self.term.is_term() {
            let _ = self.term.clear_line();
        }
    }
}
