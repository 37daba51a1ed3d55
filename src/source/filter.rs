//! Error block filter
//!
//! Engine stack traces span many lines but only the first one carries a
//! level tag. Anything inside a trace, including a telemetry tag that happens
//! to be printed there, must never reach the parser.
//!
//! ```text
//!            ERROR line                 other line
//!   Normal ─────────────► Suppressing ◄───────────┐
//!     ▲                      │  │                 │
//!     └──────────────────────┘  └─────────────────┘
//!        WARN / INFO line
//! ```
//!
//! The line that closes a block (WARN or INFO) is not captured and is
//! forwarded to the parser: the state is already back to Normal.

/// Filter state, kept per physical file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterState {
    #[default]
    Normal,
    Suppressing,
}

/// What to do with a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Hand the line to the event parser
    Forward,
    /// Route the line to the diagnostics sink, do not parse it
    Capture,
    /// Drop the line without capturing it
    Suppress,
}

/// Whether `line` contains `marker` as a whole space/tab-delimited token
pub fn has_level_marker(line: &str, marker: &str) -> bool {
    line.split([' ', '\t']).any(|token| token == marker)
}

fn opens_block(line: &str) -> bool {
    has_level_marker(line, "ERROR")
}

fn closes_block(line: &str) -> bool {
    has_level_marker(line, "WARN") || has_level_marker(line, "INFO")
}

/// Pure transition function
pub fn transition(state: FilterState, line: &str) -> (FilterState, FilterAction) {
    match state {
        FilterState::Normal if opens_block(line) => {
            (FilterState::Suppressing, FilterAction::Capture)
        }
        FilterState::Normal => (FilterState::Normal, FilterAction::Forward),
        FilterState::Suppressing if closes_block(line) => {
            (FilterState::Normal, FilterAction::Forward)
        }
        FilterState::Suppressing => (FilterState::Suppressing, FilterAction::Capture),
    }
}

/// Stateful wrapper applying `transition` line by line
#[derive(Debug, Clone)]
pub struct ErrorBlockFilter {
    state: FilterState,
    capture: bool,
}

impl Default for ErrorBlockFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorBlockFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Normal,
            capture: true,
        }
    }

    /// Suppress error blocks instead of capturing them
    pub fn without_capture() -> Self {
        Self {
            state: FilterState::Normal,
            capture: false,
        }
    }

    pub fn classify(&mut self, line: &str) -> FilterAction {
        let (next, action) = transition(self.state, line);
        self.state = next;

        match action {
            FilterAction::Capture if !self.capture => FilterAction::Suppress,
            other => other,
        }
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Start over for a new file
    pub fn reset(&mut self) {
        self.state = FilterState::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_tokens() {
        assert!(has_level_marker("2024-01-01 10:00:00 ERROR [main] boom", "ERROR"));
        assert!(has_level_marker("ERROR foo", "ERROR"));
        assert!(has_level_marker("ts\tERROR\tmsg", "ERROR"));
        assert!(!has_level_marker("MyERRORHandler started", "ERROR"));
        assert!(!has_level_marker("[ERROR] bracketed", "ERROR"));
    }

    #[test]
    fn test_transition_table() {
        use FilterAction::*;
        use FilterState::*;

        assert_eq!(transition(Normal, "INFO ok"), (Normal, Forward));
        assert_eq!(transition(Normal, "ERROR bad"), (Suppressing, Capture));
        assert_eq!(transition(Suppressing, "\tat java.lang.Thread"), (Suppressing, Capture));
        assert_eq!(transition(Suppressing, "ERROR again"), (Suppressing, Capture));
        assert_eq!(transition(Suppressing, "WARN back"), (Normal, Forward));
        assert_eq!(transition(Suppressing, "x INFO back"), (Normal, Forward));
    }

    #[test]
    fn test_boundary_line_forwarded() {
        let mut filter = ErrorBlockFilter::new();
        let lines = [
            "ERROR foo",
            "[FLUSH]\t1\ta\tb\t1\t0\tc\t0_1:10",
            "WARN [FLUSH]\t2\ta\tb\t2\t0\tc\t0_2:10",
        ];

        let actions: Vec<FilterAction> = lines.iter().map(|l| filter.classify(l)).collect();
        assert_eq!(
            actions,
            vec![
                FilterAction::Capture,
                FilterAction::Capture,
                FilterAction::Forward
            ]
        );
        assert_eq!(filter.state(), FilterState::Normal);
    }

    #[test]
    fn test_without_capture_suppresses() {
        let mut filter = ErrorBlockFilter::without_capture();
        assert_eq!(filter.classify("ERROR x"), FilterAction::Suppress);
        assert_eq!(filter.classify("trace"), FilterAction::Suppress);
        assert_eq!(filter.classify("INFO y"), FilterAction::Forward);
    }

    #[test]
    fn test_reset() {
        let mut filter = ErrorBlockFilter::new();
        filter.classify("ERROR x");
        assert_eq!(filter.state(), FilterState::Suppressing);
        filter.reset();
        assert_eq!(filter.state(), FilterState::Normal);
    }
}
