//! End-of-run summary reduction
//!
//! Each engine process prints a final stats line:
//!
//! ```text
//! ... [ALL]\t<flushCount>\t<mergeCount>\t<componentInfo>
//! ```
//!
//! Only the single best line across all files is kept. That is a much
//! narrower view than the generation table and serves callers who just need
//! the final counters.

use serde::{Deserialize, Serialize};

/// Tag of the end-of-run stats line
pub const STATS_TAG: &str = "[ALL]";

/// One parsed stats line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsLine {
    pub flush_count: u64,
    pub merge_count: u64,
    /// Component info, verbatim
    pub info: String,
}

impl StatsLine {
    pub fn new(flush_count: u64, merge_count: u64, info: impl Into<String>) -> Self {
        Self {
            flush_count,
            merge_count,
            info: info.into(),
        }
    }

    /// Whether `self` should replace `current` as the best line
    pub fn beats(&self, current: &StatsLine) -> bool {
        self.flush_count > current.flush_count
            || (self.flush_count == current.flush_count && self.merge_count > current.merge_count)
    }
}

impl std::fmt::Display for StatsLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}\t{}", self.flush_count, self.merge_count, self.info)
    }
}

/// Parse a stats line, `None` if the line is not one or is malformed
///
/// When `dataset` is set the first field must name it and is skipped.
/// Fields past the component info are ignored.
pub fn parse_stats_line(line: &str, dataset: Option<&str>) -> Option<StatsLine> {
    let pos = line.find(STATS_TAG)?;
    let rest = line[pos + STATS_TAG.len()..]
        .strip_prefix(['\t', ' '])?
        .trim_end_matches(['\r', '\n']);

    let mut fields = rest.split('\t');
    if let Some(dataset) = dataset {
        if fields.next()? != dataset {
            return None;
        }
    }

    let flush_count = fields.next()?.trim().parse().ok()?;
    let merge_count = fields.next()?.trim().parse().ok()?;
    let info = fields.next()?;

    Some(StatsLine::new(flush_count, merge_count, info))
}

/// Keeps the best stats line seen so far
///
/// A candidate replaces the current best only when its flush count is
/// strictly greater, or equal with a strictly greater merge count. Exact
/// ties keep the line seen first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestStats {
    best: Option<StatsLine>,
}

impl BestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate; returns true if it became the new best
    pub fn offer(&mut self, candidate: StatsLine) -> bool {
        let replace = match &self.best {
            None => true,
            Some(current) => candidate.beats(current),
        };
        if replace {
            self.best = Some(candidate);
        }
        replace
    }

    /// Fold in the best of a later scan
    ///
    /// Combining per-file bests in file order gives the same result as one
    /// sequential pass over all lines.
    pub fn merge(&mut self, later: BestStats) {
        if let Some(candidate) = later.best {
            self.offer(candidate);
        }
    }

    pub fn best(&self) -> Option<&StatsLine> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<StatsLine> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stats_line() {
        let line = "2024-05-01 12:00:00 INFO [Worker] [ALL]\t120\t37\t0_1:10;1_2:40\r\n";
        assert_eq!(
            parse_stats_line(line, None),
            Some(StatsLine::new(120, 37, "0_1:10;1_2:40"))
        );
    }

    #[test]
    fn test_parse_with_dataset() {
        let line = "[ALL]\tusertable\t5\t2\tinfo";
        assert_eq!(
            parse_stats_line(line, Some("usertable")),
            Some(StatsLine::new(5, 2, "info"))
        );
        assert_eq!(parse_stats_line(line, Some("other")), None);
        assert_eq!(parse_stats_line(line, None), None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_stats_line("no tag here", None), None);
        assert_eq!(parse_stats_line("[ALL]\t5\t2", None), None);
        assert_eq!(parse_stats_line("[ALL]\tx\t2\tinfo", None), None);
    }

    #[test]
    fn test_best_rule() {
        let mut best = BestStats::new();
        assert!(best.offer(StatsLine::new(10, 5, "a")));
        assert!(!best.offer(StatsLine::new(9, 99, "b")));
        assert!(best.offer(StatsLine::new(10, 6, "c")));
        assert!(best.offer(StatsLine::new(11, 0, "d")));
        assert_eq!(best.best(), Some(&StatsLine::new(11, 0, "d")));
    }

    #[test]
    fn test_exact_tie_keeps_first() {
        let mut best = BestStats::new();
        best.offer(StatsLine::new(10, 5, "first"));
        assert!(!best.offer(StatsLine::new(10, 5, "second")));
        assert_eq!(best.best().map(|s| s.info.as_str()), Some("first"));
    }

    #[test]
    fn test_merge_matches_sequential() {
        let lines = [
            StatsLine::new(3, 1, "a"),
            StatsLine::new(7, 2, "b"),
            StatsLine::new(7, 2, "c"),
            StatsLine::new(5, 9, "d"),
        ];

        let mut sequential = BestStats::new();
        for line in lines.iter().cloned() {
            sequential.offer(line);
        }

        let mut combined = BestStats::new();
        for chunk in lines.chunks(2) {
            let mut per_file = BestStats::new();
            for line in chunk.iter().cloned() {
                per_file.offer(line);
            }
            combined.merge(per_file);
        }

        assert_eq!(combined, sequential);
        assert_eq!(combined.into_best().map(|s| s.info), Some("b".to_string()));
    }
}
