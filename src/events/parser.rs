//! Event Parser
//!
//! Turns engine log lines into typed telemetry events.
//!
//! # Supported Lines
//!
//! ```text
//! ... [FLUSH]\t<gen>\t<f1>\t<f2>\t<totalFlushed>\t<totalMerged>\t<f5>\t<newComponent>
//! ... [MERGE]\t<gen>\t<f1>\t<f2>\t<f3>\t<f4>\t<f5>\t<totalMerged>\t<newComponentList>
//! ... [COMPONENTS]\t<gen>\t<liveComponentList>
//! ```
//!
//! Anything before the tag (timestamp, level, logger) is ignored. A component
//! is `<level>_<index>:<sizeBytes>` and lists are `;`-joined.
//!
//! Lines with a known tag but the wrong field count are dropped: truncated
//! lines are normal around log rotation.

use nom::{
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res},
    IResult,
};

use crate::events::types::*;

/// Result of offering one line to the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A well-formed telemetry line
    Event(ParsedLine),
    /// Known tag, but wrong arity or non-numeric key fields
    Malformed(EventKind),
    /// Not a telemetry line
    Ignored,
}

/// Recognises the three telemetry tags
#[derive(Debug, Clone, Default)]
pub struct EventParser {
    /// Only accept lines whose first field names this dataset
    dataset: Option<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the dataset name field after the tag, and strip it
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    /// Parse one physical log line
    pub fn parse(&self, line: &str) -> LineOutcome {
        let Some((kind, rest)) = locate_tag(line) else {
            return LineOutcome::Ignored;
        };

        let mut fields: Vec<&str> = rest.split('\t').collect();

        if let Some(dataset) = &self.dataset {
            if fields.first().copied() != Some(dataset.as_str()) {
                return LineOutcome::Ignored;
            }
            fields.remove(0);
        }

        if fields.len() != kind.arity() {
            return LineOutcome::Malformed(kind);
        }

        match build_event(kind, &fields) {
            Some(event) => LineOutcome::Event(ParsedLine {
                event,
                fields: fields.iter().map(|f| f.to_string()).collect(),
            }),
            None => LineOutcome::Malformed(kind),
        }
    }
}

/// Find the earliest known tag in the line and return the text after its
/// separator
fn locate_tag(line: &str) -> Option<(EventKind, &str)> {
    let (pos, kind) = EventKind::all()
        .iter()
        .filter_map(|kind| line.find(kind.tag()).map(|pos| (pos, *kind)))
        .min_by_key(|(pos, _)| *pos)?;

    let after = &line[pos + kind.tag().len()..];
    // One separator character follows the tag
    let mut chars = after.chars();
    chars.next();
    Some((kind, chars.as_str().trim_end_matches(['\r', '\n'])))
}

fn build_event(kind: EventKind, fields: &[&str]) -> Option<Event> {
    let generation = parse_generation(fields[0])?;

    let event = match kind {
        EventKind::Flush => Event::Flush(FlushEvent {
            generation,
            total_flushed: parse_count(fields[3])?,
            total_merged: parse_count(fields[4])?,
            new_component: parse_component(fields[6]),
        }),
        EventKind::Merge => Event::Merge(MergeEvent {
            generation,
            total_merged: parse_count(fields[6])?,
            new_components: parse_component_list(fields[7]),
        }),
        EventKind::Components => Event::Components(ComponentsSnapshot {
            generation,
            live_components: parse_component_list(fields[1]),
        }),
    };

    Some(event)
}

/// Generations are 1-based
fn parse_generation(field: &str) -> Option<u64> {
    parse_count(field).filter(|g| *g > 0)
}

fn parse_count(field: &str) -> Option<u64> {
    field.trim().parse().ok()
}

/// Parse `<level>_<index>:<sizeBytes>`
fn component_descriptor(input: &str) -> IResult<&str, ComponentDescriptor> {
    let (input, level) = map_res(digit1, |s: &str| s.parse::<u32>())(input)?;
    let (input, _) = char('_')(input)?;
    let (input, index) = map_res(digit1, |s: &str| s.parse::<u64>())(input)?;
    let (input, _) = char(':')(input)?;
    let (input, size_bytes) = map_res(digit1, |s: &str| s.parse::<u64>())(input)?;

    Ok((input, ComponentDescriptor::new(level, index, size_bytes)))
}

/// Parse a single component descriptor, `None` if any part is not an integer
pub fn parse_component(text: &str) -> Option<ComponentDescriptor> {
    all_consuming(component_descriptor)(text.trim())
        .ok()
        .map(|(_, c)| c)
}

/// Parse a `;`-joined component list, dropping malformed items individually
pub fn parse_component_list(text: &str) -> Vec<ComponentDescriptor> {
    text.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(parse_component)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flush_line(generation: u64) -> String {
        format!(
            "2024-03-01 10:00:00,001 INFO [Executor-1] [FLUSH]\t{}\t10\t20\t{}\t0\t5\t0_{}:1024\n",
            generation, generation, generation
        )
    }

    #[test]
    fn test_parse_flush() {
        let parser = EventParser::new();
        match parser.parse(&flush_line(3)) {
            LineOutcome::Event(parsed) => {
                assert_eq!(
                    parsed.event,
                    Event::Flush(FlushEvent {
                        generation: 3,
                        total_flushed: 3,
                        total_merged: 0,
                        new_component: Some(ComponentDescriptor::new(0, 3, 1024)),
                    })
                );
                assert_eq!(parsed.fields.len(), 7);
                assert_eq!(parsed.fields[6], "0_3:1024");
            }
            other => panic!("expected flush event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_merge() {
        let line = "WARN x [MERGE]\t4\ta\tb\tc\td\te\t2\t1_1:100;1_2:150\r\n";
        match EventParser::new().parse(line) {
            LineOutcome::Event(parsed) => match parsed.event {
                Event::Merge(merge) => {
                    assert_eq!(merge.generation, 4);
                    assert_eq!(merge.total_merged, 2);
                    assert_eq!(total_size(&merge.new_components), 250);
                }
                other => panic!("expected merge, got {:?}", other),
            },
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_components() {
        let line = "INFO [COMPONENTS]\t9\t0_3:100;0_5:200;1_2:50";
        match EventParser::new().parse(line) {
            LineOutcome::Event(parsed) => match parsed.event {
                Event::Components(snapshot) => {
                    assert_eq!(snapshot.generation, 9);
                    assert_eq!(snapshot.live_components.len(), 3);
                    assert_eq!(distinct_levels(&snapshot.live_components), 2);
                }
                other => panic!("expected snapshot, got {:?}", other),
            },
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_arity_is_malformed() {
        let line = "INFO [MERGE]\t1\t2\t3\t4\t5";
        assert_eq!(
            EventParser::new().parse(line),
            LineOutcome::Malformed(EventKind::Merge)
        );

        let line = "INFO [COMPONENTS]\t1";
        assert_eq!(
            EventParser::new().parse(line),
            LineOutcome::Malformed(EventKind::Components)
        );
    }

    #[test]
    fn test_non_numeric_generation_is_malformed() {
        let line = "INFO [COMPONENTS]\tabc\t0_1:10";
        assert_eq!(
            EventParser::new().parse(line),
            LineOutcome::Malformed(EventKind::Components)
        );

        let line = "INFO [COMPONENTS]\t0\t0_1:10";
        assert_eq!(
            EventParser::new().parse(line),
            LineOutcome::Malformed(EventKind::Components)
        );
    }

    #[test]
    fn test_earliest_tag_wins() {
        let line = "INFO [MERGE]\t4\ta\tb\tc\td\te\t2\t1_1:100;[FLUSH]";
        match EventParser::new().parse(line) {
            LineOutcome::Event(parsed) => match parsed.event {
                Event::Merge(merge) => {
                    assert_eq!(merge.generation, 4);
                    assert_eq!(total_size(&merge.new_components), 100);
                }
                other => panic!("expected merge, got {:?}", other),
            },
            other => panic!("expected event, got {:?}", other),
        }

        assert_eq!(
            EventParser::new().parse("INFO [COMPONENTS]\t[MERGE]"),
            LineOutcome::Malformed(EventKind::Components)
        );
    }

    #[test]
    fn test_untagged_line_ignored() {
        assert_eq!(
            EventParser::new().parse("INFO nothing to see here"),
            LineOutcome::Ignored
        );
    }

    #[test]
    fn test_bad_descriptor_drops_only_itself() {
        let components = parse_component_list("0_1:100;x_2:50;1_3:abc;;2_4:10");
        assert_eq!(
            components,
            vec![
                ComponentDescriptor::new(0, 1, 100),
                ComponentDescriptor::new(2, 4, 10),
            ]
        );

        assert_eq!(parse_component("0_1"), None);
        assert_eq!(parse_component("0_1:10:20"), None);
        assert_eq!(parse_component(" 3_9:77 "), Some(ComponentDescriptor::new(3, 9, 77)));
    }

    #[test]
    fn test_flush_with_bad_descriptor_keeps_event() {
        let line = "INFO [FLUSH]\t2\ta\tb\t2\t0\tc\tgarbage";
        match EventParser::new().parse(line) {
            LineOutcome::Event(parsed) => match parsed.event {
                Event::Flush(flush) => assert_eq!(flush.new_component, None),
                other => panic!("expected flush, got {:?}", other),
            },
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_dataset_filter() {
        let parser = EventParser::new().with_dataset("usertable");

        let line = "INFO [COMPONENTS]\tusertable\t5\t0_1:10";
        match parser.parse(line) {
            LineOutcome::Event(parsed) => {
                assert_eq!(parsed.event.generation(), 5);
                assert_eq!(parsed.fields, vec!["5".to_string(), "0_1:10".to_string()]);
            }
            other => panic!("expected event, got {:?}", other),
        }

        let other_dataset = "INFO [COMPONENTS]\tordertable\t5\t0_1:10";
        assert_eq!(parser.parse(other_dataset), LineOutcome::Ignored);
    }
}
