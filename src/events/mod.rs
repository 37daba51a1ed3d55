//! Engine telemetry events
//!
//! - **types**: Event data model (flush, merge, components snapshot)
//! - **parser**: Tagged line recognition and field extraction
//!
//! # Example
//!
//! ```rust
//! use lsmtrace::events::{Event, EventParser, LineOutcome};
//!
//! let parser = EventParser::new();
//! let line = "INFO [COMPONENTS]\t3\t0_3:100;0_5:200;1_2:50";
//!
//! if let LineOutcome::Event(parsed) = parser.parse(line) {
//!     assert_eq!(parsed.event.generation(), 3);
//!     assert!(matches!(parsed.event, Event::Components(_)));
//! }
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_component, parse_component_list, EventParser, LineOutcome};
pub use types::{
    distinct_levels, total_size, ComponentDescriptor, ComponentsSnapshot, Event, EventKind,
    FlushEvent, MergeEvent, ParsedLine,
};
