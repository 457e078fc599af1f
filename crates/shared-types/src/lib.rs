//! Types shared by every crate of the report generator
//!
//! - [`ReportMetadata`]: the flat key/value record describing a client and project
//! - [`NarrativeKey`]: the named prose sections of a climate adaptation plan
//! - [`TaskProgress`]: the progress record polled by HTTP clients

pub mod metadata;
pub mod narrative;
pub mod types;

pub use metadata::{marker_for, MetadataError, ReportMetadata};
pub use narrative::{NarrativeKey, NarrativeSource};
pub use types::{TaskProgress, TaskStatus};
