//! Transformation module.
//!
//! Everything between a raw cell and a populated record:
//! - Mapper: headers to operators
//! - Pipeline: overrides, defaults, prefixes and postfixes
//! - Coerce: insistent assignment
//! - Association: delimited lookups against related records

pub mod association;
pub mod coerce;
pub mod mapper;
pub mod pipeline;

pub use association::{
    parse_segments, resolve, resolve_and_assign, AssociationLookupSpec, Resolution,
    SegmentResolution,
};
pub use coerce::{assign, Assignment, Conversion, INSISTENT_CONVERSIONS};
pub use mapper::{map_headers, ColumnMap, HeaderMapping, MappingOptions};
pub use pipeline::ValueRules;
