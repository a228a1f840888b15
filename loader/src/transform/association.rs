//! Association resolution.
//!
//! An association cell names related records instead of holding a value:
//!
//! ```text
//! cell     := segment ('|' segment)*
//! segment  := [lookup_key ':'] value (',' value)*
//! ```
//!
//! `Size:large|Colour:red,green,blue` finds the size whose `Size` is `large`
//! and every colour among `red`, `green` and `blue`. Each segment is resolved
//! and assigned on its own; lookup misses become warnings on the record and
//! never stop the row.

use crate::error::{CellError, ResolutionError};
use crate::logs::log_warning_indent;
use crate::models::{Record, RecordRef, Value};
use crate::registry::{normalize_name, OperatorDescriptor};
use crate::store::Store;

use super::coerce::{self, Assignment};

/// Separates independent segments.
pub const MULTI_ASSOC_DELIM: char = '|';
/// Separates the lookup key from its values.
pub const NAME_VALUE_DELIM: char = ':';
/// Separates values within a segment.
pub const MULTI_VALUE_DELIM: char = ',';

/// Parsed form of one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationLookupSpec {
    /// Attribute of the related class searched by
    pub lookup_key: String,
    /// At least one value
    pub lookup_values: Vec<String>,
}

/// Outcome of resolving one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentResolution {
    pub spec: AssociationLookupSpec,
    pub found: Vec<RecordRef>,
    pub warning: Option<String>,
}

/// Outcome of resolving a whole cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub segments: Vec<SegmentResolution>,
}

impl Resolution {
    pub fn warnings(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| s.warning.as_deref())
            .collect()
    }

    pub fn found(&self) -> Vec<&RecordRef> {
        self.segments.iter().flat_map(|s| s.found.iter()).collect()
    }
}

/// Split a cell into lookup specs.
///
/// Key precedence: key in the segment, then `column_key` (from the header),
/// then the operator's default lookup key. Keys are normalized like operator
/// names.
pub fn parse_segments(
    cell: &str,
    operator: &OperatorDescriptor,
    column_key: Option<&str>,
) -> Result<Vec<AssociationLookupSpec>, ResolutionError> {
    cell.split(MULTI_ASSOC_DELIM)
        .filter_map(|segment| parse_segment(segment, operator, column_key).transpose())
        .collect()
}

/// Parse one segment. Blank segments yield `None`.
fn parse_segment(
    segment: &str,
    operator: &OperatorDescriptor,
    column_key: Option<&str>,
) -> Result<Option<AssociationLookupSpec>, ResolutionError> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Ok(None);
    }

    let (explicit_key, rest) = match segment.split_once(NAME_VALUE_DELIM) {
        Some((key, rest)) if !key.trim().is_empty() => (Some(key.trim()), rest),
        Some((_, rest)) => (None, rest),
        None => (None, segment),
    };

    let lookup_key = explicit_key
        .or(column_key)
        .or(operator.default_lookup_key.as_deref())
        .ok_or_else(|| ResolutionError::MissingLookupKey {
            operator: operator.name.clone(),
            segment: segment.to_string(),
        })?;

    let mut lookup_values: Vec<String> = rest
        .split(MULTI_VALUE_DELIM)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();

    if lookup_values.is_empty() {
        return Err(ResolutionError::EmptySegment {
            operator: operator.name.clone(),
            segment: segment.to_string(),
        });
    }

    if let Some(fixed) = &operator.fixed_lookup_value {
        lookup_values.push(fixed.clone());
    }

    Ok(Some(AssociationLookupSpec {
        lookup_key: normalize_name(lookup_key),
        lookup_values,
    }))
}

fn related_class(operator: &OperatorDescriptor) -> Result<&str, ResolutionError> {
    operator
        .related_class
        .as_deref()
        .ok_or_else(|| ResolutionError::NotAssociation(operator.name.clone()))
}

/// Find the records named by one spec.
fn resolve_spec(
    spec: AssociationLookupSpec,
    related_class: &str,
    store: &dyn Store,
) -> Result<SegmentResolution, ResolutionError> {
    let records = store
        .find_all_by(related_class, &spec.lookup_key, &spec.lookup_values)
        .map_err(|e| ResolutionError::Lookup {
            class: related_class.to_string(),
            message: e.to_string(),
        })?;

    Ok(if spec.lookup_values.len() == 1 {
        resolve_single(spec, records)
    } else {
        resolve_many(spec, records)
    })
}

/// Look up every segment of `cell` in the related class.
pub fn resolve(
    operator: &OperatorDescriptor,
    column_key: Option<&str>,
    cell: &str,
    store: &dyn Store,
) -> Result<Resolution, ResolutionError> {
    let related_class = related_class(operator)?;

    let mut resolution = Resolution::default();
    for spec in parse_segments(cell, operator, column_key)? {
        resolution.segments.push(resolve_spec(spec, related_class, store)?);
    }

    Ok(resolution)
}

fn resolve_single(spec: AssociationLookupSpec, records: Vec<Record>) -> SegmentResolution {
    let key = &spec.lookup_values[0];
    let (found, warning) = match records.len() {
        0 => (Vec::new(), Some(format!("Association with key {} NOT found", key))),
        1 => (records.iter().filter_map(Record::reference).collect(), None),
        n => (
            Vec::new(),
            Some(format!("Association with key {} is ambiguous ({} matches)", key, n)),
        ),
    };
    SegmentResolution { spec, found, warning }
}

fn resolve_many(spec: AssociationLookupSpec, records: Vec<Record>) -> SegmentResolution {
    let mut warning = None;

    if records.len() != spec.lookup_values.len() {
        let found_keys: Vec<String> = records
            .iter()
            .filter_map(|r| r.get(&spec.lookup_key))
            .map(|v| v.to_string())
            .collect();
        let missing: Vec<&str> = spec
            .lookup_values
            .iter()
            .filter(|v| !found_keys.contains(v))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warning = Some(format!(
                "Association with key(s) [{}] NOT found",
                missing.join(", ")
            ));
        }
    }

    let found = records.iter().filter_map(Record::reference).collect();
    SegmentResolution { spec, found, warning }
}

/// Resolve `cell` and assign what was found to `record`.
///
/// Segments are parsed, looked up and assigned one at a time, so an error in
/// a later segment keeps what earlier segments assigned. Warnings are attached
/// to the record. Returns the number of segments assigned.
pub fn resolve_and_assign(
    record: &mut Record,
    operator: &OperatorDescriptor,
    column_key: Option<&str>,
    cell: &str,
    store: &dyn Store,
) -> Result<usize, CellError> {
    let related_class = related_class(operator)?;
    let mut assigned = 0;

    for raw in cell.split(MULTI_ASSOC_DELIM) {
        let Some(spec) = parse_segment(raw, operator, column_key)? else {
            continue;
        };
        let segment = resolve_spec(spec, related_class, store)?;

        if let Some(warning) = segment.warning {
            log_warning_indent(format!("{}: {}", operator.name, warning), 1);
            record.add_warning(&operator.name, warning);
        }
        if segment.found.is_empty() {
            continue;
        }
        if coerce::assign(record, operator, Value::Records(segment.found))? != Assignment::Skipped {
            assigned += 1;
        }
    }

    Ok(assigned)
}
