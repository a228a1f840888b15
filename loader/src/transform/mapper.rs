//! Header mapping.
//!
//! Reconciles the free-text headers of a file with the operators of a class.
//! Runs once per file, before any data row, and never touches a record.
//!
//! A header may carry the lookup key of an association: `category:title`
//! maps to the `category` operator and searches categories by `title`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{MappingError, MappingResult};
use crate::logs::{log_info_indent, log_warning};
use crate::registry::{normalize_name, ClassOperators, OperatorDescriptor};

/// Options controlling how strictly headers must map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingOptions {
    /// Fail if any header cannot be mapped
    #[serde(default)]
    pub strict: bool,
    /// Headers skipped entirely
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Operators that must be mapped by some header
    #[serde(default)]
    pub mandatory: Vec<String>,
    /// Unmapped headers still carried through for column handlers
    #[serde(default)]
    pub force_inclusion: Vec<String>,
    /// Carry every header through, takes precedence over `force_inclusion`
    #[serde(default)]
    pub include_all: bool,
}

/// Result of reconciling one header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMapping {
    pub header: String,
    /// Position in the header row
    pub column: usize,
    pub operator: Option<Arc<OperatorDescriptor>>,
    pub mapped: bool,
    /// Unmapped but carried through
    pub forced: bool,
    /// Lookup key named in the header (`operator:key`)
    pub lookup_key: Option<String>,
}

impl HeaderMapping {
    pub fn operator_name(&self) -> Option<&str> {
        self.operator.as_deref().map(|op| op.name.as_str())
    }
}

/// Ordered mappings for a header row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    class: String,
    mappings: Vec<HeaderMapping>,
}

impl ColumnMap {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn mappings(&self) -> &[HeaderMapping] {
        &self.mappings
    }

    /// First mapping for a header, compared after normalization.
    pub fn get(&self, header: &str) -> Option<&HeaderMapping> {
        let wanted = normalize_name(header);
        self.mappings
            .iter()
            .find(|m| m.header == header || normalize_name(&m.header) == wanted)
    }

    /// Names of the mapped operators, in header order.
    pub fn operator_names(&self) -> Vec<&str> {
        self.mappings.iter().filter_map(|m| m.operator_name()).collect()
    }

    pub fn contains_operator(&self, name: &str) -> bool {
        let wanted = normalize_name(name);
        self.operator_names()
            .iter()
            .any(|n| normalize_name(n) == wanted)
    }

    /// Headers with no operator that were not force-included.
    pub fn unmapped_headers(&self) -> Vec<&str> {
        self.mappings
            .iter()
            .filter(|m| !m.mapped && !m.forced)
            .map(|m| m.header.as_str())
            .collect()
    }

    pub fn forced_headers(&self) -> Vec<&str> {
        self.mappings
            .iter()
            .filter(|m| m.forced)
            .map(|m| m.header.as_str())
            .collect()
    }

    /// Mandatory operators with no mapped header.
    pub fn missing_mandatory(&self, mandatory: &[String]) -> Vec<String> {
        mandatory
            .iter()
            .filter(|name| !self.contains_operator(name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Map a header row to the operators of a class.
///
/// Fails with [`MappingError::Definition`] in strict mode when a header has no
/// operator, and with [`MappingError::MissingMandatory`] when a mandatory
/// operator is not covered by any header.
pub fn map_headers(
    headers: &[String],
    operators: &ClassOperators,
    options: &MappingOptions,
) -> MappingResult<ColumnMap> {
    let ignore: HashSet<String> = options.ignore.iter().map(|h| normalize_name(h)).collect();
    let forced: HashSet<String> = options
        .force_inclusion
        .iter()
        .map(|h| normalize_name(h))
        .collect();

    let mut mappings = Vec::with_capacity(headers.len());

    for (column, header) in headers.iter().enumerate() {
        let key = normalize_name(header);
        if key.is_empty() || ignore.contains(&key) {
            continue;
        }

        let (operator, lookup_key) = match_header(header, operators);
        let mapped = operator.is_some();
        let forced = !mapped && (options.include_all || forced.contains(&key));

        mappings.push(HeaderMapping {
            header: header.clone(),
            column,
            operator,
            mapped,
            forced,
            lookup_key,
        });
    }

    let column_map = ColumnMap {
        class: operators.class().to_string(),
        mappings,
    };

    let unmapped: Vec<String> = column_map
        .unmapped_headers()
        .into_iter()
        .map(String::from)
        .collect();
    if !unmapped.is_empty() {
        log_warning(format!(
            "These headings couldn't be mapped to class {}: {}",
            operators.class(),
            unmapped.join(", ")
        ));
        if options.strict {
            return Err(MappingError::Definition {
                class: operators.class().to_string(),
                headers: unmapped,
            });
        }
    }

    let required: Vec<String> = options
        .mandatory
        .iter()
        .filter(|name| !ignore.contains(&normalize_name(name)))
        .cloned()
        .collect();
    let missing = column_map.missing_mandatory(&required);
    if !missing.is_empty() {
        for name in &missing {
            log_info_indent(format!("Mandatory column missing, expected column '{}'", name), 1);
        }
        return Err(MappingError::MissingMandatory {
            class: operators.class().to_string(),
            operators: missing,
        });
    }

    Ok(column_map)
}

/// Find the operator for a header, splitting off an `operator:key` suffix.
fn match_header(
    header: &str,
    operators: &ClassOperators,
) -> (Option<Arc<OperatorDescriptor>>, Option<String>) {
    if let Some(op) = operators.find(header) {
        return (Some(op), None);
    }

    if let Some((name, key)) = header.split_once(':') {
        if let Some(op) = operators.find(name) {
            let key = normalize_name(key);
            let lookup_key = (op.is_association() && !key.is_empty()).then_some(key);
            return (Some(op), lookup_key);
        }
    }

    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldType;

    fn product_operators() -> ClassOperators {
        ClassOperators::new(
            "Product",
            vec![
                OperatorDescriptor::attribute("name", FieldType::String),
                OperatorDescriptor::attribute("price", FieldType::Float),
                OperatorDescriptor::attribute("sku", FieldType::String),
                OperatorDescriptor::association("category", "Category").with_lookup_key("name"),
            ],
        )
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_maps_in_header_order() {
        let map = map_headers(
            &headers(&["Name", "Price", "category:title"]),
            &product_operators(),
            &MappingOptions::default(),
        )
        .unwrap();

        assert_eq!(map.operator_names(), vec!["name", "price", "category"]);
        assert_eq!(map.mappings()[2].lookup_key.as_deref(), Some("title"));
        assert!(map.unmapped_headers().is_empty());
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let ops = product_operators();
        let h = headers(&["name", "weight", "sku"]);
        let first = map_headers(&h, &ops, &MappingOptions::default()).unwrap();
        let second = map_headers(&h, &ops, &MappingOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_strict_keeps_unmapped() {
        let map = map_headers(
            &headers(&["name", "weight"]),
            &product_operators(),
            &MappingOptions::default(),
        )
        .unwrap();

        assert_eq!(map.unmapped_headers(), vec!["weight"]);
        assert!(!map.get("weight").unwrap().mapped);
    }

    #[test]
    fn test_strict_fails_on_unmapped() {
        let options = MappingOptions { strict: true, ..Default::default() };
        let err = map_headers(&headers(&["name", "weight"]), &product_operators(), &options)
            .unwrap_err();

        match err {
            MappingError::Definition { headers, .. } => assert_eq!(headers, vec!["weight"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_strict_allows_ignored_and_forced() {
        let options = MappingOptions {
            strict: true,
            ignore: vec!["notes".into()],
            force_inclusion: vec!["weight".into()],
            ..Default::default()
        };
        let map = map_headers(
            &headers(&["name", "weight", "Notes"]),
            &product_operators(),
            &options,
        )
        .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.forced_headers(), vec!["weight"]);
        assert_eq!(map.mappings()[1].column, 1);
    }

    #[test]
    fn test_include_all_forces_everything() {
        let options = MappingOptions { strict: true, include_all: true, ..Default::default() };
        let map = map_headers(&headers(&["a", "b"]), &product_operators(), &options).unwrap();
        assert_eq!(map.forced_headers(), vec!["a", "b"]);
    }

    #[test]
    fn test_mandatory_missing() {
        let options = MappingOptions { mandatory: vec!["sku".into()], ..Default::default() };
        let err = map_headers(&headers(&["name", "price"]), &product_operators(), &options)
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingMandatory {
                class: "Product".into(),
                operators: vec!["sku".into()],
            }
        );
    }

    #[test]
    fn test_mandatory_present() {
        let options = MappingOptions { mandatory: vec!["sku".into()], ..Default::default() };
        assert!(map_headers(&headers(&["SKU", "name"]), &product_operators(), &options).is_ok());
    }

    #[test]
    fn test_ignored_mandatory_is_not_required() {
        let options = MappingOptions {
            mandatory: vec!["sku".into()],
            ignore: vec!["sku".into()],
            ..Default::default()
        };
        assert!(map_headers(&headers(&["name", "sku"]), &product_operators(), &options).is_ok());
    }

    #[test]
    fn test_attribute_header_key_is_dropped() {
        let map = map_headers(
            &headers(&["price:amount"]),
            &product_operators(),
            &MappingOptions::default(),
        )
        .unwrap();
        assert!(map.mappings()[0].mapped);
        assert!(map.mappings()[0].lookup_key.is_none());
    }

    #[test]
    fn test_header_lookup_key_is_normalized() {
        let map = map_headers(
            &headers(&["Category: Title"]),
            &product_operators(),
            &MappingOptions::default(),
        )
        .unwrap();
        assert_eq!(map.mappings()[0].operator_name(), Some("category"));
        assert_eq!(map.mappings()[0].lookup_key.as_deref(), Some("title"));
    }
}
