//! Code tables for the numeric fields of a DSC call.
//!
//! Each table maps a three-digit code to a human-readable description.
//! Lookups never fail: a code that is not in the table resolves to itself.

use std::collections::HashMap;

/// Distress nature codes (`Nature=` field).
const NATURE_CODES: &[(&str, &str)] = &[
    ("100", "Fire, explosion"),
    ("101", "Flooding"),
    ("102", "Colision"),
    ("103", "Grounding"),
    ("104", "Listing, capsizing"),
    ("105", "Sinking"),
    ("106", "Disable and adrift"),
    ("107", "Undesined distress"),
    ("108", "Abandoning ship"),
    ("112", "EPIRB emision"),
];

/// End-of-sequence codes (`Eos=` field).
const END_OF_SEQUENCE_CODES: &[(&str, &str)] = &[
    ("117", "RQ Acknowledge required"),
    ("122", "BQ Acknowledge respond"),
    ("127", "Other calls"),
];

/// Call category codes (`Cat=` field).
const CATEGORY_CODES: &[(&str, &str)] = &[
    ("100", "Routine call"),
    ("106", "Ship's interests"),
    ("108", "Safety"),
    ("110", "Urgency"),
    ("112", "Danger (alarm)"),
];

/// An immutable `code -> description` mapping.
#[derive(Debug, Clone)]
pub struct CodeTable {
    name: &'static str,
    entries: HashMap<&'static str, &'static str>,
}

impl CodeTable {
    /// Build a table from static entries.
    pub fn from_entries(name: &'static str, entries: &[(&'static str, &'static str)]) -> Self {
        Self {
            name,
            entries: entries.iter().copied().collect(),
        }
    }

    /// Table name, used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolve a code to its description.
    ///
    /// Unknown codes are returned unchanged.
    pub fn resolve<'a>(&self, code: &'a str) -> &'a str {
        match self.entries.get(code) {
            Some(description) => *description,
            None => code,
        }
    }

    /// Whether the table knows this code.
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three code tables consulted by the field tokenizer.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct CodeTables {
    pub nature: CodeTable,
    pub end_of_sequence: CodeTable,
    pub category: CodeTable,
}

impl CodeTables {
    pub fn new() -> Self {
        Self {
            nature: CodeTable::from_entries("nature", NATURE_CODES),
            end_of_sequence: CodeTable::from_entries("eos", END_OF_SEQUENCE_CODES),
            category: CodeTable::from_entries("category", CATEGORY_CODES),
        }
    }
}

impl Default for CodeTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nature_lookup() {
        let tables = CodeTables::new();
        assert_eq!(tables.nature.resolve("100"), "Fire, explosion");
        assert_eq!(tables.nature.resolve("112"), "EPIRB emision");
        assert_eq!(tables.nature.resolve("999"), "999");
    }

    #[test]
    fn test_end_of_sequence_lookup() {
        let tables = CodeTables::new();
        assert_eq!(tables.end_of_sequence.resolve("117"), "RQ Acknowledge required");
        assert_eq!(tables.end_of_sequence.resolve("122"), "BQ Acknowledge respond");
        assert_eq!(tables.end_of_sequence.resolve("127"), "Other calls");
        assert_eq!(tables.end_of_sequence.resolve("100"), "100");
    }

    #[test]
    fn test_category_lookup() {
        let tables = CodeTables::new();
        assert_eq!(tables.category.resolve("112"), "Danger (alarm)");
        assert_eq!(tables.category.resolve("100"), "Routine call");
        // Position strings are not category codes
        assert_eq!(tables.category.resolve("5325.71N,01433.82E"), "5325.71N,01433.82E");
    }

    #[test]
    fn test_table_sizes() {
        let tables = CodeTables::new();
        assert_eq!(tables.nature.len(), 10);
        assert_eq!(tables.end_of_sequence.len(), 3);
        assert_eq!(tables.category.len(), 5);
        assert!(tables.nature.contains("105"));
        assert!(!tables.nature.contains("109"));
    }

    proptest! {
        #[test]
        fn prop_resolve_is_stable(code in "[0-9]{1,4}") {
            let tables = CodeTables::new();
            for table in [&tables.nature, &tables.end_of_sequence, &tables.category] {
                let first = table.resolve(&code);
                prop_assert_eq!(first, table.resolve(&code));
                if !table.contains(&code) {
                    prop_assert_eq!(first, code.as_str());
                }
            }
        }
    }
}
