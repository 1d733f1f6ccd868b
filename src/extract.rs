//! Derives the query address string for each input row.

use csv::StringRecord;

use crate::config::ColumnMapping;

/// Per-run address extractor with column names pre-resolved to header
/// indices. Extraction itself is a pure function of the record.
#[derive(Debug, Clone)]
pub struct AddressExtractor {
    mode: Mode,
}

#[derive(Debug, Clone)]
enum Mode {
    Single {
        address: Option<usize>,
    },
    Components {
        street: Option<usize>,
        city: Option<usize>,
        state: Option<usize>,
        zip: Option<usize>,
    },
}

fn find_column(headers: &StringRecord, name: Option<&str>) -> Option<usize> {
    let name = name?;
    headers.iter().position(|h| h == name)
}

impl AddressExtractor {
    /// Resolve the configured column names against the input header.
    /// A configured name missing from the header is treated as an absent
    /// component for every row; it does not abort the run.
    pub fn new(mapping: &ColumnMapping, headers: &StringRecord) -> Self {
        let mode = match mapping {
            ColumnMapping::Single { address } => Mode::Single {
                address: find_column(headers, Some(address)),
            },
            ColumnMapping::Components {
                street,
                city,
                state,
                zip,
            } => Mode::Components {
                street: find_column(headers, street.as_deref()),
                city: find_column(headers, city.as_deref()),
                state: find_column(headers, state.as_deref()),
                zip: find_column(headers, zip.as_deref()),
            },
        };
        Self { mode }
    }

    /// Build the query address for one row, or `None` when the row has no
    /// usable address data.
    pub fn extract(&self, record: &StringRecord) -> Option<String> {
        match &self.mode {
            Mode::Single { address } => {
                let value = field(record, *address)?;
                Some(value.to_string())
            }
            Mode::Components {
                street,
                city,
                state,
                zip,
            } => {
                let mut query = String::new();
                for part in [street, city, state].into_iter().filter_map(|c| field(record, *c)) {
                    if !query.is_empty() {
                        query.push_str(", ");
                    }
                    query.push_str(part);
                }
                // Zip attaches to the preceding component with a space,
                // not a comma: "street, city, state zip".
                if let Some(zip) = field(record, *zip) {
                    if !query.is_empty() {
                        query.push(' ');
                    }
                    query.push_str(zip);
                }
                if query.is_empty() {
                    None
                } else {
                    Some(query)
                }
            }
        }
    }
}

/// Trimmed, non-blank field value at a resolved column index.
fn field(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    let value = record.get(index?)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> StringRecord {
        StringRecord::from(vec!["id", "street", "city", "state", "zip", "full"])
    }

    fn components() -> ColumnMapping {
        ColumnMapping::Components {
            street: Some("street".into()),
            city: Some("city".into()),
            state: Some("state".into()),
            zip: Some("zip".into()),
        }
    }

    #[test]
    fn test_single_column() {
        let mapping = ColumnMapping::Single {
            address: "full".into(),
        };
        let extractor = AddressExtractor::new(&mapping, &headers());
        let record = StringRecord::from(vec![
            "1",
            "",
            "",
            "",
            "",
            "  1600 Amphitheatre Pkwy, Mountain View, CA  ",
        ]);
        assert_eq!(
            extractor.extract(&record).as_deref(),
            Some("1600 Amphitheatre Pkwy, Mountain View, CA")
        );
    }

    #[test]
    fn test_single_column_blank_is_invalid() {
        let mapping = ColumnMapping::Single {
            address: "full".into(),
        };
        let extractor = AddressExtractor::new(&mapping, &headers());
        let record = StringRecord::from(vec!["1", "", "", "", "", "   "]);
        assert_eq!(extractor.extract(&record), None);
    }

    #[test]
    fn test_single_column_missing_from_header_is_invalid() {
        let mapping = ColumnMapping::Single {
            address: "nope".into(),
        };
        let extractor = AddressExtractor::new(&mapping, &headers());
        let record = StringRecord::from(vec!["1", "a", "b", "c", "d", "e"]);
        assert_eq!(extractor.extract(&record), None);
    }

    #[test]
    fn test_components_full_order() {
        let extractor = AddressExtractor::new(&components(), &headers());
        let record =
            StringRecord::from(vec!["1", "123 Main St", "Springfield", "IL", "62704", ""]);
        assert_eq!(
            extractor.extract(&record).as_deref(),
            Some("123 Main St, Springfield, IL 62704")
        );
    }

    #[test]
    fn test_components_blank_parts_skipped() {
        let extractor = AddressExtractor::new(&components(), &headers());
        let record = StringRecord::from(vec!["1", "123 Main St", "  ", "IL", "", ""]);
        assert_eq!(extractor.extract(&record).as_deref(), Some("123 Main St, IL"));
    }

    #[test]
    fn test_zip_only() {
        let extractor = AddressExtractor::new(&components(), &headers());
        let record = StringRecord::from(vec!["1", "", "", "", "62704", ""]);
        assert_eq!(extractor.extract(&record).as_deref(), Some("62704"));
    }

    #[test]
    fn test_all_components_blank_is_invalid() {
        let extractor = AddressExtractor::new(&components(), &headers());
        let record = StringRecord::from(vec!["1", "", " ", "", "", ""]);
        assert_eq!(extractor.extract(&record), None);
    }

    #[test]
    fn test_unconfigured_components_skipped() {
        let mapping = ColumnMapping::Components {
            street: None,
            city: Some("city".into()),
            state: None,
            zip: Some("zip".into()),
        };
        let extractor = AddressExtractor::new(&mapping, &headers());
        let record = StringRecord::from(vec!["1", "123 Main St", "Springfield", "IL", "62704", ""]);
        assert_eq!(
            extractor.extract(&record).as_deref(),
            Some("Springfield 62704")
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = AddressExtractor::new(&components(), &headers());
        let record = StringRecord::from(vec!["1", "5 Elm St", "Dover", "DE", "19901", ""]);
        let first = extractor.extract(&record);
        assert_eq!(extractor.extract(&record), first);
    }
}
