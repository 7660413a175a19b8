//! CSV row mapper: delimited text rows -> typed report entities
//!
//! The column-name-to-index lookup is built once per report from the header
//! line and reused for every row. Coercion follows the declared field types in
//! the report schema; failures carry the row index, column name, and raw value
//! so the orchestrator can decide between skip-and-continue and abort.

use crate::error::MappingError;
use crate::schema::{FieldSpec, FieldType, ReportSchema};
use crate::types::{AccountId, FieldValue, ReportEntity};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Fixed date format expected in report payloads
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Vendor reports close with a summary line whose first field is this marker
const SUMMARY_ROW_MARKER: &str = "Total";

/// Column-name -> index lookup, built once per report from the header line
#[derive(Clone, Debug)]
pub struct HeaderIndex {
    indexes: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Build the lookup from an already-decoded header record
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let indexes = columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c.as_ref().trim().to_string(), i))
            .collect();
        Self { indexes }
    }

    /// Decode a raw header line and build the lookup
    pub fn parse(line: &str) -> Result<Self, MappingError> {
        // The header precedes data row 1
        let record = parse_record(line, 0)?;
        Ok(Self::new(record.iter()))
    }

    /// Index of a column by name
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.indexes.get(column).copied()
    }

    /// Verify every required column of the schema is present
    ///
    /// Called once per report so a missing column fails fast instead of on
    /// every row.
    pub fn check_required(&self, schema: &ReportSchema) -> Result<(), MappingError> {
        for spec in schema.fields.iter().filter(|f| f.required) {
            if self.index_of(spec.column).is_none() {
                return Err(MappingError::MissingColumn {
                    column: spec.column.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Decode one delimited line into a CSV record
///
/// Report rows are line-delimited; quoted fields never span lines in vendor
/// payloads, so each line decodes independently.
pub fn parse_record(line: &str, row: usize) -> Result<csv::StringRecord, MappingError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    let got = reader
        .read_record(&mut record)
        .map_err(|e| MappingError::MalformedRecord {
            row,
            message: e.to_string(),
        })?;
    if !got {
        record.clear();
    }
    Ok(record)
}

/// True for the trailing summary line appended by the report service
pub fn is_summary_row(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .map(|f| f.trim() == SUMMARY_ROW_MARKER)
        .unwrap_or(false)
}

/// Map one decoded row to a typed entity
///
/// `account_id` is the account the report was downloaded for; it keys the
/// entity even when the report payload carries no account column.
pub fn map_row(
    schema: &ReportSchema,
    header: &HeaderIndex,
    row: usize,
    record: &csv::StringRecord,
    account_id: AccountId,
) -> Result<ReportEntity, MappingError> {
    let mut fields: BTreeMap<String, FieldValue> = BTreeMap::new();

    for spec in schema.fields {
        let raw = header
            .index_of(spec.column)
            .and_then(|i| record.get(i))
            .map(str::trim);

        match raw {
            None if spec.required => {
                return Err(MappingError::MissingColumn {
                    column: spec.column.to_string(),
                });
            }
            None | Some("") => {
                if spec.required {
                    return Err(MappingError::InvalidValue {
                        row,
                        column: spec.column.to_string(),
                        value: String::new(),
                        expected: spec.ty.name(),
                    });
                }
                if let Some(zero) = zero_value(spec.ty) {
                    fields.insert(spec.property.to_string(), zero);
                }
            }
            Some(raw) => {
                let value = coerce(spec, raw, row)?;
                fields.insert(spec.property.to_string(), value);
            }
        }
    }

    let day = schema
        .date_property
        .and_then(|prop| fields.get(prop))
        .and_then(FieldValue::as_date);

    let dimension_key = dimension_key(schema, &fields);

    Ok(ReportEntity {
        account_id,
        report_type: schema.report_type,
        dimension_key,
        day,
        fields,
    })
}

/// Join the schema's key-field values, in table order, into the dimension key
fn dimension_key(schema: &ReportSchema, fields: &BTreeMap<String, FieldValue>) -> String {
    schema
        .key_fields()
        .map(|spec| match fields.get(spec.property) {
            Some(FieldValue::Long(v)) => v.to_string(),
            Some(FieldValue::Text(v)) => v.clone(),
            Some(FieldValue::Money(v)) => v.to_string(),
            Some(FieldValue::Date(v)) => v.format(DATE_FORMAT).to_string(),
            Some(FieldValue::Flag(v)) => v.to_string(),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Coerce one raw string to the declared field type
fn coerce(spec: &FieldSpec, raw: &str, row: usize) -> Result<FieldValue, MappingError> {
    let invalid = || MappingError::InvalidValue {
        row,
        column: spec.column.to_string(),
        value: raw.to_string(),
        expected: spec.ty.name(),
    };

    match spec.ty {
        FieldType::Long => raw.parse::<i64>().map(FieldValue::Long).map_err(|_| invalid()),
        FieldType::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldType::Money => raw.parse::<i64>().map(FieldValue::Money).map_err(|_| invalid()),
        FieldType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(FieldValue::Date)
            .map_err(|_| MappingError::DateFormat {
                row,
                column: spec.column.to_string(),
                value: raw.to_string(),
                format: DATE_FORMAT,
            }),
        FieldType::Flag => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(FieldValue::Flag(true)),
            "false" | "no" | "0" => Ok(FieldValue::Flag(false)),
            _ => Err(invalid()),
        },
    }
}

/// The zero value an optional absent field falls back to
///
/// Dates have no meaningful zero; an absent optional date is simply omitted.
fn zero_value(ty: FieldType) -> Option<FieldValue> {
    match ty {
        FieldType::Long => Some(FieldValue::Long(0)),
        FieldType::Text => Some(FieldValue::Text(String::new())),
        FieldType::Money => Some(FieldValue::Money(0)),
        FieldType::Flag => Some(FieldValue::Flag(false)),
        FieldType::Date => None,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReportType;

    fn negative_keywords() -> &'static ReportSchema {
        ReportSchema::for_type(ReportType::CampaignNegativeKeywordsReport)
    }

    fn keyword_performance() -> &'static ReportSchema {
        ReportSchema::for_type(ReportType::KeywordPerformanceReport)
    }

    fn record(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn maps_negative_keyword_row_to_typed_entity() {
        let schema = negative_keywords();
        let header = HeaderIndex::new([
            "CampaignId",
            "Id",
            "KeywordMatchType",
            "KeywordText",
            "IsNegative",
        ]);
        header.check_required(schema).unwrap();

        let row = record(&["116981433", "11533780", "Broad", "gratuite", "true"]);
        let entity = map_row(schema, &header, 1, &row, AccountId(777)).unwrap();

        assert_eq!(entity.get("campaign_id").unwrap().as_long(), Some(116981433));
        assert_eq!(entity.get("keyword_id").unwrap().as_long(), Some(11533780));
        assert_eq!(entity.get("match_type").unwrap().as_text(), Some("Broad"));
        assert_eq!(entity.get("keyword_text").unwrap().as_text(), Some("gratuite"));
        assert_eq!(entity.get("is_negative").unwrap().as_flag(), Some(true));
        assert_eq!(entity.account_id, AccountId(777));
        assert_eq!(entity.dimension_key, "116981433:11533780");
        assert_eq!(entity.day, None);
    }

    #[test]
    fn header_order_does_not_matter() {
        let schema = negative_keywords();
        let header = HeaderIndex::new([
            "IsNegative",
            "KeywordText",
            "Id",
            "CampaignId",
            "KeywordMatchType",
        ]);
        let row = record(&["true", "gratuite", "11533780", "116981433", "Broad"]);
        let entity = map_row(schema, &header, 1, &row, AccountId(1)).unwrap();

        assert_eq!(entity.get("campaign_id").unwrap().as_long(), Some(116981433));
        assert_eq!(entity.get("keyword_text").unwrap().as_text(), Some("gratuite"));
    }

    #[test]
    fn missing_required_column_names_the_column() {
        let schema = negative_keywords();
        let header = HeaderIndex::new(["Id", "KeywordMatchType", "KeywordText", "IsNegative"]);

        let err = header.check_required(schema).unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingColumn {
                column: "CampaignId".to_string()
            }
        );

        // map_row reports the same failure when called directly
        let row = record(&["11533780", "Broad", "gratuite", "true"]);
        let err = map_row(schema, &header, 3, &row, AccountId(1)).unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingColumn {
                column: "CampaignId".to_string()
            }
        );
    }

    #[test]
    fn bad_integer_reports_row_column_and_value() {
        let schema = negative_keywords();
        let header = HeaderIndex::new([
            "CampaignId",
            "Id",
            "KeywordMatchType",
            "KeywordText",
            "IsNegative",
        ]);
        let row = record(&["not-a-number", "11533780", "Broad", "gratuite", "true"]);

        let err = map_row(schema, &header, 7, &row, AccountId(1)).unwrap_err();
        assert_eq!(
            err,
            MappingError::InvalidValue {
                row: 7,
                column: "CampaignId".to_string(),
                value: "not-a-number".to_string(),
                expected: "integer",
            }
        );
    }

    #[test]
    fn bad_date_reports_expected_format() {
        let schema = keyword_performance();
        let header = HeaderIndex::new([
            "ExternalCustomerId",
            "CampaignId",
            "AdGroupId",
            "Id",
            "KeywordText",
            "KeywordMatchType",
            "IsNegative",
            "Date",
            "Impressions",
            "Clicks",
            "Cost",
        ]);
        let row = record(&[
            "42", "1", "2", "3", "shoes", "Exact", "false", "01/15/2013", "100", "7", "1420000",
        ]);

        let err = map_row(schema, &header, 1, &row, AccountId(42)).unwrap_err();
        assert!(matches!(
            err,
            MappingError::DateFormat { row: 1, ref column, .. } if column == "Date"
        ));
    }

    #[test]
    fn maps_dated_keyword_row_with_money_micros() {
        let schema = keyword_performance();
        let header = HeaderIndex::new([
            "ExternalCustomerId",
            "CampaignId",
            "AdGroupId",
            "Id",
            "KeywordText",
            "KeywordMatchType",
            "IsNegative",
            "Date",
            "Impressions",
            "Clicks",
            "Cost",
        ]);
        let row = record(&[
            "42", "1", "2", "3", "shoes", "Exact", "false", "2013-01-15", "100", "7", "1420000",
        ]);

        let entity = map_row(schema, &header, 1, &row, AccountId(42)).unwrap();
        assert_eq!(entity.day, NaiveDate::from_ymd_opt(2013, 1, 15));
        assert_eq!(entity.dimension_key, "1:2:3");
        assert_eq!(entity.get("cost").unwrap(), &FieldValue::Money(1_420_000));
        assert!((entity.get("cost").unwrap().as_money_units().unwrap() - 1.42).abs() < 1e-9);
        // Match types stay enumerated text, not booleans
        assert_eq!(entity.get("match_type").unwrap().as_text(), Some("Exact"));
    }

    #[test]
    fn optional_absent_column_falls_back_to_zero_value() {
        let schema = keyword_performance();
        // IsNegative and KeywordText omitted entirely from the header
        let header = HeaderIndex::new([
            "ExternalCustomerId",
            "CampaignId",
            "AdGroupId",
            "Id",
            "KeywordMatchType",
            "Date",
            "Impressions",
            "Clicks",
            "Cost",
        ]);
        let row = record(&[
            "42", "1", "2", "3", "Broad", "2013-01-15", "100", "7", "1420000",
        ]);

        let entity = map_row(schema, &header, 1, &row, AccountId(42)).unwrap();
        assert_eq!(entity.get("is_negative").unwrap().as_flag(), Some(false));
        assert_eq!(entity.get("keyword_text").unwrap().as_text(), Some(""));
    }

    #[test]
    fn required_empty_value_fails() {
        let schema = negative_keywords();
        let header = HeaderIndex::new([
            "CampaignId",
            "Id",
            "KeywordMatchType",
            "KeywordText",
            "IsNegative",
        ]);
        let row = record(&["", "11533780", "Broad", "gratuite", "true"]);

        let err = map_row(schema, &header, 1, &row, AccountId(1)).unwrap_err();
        assert!(matches!(
            err,
            MappingError::InvalidValue { ref column, ref value, .. }
                if column == "CampaignId" && value.is_empty()
        ));
    }

    #[test]
    fn flag_vocabulary_is_fixed() {
        let schema = negative_keywords();
        let header = HeaderIndex::new([
            "CampaignId",
            "Id",
            "KeywordMatchType",
            "KeywordText",
            "IsNegative",
        ]);

        for (raw, expected) in [("TRUE", true), ("yes", true), ("1", true), ("No", false), ("0", false)] {
            let row = record(&["1", "2", "Broad", "kw", raw]);
            let entity = map_row(schema, &header, 1, &row, AccountId(1)).unwrap();
            assert_eq!(entity.get("is_negative").unwrap().as_flag(), Some(expected), "raw={raw}");
        }

        let row = record(&["1", "2", "Broad", "kw", "maybe"]);
        assert!(map_row(schema, &header, 1, &row, AccountId(1)).is_err());
    }

    #[test]
    fn quoted_fields_with_delimiters_decode_correctly() {
        let line = r#"1,2,Broad,"chaussures, pas cher",true"#;
        let record = parse_record(line, 1).unwrap();
        assert_eq!(record.get(3), Some("chaussures, pas cher"));

        let schema = negative_keywords();
        let header = HeaderIndex::new([
            "CampaignId",
            "Id",
            "KeywordMatchType",
            "KeywordText",
            "IsNegative",
        ]);
        let entity = map_row(schema, &header, 1, &record, AccountId(1)).unwrap();
        assert_eq!(
            entity.get("keyword_text").unwrap().as_text(),
            Some("chaussures, pas cher")
        );
    }

    #[test]
    fn summary_row_is_detected() {
        assert!(is_summary_row(&record(&["Total", "", "", "", "123"])));
        assert!(!is_summary_row(&record(&["116981433", "1", "Broad", "kw", "true"])));
        assert!(!is_summary_row(&csv::StringRecord::new()));
    }
}
