//! Static property-to-column mapping tables, one per report type
//!
//! Each report type declares an explicit table of
//! `property -> (column, type, required, key)` entries built at compile time.
//! The mapper walks these tables; nothing is derived at run time from the
//! entity shape.

use crate::types::{DateRange, ReportDefinition, ReportType};

/// Declared type of one mapped field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// 64-bit integer (identifiers, counts); locale-invariant base-10
    Long,
    /// Text passed through as-is (including enumerated values like match types)
    Text,
    /// Monetary amount reported in micro-units
    Money,
    /// Calendar date in the report's fixed format
    Date,
    /// Boolean parsed from a fixed yes/no vocabulary
    Flag,
}

impl FieldType {
    /// Short name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Long => "integer",
            FieldType::Text => "text",
            FieldType::Money => "money amount",
            FieldType::Date => "date",
            FieldType::Flag => "flag",
        }
    }
}

/// One entry of a report schema: binds a property name to a CSV column
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    /// Property name on the mapped entity
    pub property: &'static str,
    /// CSV column header the value is read from
    pub column: &'static str,
    /// Declared value type
    pub ty: FieldType,
    /// Required columns must be present and non-empty or mapping fails
    pub required: bool,
    /// Key fields compose the entity's dimension key, in table order
    pub key: bool,
}

const fn field(
    property: &'static str,
    column: &'static str,
    ty: FieldType,
    required: bool,
    key: bool,
) -> FieldSpec {
    FieldSpec {
        property,
        column,
        ty,
        required,
        key,
    }
}

/// The complete declared mapping for one report type
#[derive(Clone, Copy, Debug)]
pub struct ReportSchema {
    /// The report type this schema maps
    pub report_type: ReportType,
    /// Property that carries the entity's calendar day, if the report is dated
    pub date_property: Option<&'static str>,
    /// The ordered field table
    pub fields: &'static [FieldSpec],
}

const ACCOUNT_PERFORMANCE: ReportSchema = ReportSchema {
    report_type: ReportType::AccountPerformanceReport,
    date_property: Some("day"),
    fields: &[
        field("account_id", "ExternalCustomerId", FieldType::Long, true, true),
        field("account_name", "AccountDescriptiveName", FieldType::Text, false, false),
        field("day", "Date", FieldType::Date, true, false),
        field("impressions", "Impressions", FieldType::Long, true, false),
        field("clicks", "Clicks", FieldType::Long, true, false),
        field("cost", "Cost", FieldType::Money, true, false),
    ],
};

const CAMPAIGN_PERFORMANCE: ReportSchema = ReportSchema {
    report_type: ReportType::CampaignPerformanceReport,
    date_property: Some("day"),
    fields: &[
        field("account_id", "ExternalCustomerId", FieldType::Long, true, false),
        field("campaign_id", "CampaignId", FieldType::Long, true, true),
        field("campaign_name", "CampaignName", FieldType::Text, false, false),
        field("status", "CampaignStatus", FieldType::Text, false, false),
        field("day", "Date", FieldType::Date, true, false),
        field("impressions", "Impressions", FieldType::Long, true, false),
        field("clicks", "Clicks", FieldType::Long, true, false),
        field("cost", "Cost", FieldType::Money, true, false),
    ],
};

const KEYWORD_PERFORMANCE: ReportSchema = ReportSchema {
    report_type: ReportType::KeywordPerformanceReport,
    date_property: Some("day"),
    fields: &[
        field("account_id", "ExternalCustomerId", FieldType::Long, true, false),
        field("campaign_id", "CampaignId", FieldType::Long, true, true),
        field("ad_group_id", "AdGroupId", FieldType::Long, true, true),
        field("keyword_id", "Id", FieldType::Long, true, true),
        field("keyword_text", "KeywordText", FieldType::Text, false, false),
        field("match_type", "KeywordMatchType", FieldType::Text, true, false),
        field("is_negative", "IsNegative", FieldType::Flag, false, false),
        field("day", "Date", FieldType::Date, true, false),
        field("impressions", "Impressions", FieldType::Long, true, false),
        field("clicks", "Clicks", FieldType::Long, true, false),
        field("cost", "Cost", FieldType::Money, true, false),
    ],
};

const CAMPAIGN_NEGATIVE_KEYWORDS: ReportSchema = ReportSchema {
    report_type: ReportType::CampaignNegativeKeywordsReport,
    // Structural report: rows describe campaign configuration, not daily data
    date_property: None,
    fields: &[
        field("campaign_id", "CampaignId", FieldType::Long, true, true),
        field("keyword_id", "Id", FieldType::Long, true, true),
        field("match_type", "KeywordMatchType", FieldType::Text, true, false),
        field("keyword_text", "KeywordText", FieldType::Text, true, false),
        field("is_negative", "IsNegative", FieldType::Flag, true, false),
    ],
};

impl ReportSchema {
    /// The schema table for a report type
    pub fn for_type(report_type: ReportType) -> &'static ReportSchema {
        match report_type {
            ReportType::AccountPerformanceReport => &ACCOUNT_PERFORMANCE,
            ReportType::CampaignPerformanceReport => &CAMPAIGN_PERFORMANCE,
            ReportType::KeywordPerformanceReport => &KEYWORD_PERFORMANCE,
            ReportType::CampaignNegativeKeywordsReport => &CAMPAIGN_NEGATIVE_KEYWORDS,
        }
    }

    /// Look up a field spec by property name
    pub fn field(&self, property: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.property == property)
    }

    /// Key fields in declaration order
    pub fn key_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().filter(|f| f.key)
    }

    /// Build the report definition requesting exactly this schema's columns
    pub fn definition(&self, date_range: DateRange) -> ReportDefinition {
        ReportDefinition {
            report_type: self.report_type,
            date_range,
            columns: self.fields.iter().map(|f| f.column).collect(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelativeRange;

    #[test]
    fn every_report_type_has_a_schema() {
        for rt in ReportType::all() {
            let schema = ReportSchema::for_type(*rt);
            assert_eq!(schema.report_type, *rt);
            assert!(!schema.fields.is_empty());
            assert!(
                schema.key_fields().count() >= 1,
                "{rt} needs at least one key field for the natural key"
            );
        }
    }

    #[test]
    fn date_property_is_declared_and_typed_as_date() {
        for rt in ReportType::all() {
            let schema = ReportSchema::for_type(*rt);
            if let Some(prop) = schema.date_property {
                let spec = schema.field(prop).expect("date property must be in the table");
                assert_eq!(spec.ty, FieldType::Date);
                assert!(spec.required, "a dated report's date column is required");
            }
        }
    }

    #[test]
    fn properties_and_columns_are_unique_within_a_schema() {
        for rt in ReportType::all() {
            let schema = ReportSchema::for_type(*rt);
            for (i, a) in schema.fields.iter().enumerate() {
                for b in &schema.fields[i + 1..] {
                    assert_ne!(a.property, b.property, "{rt}: duplicate property");
                    assert_ne!(a.column, b.column, "{rt}: duplicate column");
                }
            }
        }
    }

    #[test]
    fn definition_requests_columns_in_table_order() {
        let schema = ReportSchema::for_type(ReportType::CampaignNegativeKeywordsReport);
        let def = schema.definition(DateRange::Relative(RelativeRange::Yesterday));
        assert_eq!(
            def.columns,
            vec!["CampaignId", "Id", "KeywordMatchType", "KeywordText", "IsNegative"]
        );
        assert_eq!(def.report_type, ReportType::CampaignNegativeKeywordsReport);
    }
}
