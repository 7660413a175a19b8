//! HTML summary rendering and optional PDF conversion
//!
//! Renders one HTML file per account from a user-supplied template by
//! substituting `{{account_id}}`, `{{report_type}}`, `{{date_range}}`, and
//! `{{rows}}` placeholders. There is no templating engine; substitution is
//! literal. When an HTML-to-PDF converter binary is available it is invoked
//! once per rendered file.

use crate::config::ExportConfig;
use crate::db::Database;
use crate::error::{Error, Result, external_tool_error};
use crate::types::{AccountId, FieldValue, ReportEntity, ReportType};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default converter binary searched on the PATH when none is configured
const DEFAULT_PDF_TOOL: &str = "wkhtmltopdf";

/// Renders per-account HTML summaries from persisted entities
pub struct SummaryExporter {
    db: Arc<Database>,
    pdf_tool: Option<PathBuf>,
}

impl SummaryExporter {
    /// Create an exporter; resolves the PDF converter binary up front
    ///
    /// A configured path wins; otherwise the PATH is searched. PDF conversion
    /// is silently skipped when neither yields a binary.
    pub fn new(db: Arc<Database>, export: &ExportConfig) -> Self {
        let pdf_tool = export
            .pdf_tool_path
            .clone()
            .or_else(|| which::which(DEFAULT_PDF_TOOL).ok());

        if pdf_tool.is_none() {
            tracing::warn!(
                "No HTML-to-PDF converter found; writing HTML summaries only"
            );
        }

        Self { db, pdf_tool }
    }

    /// Render one summary file per account and return the written paths
    ///
    /// Accounts with no persisted entities in the range still get a file so
    /// the output directory mirrors the account list.
    pub async fn export(
        &self,
        template_path: &Path,
        out_dir: &Path,
        accounts: &[AccountId],
        report_type: ReportType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PathBuf>> {
        let template = tokio::fs::read_to_string(template_path).await.map_err(|e| {
            Error::config(
                "template",
                format!("cannot read template {}: {e}", template_path.display()),
            )
        })?;
        tokio::fs::create_dir_all(out_dir).await?;

        let mut written = Vec::with_capacity(accounts.len());
        for account_id in accounts {
            let entities = self
                .db
                .query_entities(report_type, *account_id, from, to)
                .await?;

            let html = render_html(&template, *account_id, report_type, from, to, &entities);
            let html_path = out_dir.join(format!("report_{}_{}_{}.html", account_id, from, to));
            tokio::fs::write(&html_path, html).await?;

            tracing::info!(
                account = %account_id,
                rows = entities.len(),
                path = %html_path.display(),
                "Wrote HTML summary"
            );
            written.push(html_path.clone());

            if let Some(tool) = &self.pdf_tool {
                written.push(convert_to_pdf(tool, &html_path).await?);
            }
        }
        Ok(written)
    }
}

/// Substitute the template placeholders for one account's entities
fn render_html(
    template: &str,
    account_id: AccountId,
    report_type: ReportType,
    from: NaiveDate,
    to: NaiveDate,
    entities: &[ReportEntity],
) -> String {
    let mut rows = String::new();
    for entity in entities {
        rows.push_str("<tr>");
        let day = entity
            .day
            .map(|d| d.to_string())
            .unwrap_or_default();
        rows.push_str(&format!("<td>{}</td>", escape_html(&day)));
        rows.push_str(&format!("<td>{}</td>", escape_html(&entity.dimension_key)));
        for value in entity.fields.values() {
            rows.push_str(&format!("<td>{}</td>", render_value(value)));
        }
        rows.push_str("</tr>\n");
    }

    template
        .replace("{{account_id}}", &account_id.to_string())
        .replace("{{report_type}}", report_type.as_str())
        .replace("{{date_range}}", &format!("{from} - {to}"))
        .replace("{{rows}}", &rows)
}

/// Render one field value as cell text
fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Long(v) => v.to_string(),
        FieldValue::Text(v) => escape_html(v),
        FieldValue::Money(micros) => format!("{:.2}", *micros as f64 / 1_000_000.0),
        FieldValue::Date(v) => v.to_string(),
        FieldValue::Flag(v) => v.to_string(),
    }
}

/// Minimal HTML escaping for text cells
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Invoke the converter as `<tool> <input.html> <output.pdf>`
async fn convert_to_pdf(tool: &Path, html_path: &Path) -> Result<PathBuf> {
    let pdf_path = html_path.with_extension("pdf");

    let output = tokio::process::Command::new(tool)
        .arg(html_path)
        .arg(&pdf_path)
        .output()
        .await
        .map_err(|e| external_tool_error(tool, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(external_tool_error(
            tool,
            format!("exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    tracing::info!(path = %pdf_path.display(), "Converted summary to PDF");
    Ok(pdf_path)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const TEMPLATE: &str = "<html><body>\
<h1>Account {{account_id}} - {{report_type}}</h1>\
<p>{{date_range}}</p>\
<table>{{rows}}</table>\
</body></html>";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn account_entity(account: i64, day: NaiveDate, name: &str) -> ReportEntity {
        let mut fields = BTreeMap::new();
        fields.insert("account_name".to_string(), FieldValue::Text(name.to_string()));
        fields.insert("clicks".to_string(), FieldValue::Long(7));
        fields.insert("cost".to_string(), FieldValue::Money(1_500_000));
        ReportEntity {
            account_id: AccountId(account),
            report_type: ReportType::AccountPerformanceReport,
            dimension_key: account.to_string(),
            day: Some(day),
            fields,
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        let entities = vec![account_entity(123, d(2013, 1, 15), "Acme")];
        let html = render_html(
            TEMPLATE,
            AccountId(123),
            ReportType::AccountPerformanceReport,
            d(2013, 1, 1),
            d(2013, 1, 31),
            &entities,
        );

        assert!(html.contains("Account 123 - ACCOUNT_PERFORMANCE_REPORT"));
        assert!(html.contains("2013-01-01 - 2013-01-31"));
        assert!(html.contains("<td>2013-01-15</td>"));
        assert!(html.contains("<td>Acme</td>"));
        assert!(html.contains("<td>7</td>"));
        // Money renders in currency units, not micros
        assert!(html.contains("<td>1.50</td>"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn text_cells_are_escaped() {
        let entities = vec![account_entity(1, d(2013, 1, 15), "<script>alert(1)</script>")];
        let html = render_html(
            TEMPLATE,
            AccountId(1),
            ReportType::AccountPerformanceReport,
            d(2013, 1, 1),
            d(2013, 1, 31),
            &entities,
        );
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn export_writes_one_file_per_account() {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(db_file.path()).await.unwrap());
        db.upsert_entities(&[account_entity(1, d(2013, 1, 15), "Acme")])
            .await
            .unwrap();

        let dir = TempDir::new().unwrap();
        let template_path = dir.path().join("template.html");
        tokio::fs::write(&template_path, TEMPLATE).await.unwrap();
        let out_dir = dir.path().join("out");

        // Force HTML-only output regardless of what is installed
        let exporter = SummaryExporter {
            db,
            pdf_tool: None,
        };
        let written = exporter
            .export(
                &template_path,
                &out_dir,
                &[AccountId(1), AccountId(2)],
                ReportType::AccountPerformanceReport,
                d(2013, 1, 1),
                d(2013, 1, 31),
            )
            .await
            .unwrap();

        assert_eq!(written.len(), 2);
        let first = tokio::fs::read_to_string(&written[0]).await.unwrap();
        assert!(first.contains("Acme"));
        // Account 2 has no data but still gets an empty summary
        let second = tokio::fs::read_to_string(&written[1]).await.unwrap();
        assert!(second.contains("Account 2"));
        assert!(second.contains("<table></table>"));
    }

    #[tokio::test]
    async fn missing_template_is_a_config_error() {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(db_file.path()).await.unwrap());
        let dir = TempDir::new().unwrap();

        let exporter = SummaryExporter {
            db,
            pdf_tool: None,
        };
        let err = exporter
            .export(
                &dir.path().join("no-such-template.html"),
                dir.path(),
                &[AccountId(1)],
                ReportType::AccountPerformanceReport,
                d(2013, 1, 1),
                d(2013, 1, 31),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn converter_is_invoked_per_rendered_file() {
        use std::os::unix::fs::PermissionsExt;

        let db_file = tempfile::NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(db_file.path()).await.unwrap());
        db.upsert_entities(&[account_entity(1, d(2013, 1, 15), "Acme")])
            .await
            .unwrap();

        let dir = TempDir::new().unwrap();
        let template_path = dir.path().join("template.html");
        tokio::fs::write(&template_path, TEMPLATE).await.unwrap();

        // Stand-in converter: copies input to output
        let tool = dir.path().join("fake-pdf-tool.sh");
        tokio::fs::write(&tool, "#!/bin/sh\ncp \"$1\" \"$2\"\n")
            .await
            .unwrap();
        tokio::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755))
            .await
            .unwrap();

        let exporter = SummaryExporter {
            db,
            pdf_tool: Some(tool),
        };
        let written = exporter
            .export(
                &template_path,
                &dir.path().join("out"),
                &[AccountId(1)],
                ReportType::AccountPerformanceReport,
                d(2013, 1, 1),
                d(2013, 1, 31),
            )
            .await
            .unwrap();

        assert_eq!(written.len(), 2);
        assert!(written[1].extension().is_some_and(|e| e == "pdf"));
        assert!(tokio::fs::try_exists(&written[1]).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_converter_surfaces_an_external_tool_error() {
        use std::os::unix::fs::PermissionsExt;

        let db_file = tempfile::NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(db_file.path()).await.unwrap());

        let dir = TempDir::new().unwrap();
        let template_path = dir.path().join("template.html");
        tokio::fs::write(&template_path, TEMPLATE).await.unwrap();

        let tool = dir.path().join("broken-tool.sh");
        tokio::fs::write(&tool, "#!/bin/sh\necho boom >&2\nexit 1\n")
            .await
            .unwrap();
        tokio::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755))
            .await
            .unwrap();

        let exporter = SummaryExporter {
            db,
            pdf_tool: Some(tool),
        };
        let err = exporter
            .export(
                &template_path,
                &dir.path().join("out"),
                &[AccountId(1)],
                ReportType::AccountPerformanceReport,
                d(2013, 1, 1),
                d(2013, 1, 31),
            )
            .await
            .unwrap_err();
        match err {
            Error::ExternalTool(message) => assert!(message.contains("boom")),
            other => panic!("expected ExternalTool error, got {other:?}"),
        }
    }
}
