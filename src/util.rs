//! Small input-parsing helpers for the CLI surface.

use crate::error::{Error, Result};
use crate::types::AccountId;
use chrono::NaiveDate;
use std::path::Path;

/// Compact date format used by the CLI flags
const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Parse a `YYYYMMDD` date as passed on the command line
pub fn parse_compact_date(flag: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, COMPACT_DATE_FORMAT)
        .map_err(|_| Error::config(flag, format!("invalid date '{value}', expected YYYYMMDD")))
}

/// Parse account ids from file contents
///
/// One id per line. Dashes are tolerated (ids are often written
/// `123-456-7890`), blank lines and `#` comments are skipped.
pub fn parse_account_ids(contents: &str) -> Result<Vec<AccountId>> {
    let mut ids = Vec::new();
    for (line_number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let digits: String = line.chars().filter(|c| *c != '-').collect();
        let id = digits.parse::<i64>().map_err(|_| {
            Error::config(
                "account-ids-file",
                format!("invalid account id '{line}' on line {}", line_number + 1),
            )
        })?;
        ids.push(AccountId(id));
    }
    Ok(ids)
}

/// Read and parse an account-ids file
pub async fn read_account_ids_file(path: &Path) -> Result<Vec<AccountId>> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::config(
            "account-ids-file",
            format!("cannot read {}: {e}", path.display()),
        )
    })?;
    let ids = parse_account_ids(&contents)?;
    if ids.is_empty() {
        return Err(Error::config(
            "account-ids-file",
            format!("{} contains no account ids", path.display()),
        ));
    }
    Ok(ids)
}
