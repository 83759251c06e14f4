// 📂 Estimate Ingestion - CSV line items
// Stands in for the upstream document-extraction service during development
// and for the CLI. Expected header: description,quantity,unit_price,total
// with an optional category column.

use anyhow::{Context as AnyhowContext, Result};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::model::RawLineItem;

/// Raw CSV row. Amounts stay strings here and are parsed with
/// `BigDecimal::from_str` so "0.10" arrives as exactly 0.10, never as a
/// float approximation.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    description: String,
    quantity: String,
    unit_price: String,
    total: String,
    #[serde(default)]
    category: Option<String>,
}

/// Load one estimate's line items from a CSV file, preserving input order.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawLineItem>> {
    let mut rdr = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open estimate CSV: {:?}", path.as_ref()))?;

    let mut items = Vec::new();
    for (row, result) in rdr.deserialize().enumerate() {
        let line = row + 2; // header is row 1
        let record: CsvRecord = result
            .with_context(|| format!("Failed to parse row {} of {:?}", line, path.as_ref()))?;

        let decimal = |field: &str, value: &str| -> Result<BigDecimal> {
            BigDecimal::from_str(value.trim()).with_context(|| {
                format!(
                    "Row {} of {:?}: {} is not a decimal number: {:?}",
                    line,
                    path.as_ref(),
                    field,
                    value,
                )
            })
        };

        items.push(RawLineItem {
            quantity: decimal("quantity", &record.quantity)?,
            unit_price: decimal("unit_price", &record.unit_price)?,
            total: decimal("total", &record.total)?,
            description: record.description,
            category_hint: record.category.filter(|c| !c.trim().is_empty()),
        });
    }

    tracing::debug!(count = items.len(), path = ?path.as_ref(), "estimate loaded");
    Ok(items)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "estimate-recon-test-{}-{}.csv",
            std::process::id(),
            content.len(),
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_csv_with_category_column() {
        let path = write_temp(
            "description,quantity,unit_price,total,category\n\
             Refinish hood,2,90.00,180.00,labor\n\
             Front bumper cover,1,389.50,389.50,\n",
        );

        let items = load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Refinish hood");
        assert_eq!(items[0].quantity, BigDecimal::from(2));
        assert_eq!(items[0].category_hint.as_deref(), Some("labor"));
        assert_eq!(items[1].total, BigDecimal::from_str("389.50").unwrap());
        assert_eq!(items[1].category_hint, None);
    }

    #[test]
    fn test_load_csv_without_category_column() {
        let path = write_temp(
            "description,quantity,unit_price,total\n\
             Paint supplies kit,1,100.00,100.00\n",
        );

        let items = load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category_hint, None);
    }

    #[test]
    fn test_amounts_parse_exactly() {
        let path = write_temp(
            "description,quantity,unit_price,total\n\
             Shop supplies,3,0.10,0.30\n",
        );

        let items = load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(items[0].unit_price, BigDecimal::from_str("0.10").unwrap());
        assert_eq!(items[0].total, BigDecimal::from_str("0.30").unwrap());
    }

    #[test]
    fn test_malformed_numeric_field_is_an_error() {
        let path = write_temp(
            "description,quantity,unit_price,total\n\
             Refinish hood,not-a-number,90.00,180.00\n",
        );

        let result = load_csv(&path);
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }
}
