//! CSV price-history loader.
//!
//! Reads purchase-level CSV rows and aggregates them into one mean price per
//! product per calendar day. Recognized columns (either spelling):
//!   order_date / Order Date
//!   product_code / ASIN/ISBN (Product Code)
//!   price / Purchase Price Per Unit
//!   quantity / Quantity (optional)
//! Other columns are ignored.
//!
//! Rows with an unparseable date, a missing product code, or a missing or
//! non-positive price (or quantity, when the column exists) are dropped and
//! summarized in one warning.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};
use crate::types::{PriceHistory, PriceRecord};

/// Required columns and the header spellings accepted for each.
const REQUIRED_COLUMNS: [(&str, [&str; 2]); 3] = [
    ("order_date", ["order_date", "Order Date"]),
    ("product_code", ["product_code", "ASIN/ISBN (Product Code)"]),
    ("price", ["price", "Purchase Price Per Unit"]),
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One raw CSV row. Everything is text until cleaned.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawRow {
    #[serde(alias = "Order Date")]
    order_date: Option<String>,
    #[serde(alias = "ASIN/ISBN (Product Code)")]
    product_code: Option<String>,
    #[serde(alias = "Purchase Price Per Unit")]
    price: Option<String>,
    #[serde(alias = "Quantity")]
    quantity: Option<String>,
}

/// A cleaned purchase row.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRow {
    pub product_code: String,
    pub date: NaiveDate,
    pub price: f64,
}

impl RawRow {
    fn clean(&self) -> Option<PurchaseRow> {
        let date = parse_date(self.order_date.as_deref()?)?;
        let product_code = self.product_code.as_deref()?.trim();
        if product_code.is_empty() {
            return None;
        }
        let price = parse_positive(self.price.as_deref()?)?;
        if let Some(qty) = self.quantity.as_deref() {
            parse_positive(qty)?;
        }
        Some(PurchaseRow {
            product_code: product_code.to_string(),
            date,
            price,
        })
    }
}

/// Row counts from one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub rows_read: usize,
    pub rows_dropped: usize,
}

impl LoadStats {
    pub fn dropped_fraction(&self) -> f64 {
        if self.rows_read == 0 {
            0.0
        } else {
            self.rows_dropped as f64 / self.rows_read as f64
        }
    }
}

/// Daily price histories keyed by product code, ordered by code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceCatalog {
    histories: BTreeMap<String, PriceHistory>,
    stats: LoadStats,
}

impl PriceCatalog {
    /// Aggregate cleaned rows into daily mean prices.
    pub fn from_rows(rows: &[PurchaseRow]) -> Result<Self> {
        let mut days: BTreeMap<&str, BTreeMap<NaiveDate, (f64, usize)>> = BTreeMap::new();
        for row in rows {
            let slot = days
                .entry(row.product_code.as_str())
                .or_default()
                .entry(row.date)
                .or_insert((0.0, 0));
            slot.0 += row.price;
            slot.1 += 1;
        }

        let mut histories = BTreeMap::new();
        for (code, by_day) in days {
            let records = by_day
                .into_iter()
                .map(|(date, (sum, count))| PriceRecord::new(date, sum / count as f64))
                .collect();
            histories.insert(code.to_string(), PriceHistory::new(records)?);
        }
        Ok(Self {
            histories,
            stats: LoadStats::default(),
        })
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn get(&self, product_code: &str) -> Option<&PriceHistory> {
        self.histories.get(product_code)
    }

    /// Like [`PriceCatalog::get`], but a missing product is an error.
    pub fn history(&self, product_code: &str) -> Result<&PriceHistory> {
        self.get(product_code)
            .ok_or_else(|| DetectionError::UnknownProduct(product_code.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PriceHistory)> {
        self.histories.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Parse and clean purchase rows from a CSV reader.
pub fn load_rows<R: Read>(reader: R) -> Result<(Vec<PurchaseRow>, LoadStats)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    for (field, spellings) in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| spellings.contains(&h)) {
            return Err(DetectionError::MissingField(field));
        }
    }

    let mut stats = LoadStats::default();
    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<RawRow>() {
        let raw = result?;
        stats.rows_read += 1;
        match raw.clean() {
            Some(row) => rows.push(row),
            None => stats.rows_dropped += 1,
        }
    }

    if stats.rows_dropped > 0 {
        log::warn!(
            "dropped {} of {} rows due to invalid data ({:.2}%)",
            stats.rows_dropped,
            stats.rows_read,
            stats.dropped_fraction() * 100.0
        );
    }
    Ok((rows, stats))
}

/// Load and aggregate a catalog from a CSV reader.
pub fn load_catalog<R: Read>(reader: R) -> Result<PriceCatalog> {
    let (rows, stats) = load_rows(reader)?;
    let mut catalog = PriceCatalog::from_rows(&rows)?;
    catalog.stats = stats;
    log::info!(
        "rows={} kept={} products={}",
        stats.rows_read,
        rows.len(),
        catalog.len()
    );
    Ok(catalog)
}

/// Load and aggregate a catalog from a CSV file path.
pub fn load_catalog_file(path: impl AsRef<Path>) -> Result<PriceCatalog> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| DetectionError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_catalog(file)
}

/// Parse a date or date-time cell, keeping only the calendar day.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn parse_positive(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Order Date,Purchase Price Per Unit,Quantity,Shipping Address State,Title,ASIN/ISBN (Product Code),Category
2023-01-05,10.00,1,CA,Cable,B0001,ELECTRONICS
2023-01-05,12.00,2,NY,Cable,B0001,ELECTRONICS
2023-01-06,11.00,1,CA,Cable,B0001,ELECTRONICS
2023-01-06,,1,CA,Cable,B0001,ELECTRONICS
2023-01-07,-3.00,1,CA,Cable,B0001,ELECTRONICS
not-a-date,9.00,1,CA,Cable,B0001,ELECTRONICS
2023-01-08,9.00,0,CA,Cable,B0001,ELECTRONICS
2023-01-09,9.00,1,CA,Mug,,KITCHEN
2023-01-04,25.50,1,TX,Book,B0002,BOOKS
";

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn load_sample_csv_with_original_headers() {
        let catalog = load_catalog(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.stats(), LoadStats { rows_read: 9, rows_dropped: 5 });

        let cable = catalog.get("B0001").unwrap();
        assert_eq!(cable.len(), 2);
        assert_eq!(cable.records()[0].date, d("2023-01-05"));
        assert!((cable.records()[0].price - 11.0).abs() < 1e-9);
        assert!((cable.records()[1].price - 11.0).abs() < 1e-9);

        let codes: Vec<_> = catalog.iter().map(|(code, _)| code).collect();
        assert_eq!(codes, vec!["B0001", "B0002"]);
    }

    #[test]
    fn snake_case_headers_without_quantity() {
        let csv_data = "\
product_code,order_date,price
A,2024-02-01 09:30:00,5.0
A,2024-02-01T18:00:00,7.0
A,02/03/2024,6.0
";
        let catalog = load_catalog(csv_data.as_bytes()).unwrap();
        let a = catalog.get("A").unwrap();
        assert_eq!(a.len(), 2);
        assert!((a.records()[0].price - 6.0).abs() < 1e-9);
        assert_eq!(a.records()[1].date, d("2024-02-03"));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let csv_data = "order_date,price\n2024-01-01,3.0\n";
        let err = load_catalog(csv_data.as_bytes()).unwrap_err();
        assert!(matches!(err, DetectionError::MissingField("product_code")));
    }

    #[test]
    fn unknown_product_is_an_error() {
        let catalog = load_catalog(SAMPLE_CSV.as_bytes()).unwrap();
        assert!(catalog.history("B0001").is_ok());
        assert!(matches!(
            catalog.history("B9999"),
            Err(DetectionError::UnknownProduct(_))
        ));
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_date("2023-04-01"), Some(d("2023-04-01")));
        assert_eq!(parse_date(" 04/01/2023 "), Some(d("2023-04-01")));
        assert_eq!(parse_date("2023-04-01 23:59:59"), Some(d("2023-04-01")));
        assert_eq!(parse_date("April 1st"), None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_catalog_file("/nonexistent/purchases.csv").unwrap_err();
        assert!(matches!(err, DetectionError::Io { .. }));
    }
}
