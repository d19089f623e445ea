pub mod price;
pub mod records;
pub mod segments;

use tracing::debug;

use crate::config::Conventions;
use crate::db::RawPage;
use crate::error::RecordError;
use records::{PriceRow, References};
use segments::{segment_indexed, CategoryIndex};

/// Everything produced for one location's table.
#[derive(Debug, Default)]
pub struct LocationReport {
    pub country: String,
    pub city: String,
    pub rows: Vec<PriceRow>,
    /// Requested categories with no block in this table.
    pub absent: Vec<String>,
    pub errors: Vec<RecordError>,
}

impl LocationReport {
    pub fn malformed_cells(&self) -> usize {
        self.rows.iter().map(|r| r.record.malformed_count()).sum()
    }
}

/// Two-pass pipeline: table → category index → one pivoted row per category.
pub fn process_location(
    page: &RawPage,
    categories: &[String],
    refs: &References,
    conventions: &Conventions,
) -> LocationReport {
    let mut report = LocationReport {
        country: page.country.clone(),
        city: page.city.clone(),
        ..Default::default()
    };

    let index = match CategoryIndex::build(&page.rows, conventions) {
        Ok(index) => index,
        Err(source) => {
            report.errors.push(RecordError::Segment {
                country: page.country.clone(),
                city: page.city.clone(),
                source,
            });
            return report;
        }
    };

    for category in categories {
        let Some(record) = segment_indexed(&index, &page.rows, category, conventions) else {
            report.absent.push(category.clone());
            continue;
        };
        match records::pivot(&page.country, &page.city, record, refs, conventions) {
            Ok(row) => report.rows.push(row),
            Err(source) => report.errors.push(RecordError::Lookup {
                country: page.country.clone(),
                city: page.city.clone(),
                category: category.clone(),
                source,
            }),
        }
    }

    debug!(
        "{}/{}: {} rows, {} absent, {} errors",
        report.country,
        report.city,
        report.rows.len(),
        report.absent.len(),
        report.errors.len()
    );
    report
}

// ── Tests ──
