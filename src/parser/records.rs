use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::segments::CategoryRecord;
use crate::config::{Conventions, LEADING_CATEGORY_ID};
use crate::db::{CategoryRow, LocationRow};
use crate::error::LookupError;

/// (country, city) → location id.
#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    ids: HashMap<(String, String), i64>,
}

impl LocationTable {
    pub fn new(rows: &[LocationRow]) -> Self {
        let ids = rows
            .iter()
            .map(|r| ((r.country.clone(), r.city.clone()), r.id))
            .collect();
        Self { ids }
    }

    pub fn id(&self, country: &str, city: &str) -> Result<i64, LookupError> {
        self.ids
            .get(&(country.to_string(), city.to_string()))
            .copied()
            .ok_or_else(|| LookupError::Location {
                country: country.to_string(),
                city: city.to_string(),
            })
    }
}

/// Category name → category id.
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    ids: HashMap<String, i64>,
    names: Vec<String>,
}

impl CategoryTable {
    pub fn new(rows: &[CategoryRow]) -> Self {
        Self {
            ids: rows.iter().map(|r| (r.name.clone(), r.id)).collect(),
            names: rows.iter().map(|r| r.name.clone()).collect(),
        }
    }

    pub fn id(&self, name: &str) -> Result<i64, LookupError> {
        self.ids
            .get(name.trim())
            .copied()
            .ok_or_else(|| LookupError::Category {
                name: name.to_string(),
            })
    }

    /// Names in reference-table order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Reference tables shared read-only by every location.
#[derive(Debug, Clone, Default)]
pub struct References {
    pub locations: LocationTable,
    pub categories: CategoryTable,
}

/// One category of one location, pivoted to a single wide row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRow {
    pub location_id: i64,
    pub category_id: i64,
    pub record: CategoryRecord,
}

impl Serialize for PriceRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.record.len() + 2))?;
        map.serialize_entry("location_id", &self.location_id)?;
        map.serialize_entry("category_id", &self.category_id)?;
        for (label, amount) in self.record.amounts() {
            map.serialize_entry(label, &amount)?;
        }
        map.end()
    }
}

/// Attach location and category keys to a record.
pub fn pivot(
    country: &str,
    city: &str,
    record: CategoryRecord,
    refs: &References,
    conventions: &Conventions,
) -> Result<PriceRow, LookupError> {
    let location_id = refs.locations.id(country, city)?;
    let category_id = if conventions.is_leading(&record.category) {
        LEADING_CATEGORY_ID
    } else {
        refs.categories.id(&record.category)?
    };
    Ok(PriceRow {
        location_id,
        category_id,
        record,
    })
}

// ── Tests ──
