pub const DEFAULT_DB_PATH: &str = "data/col.sqlite";

/// Category id reserved for the leading group, which has no name in the
/// category reference table.
pub const LEADING_CATEGORY_ID: i64 = 0;

/// Marker values of the source table layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conventions {
    /// `Type` value of a row that closes a category block.
    pub sentinel: String,
    /// `Avg_price` value meaning "no data".
    pub unknown_marker: String,
    /// Name of the group occupying the rows before the first sentinel.
    pub leading_category: String,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            sentinel: "Edit".to_string(),
            unknown_marker: "?".to_string(),
            leading_category: "Restaurants".to_string(),
        }
    }
}

impl Conventions {
    pub fn is_sentinel(&self, row_type: &str) -> bool {
        row_type.trim() == self.sentinel
    }

    pub fn is_leading(&self, category: &str) -> bool {
        category.trim() == self.leading_category
    }
}
