use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("table has no \"{sentinel}\" rows, cannot infer category boundaries")]
    NoSentinel { sentinel: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("location not found in reference table: {country} / {city}")]
    Location { country: String, city: String },

    #[error("category not found in reference table: {name}")]
    Category { name: String },
}

/// Failure of one output record; never aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{country}/{city}: {source}")]
    Segment {
        country: String,
        city: String,
        #[source]
        source: SegmentError,
    },

    #[error("{country}/{city} [{category}]: {source}")]
    Lookup {
        country: String,
        city: String,
        category: String,
        #[source]
        source: LookupError,
    },
}
