//! Outlier filter for consecutive temperature readings.
//!
//! A single-cycle swing larger than the configured limit is treated as a bus
//! glitch: the raw value is dropped and the last accepted value is kept.

/// Outcome of filtering one raw reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filtered {
    /// The raw value was accepted and is the new reference value
    Accepted(f64),
    /// The raw value was discarded; carries the previous value that replaces it
    Rejected { raw: f64, kept: f64 },
}

impl Filtered {
    /// Value to publish for this cycle.
    pub fn value(&self) -> f64 {
        match *self {
            Filtered::Accepted(v) => v,
            Filtered::Rejected { kept, .. } => kept,
        }
    }
}

/// Apply the outlier rule to `raw` given the last accepted value.
///
/// With no previous value the raw reading is accepted as-is.
pub fn sanitize(previous: Option<f64>, raw: f64, max_change: f64) -> Filtered {
    match previous {
        None => Filtered::Accepted(raw),
        Some(prev) if (raw - prev).abs() > max_change => Filtered::Rejected { raw, kept: prev },
        Some(_) => Filtered::Accepted(raw),
    }
}
