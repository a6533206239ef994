//! JSON message body for one publish cycle.
//!
//! ```text
//! {"dateTime": "1700000000", "extraTemp1": "21.0", "extraTemp2": "20.0"}
//! ```
//!
//! Keys are `extraTemp<N>` with N the 1-based sensor index; values are strings
//! with one fractional digit. `dateTime` is only present when timestamping is
//! enabled.

use std::io;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::ser::Formatter;

use crate::sensor::Reading;

/// Message body built from one cycle's readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    timestamp: Option<i64>,
    readings: Vec<(usize, f64)>,
}

impl Payload {
    /// Build a payload; `timestamp` is Unix seconds.
    pub fn new(readings: &[Reading], timestamp: Option<i64>) -> Self {
        Self {
            timestamp,
            readings: readings.iter().map(|r| (r.sensor, r.celsius)).collect(),
        }
    }

    /// Render to the wire format.
    pub fn to_json(&self) -> String {
        let mut out = Vec::with_capacity(32 + self.readings.len() * 24);
        let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
        // Serializing strings and integers into a Vec cannot fail
        if self.serialize(&mut ser).is_err() {
            return String::from("{}");
        }
        String::from_utf8(out).unwrap_or_default()
    }
}

/// Convenience wrapper around [`Payload::new`] + [`Payload::to_json`].
pub fn build(readings: &[Reading], timestamp: Option<i64>) -> String {
    Payload::new(readings, timestamp).to_json()
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.readings.len() + usize::from(self.timestamp.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(ts) = self.timestamp {
            map.serialize_entry("dateTime", &ts.to_string())?;
        }
        for (sensor, celsius) in &self.readings {
            map.serialize_entry(
                &format!("extraTemp{}", sensor + 1),
                &format!("{:.1}", celsius),
            )?;
        }
        map.end()
    }
}

/// Compact JSON with a space after `:` and `,`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}
