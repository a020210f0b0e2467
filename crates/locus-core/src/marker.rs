//! Progress markers.
//!
//! Every location (and every account configuration row, for its listing) carries
//! a marker recording how far it has been covered:
//!
//! | Stored form     | Meaning                                             |
//! |-----------------|-----------------------------------------------------|
//! | empty           | never processed in this pass                        |
//! | `yyyy-MM-dd`    | covered through this date, more weeks pending       |
//! | `d-yyyy-MM-dd`  | covered through this date and caught up to boundary |
//!
//! Only the terminal form is recognised by pattern; anything else that fails
//! to parse as a date reads back as [`Marker::Empty`].

use std::fmt;

use chrono::NaiveDate;

use crate::models::Location;

const TERMINAL_PREFIX: &str = "d-";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Marker {
    #[default]
    Empty,
    /// Covered through the date; more windows remain.
    Pending(NaiveDate),
    /// Caught up to the boundary date of the pass that wrote it.
    Caught(NaiveDate),
}

impl Marker {
    /// Parses a stored marker value.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use locus_core::marker::Marker;
    ///
    /// let day = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
    /// assert_eq!(Marker::parse("d-2024-03-08"), Marker::Caught(day));
    /// assert_eq!(Marker::parse("2024-03-08"), Marker::Pending(day));
    /// assert_eq!(Marker::parse(""), Marker::Empty);
    /// ```
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if is_terminal_pattern(value) {
            return NaiveDate::parse_from_str(&value[TERMINAL_PREFIX.len()..], DATE_FORMAT)
                .map(Marker::Caught)
                .unwrap_or(Marker::Empty);
        }
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(Marker::Pending)
            .unwrap_or(Marker::Empty)
    }

    /// Parses an optional stored value, as read from a nullable column.
    pub fn from_stored(value: Option<&str>) -> Self {
        value.map(Marker::parse).unwrap_or_default()
    }

    /// The value to persist, or `None` for an empty marker.
    pub fn to_stored(&self) -> Option<String> {
        match self {
            Marker::Empty => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Marker::Caught(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Marker::Empty)
    }

    /// The covered-through date, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Marker::Empty => None,
            Marker::Pending(d) | Marker::Caught(d) => Some(*d),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Empty => Ok(()),
            Marker::Pending(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Marker::Caught(d) => write!(f, "{}{}", TERMINAL_PREFIX, d.format(DATE_FORMAT)),
        }
    }
}

/// Matches `d-####-##-##` exactly.
fn is_terminal_pattern(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 12 || !value.starts_with(TERMINAL_PREFIX) {
        return false;
    }
    bytes[2..].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}

/// True only for a non-empty list whose markers are all terminal.
///
/// An empty list is never complete: an unpopulated location table must not
/// be mistaken for a finished harvest.
pub fn all_terminal(locations: &[Location]) -> bool {
    !locations.is_empty() && locations.iter().all(|l| l.marker.is_terminal())
}
