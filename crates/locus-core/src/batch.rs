//! Batch planning.
//!
//! The insights API scopes one `reportInsights` call to a single account, so a
//! batch is a run of same-account locations taken in row order, capped at the
//! configured batch size.
//!
//! # Catch-up ordering
//!
//! An interrupted pass can leave some locations further along than others.
//! Each non-terminal location therefore resumes from its own marker
//! ([`resume_date`]), and a window only batches the locations whose resume
//! date is that window's first day. The window sequence begins at the
//! least-progressed location ([`catch_up_start`]), so laggards are fetched
//! first and the rest join in lock-step once the windows reach them.

use chrono::NaiveDate;

use crate::marker::Marker;
use crate::models::Location;
use crate::window::WINDOW_DAYS;

/// A same-account group of locations fetched in one call.
///
/// Entries keep their row order; lookup is by remote key (`locations/{id}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationBatch {
    pub account: String,
    entries: Vec<Location>,
    /// Index of the first location after the scan that built this batch.
    pub next_index: usize,
}

impl LocationBatch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Location> {
        self.entries.iter().find(|l| l.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|l| l.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.entries.iter()
    }

    /// Removes the lowest-ordered entry.
    pub fn pop_front(&mut self) -> Option<Location> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn into_locations(self) -> Vec<Location> {
        self.entries
    }
}

/// Builds the next batch scanning forward from `start`.
///
/// Leading locations rejected by `eligible` are skipped. The first eligible
/// location fixes the account; the scan then collects eligible locations of
/// that account until it meets a different account or holds `max` entries.
/// Returns `None` when nothing eligible remains.
pub fn next_batch<F>(
    locations: &[Location],
    start: usize,
    max: usize,
    eligible: F,
) -> Option<LocationBatch>
where
    F: Fn(&Location) -> bool,
{
    let max = max.max(1);
    let first = start + locations.get(start..)?.iter().position(&eligible)?;
    let account = locations[first].account.clone();

    let mut entries = vec![locations[first].clone()];
    let mut index = first + 1;
    while index < locations.len() && entries.len() < max {
        let location = &locations[index];
        if location.account != account {
            break;
        }
        if eligible(location) {
            entries.push(location.clone());
        }
        index += 1;
    }

    Some(LocationBatch {
        account,
        entries,
        next_index: index,
    })
}

/// The first day of the next window a location needs, or `None` if it is
/// caught up.
///
/// Markers older than `global_start` are clamped to it. Markers off the weekly
/// grid anchored at `global_start` are aligned down to the previous grid day.
pub fn resume_date(marker: &Marker, global_start: NaiveDate) -> Option<NaiveDate> {
    match marker {
        Marker::Caught(_) => None,
        Marker::Empty => Some(global_start),
        Marker::Pending(date) if *date <= global_start => Some(global_start),
        Marker::Pending(date) => {
            let offset = (*date - global_start).num_days() % WINDOW_DAYS;
            Some(*date - chrono::Duration::days(offset))
        }
    }
}

/// The earliest resume date among `locations`.
pub fn catch_up_start(locations: &[Location], global_start: NaiveDate) -> Option<NaiveDate> {
    locations
        .iter()
        .filter_map(|l| resume_date(&l.marker, global_start))
        .min()
}
