//! Epoch Stack data model
//!
//! An [`Epoch`] is one acquisition (or compressed summary of a prior
//! ministack) and an [`EpochStack`] is the date-ordered sequence of them
//! handed to the reference resolver and the statistics fuser.
//!
//! Dates and the compressed flag come from the file naming convention:
//! - every run of exactly eight digits forming a valid `YYYYMMDD` is a date,
//!   the first one being the sensing date
//! - a file name containing `compressed` (any case) marks a compressed epoch

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

const COMPRESSED_MARKER: &str = "compressed";

/// Extract every `YYYYMMDD` date embedded in the file name of `id`.
///
/// Only maximal digit runs of length eight are considered, so time-of-day
/// suffixes (`T161531`) and frame numbers (`F150`) are ignored.
pub fn parse_dates(id: impl AsRef<Path>) -> Vec<NaiveDate> {
    let name = file_name(id.as_ref());
    DIGIT_RUN
        .find_iter(&name)
        .filter(|m| m.as_str().len() == 8)
        .filter_map(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok())
        .collect()
}

/// First date found in the name of `id`.
pub fn parse_date(id: impl AsRef<Path>) -> Result<NaiveDate> {
    let id = id.as_ref();
    parse_dates(id).into_iter().next().ok_or_else(|| {
        Error::InvalidInput(format!("No date found in file name: {}", id.display()))
    })
}

/// Whether `id` names a compressed epoch.
pub fn is_compressed(id: impl AsRef<Path>) -> bool {
    file_name(id.as_ref())
        .to_lowercase()
        .contains(COMPRESSED_MARKER)
}

fn file_name(id: &Path) -> String {
    id.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.to_string_lossy().into_owned())
}

/// One acquisition or compressed-acquisition record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    sensing_date: NaiveDate,
    is_compressed: bool,
    identifier: PathBuf,
    /// All dates in the name; used only as the ordering key
    dates: Vec<NaiveDate>,
}

impl Epoch {
    /// Build an epoch with explicit attributes.
    pub fn new(identifier: impl Into<PathBuf>, sensing_date: NaiveDate, is_compressed: bool) -> Self {
        Self {
            sensing_date,
            is_compressed,
            identifier: identifier.into(),
            dates: vec![sensing_date],
        }
    }

    /// Derive the epoch attributes from the naming convention.
    pub fn from_identifier(identifier: impl Into<PathBuf>) -> Result<Self> {
        let identifier = identifier.into();
        let dates = parse_dates(&identifier);
        let sensing_date = *dates.first().ok_or_else(|| {
            Error::InvalidInput(format!(
                "No date found in file name: {}",
                identifier.display()
            ))
        })?;
        Ok(Self {
            sensing_date,
            is_compressed: is_compressed(&identifier),
            identifier,
            dates,
        })
    }

    pub fn sensing_date(&self) -> NaiveDate {
        self.sensing_date
    }

    pub fn is_compressed(&self) -> bool {
        self.is_compressed
    }

    /// Opaque handle back to the source file
    pub fn identifier(&self) -> &Path {
        &self.identifier
    }
}

/// Date-ordered sequence of epochs
///
/// Construction sorts and validates; the stack is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochStack {
    epochs: Vec<Epoch>,
}

impl EpochStack {
    /// Sort `epochs` by date and reject duplicate real-epoch dates.
    ///
    /// The sort is stable and keyed on every date in the name, so compressed
    /// epochs that share a base-phase date keep the order of their later dates.
    pub fn new(mut epochs: Vec<Epoch>) -> Result<Self> {
        if epochs.is_empty() {
            return Err(Error::InvalidInput("Epoch stack is empty".to_string()));
        }
        epochs.sort_by(|a, b| a.dates.cmp(&b.dates));
        let stack = Self { epochs };
        stack.assert_no_duplicate_dates()?;
        Ok(stack)
    }

    /// Parse every identifier with the naming convention, then build the stack.
    pub fn from_identifiers<I, P>(identifiers: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let epochs = identifiers
            .into_iter()
            .map(Epoch::from_identifier)
            .collect::<Result<Vec<_>>>()?;
        Self::new(epochs)
    }

    /// Only one real acquisition is allowed per date. Compressed epochs are exempt.
    fn assert_no_duplicate_dates(&self) -> Result<()> {
        let mut by_date: BTreeMap<NaiveDate, Vec<&Path>> = BTreeMap::new();
        for epoch in self.real() {
            by_date
                .entry(epoch.sensing_date)
                .or_default()
                .push(epoch.identifier());
        }

        let duplicates: Vec<(NaiveDate, PathBuf)> = by_date
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .flat_map(|(date, ids)| ids.into_iter().map(move |id| (date, id.to_path_buf())))
            .collect();

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(Error::DuplicateDates(duplicates))
        }
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Epoch> {
        self.epochs.get(idx)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.epochs.iter().map(|e| e.sensing_date)
    }

    pub fn compressed(&self) -> impl Iterator<Item = &Epoch> + '_ {
        self.epochs.iter().filter(|e| e.is_compressed)
    }

    pub fn real(&self) -> impl Iterator<Item = &Epoch> + '_ {
        self.epochs.iter().filter(|e| !e.is_compressed)
    }

    pub fn compressed_count(&self) -> usize {
        self.compressed().count()
    }

    pub fn real_count(&self) -> usize {
        self.real().count()
    }

    pub fn has_compressed(&self) -> bool {
        self.epochs.iter().any(|e| e.is_compressed)
    }

    /// First index whose sensing date is on or after `date`.
    pub fn first_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        self.epochs.iter().position(|e| e.sensing_date >= date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_dates_gslc_name() {
        let dates = parse_dates("NISAR_L2_GSLC_NI_F150_20180610T161531Z_20240429T233903Z_NI_HH_v0.1.h5");
        assert_eq!(dates, vec![date(2018, 6, 10), date(2024, 4, 29)]);
    }

    #[test]
    fn test_parse_dates_ignores_directory() {
        let dates = parse_dates("/data/20991231/compressed_F150_20180722_20190412_20190705.h5");
        assert_eq!(
            dates,
            vec![date(2018, 7, 22), date(2019, 4, 12), date(2019, 7, 5)]
        );
    }

    #[test]
    fn test_parse_dates_skips_invalid_calendar_values() {
        // 20181340 has month 13
        let dates = parse_dates("slc_20181340_20180101.h5");
        assert_eq!(dates, vec![date(2018, 1, 1)]);
    }

    #[test]
    fn test_parse_date_missing() {
        assert!(matches!(parse_date("no_dates_here.h5"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_is_compressed_case_insensitive() {
        assert!(is_compressed("COMPRESSED_NISAR_F150_20200101.h5"));
        assert!(is_compressed("compressed_F150_20200101.h5"));
        assert!(!is_compressed("NISAR_F150_20200101.h5"));
        // Directory names do not count
        assert!(!is_compressed("/compressed_slcs/NISAR_F150_20200101.h5"));
    }

    #[test]
    fn test_stack_sorts_by_date() {
        let stack = EpochStack::from_identifiers([
            "NISAR_F150_20200301.h5",
            "NISAR_F150_20200101.h5",
            "NISAR_F150_20200201.h5",
        ])
        .unwrap();
        let dates: Vec<_> = stack.dates().collect();
        assert_eq!(dates, vec![date(2020, 1, 1), date(2020, 2, 1), date(2020, 3, 1)]);
    }

    #[test]
    fn test_stack_orders_compressed_with_shared_base_date() {
        let stack = EpochStack::from_identifiers([
            "compressed_F150_20190711_20200113_20200406.h5",
            "compressed_F150_20190711_20190711_20191003.h5",
            "compressed_F150_20190711_20191009_20200107.h5",
        ])
        .unwrap();
        let names: Vec<_> = stack
            .epochs()
            .iter()
            .map(|e| e.identifier().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "compressed_F150_20190711_20190711_20191003.h5",
                "compressed_F150_20190711_20191009_20200107.h5",
                "compressed_F150_20190711_20200113_20200406.h5",
            ]
        );
        assert_eq!(stack.compressed_count(), 3);
    }

    #[test]
    fn test_stack_rejects_duplicate_real_dates() {
        let result = EpochStack::from_identifiers([
            "NISAR_F150_20200101T000000_a.h5",
            "NISAR_F150_20200101T120000_b.h5",
            "NISAR_F150_20200201.h5",
        ]);
        match result {
            Err(Error::DuplicateDates(entries)) => {
                assert_eq!(entries.len(), 2);
                assert!(entries.iter().all(|(d, _)| *d == date(2020, 1, 1)));
            }
            other => panic!("expected duplicate dates error, got {:?}", other),
        }
    }

    #[test]
    fn test_stack_allows_duplicate_compressed_dates() {
        let stack = EpochStack::from_identifiers([
            "compressed_F150_20190711_20190711_20191003.h5",
            "compressed_F150_20190711_20191009_20200107.h5",
            "NISAR_F150_20200804.h5",
        ])
        .unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.real_count(), 1);
    }

    #[test]
    fn test_stack_rejects_empty() {
        assert!(EpochStack::new(Vec::new()).is_err());
    }

    #[test]
    fn test_first_on_or_after() {
        let stack = EpochStack::new(vec![
            Epoch::new("a", date(2020, 1, 1), false),
            Epoch::new("b", date(2020, 2, 1), false),
        ])
        .unwrap();
        assert_eq!(stack.first_on_or_after(date(2019, 1, 1)), Some(0));
        assert_eq!(stack.first_on_or_after(date(2020, 1, 15)), Some(1));
        assert_eq!(stack.first_on_or_after(date(2020, 2, 1)), Some(1));
        assert_eq!(stack.first_on_or_after(date(2020, 2, 2)), None);
    }
}
