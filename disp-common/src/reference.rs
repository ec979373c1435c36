//! Output reference resolution
//!
//! Sequential ministack processing can only move its phase reference at a
//! ministack boundary (a compressed epoch). A changeover requested between
//! boundaries is instead reported as an "extra" reference date for the
//! network construction of the next stage.
//!
//! Both outputs are overwritten while walking the requested dates in
//! ascending order, so the latest qualifying request wins.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::ReferenceDates;
use crate::epoch::EpochStack;
use crate::Error;

/// How compressed SLCs are referenced across ministacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressedSlcPlan {
    /// Every ministack is referenced to the first epoch of the whole stack
    #[default]
    AlwaysFirst,
    /// Each ministack is referenced to its own most recent compressed epoch
    LastPerMinistack,
}

impl CompressedSlcPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressedSlcPlan::AlwaysFirst => "always_first",
            CompressedSlcPlan::LastPerMinistack => "last_per_ministack",
        }
    }
}

impl fmt::Display for CompressedSlcPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressedSlcPlan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always_first" => Ok(CompressedSlcPlan::AlwaysFirst),
            "last_per_ministack" => Ok(CompressedSlcPlan::LastPerMinistack),
            other => Err(Error::UnknownCompressedSlcPlan(other.to_string())),
        }
    }
}

/// Result of [`resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferenceResolution {
    /// Index into the stack of the structural output reference
    pub output_reference_idx: usize,
    /// Mid-ministack changeover to thread into network construction
    pub extra_reference_date: Option<NaiveDate>,
}

impl ReferenceResolution {
    pub fn new(output_reference_idx: usize, extra_reference_date: Option<NaiveDate>) -> Self {
        Self {
            output_reference_idx,
            extra_reference_date,
        }
    }
}

/// Compute the output reference index and optional extra reference date.
///
/// `stack` must already be sorted and duplicate-checked; it is not re-sorted.
pub fn resolve(
    stack: &EpochStack,
    reference_dates: &ReferenceDates,
    plan: CompressedSlcPlan,
) -> ReferenceResolution {
    if plan == CompressedSlcPlan::LastPerMinistack {
        // Structurally the last compressed epoch; no date lookup.
        let idx = stack.compressed_count().saturating_sub(1);
        return ReferenceResolution::new(idx, None);
    }

    let mut output_reference_idx = 0;
    let mut extra_reference_date = None;

    for &ref_date in reference_dates {
        let Some(idx) = stack.first_on_or_after(ref_date) else {
            // Beyond the end of the stack
            continue;
        };
        if idx == 0 {
            // Only mid-stack changes matter
            continue;
        }
        let Some(epoch) = stack.get(idx) else {
            continue;
        };

        if epoch.is_compressed() {
            output_reference_idx = idx;
        } else if epoch.sensing_date() >= ref_date {
            extra_reference_date = Some(epoch.sensing_date());
        }
    }

    ReferenceResolution::new(output_reference_idx, extra_reference_date)
}
