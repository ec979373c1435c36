//! Amplitude statistics: weighting schemes, recombination and the
//! tile-by-tile fuser

pub mod combine;
pub mod fuser;
pub mod weighting;

pub use combine::combine_amplitude_dispersions;
pub use fuser::{
    CompletionMarker, FuseOutcome, FusedStatistics, StatisticsFuser, StatisticsPair,
    COMBINED_DISPERSION_NAME, COMBINED_MEAN_NAME, COMPLETION_MARKER_NAME,
};
pub use weighting::WeightScheme;
