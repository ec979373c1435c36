//! Reference resolution over stacks built from real file naming conventions
//!
//! Input lists are deliberately given out of order: the stack sorts them.

use chrono::NaiveDate;
use disp_common::catalog::ReferenceDates;
use disp_common::epoch::EpochStack;
use disp_common::reference::{resolve, CompressedSlcPlan, ReferenceResolution};
use disp_common::Error;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `num_compressed` leading acquisitions are turned into compressed epochs.
fn frame_files(sensing: &[(i32, u32, u32)], num_compressed: usize) -> Vec<String> {
    let mut files: Vec<String> = sensing
        .iter()
        .enumerate()
        .map(|(i, &(y, m, d))| {
            let stamp = format!("{:04}{:02}{:02}T161251", y, m, d);
            if i < num_compressed {
                format!("COMPRESSED_NISAR_F150_{}_20200101_20210101.h5", stamp)
            } else {
                format!("NISAR_F150_{}.h5", stamp)
            }
        })
        .collect();
    files.reverse();
    files
}

fn august_resets() -> ReferenceDates {
    (2018..2025).map(|y| date(y, 8, 1)).collect()
}

const WINTER_2016: [(i32, u32, u32); 15] = [
    (2016, 8, 10),
    (2016, 9, 3),
    (2016, 9, 27),
    (2016, 10, 21),
    (2016, 11, 14),
    (2016, 12, 8),
    (2017, 1, 1),
    (2017, 1, 13),
    (2017, 1, 19),
    (2017, 1, 25),
    (2017, 2, 18),
    (2017, 3, 2),
    (2017, 3, 14),
    (2017, 3, 26),
    (2017, 4, 7),
];

#[test]
fn test_multi_year_frame_without_compressed_epochs() {
    // Summer-only acquisitions over three years
    let sensing = [
        (2018, 8, 8),
        (2018, 8, 20),
        (2018, 9, 1),
        (2018, 9, 25),
        (2019, 8, 15),
        (2019, 8, 27),
        (2019, 9, 8),
        (2019, 9, 20),
        (2020, 6, 10),
        (2020, 6, 22),
        (2020, 7, 4),
        (2020, 7, 16),
        (2020, 8, 9),
        (2020, 8, 21),
        (2020, 9, 2),
    ];
    let stack = EpochStack::from_identifiers(frame_files(&sensing, 0)).unwrap();

    let resolution = resolve(&stack, &august_resets(), CompressedSlcPlan::AlwaysFirst);

    // The latest changeover inside the stack lands on the next real acquisition
    assert_eq!(resolution, ReferenceResolution::new(0, Some(date(2020, 8, 9))));
}

#[test]
fn test_changeover_at_stack_start_is_ignored() {
    let stack = EpochStack::from_identifiers(frame_files(&WINTER_2016, 0)).unwrap();
    let reference_dates: ReferenceDates = [
        "2016-08-10T14:07:13",
        "2017-08-17T14:07:19",
        "2018-08-12T14:07:25",
        "2019-08-13T14:06:50",
        "2020-08-13T14:07:38",
    ]
    .iter()
    .map(|s| disp_common::catalog::parse_iso_date(s).unwrap())
    .collect();

    let resolution = resolve(&stack, &reference_dates, CompressedSlcPlan::AlwaysFirst);
    assert_eq!(resolution, ReferenceResolution::new(0, None));
}

#[test]
fn test_repeated_compressed_base_dates() {
    let mut files = vec![
        "NISAR_L2_GSLC_NI_F150_20200903T161549Z_20240501T094950Z_NI_HH_v0.1.h5",
        "compressed_F150_20190711_20191009_20200107.h5",
        "NISAR_L2_GSLC_NI_F150_20200804T161629Z_20240501T010610Z_NI_HH_v0.1.h5",
        "compressed_F150_20200717_20200412_20200729.h5",
        "NISAR_L2_GSLC_NI_F150_20200816T161630Z_20240501T042747Z_NI_HH_v0.1.h5",
        "compressed_F150_20180722_20190412_20190705.h5",
        "NISAR_L2_GSLC_NI_F150_20200828T161631Z_20240501T075057Z_NI_HH_v0.1.h5",
        "compressed_F150_20190711_20200113_20200406.h5",
        "NISAR_L2_GSLC_NI_F150_20200810T161548Z_20240501T030849Z_NI_HH_v0.1.h5",
        "compressed_F150_20190711_20190711_20191003.h5",
        "NISAR_L2_GSLC_NI_F150_20200822T161548Z_20240501T062744Z_NI_HH_v0.1.h5",
    ];
    files.rotate_left(3);
    let stack = EpochStack::from_identifiers(files).unwrap();
    assert_eq!(stack.compressed_count(), 5);

    let reference_dates: ReferenceDates = [
        date(2017, 7, 9),
        date(2018, 7, 16),
        date(2019, 7, 11),
        date(2020, 7, 17),
        date(2021, 7, 12),
    ]
    .into_iter()
    .collect();

    let resolution = resolve(&stack, &reference_dates, CompressedSlcPlan::AlwaysFirst);

    // The compressed epoch whose base phase is 2020-07-17
    assert_eq!(resolution, ReferenceResolution::new(4, None));
    assert_eq!(
        stack.get(4).unwrap().identifier().to_str(),
        Some("compressed_F150_20200717_20200412_20200729.h5")
    );
}

#[test]
fn test_last_per_ministack_tracks_compressed_count() {
    let no_dates = ReferenceDates::new();

    let stack = EpochStack::from_identifiers(frame_files(&WINTER_2016, 0)).unwrap();
    assert_eq!(
        resolve(&stack, &no_dates, CompressedSlcPlan::LastPerMinistack),
        ReferenceResolution::new(0, None)
    );

    for num_compressed in 1..6 {
        let stack = EpochStack::from_identifiers(frame_files(&WINTER_2016, num_compressed)).unwrap();
        let resolution = resolve(&stack, &august_resets(), CompressedSlcPlan::LastPerMinistack);
        assert_eq!(resolution, ReferenceResolution::new(num_compressed - 1, None));
    }
}

#[test]
fn test_duplicate_real_dates_rejected() {
    let files = vec![
        "NISAR_F150_20200101T000000.h5",
        "NISAR_F150_20200101T120000.h5",
        "NISAR_F150_20200113T000000.h5",
    ];
    match EpochStack::from_identifiers(files) {
        Err(Error::DuplicateDates(entries)) => {
            assert_eq!(entries.len(), 2);
            assert!(entries.iter().all(|(d, _)| *d == date(2020, 1, 1)));
        }
        other => panic!("expected duplicate dates error, got {:?}", other),
    }
}

#[test]
fn test_compressed_epochs_may_share_dates() {
    let files = vec![
        "compressed_F150_20190711_20190711_20191003.h5",
        "compressed_F150_20190711_20191009_20200107.h5",
        "NISAR_F150_20200113T000000.h5",
    ];
    let stack = EpochStack::from_identifiers(files).unwrap();
    assert_eq!(stack.len(), 3);
    assert_eq!(stack.real_count(), 1);
}

#[test]
fn test_same_date_compressed_epochs_first_occurrence_wins() {
    let files = vec![
        "NISAR_F150_20200113T000000.h5",
        "compressed_F150_20190711_20191009_20200107.h5",
        "compressed_F150_20180722_20190412_20190705.h5",
        "compressed_F150_20190711_20190711_20191003.h5",
    ];
    let stack = EpochStack::from_identifiers(files).unwrap();
    let reference_dates: ReferenceDates = [date(2019, 7, 11)].into_iter().collect();

    let resolution = resolve(&stack, &reference_dates, CompressedSlcPlan::AlwaysFirst);

    assert_eq!(resolution, ReferenceResolution::new(1, None));
    assert_eq!(
        stack.get(1).unwrap().identifier().to_str(),
        Some("compressed_F150_20190711_20190711_20191003.h5")
    );
    assert_eq!(
        stack.get(2).unwrap().identifier().to_str(),
        Some("compressed_F150_20190711_20191009_20200107.h5")
    );
}
