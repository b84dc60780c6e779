use chrono::TimeZone;

use super::*;

fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn assert_contiguous(intervals: &[TimeInterval], start: DateTime<Utc>, end: DateTime<Utc>) {
    assert_eq!(intervals.first().unwrap().start, start);
    assert_eq!(intervals.last().unwrap().end, end);
    for pair in intervals.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "gap between {pair:?}");
    }
    for interval in intervals {
        assert!(interval.start < interval.end, "empty interval {interval}");
    }
}

#[test]
fn six_months_in_two_month_steps() {
    let got = split_range(ymd(2024, 1, 1), ymd(2024, 7, 1), TimeUnit::Months, 2).unwrap();
    assert_eq!(
        got,
        vec![
            TimeInterval { start: ymd(2024, 1, 1), end: ymd(2024, 3, 1) },
            TimeInterval { start: ymd(2024, 3, 1), end: ymd(2024, 5, 1) },
            TimeInterval { start: ymd(2024, 5, 1), end: ymd(2024, 7, 1) },
        ]
    );
}

#[test]
fn final_interval_is_clamped_to_end() {
    let got = split_range(ymd(2024, 1, 1), ymd(2024, 1, 11), TimeUnit::Days, 4).unwrap();
    assert_eq!(got.len(), 3);
    assert_eq!(got[2], TimeInterval { start: ymd(2024, 1, 9), end: ymd(2024, 1, 11) });
}

#[test]
fn size_larger_than_range_yields_single_interval() {
    let got = split_range(ymd(2024, 1, 1), ymd(2024, 2, 1), TimeUnit::Years, 1).unwrap();
    assert_eq!(got, vec![TimeInterval { start: ymd(2024, 1, 1), end: ymd(2024, 2, 1) }]);
}

#[test]
fn years_step_by_calendar_year() {
    let got = split_range(ymd(2020, 6, 15), ymd(2023, 1, 1), TimeUnit::Years, 1).unwrap();
    let ends: Vec<_> = got.iter().map(|i| i.end).collect();
    assert_eq!(ends, vec![ymd(2021, 6, 15), ymd(2022, 6, 15), ymd(2023, 1, 1)]);
}

#[test]
fn month_end_start_clamps_to_last_day_of_shorter_month() {
    let got = split_range(ymd(2024, 1, 31), ymd(2024, 4, 30), TimeUnit::Months, 1).unwrap();
    assert_eq!(got[0].end, ymd(2024, 2, 29));
    assert_contiguous(&got, ymd(2024, 1, 31), ymd(2024, 4, 30));
}

#[test]
fn contiguity_holds_across_units_and_sizes() {
    let start = ymd(2021, 3, 17);
    let end = ymd(2024, 11, 2);
    for unit in [TimeUnit::Days, TimeUnit::Months, TimeUnit::Years] {
        for size in [1, 2, 7, 30] {
            let got = split_range(start, end, unit, size).unwrap();
            assert_contiguous(&got, start, end);
        }
    }
}

#[test]
fn splitting_is_deterministic() {
    let a = split_range(ymd(2023, 1, 1), ymd(2024, 1, 1), TimeUnit::Days, 10).unwrap();
    let b = split_range(ymd(2023, 1, 1), ymd(2024, 1, 1), TimeUnit::Days, 10).unwrap();
    assert_eq!(a, b);
}

#[test]
fn equal_bounds_are_an_invalid_range() {
    let err = split_range(ymd(2024, 1, 1), ymd(2024, 1, 1), TimeUnit::Days, 1).unwrap_err();
    assert!(matches!(err, IntervalError::InvalidRange { .. }));
}

#[test]
fn reversed_bounds_are_an_invalid_range() {
    let err = split_range(ymd(2024, 2, 1), ymd(2024, 1, 1), TimeUnit::Months, 1).unwrap_err();
    assert!(matches!(err, IntervalError::InvalidRange { .. }));
}

#[test]
fn zero_size_is_rejected() {
    let err = split_range(ymd(2024, 1, 1), ymd(2024, 2, 1), TimeUnit::Days, 0).unwrap_err();
    assert_eq!(err, IntervalError::InvalidSize);
}

#[test]
fn unit_parses_singular_and_plural() {
    assert_eq!("days".parse::<TimeUnit>(), Ok(TimeUnit::Days));
    assert_eq!("Month".parse::<TimeUnit>(), Ok(TimeUnit::Months));
    assert_eq!(" YEARS ".parse::<TimeUnit>(), Ok(TimeUnit::Years));
}

#[test]
fn unknown_unit_is_rejected() {
    assert_eq!(
        "weeks".parse::<TimeUnit>(),
        Err(IntervalError::UnsupportedUnit("weeks".to_string()))
    );
}

#[test]
fn parse_date_accepts_supported_formats() {
    assert_eq!(parse_date("2024-03-15").unwrap(), ymd(2024, 3, 15));
    assert_eq!(parse_date("2024/03/15").unwrap(), ymd(2024, 3, 15));
    assert_eq!(parse_date("2024-03").unwrap(), ymd(2024, 3, 1));
    assert_eq!(parse_date("2024/03").unwrap(), ymd(2024, 3, 1));
    assert_eq!(parse_date("2024").unwrap(), ymd(2024, 1, 1));
}

#[test]
fn parse_date_rejects_garbage() {
    for raw in ["", "yesterday", "24-03-15", "2024-13-01", "2024-02-30", "2024-03-15T10:00"] {
        assert!(
            matches!(parse_date(raw), Err(IntervalError::InvalidDate(_))),
            "expected InvalidDate for {raw:?}"
        );
    }
}

#[test]
fn interval_contains_is_half_open() {
    let interval = TimeInterval { start: ymd(2024, 1, 1), end: ymd(2024, 2, 1) };
    assert!(interval.contains(ymd(2024, 1, 1)));
    assert!(interval.contains(ymd(2024, 1, 31)));
    assert!(!interval.contains(ymd(2024, 2, 1)));
}

#[test]
fn compact_label_formats_both_bounds() {
    let interval = TimeInterval { start: ymd(2024, 1, 1), end: ymd(2024, 3, 1) };
    assert_eq!(interval.compact_label(), "20240101_20240301");
    assert_eq!(interval.to_string(), "2024-01-01 ~ 2024-03-01");
}
