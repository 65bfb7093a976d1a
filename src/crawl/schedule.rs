// src/crawl/schedule.rs
// =============================================================================
// Splits the requested time range into windows.
//
// The platform returns at most one page per call and quietly caps how many
// results one query can reach, so a long range is asked about one slice at
// a time. Smaller steps mean fewer items lost to the cap but more requests;
// the step is the caller's choice.
//
// Windows are produced lazily by an iterator. Cloning the iterator (or
// calling partition() again) restarts from the beginning.
//
//   start                                                   end
//     |---- step ----|---- step ----|---- step ----|-- rest --|
// =============================================================================

use crate::error::ScheduleError;
use crate::model::TimeWindow;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct Windows {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

impl Iterator for Windows {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<TimeWindow> {
        if self.cursor >= self.end {
            return None;
        }
        // The last window is clipped to `end`
        let window_end = self
            .cursor
            .checked_add_signed(self.step)
            .map_or(self.end, |t| t.min(self.end));
        let window = TimeWindow::new(self.cursor, window_end);
        self.cursor = window_end;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = remaining(self.cursor, self.end, self.step);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Windows {}

fn remaining(cursor: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> usize {
    if cursor >= end {
        return 0;
    }
    let span = (end - cursor).num_milliseconds();
    let step = step.num_milliseconds().max(1);
    ((span + step - 1) / step) as usize
}

// Returns the windows covering [start, end).
//
// start == end is allowed and yields nothing; start after end is an error.
pub fn partition(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Result<Windows, ScheduleError> {
    // Window counting works in milliseconds, so a step needs at least one
    if step < Duration::milliseconds(1) {
        return Err(ScheduleError::NonPositiveStep);
    }
    if start > end {
        return Err(ScheduleError::InvertedRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }
    Ok(Windows { cursor: start, end, step })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    // Windows are contiguous, non-overlapping and exactly cover [start, end)
    fn assert_covers(windows: &[TimeWindow], start: DateTime<Utc>, end: DateTime<Utc>) {
        assert_eq!(windows.first().map(|w| w.start), Some(start));
        assert_eq!(windows.last().map(|w| w.end), Some(end));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(windows.iter().all(|w| w.start < w.end));
    }

    #[test]
    fn even_split() {
        let windows: Vec<_> = partition(at(0, 0), at(3, 0), Duration::hours(1)).unwrap().collect();
        assert_eq!(windows.len(), 3);
        assert_covers(&windows, at(0, 0), at(3, 0));
    }

    #[test]
    fn last_window_is_clipped() {
        let windows: Vec<_> = partition(at(0, 0), at(2, 30), Duration::hours(1)).unwrap().collect();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].duration(), Duration::minutes(30));
        assert_covers(&windows, at(0, 0), at(2, 30));
    }

    #[test]
    fn step_longer_than_range_gives_one_window() {
        let windows: Vec<_> = partition(at(1, 0), at(1, 10), Duration::days(1)).unwrap().collect();
        assert_eq!(windows, vec![TimeWindow::new(at(1, 0), at(1, 10))]);
    }

    #[test]
    fn coverage_holds_for_many_shapes() {
        let start = at(0, 0);
        for minutes in [1i64, 7, 59, 60, 61, 600, 1439] {
            for step in [1i64, 5, 13, 60, 1000] {
                let end = start + Duration::minutes(minutes);
                let iter = partition(start, end, Duration::minutes(step)).unwrap();
                let expected_len = iter.len();
                let windows: Vec<_> = iter.collect();
                assert_eq!(windows.len(), expected_len, "len for {}m / {}m", minutes, step);
                assert_covers(&windows, start, end);
            }
        }
    }

    #[test]
    fn restartable() {
        let windows = partition(at(0, 0), at(4, 0), Duration::hours(1)).unwrap();
        let again = windows.clone();
        assert_eq!(windows.collect::<Vec<_>>(), again.collect::<Vec<_>>());
    }

    #[test]
    fn empty_range_yields_nothing() {
        assert_eq!(partition(at(1, 0), at(1, 0), Duration::hours(1)).unwrap().count(), 0);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            partition(at(0, 0), at(1, 0), Duration::zero()).unwrap_err(),
            ScheduleError::NonPositiveStep
        );
        assert_eq!(
            partition(at(0, 0), at(1, 0), Duration::minutes(-5)).unwrap_err(),
            ScheduleError::NonPositiveStep
        );
        assert!(matches!(
            partition(at(2, 0), at(1, 0), Duration::hours(1)),
            Err(ScheduleError::InvertedRange { .. })
        ));
    }
}
