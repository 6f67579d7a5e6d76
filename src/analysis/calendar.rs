use chrono::NaiveDate;

use crate::models::ContributionCalendar;

/// Current and longest streak, produced together by one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streaks {
    pub current: u32,
    pub longest: u32,
}

pub fn total_contributions(calendar: &ContributionCalendar) -> u64 {
    calendar.days().map(|(_, count)| u64::from(count)).sum()
}

/// Walks the calendar once in chronological order.
///
/// A missing date between two entries breaks a run. The latest day counts as
/// in progress: when it is zero, the current streak is the run that ended the
/// day before it.
pub fn compute_streaks(calendar: &ContributionCalendar) -> Streaks {
    let mut run = 0u32;
    let mut run_before_last = 0u32;
    let mut longest = 0u32;
    let mut last_count = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for (date, count) in calendar.days() {
        let contiguous = previous
            .and_then(|p| p.succ_opt())
            .map_or(true, |next| next == date);
        if !contiguous {
            run = 0;
        }

        run_before_last = run;
        if count > 0 {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }

        last_count = count;
        previous = Some(date);
    }

    Streaks {
        current: if last_count > 0 { run } else { run_before_last },
        longest,
    }
}

/// Color level 0-4 for a day's count: 0, 1-2, 3-5, 6-9, 10+.
pub fn contribution_level(count: u32) -> u8 {
    match count {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        6..=9 => 3,
        _ => 4,
    }
}
