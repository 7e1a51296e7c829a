use chrono::{Datelike, NaiveDate};

/// Incremental share of the monthly target reached by the end of each bracket,
/// in percent. The last bracket runs from day 26 to the end of the month.
const BRACKET_WEIGHTS: [f64; 6] = [21.23, 11.61, 8.13, 7.75, 12.96, 38.31];
const BRACKET_DAYS: u32 = 5;

/// Fraction of the monthly target expected to be disbursed by the end of `day`.
pub fn cumulative_weight_fraction(day: u32, days_in_month: u32) -> f64 {
    let days_in_month = days_in_month.max(BRACKET_DAYS * 5 + 1);
    let day = day.clamp(1, days_in_month);

    let bracket = (((day - 1) / BRACKET_DAYS) as usize).min(BRACKET_WEIGHTS.len() - 1);
    let bracket_start = bracket as u32 * BRACKET_DAYS + 1;
    let bracket_len = if bracket == BRACKET_WEIGHTS.len() - 1 {
        days_in_month - bracket_start + 1
    } else {
        BRACKET_DAYS
    };

    let completed: f64 = BRACKET_WEIGHTS[..bracket].iter().sum();
    let elapsed = f64::from(day - bracket_start + 1) / f64::from(bracket_len);
    let percent = completed + BRACKET_WEIGHTS[bracket] * elapsed;

    (percent / 100.0).min(1.0)
}

pub fn pacing_target(total_target: f64, day: u32, days_in_month: u32) -> f64 {
    total_target * cumulative_weight_fraction(day, days_in_month)
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn first_day_is_a_fifth_of_first_bracket() {
        for days in [28, 29, 30, 31] {
            let target = pacing_target(100.0, 1, days);
            assert!((target - 100.0 * 0.2123 / 5.0).abs() < EPS, "{days}: {target}");
        }
    }

    #[test]
    fn last_day_reaches_full_target() {
        for days in [28, 29, 30, 31] {
            assert!((pacing_target(42.0, days, days) - 42.0).abs() < EPS);
        }
    }

    #[test]
    fn bracket_ends_match_cumulative_weights() {
        let expected = [(5, 0.2123), (10, 0.3284), (15, 0.4097), (20, 0.4872), (25, 0.6168)];
        for (day, fraction) in expected {
            assert!((cumulative_weight_fraction(day, 31) - fraction).abs() < EPS, "day {day}");
        }
    }

    #[test]
    fn final_bracket_stretches_with_month_length() {
        let feb = cumulative_weight_fraction(27, 28);
        let expected = (61.68 + 38.31 * 2.0 / 3.0) / 100.0;
        assert!((feb - expected).abs() < EPS);

        let long = cumulative_weight_fraction(27, 31);
        let expected = (61.68 + 38.31 * 2.0 / 6.0) / 100.0;
        assert!((long - expected).abs() < EPS);
    }

    #[test]
    fn pacing_is_monotonic_through_the_month() {
        for days in [28, 29, 30, 31] {
            let mut previous = 0.0;
            for day in 1..=days {
                let current = pacing_target(1_000.0, day, days);
                assert!(current >= previous, "day {day} of {days}");
                previous = current;
            }
        }
    }

    #[test]
    fn out_of_range_days_are_clamped() {
        assert_eq!(cumulative_weight_fraction(0, 30), cumulative_weight_fraction(1, 30));
        assert!((cumulative_weight_fraction(45, 30) - 1.0).abs() < EPS);
    }

    #[test]
    fn month_lengths() {
        let date = |y, m| NaiveDate::from_ymd_opt(y, m, 10).unwrap();
        assert_eq!(days_in_month(date(2024, 2)), 29);
        assert_eq!(days_in_month(date(2025, 2)), 28);
        assert_eq!(days_in_month(date(2025, 4)), 30);
        assert_eq!(days_in_month(date(2025, 12)), 31);
    }
}
