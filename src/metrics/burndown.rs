//! Sprint burndown series.
//!
//! A pure function of a sprint, its stories and the current time.

use crate::types::{Sprint, UserStory};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Burndown of one sprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Burndown {
    pub total_points: i64,
    pub series: Vec<BurndownPoint>,
}

/// One day of the burndown
///
/// `actual` is null for days that lie more than a day in the future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurndownPoint {
    pub day: i64,
    /// `YYYY-MM-DD`
    pub date: String,
    pub ideal: f64,
    pub actual: Option<i64>,
}

/// Compute the ideal and actual remaining points per day of the sprint
///
/// A sprint without both dates has an empty series. The number of days is
/// the floor of whole 24-hour periods between start and end, so a same-day
/// sprint yields a single point.
pub fn compute_burndown(sprint: &Sprint, stories: &[UserStory], now: DateTime<Utc>) -> Burndown {
    let total_points: i64 = stories.iter().map(UserStory::points).sum();

    let (start, end) = match (sprint.start_date, sprint.end_date) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Burndown {
                total_points,
                series: Vec::new(),
            }
        }
    };

    let days = (end - start).num_seconds().div_euclid(SECONDS_PER_DAY);
    let ideal_decrement = if days > 0 {
        total_points as f64 / days as f64
    } else {
        total_points as f64
    };
    let horizon = now + Duration::days(1);

    let series = (0..=days)
        .map(|day| {
            let date = start + Duration::days(day);
            let ideal = (total_points as f64 - ideal_decrement * day as f64).max(0.0);
            let burned: i64 = stories
                .iter()
                .filter(|s| s.completed_at.is_some_and(|at| at <= date))
                .map(UserStory::points)
                .sum();

            BurndownPoint {
                day,
                date: date.format("%Y-%m-%d").to_string(),
                ideal,
                actual: (date < horizon).then_some(total_points - burned),
            }
        })
        .collect();

    Burndown {
        total_points,
        series,
    }
}
