//! Route assignment and route plan row types

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Serialize, Serializer};

use super::{ClusterId, LocationKind};
use crate::defaults::UNSEQUENCED_STOP_NUMBER;

/// The (agent, date) a cluster is visited on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAssignment {
    pub cluster_id: ClusterId,
    pub agent_id: String,
    pub date: NaiveDate,
    pub territory: String,
    /// Set when no free (agent, date) slot was found and the pair was forced.
    /// A degraded assignment may collide with another cluster's pair.
    pub degraded: bool,
}

/// Position of a location within its day route
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopNumber {
    /// 1-based visiting order
    Sequenced(u32),
    /// No computed order (location has no coordinates)
    Unsequenced,
}

impl StopNumber {
    pub const fn as_i32(self) -> i32 {
        match self {
            StopNumber::Sequenced(n) => n as i32,
            StopNumber::Unsequenced => UNSEQUENCED_STOP_NUMBER,
        }
    }

    pub const fn is_sequenced(self) -> bool {
        matches!(self, StopNumber::Sequenced(_))
    }
}

impl Serialize for StopNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

/// Week of month used in route codes: days 1-7 are week 1, 8-14 week 2, ...
pub fn week_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

/// Working-day number 1..=6, Monday = 1. Sunday folds onto 1.
pub fn weekday_code(date: NaiveDate) -> u32 {
    match date.weekday() {
        Weekday::Sun => 1,
        day => day.number_from_monday(),
    }
}

/// `{territory}_W{week:02}_D{weekday}`, or `W{week:02}_D{weekday}` without a territory
pub fn route_code(territory: &str, date: NaiveDate) -> String {
    let week = week_of_month(date);
    let weekday = weekday_code(date);
    if territory.is_empty() {
        format!("W{:02}_D{}", week, weekday)
    } else {
        format!("{}_W{:02}_D{}", territory, week, weekday)
    }
}

pub fn route_label(agent_id: &str, date: NaiveDate) -> String {
    format!("Prospect Route {} {}", agent_id, date.format("%Y-%m-%d"))
}

/// One persisted row of the route plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlanEntry {
    pub location_id: String,
    pub route_date: NaiveDate,
    pub name: String,
    pub weekday: u32,
    pub territory: String,
    pub agent_id: String,
    pub route_name: String,
    pub entity_id: String,
    pub route_code: String,
    pub stop_no: StopNumber,
    pub kind: LocationKind,
    pub zone_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_of_month_boundaries() {
        assert_eq!(week_of_month(date(2025, 3, 1)), 1);
        assert_eq!(week_of_month(date(2025, 3, 7)), 1);
        assert_eq!(week_of_month(date(2025, 3, 8)), 2);
        assert_eq!(week_of_month(date(2025, 3, 29)), 5);
        assert_eq!(week_of_month(date(2025, 3, 31)), 5);
    }

    #[test]
    fn test_route_code_with_territory() {
        // 2025-03-10 is a Monday in week 2
        assert_eq!(route_code("TER01", date(2025, 3, 10)), "TER01_W02_D1");
        // 2025-03-22 is a Saturday in week 4
        assert_eq!(route_code("TER01", date(2025, 3, 22)), "TER01_W04_D6");
    }

    #[test]
    fn test_weekday_code_stays_within_working_days() {
        assert_eq!(weekday_code(date(2025, 3, 10)), 1);
        assert_eq!(weekday_code(date(2025, 3, 15)), 6);
        // 2025-03-16 is a Sunday
        assert_eq!(weekday_code(date(2025, 3, 16)), 1);
        assert_eq!(route_code("TER01", date(2025, 3, 16)), "TER01_W03_D1");
    }

    #[test]
    fn test_route_code_without_territory() {
        assert_eq!(route_code("", date(2025, 3, 3)), "W01_D1");
    }

    #[test]
    fn test_unsequenced_stop_uses_sentinel() {
        assert_eq!(StopNumber::Unsequenced.as_i32(), UNSEQUENCED_STOP_NUMBER);
        assert_eq!(StopNumber::Sequenced(7).as_i32(), 7);
        assert!(StopNumber::Sequenced(60) < StopNumber::Unsequenced);
    }

    #[test]
    fn test_route_label() {
        assert_eq!(route_label("AG7", date(2025, 1, 5)), "Prospect Route AG7 2025-01-05");
    }
}
