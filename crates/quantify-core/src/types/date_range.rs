//! 양 끝을 포함하는 달력 날짜 범위.

use crate::error::{CoreError, CoreResult};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `[start, end]` 날짜 범위 (양 끝 포함, 시각 없음).
///
/// 생성 시 `start <= end`를 보장합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// 새 날짜 범위를 생성합니다.
    pub fn new(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// 하루짜리 범위.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// 범위에 포함된 달력 일수.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// `other`가 이 범위 안에 완전히 들어가는지 확인합니다.
    pub fn covers(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// 두 범위가 겹치거나 달력상 바로 붙어 있는지 확인합니다.
    pub fn touches(&self, other: &DateRange) -> bool {
        self.start <= other.end + Duration::days(1) && other.start <= self.end + Duration::days(1)
    }

    /// 두 범위의 최소/최대 경계를 합친 범위.
    ///
    /// 떨어져 있는 범위라도 사이 구간을 포함한 하나의 범위를 반환합니다.
    pub fn hull(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// 범위 안의 모든 달력 날짜를 순서대로 순회합니다.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_range_rejects_inverted() {
        assert!(DateRange::new(d(2021, 1, 8), d(2021, 1, 4)).is_err());
        assert!(DateRange::new(d(2021, 1, 4), d(2021, 1, 4)).is_ok());
    }

    #[test]
    fn test_range_days() {
        let range = DateRange::new(d(2021, 1, 30), d(2021, 2, 2)).unwrap();
        assert_eq!(range.num_days(), 4);
        let days: Vec<_> = range.days().collect();
        assert_eq!(days, vec![d(2021, 1, 30), d(2021, 1, 31), d(2021, 2, 1), d(2021, 2, 2)]);
    }

    #[test]
    fn test_range_touches() {
        let a = DateRange::new(d(2021, 1, 4), d(2021, 1, 8)).unwrap();
        let abutting = DateRange::new(d(2021, 1, 9), d(2021, 1, 12)).unwrap();
        let apart = DateRange::new(d(2021, 1, 10), d(2021, 1, 12)).unwrap();

        assert!(a.touches(&abutting));
        assert!(abutting.touches(&a));
        assert!(!a.touches(&apart));
    }

    #[test]
    fn test_range_hull_and_covers() {
        let a = DateRange::new(d(2021, 1, 4), d(2021, 1, 8)).unwrap();
        let b = DateRange::new(d(2021, 1, 6), d(2021, 1, 15)).unwrap();
        let hull = a.hull(&b);
        assert_eq!(hull, DateRange::new(d(2021, 1, 4), d(2021, 1, 15)).unwrap());
        assert!(hull.covers(&a));
        assert!(hull.covers(&b));
        assert!(!a.covers(&b));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn range_strategy() -> impl Strategy<Value = DateRange> {
            (0i64..2000, 0i64..400).prop_map(|(offset, len)| {
                let start = d(2015, 1, 1) + Duration::days(offset);
                DateRange::new(start, start + Duration::days(len)).unwrap()
            })
        }

        proptest! {
            #[test]
            fn hull_covers_both(a in range_strategy(), b in range_strategy()) {
                let hull = a.hull(&b);
                prop_assert!(hull.covers(&a));
                prop_assert!(hull.covers(&b));
                prop_assert_eq!(hull, b.hull(&a));
            }

            #[test]
            fn days_matches_num_days(a in range_strategy()) {
                prop_assert_eq!(a.days().count() as i64, a.num_days());
            }

            #[test]
            fn covering_implies_touching(a in range_strategy(), b in range_strategy()) {
                if a.covers(&b) {
                    prop_assert!(a.touches(&b));
                }
            }
        }
    }
}
