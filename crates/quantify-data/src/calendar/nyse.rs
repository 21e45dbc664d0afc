//! 미국 주식시장(NYSE/NASDAQ) 거래 캘린더.
//!
//! 외부 API 없이 규칙으로 휴장일을 계산합니다:
//! - 주말은 항상 휴장
//! - 연방 시장 휴일 (토요일이면 금요일, 일요일이면 월요일로 대체)
//! - 1월 1일이 토요일이면 전년도 12월 31일은 대체 휴장하지 않음
//! - Good Friday (부활절 2일 전)
//! - Juneteenth (2022년부터)
//! - 특별 휴장일 (9/11, 허리케인 샌디, 전직 대통령 국장 등)

use super::TradingCalendar;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// 규칙 기반 미국 주식시장 캘린더.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsEquityCalendar;

/// 정규 휴일 외의 전일 휴장일 (연, 월, 일).
const SPECIAL_CLOSURES: &[(i32, u32, u32)] = &[
    (1994, 4, 27),  // 닉슨 국장
    (2001, 9, 11),  // 9/11 테러
    (2001, 9, 12),
    (2001, 9, 13),
    (2001, 9, 14),
    (2004, 6, 11),  // 레이건 국장
    (2007, 1, 2),   // 포드 국장
    (2012, 10, 29), // 허리케인 샌디
    (2012, 10, 30),
    (2018, 12, 5),  // 부시 국장
    (2025, 1, 9),   // 카터 국장
];

impl UsEquityCalendar {
    /// 해당 연도의 평일 휴장일 목록을 계산합니다.
    pub fn holidays(year: i32) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = Vec::with_capacity(12);

        // 신정: 토요일이면 대체 휴장 없음
        if let Some(new_year) = NaiveDate::from_ymd_opt(year, 1, 1) {
            match new_year.weekday() {
                Weekday::Sat => {}
                Weekday::Sun => days.push(new_year + Duration::days(1)),
                _ => days.push(new_year),
            }
        }

        if year >= 1998 {
            days.extend(nth_weekday(year, 1, Weekday::Mon, 3)); // 마틴 루터 킹 데이
        }
        days.extend(nth_weekday(year, 2, Weekday::Mon, 3)); // 대통령의 날
        days.extend(easter_sunday(year).map(|d| d - Duration::days(2))); // Good Friday
        days.extend(last_weekday(year, 5, Weekday::Mon)); // 메모리얼 데이
        if year >= 2022 {
            days.extend(observed(year, 6, 19)); // Juneteenth
        }
        days.extend(observed(year, 7, 4)); // 독립기념일
        days.extend(nth_weekday(year, 9, Weekday::Mon, 1)); // 노동절
        days.extend(nth_weekday(year, 11, Weekday::Thu, 4)); // 추수감사절
        days.extend(observed(year, 12, 25)); // 크리스마스

        days.extend(
            SPECIAL_CLOSURES
                .iter()
                .filter(|(y, _, _)| *y == year)
                .filter_map(|(y, m, d)| NaiveDate::from_ymd_opt(*y, *m, *d)),
        );

        days.sort();
        days.dedup();
        days
    }

    fn is_holiday(date: NaiveDate) -> bool {
        Self::holidays(date.year()).contains(&date)
    }
}

impl TradingCalendar for UsEquityCalendar {
    fn name(&self) -> &str {
        "US_EQUITY"
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !Self::is_holiday(date)
    }

    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        // 연도별 휴일을 한 번만 계산
        let mut holidays: Vec<NaiveDate> = Vec::new();
        for year in start.year()..=end.year() {
            holidays.extend(Self::holidays(year));
        }

        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| !is_weekend(*d) && holidays.binary_search(d).is_err())
            .collect()
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 해당 월의 n번째 요일.
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

/// 해당 월의 마지막 요일.
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

/// 주말에 걸린 고정 휴일의 대체 휴장일.
fn observed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    })
}

/// 그레고리력 부활절 (익명 알고리즘).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
