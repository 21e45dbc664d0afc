//! 종목 심볼 정의.
//!
//! 심볼은 저장소와 가용성 인덱스 양쪽의 키로 사용되는 불투명한 문자열입니다.
//! 생성 시 앞뒤 공백을 제거하고 대문자로 정규화합니다.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 거래 가능한 종목의 심볼 (예: AAPL, BRK.B).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// 새 심볼을 생성합니다.
    pub fn new(raw: impl AsRef<str>) -> CoreResult<Self> {
        let normalized = raw.as_ref().trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(CoreError::EmptySymbol);
        }
        Ok(Self(normalized))
    }

    /// 정규화된 심볼 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 쉼표로 구분된 심볼 목록을 파싱합니다 (예: "AAPL,msft, tsla").
    ///
    /// 빈 항목은 무시하고 중복은 제거합니다.
    pub fn parse_list(s: &str) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = s.split(',').filter_map(|p| Symbol::new(p).ok()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
