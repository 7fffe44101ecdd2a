//! Reporting periods (year + quarter).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sub-period label within a year.
///
/// Declaration order is the chronological order, so the derived `Ord` is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn as_str(self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quarter {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" | "1" => Ok(Quarter::Q1),
            "Q2" | "2" => Ok(Quarter::Q2),
            "Q3" | "3" => Ok(Quarter::Q3),
            "Q4" | "4" => Ok(Quarter::Q4),
            _ => Err(PeriodParseError(s.to_string())),
        }
    }
}

/// A discrete reporting interval.
///
/// Field order matters: the derived `Ord` compares `year` first, then `quarter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: u16,
    pub quarter: Quarter,
}

impl Period {
    pub fn new(year: u16, quarter: Quarter) -> Self {
        Self { year, quarter }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.quarter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid period: {0:?} (expected e.g. 2024-Q3)")]
pub struct PeriodParseError(String);

impl FromStr for Period {
    type Err = PeriodParseError;

    /// Accepts `2024-Q3`, `2024Q3` and `2024-3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || PeriodParseError(s.to_string());
        let (year, quarter) = match s.split_once('-') {
            Some(parts) => parts,
            None => {
                let idx = s.find(['Q', 'q']).ok_or_else(err)?;
                s.split_at(idx)
            }
        };
        let year = year.parse::<u16>().map_err(|_| err())?;
        let quarter = quarter.parse::<Quarter>().map_err(|_| err())?;
        Ok(Period::new(year, quarter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn periods_order_by_year_then_quarter() {
        let mut periods = vec![
            Period::new(2024, Quarter::Q1),
            Period::new(2023, Quarter::Q4),
            Period::new(2024, Quarter::Q3),
            Period::new(2023, Quarter::Q1),
        ];
        periods.sort();
        assert_eq!(
            periods,
            vec![
                Period::new(2023, Quarter::Q1),
                Period::new(2023, Quarter::Q4),
                Period::new(2024, Quarter::Q1),
                Period::new(2024, Quarter::Q3),
            ]
        );
    }

    #[rstest]
    #[case::dashed("2024-Q3", Period::new(2024, Quarter::Q3))]
    #[case::compact("2024Q1", Period::new(2024, Quarter::Q1))]
    #[case::numeric("2023-4", Period::new(2023, Quarter::Q4))]
    #[case::lowercase("2022q2", Period::new(2022, Quarter::Q2))]
    fn parses_period(#[case] input: &str, #[case] expected: Period) {
        assert_eq!(input.parse::<Period>().unwrap(), expected);
    }

    #[rstest]
    #[case("2024")]
    #[case("2024-Q5")]
    #[case("abcd-Q1")]
    #[case("")]
    fn rejects_bad_period(#[case] input: &str) {
        assert!(input.parse::<Period>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        let p = Period::new(2021, Quarter::Q2);
        assert_eq!(p.to_string(), "2021-Q2");
        assert_eq!(p.to_string().parse::<Period>().unwrap(), p);
    }
}
