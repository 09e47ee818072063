//! Derived per-sample values that go into status records and summary reports.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// Percentage with two decimal places, stored as an integer number of hundredths.
/// All arithmetic is exact, so the same counts always produce the same text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Percent(u64);

impl Percent {
    /// Returns `part / total * 100`, rounded half-up to two decimals.
    /// Returns None if `total` is zero.
    pub fn of(part: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let num = u128::from(part) * 20_000 + u128::from(total);
        let den = 2 * u128::from(total);
        Some(Self(u64::try_from(num / den).unwrap_or(u64::MAX)))
    }

    pub fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    pub fn hundredths(self) -> u64 {
        self.0
    }
}

impl Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Parses decimal percentages such as `95.23`, `95.23%` or `7`.
/// Digits after the second decimal place are rounded half-up.
impl FromStr for Percent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('%');
        let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let is_digits = |t: &str| t.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() || !is_digits(int_part) || !is_digits(frac_part) {
            return Err(format!("Cannot parse percentage '{}'", s));
        }
        let int_val: u64 = int_part.parse().map_err(|_| format!("Percentage '{}' is too large", s))?;
        let mut frac = frac_part.bytes().map(|b| u64::from(b - b'0'));
        let first = frac.next().unwrap_or(0);
        let second = frac.next().unwrap_or(0);
        let round_up = frac.next().map(|d| d >= 5).unwrap_or(false);
        int_val.checked_mul(100)
            .and_then(|v| v.checked_add(first * 10 + second + u64::from(round_up)))
            .map(Self)
            .ok_or_else(|| format!("Percentage '{}' is too large", s))
    }
}

/// Ordered list of named values, for example `("Retention rate", "95.00%")`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metrics(Vec<(String, String)>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new value. If the key was already present, its value is replaced.
    pub fn push(&mut self, key: impl Into<String>, value: impl Display) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Adds a percentage, or `NA` if the total is zero.
    pub fn push_percent(&mut self, key: impl Into<String>, part: u64, total: u64) {
        match Percent::of(part, total) {
            Some(perc) => self.push(key, perc),
            None => self.push(key, "NA"),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounding() {
        assert_eq!(Percent::of(950, 1000).unwrap().to_string(), "95.00%");
        assert_eq!(Percent::of(1, 3).unwrap().to_string(), "33.33%");
        assert_eq!(Percent::of(2, 3).unwrap().to_string(), "66.67%");
        // 1/8 = 12.5%, 1/800 = 0.125% -> rounded up.
        assert_eq!(Percent::of(1, 800).unwrap().to_string(), "0.13%");
        assert_eq!(Percent::of(0, 5).unwrap().to_string(), "0.00%");
        assert_eq!(Percent::of(7, 7).unwrap().to_string(), "100.00%");
        assert!(Percent::of(0, 0).is_none());
    }

    #[test]
    fn percent_within_bounds() {
        let totals = [1_u64, 2, 3, 7, 999, 1000, 123_456_789, u64::MAX];
        for &total in totals.iter() {
            for part in [0, 1, total / 3, total / 2, total.saturating_sub(1), total] {
                let perc = Percent::of(part, total).unwrap();
                assert!(perc.hundredths() <= 100_00, "{} / {} -> {}", part, total, perc);
                assert_eq!(perc, Percent::of(part, total).unwrap());
            }
        }
    }

    #[test]
    fn percent_parse() {
        assert_eq!("95.23".parse::<Percent>().unwrap().hundredths(), 9523);
        assert_eq!("95.23%".parse::<Percent>().unwrap().hundredths(), 9523);
        assert_eq!("7".parse::<Percent>().unwrap().to_string(), "7.00%");
        assert_eq!("0.5".parse::<Percent>().unwrap().to_string(), "0.50%");
        assert_eq!("12.345".parse::<Percent>().unwrap().to_string(), "12.35%");
        assert!("abc".parse::<Percent>().is_err());
        assert!(".5".parse::<Percent>().is_err());
        assert_eq!("184467440737095516.15".parse::<Percent>().unwrap().hundredths(), u64::MAX);
        assert!("184467440737095516.16".parse::<Percent>().is_err());
        assert!("999999999999999999.5".parse::<Percent>().is_err());
    }

    #[test]
    fn metrics_keep_order() {
        let mut m = Metrics::new();
        m.push("Raw reads", 1000);
        m.push_percent("Retention rate", 0, 0);
        m.push("Raw reads", 1001);
        let v: Vec<_> = m.iter().collect();
        assert_eq!(v, vec![("Raw reads", "1001"), ("Retention rate", "NA")]);
        assert_eq!(m.get("Retention rate"), Some("NA"));
    }
}
