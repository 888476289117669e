use chrono::NaiveTime;
use regex::Regex;
use std::sync::LazyLock;

use crate::types::{FormResult, ScoringAverages};

static RECORD_CJK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*勝\s*(\d+)\s*敗").expect("valid record regex"));
static RECORD_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*[-–—]\s*(\d+)").expect("valid record regex"));
static STREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(\d+)\s*連(勝|敗))|(?:\b([WLwl])\s*(\d+)\b)").expect("valid streak regex")
});
static AVERAGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)").expect("valid averages regex")
});
// `1,85` or `228,5`: a comma followed by fewer than three trailing digits is
// a decimal mark, not a thousands separator.
static DECIMAL_COMMA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d\s*[,，]\s*\d{1,2}\s*$").expect("valid decimal comma regex")
});
static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*[:：]\s*(\d{2})").expect("valid time regex"));

/// Folds fullwidth digits and punctuation to ASCII and drops thousand separators.
pub fn normalize_digits(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            '．' => Some('.'),
            '－' | '−' => Some('-'),
            '＋' => Some('+'),
            '／' => Some('/'),
            ',' | '，' | '_' | '\u{2009}' | '\u{202f}' => None,
            c => Some(c),
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Integer count such as a score. Signed so callers can reject negatives explicitly.
pub fn parse_count(raw: &str) -> Option<i64> {
    let cleaned = normalize_digits(raw);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok()
}

/// A win-loss line plus the current streak, if the source printed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRecord {
    pub wins: u32,
    pub losses: u32,
    pub streak: Option<(FormResult, u32)>,
}

/// Accepts `30勝25敗`, `33 - 19`, `客12 - 13` and `8 - 2 , 5連勝` (also `W5` / `L3`).
pub fn parse_record(raw: &str) -> Option<ParsedRecord> {
    let text = normalize_digits(raw);
    let caps = RECORD_CJK
        .captures(&text)
        .or_else(|| RECORD_DASH.captures(&text))?;
    let wins = caps[1].parse().ok()?;
    let losses = caps[2].parse().ok()?;
    let tail = &text[caps.get(0).map_or(0, |m| m.end())..];

    let streak = STREAK.captures(tail).and_then(|s| {
        let (result, len) = match (s.get(1), s.get(2), s.get(3), s.get(4)) {
            (Some(n), Some(kind), _, _) => (kind.as_str() == "勝", n.as_str()),
            (_, _, Some(kind), Some(n)) => (kind.as_str().eq_ignore_ascii_case("w"), n.as_str()),
            _ => return None,
        };
        let len = len.parse::<u32>().ok()?;
        let result = if result { FormResult::Win } else { FormResult::Loss };
        Some((result, len))
    });

    Some(ParsedRecord {
        wins,
        losses,
        streak,
    })
}

/// Any price notation to decimal odds: American `+150`/`-120`, decimal `1.85`, fractional `5/2`.
pub fn parse_price(raw: &str) -> Option<f64> {
    if DECIMAL_COMMA.is_match(raw) {
        return None;
    }
    let text = normalize_digits(raw);
    if text.is_empty() {
        return None;
    }

    if let Some((num, den)) = text.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if num < 0.0 || den <= 0.0 {
            return None;
        }
        return Some(1.0 + num / den);
    }

    let value: f64 = text.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let american = text.starts_with('+') || text.starts_with('-') || value.abs() >= 100.0;
    if american {
        if value >= 100.0 {
            Some(1.0 + value / 100.0)
        } else if value <= -100.0 {
            Some(1.0 + 100.0 / value.abs())
        } else {
            None
        }
    } else if value > 1.0 {
        Some(value)
    } else {
        None
    }
}

/// Home handicap. `½` is accepted, and a zero line means none was posted.
pub fn parse_spread(raw: &str) -> Option<f64> {
    if DECIMAL_COMMA.is_match(raw) {
        return None;
    }
    let mut text = normalize_digits(raw);
    let half = text.ends_with('½');
    if half {
        text.pop();
    }
    let mut value = match text.as_str() {
        "" | "+" => 0.0,
        "-" => -0.0,
        t => t.parse::<f64>().ok()?,
    };
    if half {
        value += if text.starts_with('-') { -0.5 } else { 0.5 };
    }
    (value.is_finite() && value != 0.0).then_some(value)
}

pub fn parse_decimal(raw: &str) -> Option<f64> {
    if DECIMAL_COMMA.is_match(raw) {
        return None;
    }
    let text = normalize_digits(raw);
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `113.5 / 108.2` as points scored / allowed per game.
pub fn parse_averages(raw: &str) -> Option<ScoringAverages> {
    let text = normalize_digits(raw);
    let caps = AVERAGES.captures(&text)?;
    Some(ScoringAverages {
        scored: caps[1].parse().ok()?,
        allowed: caps[2].parse().ok()?,
    })
}

pub fn parse_start_time(raw: &str) -> Option<NaiveTime> {
    let text = normalize_digits(raw);
    let caps = CLOCK.captures(&text)?;
    NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
}

/// Trims, collapses whitespace and strips invisible characters. Placeholders map to `None`.
pub fn fold_team_name(raw: &str) -> Option<String> {
    let visible: String = raw
        .chars()
        .map(|c| match c {
            '\u{00a0}' | '\u{3000}' => ' ',
            c => c,
        })
        .filter(|c| !matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}'))
        .collect();
    let folded = visible.split_whitespace().collect::<Vec<_>>().join(" ");
    match folded.as_str() {
        "" | "—" | "-" | "--" => None,
        _ => Some(folded),
    }
}
