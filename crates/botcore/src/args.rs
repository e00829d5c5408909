//! 指令參數文法
//!
//! `.addop` 的時間參數、`.rmop` 的編號清單，以及以 `"; "` 分隔的多值參數。

use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use thiserror::Error;

/// 多值參數的分隔字串
pub const ITEM_SEPARATOR: &str = "; ";

/// 參數錯誤；一律以用法提示回覆
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("缺少參數")]
    Missing,

    #[error("參數格式不符: {0}")]
    Malformed(String),

    #[error("無效的日期時間: {0}")]
    InvalidDate(String),

    #[error("無效的編號: {0}")]
    InvalidId(String),
}

/// 事件時間：絕對時間或相對於現在的時間長度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    At(DateTime<Utc>),
    In(Duration),
}

impl EventTime {
    /// 換算為絕對時間
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            EventTime::At(at) => *at,
            EventTime::In(delta) => now + *delta,
        }
    }
}

fn absolute_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})[@Tt](\d{1,2}):(\d{1,2}) (.+)$").unwrap()
    })
}

fn relative_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,3})[dD](\d{1,2})[hH](\d{1,2})[mM] (.+)$").unwrap())
}

/// 解析 `.addop` 參數
///
/// 接受 `YYYY-M-D@H:M <name>` 或 `<d>d<h>h<m>m <name>`。
///
/// # Example
/// ```
/// use botcore::args::{parse_event, EventTime};
/// use chrono::Duration;
///
/// let (when, name) = parse_event("1d2h3m Fleet Up").unwrap();
/// assert_eq!(when, EventTime::In(Duration::minutes(24 * 60 + 2 * 60 + 3)));
/// assert_eq!(name, "Fleet Up");
/// assert!(parse_event("banana").is_err());
/// ```
pub fn parse_event(arg: &str) -> Result<(EventTime, String), ArgumentError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(ArgumentError::Missing);
    }

    if let Some(caps) = relative_pattern().captures(arg) {
        let days = number(&caps[1])?;
        let hours = number(&caps[2])?;
        let minutes = number(&caps[3])?;
        let delta = Duration::days(days) + Duration::hours(hours) + Duration::minutes(minutes);
        return Ok((EventTime::In(delta), event_name(&caps[4])?));
    }

    if let Some(caps) = absolute_pattern().captures(arg) {
        let year = number(&caps[1])? as i32;
        let month = number(&caps[2])? as u32;
        let day = number(&caps[3])? as u32;
        let hour = number(&caps[4])? as u32;
        let minute = number(&caps[5])? as u32;
        let at = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .ok_or_else(|| ArgumentError::InvalidDate(arg.to_string()))?
            .and_utc();
        return Ok((EventTime::At(at), event_name(&caps[6])?));
    }

    Err(ArgumentError::Malformed(arg.to_string()))
}

fn number(digits: &str) -> Result<i64, ArgumentError> {
    digits
        .parse()
        .map_err(|_| ArgumentError::Malformed(digits.to_string()))
}

fn event_name(raw: &str) -> Result<String, ArgumentError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ArgumentError::Missing);
    }
    Ok(name.to_string())
}

/// 解析 `.rmop` 的編號清單
///
/// 以 `"; "` 分隔，每個編號必須為正整數；去除重複後由大到小排序。
pub fn parse_ids(arg: &str) -> Result<Vec<usize>, ArgumentError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(ArgumentError::Missing);
    }

    let mut ids = arg
        .split(ITEM_SEPARATOR)
        .map(|raw| {
            let raw = raw.trim();
            match raw.parse::<usize>() {
                Ok(id) if id > 0 => Ok(id),
                _ => Err(ArgumentError::InvalidId(raw.to_string())),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.dedup();
    Ok(ids)
}

/// 以 `"; "` 分隔多值參數，保留順序並略過空白項目
pub fn split_items(arg: &str) -> Vec<String> {
    arg.split(ITEM_SEPARATOR)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
