//! 倒數清單
//!
//! 依時間排序的事件；編號為排序後從 1 開始的位置。
//! 過期超過 30 分鐘的事件會在列出或移除前自動清除。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::args::EventTime;
use crate::store::{Backing, StoreError};

/// 過期多久後清除（分鐘）
const EXPIRY_MINUTES: i64 = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CountdownError {
    #[error("編號超出範圍")]
    OutOfBounds,
}

/// 倒數事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub at: DateTime<Utc>,
}

/// 倒數清單的存取介面
pub trait CountdownStore: Send {
    /// 列出所有事件的倒數訊息
    fn list_events(&mut self, now: DateTime<Utc>) -> Vec<String>;

    fn add_event(&mut self, when: EventTime, name: &str, now: DateTime<Utc>);

    /// 移除指定編號；任一編號超出範圍時不移除任何事件
    fn remove_events(&mut self, ids: &[usize], now: DateTime<Utc>) -> Result<Vec<String>, CountdownError>;
}

/// 記憶體中的倒數清單，可選擇寫入 JSON 檔
#[derive(Debug, Default)]
pub struct CountdownBoard {
    events: Vec<Event>,
    backing: Backing,
}

impl CountdownBoard {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 開啟清單，檔案存在時載入既有事件
    pub fn open(backing: Backing) -> Result<Self, StoreError> {
        let mut events: Vec<Event> = backing.load()?.unwrap_or_default();
        events.sort_by_key(|e| e.at);
        debug!("載入 {} 個倒數事件", events.len());
        Ok(Self { events, backing })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn insert(&mut self, event: Event) {
        let pos = self.events.partition_point(|e| e.at <= event.at);
        self.events.insert(pos, event);
    }

    /// 清除已過期的事件
    fn prune(&mut self, now: DateTime<Utc>) {
        let before = self.events.len();
        self.events
            .retain(|e| (now - e.at).num_seconds() / 60 <= EXPIRY_MINUTES);
        if self.events.len() != before {
            debug!("清除 {} 個過期事件", before - self.events.len());
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.backing.save(&self.events) {
            warn!("倒數清單寫入失敗: {}", e);
        }
    }
}

impl CountdownStore for CountdownBoard {
    fn list_events(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.prune(now);
        if self.events.is_empty() {
            return vec!["No upcoming events.".to_string()];
        }
        self.events
            .iter()
            .enumerate()
            .map(|(i, event)| countdown_line(event, i + 1, now))
            .collect()
    }

    fn add_event(&mut self, when: EventTime, name: &str, now: DateTime<Utc>) {
        let event = Event {
            name: name.to_string(),
            at: when.resolve(now),
        };
        debug!("新增倒數事件: {} at {}", event.name, event.at);
        self.insert(event);
        self.persist();
    }

    fn remove_events(&mut self, ids: &[usize], now: DateTime<Utc>) -> Result<Vec<String>, CountdownError> {
        self.prune(now);

        let mut ids = ids.to_vec();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        if ids.is_empty() || ids.iter().any(|&id| id == 0 || id > self.events.len()) {
            return Err(CountdownError::OutOfBounds);
        }

        let replies = ids
            .iter()
            .map(|&id| {
                let event = self.events.remove(id - 1);
                format!("Removed: {} (ID:{}).", event.name, id)
            })
            .collect();
        self.persist();
        Ok(replies)
    }
}

fn countdown_line(event: &Event, id: usize, now: DateTime<Utc>) -> String {
    let delta = event.at - now;
    if delta > Duration::zero() {
        let secs = delta.num_seconds();
        format!(
            "{:4}d {:2}h {:2}m until {} at {} UTC (ID:{})",
            secs / 86_400,
            secs % 86_400 / 3_600,
            secs % 3_600 / 60,
            event.name,
            event.at.format("%Y-%m-%dT%H:%M"),
            id
        )
    } else {
        format!("   IT'S HAPPENING: \"{}\" (ID:{})", event.name, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn board_with(names: &[&str]) -> CountdownBoard {
        let mut board = CountdownBoard::in_memory();
        for (i, name) in names.iter().enumerate() {
            board.add_event(EventTime::At(at(12, i as u32)), name, at(0, 0));
        }
        board
    }

    fn names(board: &CountdownBoard) -> Vec<&str> {
        board.events().iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_empty_board() {
        let mut board = CountdownBoard::in_memory();
        assert_eq!(board.list_events(at(0, 0)), vec!["No upcoming events."]);
    }

    #[test]
    fn test_future_event_line() {
        let mut board = CountdownBoard::in_memory();
        let now = Utc.with_ymd_and_hms(2023, 12, 30, 7, 55, 0).unwrap();
        board.add_event(EventTime::At(at(10, 0)), "Fleet Up", now);
        assert_eq!(
            board.list_events(now),
            vec!["   2d  2h  5m until Fleet Up at 2024-01-01T10:00 UTC (ID:1)"]
        );
    }

    #[test]
    fn test_happening_within_grace_window() {
        let mut board = CountdownBoard::in_memory();
        board.add_event(EventTime::At(at(10, 0)), "Fleet Up", at(9, 0));
        assert_eq!(
            board.list_events(at(10, 0)),
            vec!["   IT'S HAPPENING: \"Fleet Up\" (ID:1)"]
        );
        assert_eq!(
            board.list_events(at(10, 30)),
            vec!["   IT'S HAPPENING: \"Fleet Up\" (ID:1)"]
        );
    }

    #[test]
    fn test_expired_event_is_removed() {
        let mut board = CountdownBoard::in_memory();
        board.add_event(EventTime::At(at(10, 0)), "Fleet Up", at(9, 0));
        assert_eq!(board.list_events(at(10, 31)), vec!["No upcoming events."]);
        assert!(board.is_empty());
    }

    #[test]
    fn test_events_sorted_by_time() {
        let mut board = CountdownBoard::in_memory();
        let now = at(0, 0);
        board.add_event(EventTime::At(at(12, 0)), "late", now);
        board.add_event(EventTime::In(Duration::hours(1)), "early", now);
        board.add_event(EventTime::At(at(12, 0)), "late too", now);
        assert_eq!(names(&board), vec!["early", "late", "late too"]);
        let lines = board.list_events(now);
        assert!(lines[0].contains("early") && lines[0].ends_with("(ID:1)"));
        assert!(lines[2].contains("late too") && lines[2].ends_with("(ID:3)"));
    }

    #[test]
    fn test_remove_descending_and_renumber() {
        let mut board = board_with(&["one", "two", "three", "four", "five"]);
        let replies = board.remove_events(&[2, 4], at(0, 0)).unwrap();
        assert_eq!(replies, vec!["Removed: four (ID:4).", "Removed: two (ID:2)."]);
        assert_eq!(names(&board), vec!["one", "three", "five"]);
        let lines = board.list_events(at(0, 0));
        assert!(lines[1].contains("three") && lines[1].ends_with("(ID:2)"));
    }

    #[test]
    fn test_out_of_bounds_removes_nothing() {
        let mut board = board_with(&["one", "two"]);
        assert_eq!(
            board.remove_events(&[1, 3], at(0, 0)),
            Err(CountdownError::OutOfBounds)
        );
        assert_eq!(
            board.remove_events(&[0], at(0, 0)),
            Err(CountdownError::OutOfBounds)
        );
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_names_keep_case() {
        let mut board = CountdownBoard::in_memory();
        board.add_event(EventTime::In(Duration::hours(1)), "Fleet Up http://x.example/AbC", at(0, 0));
        assert_eq!(board.events()[0].name, "Fleet Up http://x.example/AbC");
    }

    #[test]
    fn test_persisted_board_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("botcore-countdown-{}", std::process::id()))
            .join("ops.json");
        let mut board = CountdownBoard::open(Backing::file(&path)).unwrap();
        board.add_event(EventTime::At(at(12, 0)), "Fleet Up", at(0, 0));

        let reopened = CountdownBoard::open(Backing::file(&path)).unwrap();
        assert_eq!(names(&reopened), vec!["Fleet Up"]);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
