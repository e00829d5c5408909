//! 塔台紀錄
//!
//! 記錄每座塔最後一次檢查的時間。塔名一律轉為大寫並去除前後空白。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{Backing, StoreError};

const CHECK_FORMAT: &str = "%b %d at %H:%M UTC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tower {
    pub name: String,
    pub last_checked: Option<DateTime<Utc>>,
}

/// 塔台紀錄
#[derive(Debug, Default)]
pub struct TowerLedger {
    towers: Vec<Tower>,
    backing: Backing,
}

fn normalize(name: &str) -> String {
    name.trim().to_uppercase()
}

impl TowerLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(backing: Backing) -> Result<Self, StoreError> {
        let towers: Vec<Tower> = backing.load()?.unwrap_or_default();
        debug!("載入 {} 座塔", towers.len());
        Ok(Self { towers, backing })
    }

    pub fn towers(&self) -> &[Tower] {
        &self.towers
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Tower> {
        self.towers.iter_mut().find(|t| t.name == name)
    }

    pub fn add(&mut self, name: &str) -> String {
        let name = normalize(name);
        if self.towers.iter().any(|t| t.name == name) {
            return format!("'{}' already exists.", name);
        }
        self.towers.push(Tower {
            name: name.clone(),
            last_checked: None,
        });
        self.persist();
        format!("Added: '{}'", name)
    }

    pub fn remove(&mut self, name: &str) -> String {
        let name = normalize(name);
        let before = self.towers.len();
        self.towers.retain(|t| t.name != name);
        if self.towers.len() == before {
            return format!("'{}' doesn't exist to delete.", name);
        }
        self.persist();
        format!("Removed: '{}'", name)
    }

    /// 標記為已檢查
    pub fn mark(&mut self, name: &str, now: DateTime<Utc>) -> String {
        let name = normalize(name);
        let Some(tower) = self.find_mut(&name) else {
            return format!("'{}' doesn't exist to mark.", name);
        };
        tower.last_checked = Some(now);
        self.persist();
        format!("{} marked as checked on {}.", name, now.format(CHECK_FORMAT))
    }

    /// 列出所有塔；從未檢查的在前，其餘依檢查時間由舊到新
    pub fn list(&self, now: DateTime<Utc>) -> Vec<String> {
        if self.towers.is_empty() {
            return vec!["Not tracking any towers yet.".to_string()];
        }

        let mut towers: Vec<&Tower> = self.towers.iter().collect();
        towers.sort_by_key(|t| t.last_checked);

        let mut lines: Vec<String> = towers
            .iter()
            .map(|t| match t.last_checked {
                Some(at) => format!("{} checked on {}.", t.name, at.format(CHECK_FORMAT)),
                None => format!("{} never checked.", t.name),
            })
            .collect();
        lines.push(format!("It is now {}.", now.format(CHECK_FORMAT)));
        lines
    }

    fn persist(&self) {
        if let Err(e) = self.backing.save(&self.towers) {
            warn!("塔台紀錄寫入失敗: {}", e);
        }
    }
}
