//! 頻道成員名單與權限判斷
//!
//! 只由 JOIN / PART / NICK / NAMES 回覆更新。
//! 一份 NAMES 名單可能分成多行 353，以 366 結束；
//! 名單開始時取代舊名單，之後的行只做累加。
//! 暱稱比較採用 ASCII 不分大小寫。

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

/// 名單中可能出現在暱稱前的身分符號
const ROLE_MARKERS: &[char] = &['~', '&', '@', '%', '+'];

/// 是否為頻道名稱
pub fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// 頻道成員名單
#[derive(Debug, Default, Clone)]
pub struct ChannelRoster {
    /// 頻道（小寫） -> 成員暱稱（小寫）
    channels: HashMap<String, HashSet<String>>,
    /// 具權限的頻道（小寫）
    privileged: HashSet<String>,
    /// 正在接收 NAMES 名單、尚未收到 366 的頻道（小寫）
    listing: HashSet<String>,
}

impl ChannelRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以具權限的頻道清單建立
    pub fn with_privileged<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            privileged: channels.into_iter().map(|c| fold(c.as_ref())).collect(),
            ..Self::default()
        }
    }

    /// 目標是否具權限
    ///
    /// 頻道目標：在具權限頻道清單中。
    /// 使用者目標：目前位於任一具權限頻道中。
    pub fn is_privileged(&self, target: &str) -> bool {
        let target = fold(target);
        if is_channel(&target) {
            return self.privileged.contains(&target);
        }
        self.privileged.iter().any(|channel| {
            self.channels
                .get(channel)
                .is_some_and(|members| members.contains(&target))
        })
    }

    pub fn join(&mut self, nick: &str, channel: &str) {
        debug!("{} 加入 {}", nick, channel);
        self.channels.entry(fold(channel)).or_default().insert(fold(nick));
    }

    pub fn part(&mut self, nick: &str, channel: &str) {
        let removed = self
            .channels
            .get_mut(&fold(channel))
            .is_some_and(|members| members.remove(&fold(nick)));
        if removed {
            debug!("{} 離開 {}", nick, channel);
        } else {
            warn!("{} 離開 {}，但不在名單中", nick, channel);
        }
    }

    /// 套用一行 NAMES 回覆 (353)
    ///
    /// 名單的第一行取代整個頻道名單，直到 [`end_names`](Self::end_names) 之前的行都累加上去。
    pub fn set_names(&mut self, channel: &str, names: &str) {
        let key = fold(channel);
        let names = names
            .split_whitespace()
            .map(|name| name.trim_start_matches(ROLE_MARKERS))
            .filter(|name| !name.is_empty())
            .map(fold);

        let members = self.channels.entry(key.clone()).or_default();
        if self.listing.insert(key) {
            members.clear();
        }
        members.extend(names);
        debug!("{} 名單目前 {} 人", channel, members.len());
    }

    /// NAMES 名單結束 (366)
    pub fn end_names(&mut self, channel: &str) {
        if self.listing.remove(&fold(channel)) {
            debug!("{} 名單接收完成", channel);
        }
    }

    /// 暱稱變更：在所有頻道中一次搬移
    pub fn nick_changed(&mut self, old: &str, new: &str) {
        let old = fold(old);
        let new = fold(new);
        for members in self.channels.values_mut() {
            if members.remove(&old) {
                members.insert(new.clone());
            }
        }
    }

    /// 頻道成員（排序後，小寫）
    pub fn members(&self, channel: &str) -> BTreeSet<String> {
        self.channels
            .get(&fold(channel))
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 重新連線時清除名單（保留權限設定）
    pub fn clear(&mut self) {
        self.channels.clear();
        self.listing.clear();
    }
}
