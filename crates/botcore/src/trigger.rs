//! Trigger（觸發器）模組
//!
//! 比對聊天訊息內容，決定要執行哪些指令。
//! 指令表在啟動時建立一次，之後唯讀共用。

use regex::Regex;

use crate::collab::{GameServer, MarketHub};

/// 觸發器動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// `.time`
    UtcTime,
    /// `.upladtime`
    IsoTime,
    /// `.jita` 等市場價格查詢
    PriceCheck(MarketHub),
    /// 訊息中的網址標題
    UrlTitles,
    /// `.eve` / `.sisi` 伺服器狀態
    ServerStatus(GameServer),
    /// `(notice) ...` 轉為 NOTICE
    NoticeRelay,
    Help,
    ListOps,
    AddOp,
    RemoveOps,
    ListTowers,
    AddTower,
    RemoveTower,
    MarkTower,
}

/// 指令是否需要參數（註冊時決定）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// 指令後不可有任何內容
    Bare,
    /// 指令後的其餘文字為參數
    Text,
}

/// 觸發器匹配模式
#[derive(Debug, Clone)]
pub enum TriggerPattern {
    /// 以 `.` 開頭的指令字，與訊息的第一個詞比對
    Command { word: String, arity: Arity },
    /// 訊息中所有符合的片段
    FindAll(String),
    /// 整段訊息的正則表達式，取出捕獲群組
    Regex(String),
}

/// 權限閘門
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Public,
    /// 回覆目標不具權限時靜默略過
    Privileged,
}

/// 觸發器匹配結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerMatch {
    Bare,
    Argument(String),
    /// 指令字相符但沒有參數
    MissingArgument,
    Captures(Vec<String>),
}

/// 觸發器定義
#[derive(Debug, Clone)]
pub struct Trigger {
    /// 觸發器名稱
    pub name: String,
    /// 匹配模式
    pub pattern: TriggerPattern,
    /// 執行動作
    pub action: TriggerAction,
    pub gate: Gate,
    /// 參數錯誤時的用法提示
    pub usage: Option<String>,
    /// `.help` 中顯示的說明（僅具權限指令）
    pub help: Option<String>,
    /// 編譯後的正則（內部使用）
    compiled_regex: Option<Regex>,
}

impl Trigger {
    /// 創建新的觸發器
    pub fn new(name: impl Into<String>, pattern: TriggerPattern, action: TriggerAction) -> Self {
        let compiled = match &pattern {
            TriggerPattern::Regex(re) | TriggerPattern::FindAll(re) => Regex::new(re).ok(),
            TriggerPattern::Command { .. } => None,
        };

        Self {
            name: name.into(),
            pattern,
            action,
            gate: Gate::Public,
            usage: None,
            help: None,
            compiled_regex: compiled,
        }
    }

    /// 以指令字建立
    pub fn command(word: &str, arity: Arity, action: TriggerAction) -> Self {
        Self::new(
            word,
            TriggerPattern::Command {
                word: word.to_string(),
                arity,
            },
            action,
        )
    }

    pub fn privileged(mut self) -> Self {
        self.gate = Gate::Privileged;
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// 嘗試匹配訊息
    pub fn try_match(&self, message: &str) -> Option<TriggerMatch> {
        match &self.pattern {
            TriggerPattern::Command { word, arity } => {
                let (head, rest) = message.split_once(' ').unwrap_or((message, ""));
                if head != word {
                    return None;
                }
                let rest = rest.trim();
                match (arity, rest.is_empty()) {
                    (Arity::Bare, true) => Some(TriggerMatch::Bare),
                    (Arity::Bare, false) => None,
                    (Arity::Text, true) => Some(TriggerMatch::MissingArgument),
                    (Arity::Text, false) => Some(TriggerMatch::Argument(rest.to_string())),
                }
            }
            TriggerPattern::FindAll(_) => {
                let regex = self.compiled_regex.as_ref()?;
                let found: Vec<String> = regex
                    .find_iter(message)
                    .map(|m| m.as_str().to_string())
                    .collect();
                (!found.is_empty()).then_some(TriggerMatch::Captures(found))
            }
            TriggerPattern::Regex(_) => {
                let regex = self.compiled_regex.as_ref()?;
                let captures = regex.captures(message)?;

                let groups: Vec<String> = captures
                    .iter()
                    .skip(1)
                    .filter_map(|m| m.map(|m| m.as_str().to_string()))
                    .collect();

                Some(TriggerMatch::Captures(groups))
            }
        }
    }
}

/// 公開指令一覽（`.help` 的第一行）
pub const PUBLIC_HELP: &str = ".jita, .amarr, .dodixie, .rens, .hek, .time, .upladtime, .eve, .sisi";

const URL_PATTERN: &str = r"https?://\S+";
const NOTICE_PATTERN: &str = r"^ ?\(notice\) (.+)$";
const PRICE_USAGE: &str = "Usage: .jita|amarr|dodixie|hek|rens <item_name>";

/// 指令表，依註冊順序比對與執行
#[derive(Debug, Default, Clone)]
pub struct CommandTable {
    triggers: Vec<Trigger>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 標準指令表
    pub fn standard() -> Self {
        let mut table = Self::new();

        table.add(Trigger::command(".time", Arity::Bare, TriggerAction::UtcTime));
        table.add(Trigger::command(".upladtime", Arity::Bare, TriggerAction::IsoTime));
        table.add(Trigger::new(
            "url",
            TriggerPattern::FindAll(URL_PATTERN.to_string()),
            TriggerAction::UrlTitles,
        ));
        for hub in MarketHub::ALL {
            let word = format!(".{}", hub.key());
            table.add(
                Trigger::command(&word, Arity::Text, TriggerAction::PriceCheck(hub))
                    .with_usage(PRICE_USAGE),
            );
        }
        table.add(Trigger::command(
            ".eve",
            Arity::Bare,
            TriggerAction::ServerStatus(GameServer::Tranquility),
        ));
        table.add(Trigger::command(
            ".sisi",
            Arity::Bare,
            TriggerAction::ServerStatus(GameServer::Singularity),
        ));
        table.add(Trigger::new(
            "notice",
            TriggerPattern::Regex(NOTICE_PATTERN.to_string()),
            TriggerAction::NoticeRelay,
        ));
        table.add(Trigger::command(".help", Arity::Bare, TriggerAction::Help));

        table.add(
            Trigger::command(".ops", Arity::Bare, TriggerAction::ListOps)
                .privileged()
                .with_help(".ops"),
        );
        table.add(
            Trigger::command(".addop", Arity::Text, TriggerAction::AddOp)
                .privileged()
                .with_usage("Usage: .addop <year>-<month>-<day>@<hour>:<minute> <name> OR <days>d<hours>h<minutes>m <name>")
                .with_help(".addop <year>-<month>-<day>@<hour>:<minute> <name> OR <days>d<hours>h<minutes>m <name>"),
        );
        table.add(
            Trigger::command(".rmop", Arity::Text, TriggerAction::RemoveOps)
                .privileged()
                .with_usage("Usage: .rmop <op number>")
                .with_help(".rmop <op number>[; <op number>...]"),
        );
        table.add(
            Trigger::command(".towers", Arity::Bare, TriggerAction::ListTowers)
                .privileged()
                .with_help(".towers"),
        );
        table.add(
            Trigger::command(".addtower", Arity::Text, TriggerAction::AddTower)
                .privileged()
                .with_usage("Usage: .addtower <tower_name>")
                .with_help(".addtower <tower_name>"),
        );
        table.add(
            Trigger::command(".rmtower", Arity::Text, TriggerAction::RemoveTower)
                .privileged()
                .with_usage("Usage: .rmtower <tower_name>")
                .with_help(".rmtower <tower_name>"),
        );
        table.add(
            Trigger::command(".marktower", Arity::Text, TriggerAction::MarkTower)
                .privileged()
                .with_usage("Usage: .marktower <tower_name>")
                .with_help(".marktower <tower_name>"),
        );

        table
    }

    /// 添加觸發器（同名者取代，保留原位置）
    pub fn add(&mut self, trigger: Trigger) {
        match self.triggers.iter_mut().find(|t| t.name == trigger.name) {
            Some(existing) => *existing = trigger,
            None => self.triggers.push(trigger),
        }
    }

    /// 獲取觸發器
    pub fn get(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.name == name)
    }

    /// 依註冊順序列出
    pub fn list(&self) -> &[Trigger] {
        &self.triggers
    }

    /// 處理訊息，依註冊順序返回所有匹配的觸發器
    pub fn process(&self, message: &str) -> Vec<(&Trigger, TriggerMatch)> {
        self.triggers
            .iter()
            .filter_map(|trigger| trigger.try_match(message).map(|m| (trigger, m)))
            .collect()
    }

    /// `.help` 輸出
    pub fn help_lines(&self, privileged: bool) -> Vec<String> {
        let mut lines = vec![PUBLIC_HELP.to_string()];
        if privileged {
            lines.extend(
                self.triggers
                    .iter()
                    .filter(|t| t.gate == Gate::Privileged)
                    .filter_map(|t| t.help.clone()),
            );
        }
        lines
    }
}
