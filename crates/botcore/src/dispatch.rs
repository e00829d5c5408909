//! 指令分派
//!
//! 比對聊天訊息、檢查權限、執行指令並產生回覆。
//! 所有使用者可見的失敗都轉成回覆訊息，不會向上傳遞錯誤。

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::args::{self, ArgumentError};
use crate::clock::{Clock, SystemClock};
use crate::collab::{GameServer, MarketHub, PriceLookup, ServerStatus, TitleFetcher, Unavailable};
use crate::countdown::{CountdownBoard, CountdownError, CountdownStore};
use crate::irc::OutboundCommand;
use crate::roster::{is_channel, ChannelRoster};
use crate::towers::TowerLedger;
use crate::trigger::{CommandTable, Gate, Trigger, TriggerAction, TriggerMatch};

/// 頻道中價格查詢的結果上限
pub const CHANNEL_PRICE_LIMIT: usize = 10;
/// 私訊中價格查詢的結果上限
pub const PRIVATE_PRICE_LIMIT: usize = 50;
/// 頻道中超過此行數時截斷
const CHANNEL_LINE_LIMIT: usize = 9;

/// 回覆對象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    Channel(String),
    User(String),
}

impl ReplyTarget {
    /// 私訊（收件者為自己）回覆給發送者，否則回覆到收件頻道
    pub fn for_message(sender: &str, recipient: &str, own_nick: &str) -> Self {
        if recipient.eq_ignore_ascii_case(own_nick) {
            ReplyTarget::User(sender.to_string())
        } else {
            ReplyTarget::Channel(recipient.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ReplyTarget::Channel(name) | ReplyTarget::User(name) => name,
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, ReplyTarget::Channel(name) if is_channel(name))
    }
}

/// 一則待分派的聊天訊息
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a> {
    pub sender: &'a str,
    pub recipient: &'a str,
    pub body: &'a str,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// 指令分派器
///
/// 所有欄位皆以 `Arc` 共用，複製成本低，可交給每個連線各一份。
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<CommandTable>,
    prices: Arc<dyn PriceLookup>,
    titles: Arc<dyn TitleFetcher>,
    status: Arc<dyn ServerStatus>,
    countdown: Arc<Mutex<dyn CountdownStore>>,
    towers: Arc<Mutex<TowerLedger>>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(table: Arc<CommandTable>) -> Self {
        Self {
            table,
            prices: Arc::new(Unavailable),
            titles: Arc::new(Unavailable),
            status: Arc::new(Unavailable),
            countdown: Arc::new(Mutex::new(CountdownBoard::in_memory())),
            towers: Arc::new(Mutex::new(TowerLedger::in_memory())),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_prices(mut self, prices: Arc<dyn PriceLookup>) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_titles(mut self, titles: Arc<dyn TitleFetcher>) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_status(mut self, status: Arc<dyn ServerStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_countdown(mut self, countdown: Arc<Mutex<dyn CountdownStore>>) -> Self {
        self.countdown = countdown;
        self
    }

    pub fn with_towers(mut self, towers: Arc<Mutex<TowerLedger>>) -> Self {
        self.towers = towers;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// 分派一則訊息，回傳要送出的指令
    ///
    /// 所有符合的指令依註冊順序執行，輸出依序串接。
    pub async fn dispatch(
        &self,
        message: Incoming<'_>,
        own_nick: &str,
        roster: &ChannelRoster,
    ) -> Vec<OutboundCommand> {
        if message.sender.eq_ignore_ascii_case(own_nick) {
            return Vec::new();
        }

        let target = ReplyTarget::for_message(message.sender, message.recipient, own_nick);
        let privileged = roster.is_privileged(target.name());

        let mut commands = Vec::new();
        for (trigger, matched) in self.table.process(message.body) {
            if trigger.gate == Gate::Privileged && !privileged {
                debug!("{} 無權限執行 {}", target.name(), trigger.name);
                continue;
            }
            debug!("執行 {} -> {}", trigger.name, target.name());
            commands.extend(self.run(trigger, matched, &target, privileged).await);
        }
        commands
    }

    async fn run(
        &self,
        trigger: &Trigger,
        matched: TriggerMatch,
        target: &ReplyTarget,
        privileged: bool,
    ) -> Vec<OutboundCommand> {
        let now = self.clock.now();
        let lines = match (trigger.action, matched) {
            (TriggerAction::UtcTime, _) => vec![now.format("UTC %A %B %d, %Y - %H:%M%p").to_string()],
            (TriggerAction::IsoTime, _) => vec![format!("UTC {}", iso_time(now))],
            (TriggerAction::Help, _) => self.table.help_lines(privileged),
            (TriggerAction::PriceCheck(hub), TriggerMatch::Argument(arg)) => {
                self.price_check(hub, &arg, target).await
            }
            (TriggerAction::UrlTitles, TriggerMatch::Captures(urls)) => self.url_titles(&urls).await,
            (TriggerAction::ServerStatus(server), _) => vec![self.server_status(server).await],
            (TriggerAction::NoticeRelay, TriggerMatch::Captures(groups)) => {
                return notice_relay(target, groups);
            }
            (action, matched) => self.run_stateful(trigger, action, matched, now),
        };

        lines
            .into_iter()
            .map(|line| OutboundCommand::privmsg(target.name(), line))
            .collect()
    }

    /// 倒數與塔台指令，全部同步執行，不跨越 await 持有鎖
    fn run_stateful(
        &self,
        trigger: &Trigger,
        action: TriggerAction,
        matched: TriggerMatch,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let result = match (action, matched) {
            (TriggerAction::ListOps, _) => Ok(lock(&self.countdown).list_events(now)),
            (TriggerAction::AddOp, TriggerMatch::Argument(arg)) => {
                args::parse_event(&arg).map(|(when, name)| {
                    lock(&self.countdown).add_event(when, &name, now);
                    vec!["Event added.".to_string()]
                })
            }
            (TriggerAction::RemoveOps, TriggerMatch::Argument(arg)) => {
                args::parse_ids(&arg).map(|ids| match lock(&self.countdown).remove_events(&ids, now) {
                    Ok(replies) => replies,
                    Err(CountdownError::OutOfBounds) => {
                        vec!["One or more op numbers out of bounds.".to_string()]
                    }
                })
            }
            (TriggerAction::ListTowers, _) => Ok(lock(&self.towers).list(now)),
            (TriggerAction::AddTower, TriggerMatch::Argument(name)) => {
                Ok(vec![lock(&self.towers).add(&name)])
            }
            (TriggerAction::RemoveTower, TriggerMatch::Argument(name)) => {
                Ok(vec![lock(&self.towers).remove(&name)])
            }
            (TriggerAction::MarkTower, TriggerMatch::Argument(name)) => {
                Ok(vec![lock(&self.towers).mark(&name, now)])
            }
            _ => Err(ArgumentError::Missing),
        };

        result.unwrap_or_else(|e| {
            debug!("{} 參數錯誤: {}", trigger.name, e);
            trigger.usage.iter().cloned().collect()
        })
    }

    async fn price_check(&self, hub: MarketHub, arg: &str, target: &ReplyTarget) -> Vec<String> {
        let limit = if target.is_channel() {
            CHANNEL_PRICE_LIMIT
        } else {
            PRIVATE_PRICE_LIMIT
        };

        let mut lines = Vec::new();
        for item in args::split_items(arg) {
            let found = match self.prices.lookup_prices(hub, &item, limit).await {
                Ok(found) if found.is_empty() => {
                    vec![format!("Sorry, I can't find {} on the market.", item)]
                }
                Ok(found) => found,
                Err(e) => {
                    warn!("{} 價格查詢失敗 ({}): {}", hub, item, e);
                    vec![format!("Problem checking prices for {}.", item)]
                }
            };
            if target.is_channel() {
                lines.extend(trim_lines(found));
            } else {
                lines.extend(found);
            }
        }
        lines
    }

    async fn server_status(&self, server: GameServer) -> String {
        match self.status.server_status(server).await {
            Ok(report) if report.online => {
                format!("{} is up with {} players online.", server, group_thousands(report.players))
            }
            Ok(_) => format!("{} is down.", server),
            Err(e) => {
                warn!("{} 狀態查詢失敗: {}", server, e);
                "No response from Eve API.".to_string()
            }
        }
    }

    async fn url_titles(&self, urls: &[String]) -> Vec<String> {
        let mut lines = Vec::new();
        for (i, url) in urls.iter().enumerate() {
            let n = i + 1;
            match self.titles.fetch_title(url).await {
                Ok(Some(title)) => lines.push(format!("{}: {}", n, title)),
                Ok(None) => debug!("{} 沒有標題", url),
                Err(e) => {
                    warn!("標題擷取失敗 ({}): {}", url, e);
                    lines.push(format!("{}: 404'd!", n));
                }
            }
        }
        lines
    }
}

/// 秒以下為零時省略小數，否則取到微秒
fn iso_time(now: DateTime<Utc>) -> String {
    let naive = now.naive_utc();
    if now.timestamp_subsec_micros() == 0 {
        naive.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        naive.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// 千位分隔：`31337` -> `31,337`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn notice_relay(target: &ReplyTarget, groups: Vec<String>) -> Vec<OutboundCommand> {
    if !target.is_channel() {
        debug!("私訊中的 (notice) 不轉發");
        return Vec::new();
    }
    groups
        .into_iter()
        .next()
        .map(|content| OutboundCommand::notice(target.name(), content))
        .into_iter()
        .collect()
}

/// 頻道中過長的結果只保留前幾行
fn trim_lines(mut lines: Vec<String>) -> Vec<String> {
    if lines.len() > CHANNEL_LINE_LIMIT {
        let more = lines.len() - CHANNEL_LINE_LIMIT;
        lines.truncate(CHANNEL_LINE_LIMIT);
        lines.push(format!("...and {} more lines. Try a narrower search term?", more));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::collab::{CollaboratorError, ServerReport};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct FakePrices;

    #[async_trait]
    impl PriceLookup for FakePrices {
        async fn lookup_prices(
            &self,
            hub: MarketHub,
            item: &str,
            max_results: usize,
        ) -> Result<Vec<String>, CollaboratorError> {
            match item {
                "nothing" => Ok(vec![]),
                "broken" => Err(CollaboratorError::Failed("timeout".to_string())),
                "many" => Ok((1..=max_results).map(|i| format!("{} {}", item, i)).collect()),
                _ => Ok(vec![format!("{} @ {}", item, hub)]),
            }
        }
    }

    struct FakeTitles;

    #[async_trait]
    impl TitleFetcher for FakeTitles {
        async fn fetch_title(&self, url: &str) -> Result<Option<String>, CollaboratorError> {
            if url.contains("missing") {
                Err(CollaboratorError::Failed("404".to_string()))
            } else if url.ends_with(".png") {
                Ok(None)
            } else {
                Ok(Some(format!("Title of {}", url)))
            }
        }
    }

    struct FakeStatus;

    #[async_trait]
    impl ServerStatus for FakeStatus {
        async fn server_status(&self, server: GameServer) -> Result<ServerReport, CollaboratorError> {
            match server {
                GameServer::Tranquility => Ok(ServerReport {
                    online: true,
                    players: 31337,
                }),
                GameServer::Singularity => Ok(ServerReport {
                    online: false,
                    players: 0,
                }),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 5, 7).unwrap()
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(CommandTable::standard()))
            .with_prices(Arc::new(FakePrices))
            .with_titles(Arc::new(FakeTitles))
            .with_status(Arc::new(FakeStatus))
            .with_clock(Arc::new(FixedClock::new(now())))
    }

    fn roster() -> ChannelRoster {
        let mut roster = ChannelRoster::with_privileged(["#ops"]);
        roster.set_names("#ops", "@alice tooper");
        roster.set_names("#public", "bob alice tooper");
        roster
    }

    async fn say(d: &Dispatcher, sender: &str, recipient: &str, body: &str) -> Vec<OutboundCommand> {
        let message = Incoming {
            sender,
            recipient,
            body,
        };
        d.dispatch(message, "tooper", &roster()).await
    }

    fn texts(commands: &[OutboundCommand]) -> Vec<String> {
        commands
            .iter()
            .map(|c| match c {
                OutboundCommand::Privmsg { text, .. } | OutboundCommand::Notice { text, .. } => text.clone(),
                other => other.encode(),
            })
            .collect()
    }

    #[test]
    fn test_reply_target() {
        assert_eq!(
            ReplyTarget::for_message("alice", "TOOPER", "tooper"),
            ReplyTarget::User("alice".to_string())
        );
        assert_eq!(
            ReplyTarget::for_message("alice", "#ops", "tooper"),
            ReplyTarget::Channel("#ops".to_string())
        );
    }

    #[test]
    fn test_trim_lines() {
        let lines: Vec<String> = (1..=12).map(|i| i.to_string()).collect();
        let trimmed = trim_lines(lines);
        assert_eq!(trimmed.len(), 10);
        assert_eq!(trimmed[9], "...and 3 more lines. Try a narrower search term?");

        let short: Vec<String> = (1..=9).map(|i| i.to_string()).collect();
        assert_eq!(trim_lines(short.clone()), short);
    }

    #[tokio::test]
    async fn test_private_message_replies_to_sender() {
        let out = say(&dispatcher(), "bob", "tooper", ".time").await;
        assert_eq!(
            out,
            vec![OutboundCommand::privmsg("bob", "UTC Monday January 01, 2024 - 09:05AM")]
        );
    }

    #[tokio::test]
    async fn test_channel_message_replies_to_channel() {
        let out = say(&dispatcher(), "bob", "#public", ".upladtime").await;
        assert_eq!(out, vec![OutboundCommand::privmsg("#public", "UTC 2024-01-01T09:05:07")]);
    }

    #[tokio::test]
    async fn test_iso_time_keeps_microseconds() {
        let at = now() + chrono::Duration::microseconds(26_490);
        let d = dispatcher().with_clock(Arc::new(FixedClock::new(at)));
        assert_eq!(
            texts(&say(&d, "bob", "#public", ".upladtime").await),
            vec!["UTC 2024-01-01T09:05:07.026490"]
        );
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(31337), "31,337");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[tokio::test]
    async fn test_server_status() {
        let d = dispatcher();
        assert_eq!(
            texts(&say(&d, "bob", "#public", ".eve").await),
            vec!["Tranquility is up with 31,337 players online."]
        );
        assert_eq!(
            texts(&say(&d, "bob", "tooper", ".sisi").await),
            vec!["Singularity is down."]
        );
        assert!(say(&d, "bob", "#public", ".eve now").await.is_empty());
    }

    #[tokio::test]
    async fn test_server_status_without_backend() {
        let d = Dispatcher::new(Arc::new(CommandTable::standard()));
        assert_eq!(
            texts(&say(&d, "bob", "#public", ".sisi").await),
            vec!["No response from Eve API."]
        );
    }

    #[tokio::test]
    async fn test_own_messages_are_ignored() {
        assert!(say(&dispatcher(), "Tooper", "#ops", ".help").await.is_empty());
    }

    #[tokio::test]
    async fn test_help_depends_on_privilege() {
        let d = dispatcher();
        let public = texts(&say(&d, "bob", "#public", ".help").await);
        assert_eq!(public, vec![crate::trigger::PUBLIC_HELP.to_string()]);
        for hidden in [".ops", ".addop", ".rmop"] {
            assert!(!public.iter().any(|l| l.contains(hidden)));
        }

        let full = texts(&say(&d, "bob", "#ops", ".help").await);
        for shown in [".ops", ".addop", ".rmop"] {
            assert!(full.iter().any(|l| l.starts_with(shown)));
        }

        let pm = texts(&say(&d, "alice", "tooper", ".help").await);
        assert_eq!(pm, full);
    }

    #[tokio::test]
    async fn test_privileged_commands_silently_skipped() {
        let d = dispatcher();
        assert!(say(&d, "bob", "#public", ".ops").await.is_empty());
        assert!(say(&d, "bob", "tooper", ".addop 1d0h0m x").await.is_empty());
        assert_eq!(
            texts(&say(&d, "bob", "#ops", ".ops").await),
            vec!["No upcoming events."]
        );
    }

    #[tokio::test]
    async fn test_malformed_addop_returns_usage_and_adds_nothing() {
        let d = dispatcher();
        let out = texts(&say(&d, "alice", "#ops", ".addop banana").await);
        assert_eq!(
            out,
            vec!["Usage: .addop <year>-<month>-<day>@<hour>:<minute> <name> OR <days>d<hours>h<minutes>m <name>"]
        );
        assert_eq!(texts(&say(&d, "alice", "#ops", ".addop").await), out);
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".ops").await),
            vec!["No upcoming events."]
        );
    }

    #[tokio::test]
    async fn test_addop_then_ops() {
        let d = dispatcher();
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".addop 2024-01-01@10:00 Fleet Up").await),
            vec!["Event added."]
        );
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".ops").await),
            vec!["   0d  0h 54m until Fleet Up at 2024-01-01T10:00 UTC (ID:1)"]
        );
    }

    #[tokio::test]
    async fn test_rmop() {
        let d = dispatcher();
        for i in 1..=5 {
            say(&d, "alice", "#ops", &format!(".addop 0d{}h0m op{}", i, i)).await;
        }
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".rmop 2; 4").await),
            vec!["Removed: op4 (ID:4).", "Removed: op2 (ID:2)."]
        );
        let listed = texts(&say(&d, "alice", "#ops", ".ops").await);
        assert_eq!(listed.len(), 3);
        assert!(listed[0].contains("op1") && listed[0].ends_with("(ID:1)"));
        assert!(listed[1].contains("op3") && listed[1].ends_with("(ID:2)"));
        assert!(listed[2].contains("op5") && listed[2].ends_with("(ID:3)"));

        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".rmop 1; 9").await),
            vec!["One or more op numbers out of bounds."]
        );
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".rmop x").await),
            vec!["Usage: .rmop <op number>"]
        );
        assert_eq!(texts(&say(&d, "alice", "#ops", ".ops").await).len(), 3);
    }

    #[tokio::test]
    async fn test_price_check_per_item() {
        let d = dispatcher();
        assert_eq!(
            texts(&say(&d, "bob", "#public", ".jita Tritanium; nothing; broken").await),
            vec![
                "Tritanium @ jita",
                "Sorry, I can't find nothing on the market.",
                "Problem checking prices for broken.",
            ]
        );
        assert_eq!(
            texts(&say(&d, "bob", "#public", ".hek").await),
            vec!["Usage: .jita|amarr|dodixie|hek|rens <item_name>"]
        );
    }

    #[tokio::test]
    async fn test_price_limit_depends_on_target() {
        let d = dispatcher();
        let channel = texts(&say(&d, "bob", "#public", ".amarr many").await);
        assert_eq!(channel.len(), 10);
        assert_eq!(channel[9], "...and 1 more lines. Try a narrower search term?");

        let private = texts(&say(&d, "bob", "tooper", ".amarr many").await);
        assert_eq!(private.len(), PRIVATE_PRICE_LIMIT);
    }

    #[tokio::test]
    async fn test_url_titles_numbered_in_order() {
        let d = dispatcher();
        let out = texts(
            &say(
                &d,
                "bob",
                "#public",
                "look https://a.example http://b.example/x.png http://missing.example",
            )
            .await,
        );
        assert_eq!(out, vec!["1: Title of https://a.example", "3: 404'd!"]);
    }

    #[tokio::test]
    async fn test_unavailable_collaborators_reply_neutrally() {
        let d = Dispatcher::new(Arc::new(CommandTable::standard()));
        assert_eq!(
            texts(&say(&d, "bob", "#public", ".rens Tritanium").await),
            vec!["Problem checking prices for Tritanium."]
        );
        assert_eq!(
            texts(&say(&d, "bob", "#public", "https://a.example").await),
            vec!["1: 404'd!"]
        );
    }

    #[tokio::test]
    async fn test_notice_relay_only_in_channels() {
        let d = dispatcher();
        assert_eq!(
            say(&d, "bob", "#public", "(notice) fleet in 5").await,
            vec![OutboundCommand::notice("#public", "fleet in 5")]
        );
        assert!(say(&d, "bob", "tooper", "(notice) fleet in 5").await.is_empty());
    }

    #[tokio::test]
    async fn test_towers() {
        let d = dispatcher();
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".addtower alpha").await),
            vec!["Added: 'ALPHA'"]
        );
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".marktower Alpha").await),
            vec!["ALPHA marked as checked on Jan 01 at 09:05 UTC."]
        );
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".towers").await),
            vec![
                "ALPHA checked on Jan 01 at 09:05 UTC.",
                "It is now Jan 01 at 09:05 UTC."
            ]
        );
        assert_eq!(
            texts(&say(&d, "alice", "#ops", ".rmtower").await),
            vec!["Usage: .rmtower <tower_name>"]
        );
        assert!(say(&d, "bob", "#public", ".towers").await.is_empty());
    }
}
