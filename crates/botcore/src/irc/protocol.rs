//! IRC 協定解析
//!
//! 先把一行拆成 prefix / 指令 / 參數，再依固定順序套用規則表。
//! 規則順序即優先順序：越具體的形狀越前面，每行最多產生一個事件。

/// 由一行協定資料解析出的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// `PING :<token>`
    Ping { token: String },
    /// `:<nick>!<user>@<host> PRIVMSG <recipient> :<body>`
    ChatMessage {
        sender: String,
        recipient: String,
        body: String,
    },
    Join { nick: String, channel: String },
    Part { nick: String, channel: String },
    NickChanged { old: String, new: String },
    /// RPL_NAMREPLY (353)，`names` 為未處理的原始名單（可能帶身分符號）
    NamesReply { channel: String, names: String },
    /// RPL_ENDOFNAMES (366)，一份 NAMES 名單結束
    NamesEnd { channel: String },
    /// RPL_WELCOME (001)，註冊完成
    Welcome,
    /// 伺服器在加入頻道後重播最近的歷史訊息
    ReplayNotice { channel: String, line_count: u8 },
    /// RPL_TOPIC (332)，刻意忽略
    TopicReply,
    /// ERR_NICKNAMEINUSE (433)
    NickConflict,
    /// `ERROR :<reason>`
    Error { reason: String },
    Unrecognized,
}

impl ProtocolEvent {
    /// 是否為必須結束連線的事件
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NickConflict | Self::Error { .. })
    }
}

/// 拆解後的一行
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scanned<'a> {
    prefix: Option<&'a str>,
    command: &'a str,
    params: Vec<&'a str>,
    trailing: Option<&'a str>,
}

impl<'a> Scanned<'a> {
    /// prefix 中 `!` 之前的暱稱；沒有 `!` 表示來源是伺服器
    fn user_nick(&self) -> Option<&'a str> {
        let (nick, _) = self.prefix?.split_once('!')?;
        (!nick.is_empty()).then_some(nick)
    }

    /// 第一個參數，或在沒有中間參數時取尾端參數
    fn first_or_trailing(&self) -> Option<&'a str> {
        self.params
            .first()
            .copied()
            .or(self.trailing)
            .filter(|s| !s.is_empty())
    }
}

fn scan(line: &str) -> Option<Scanned<'_>> {
    let mut rest = line.trim_start_matches(' ');

    let prefix = match rest.strip_prefix(':') {
        Some(after) => {
            let (prefix, remainder) = after.split_once(' ')?;
            rest = remainder;
            Some(prefix)
        }
        None => None,
    };

    rest = rest.trim_start_matches(' ');
    let (command, mut rest) = match rest.split_once(' ') {
        Some((command, remainder)) => (command, remainder),
        None => (rest, ""),
    };
    if command.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    let mut trailing = None;
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(text) = rest.strip_prefix(':') {
            trailing = Some(text);
            break;
        }
        match rest.split_once(' ') {
            Some((param, remainder)) => {
                params.push(param);
                rest = remainder;
            }
            None => {
                params.push(rest);
                break;
            }
        }
    }

    Some(Scanned {
        prefix,
        command,
        params,
        trailing,
    })
}

type Rule = fn(&Scanned<'_>) -> Option<ProtocolEvent>;

/// 依優先順序排列的規則表
const RULES: &[(&str, Rule)] = &[
    ("ping", ping),
    ("error", error),
    ("chat", chat_message),
    ("replay", replay_notice),
    ("names", names_reply),
    ("names_end", names_end),
    ("welcome", welcome),
    ("join", join),
    ("part", part),
    ("nick", nick_changed),
    ("topic", topic_reply),
    ("conflict", nick_conflict),
];

/// 解析一行協定資料
///
/// 純函式且對任何輸入都有結果；無法辨識的行回傳 [`ProtocolEvent::Unrecognized`]。
///
/// # Example
/// ```
/// use botcore::irc::{parse, ProtocolEvent};
///
/// assert_eq!(
///     parse("PING :irc.example.net"),
///     ProtocolEvent::Ping { token: "irc.example.net".to_string() }
/// );
/// assert_eq!(parse("garbage"), ProtocolEvent::Unrecognized);
/// ```
pub fn parse(line: &str) -> ProtocolEvent {
    let Some(scanned) = scan(line) else {
        return ProtocolEvent::Unrecognized;
    };
    RULES
        .iter()
        .find_map(|(_, rule)| rule(&scanned))
        .unwrap_or(ProtocolEvent::Unrecognized)
}

fn ping(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.prefix.is_some() || m.command != "PING" {
        return None;
    }
    let token = m.trailing.or_else(|| m.params.first().copied())?;
    (!token.is_empty()).then(|| ProtocolEvent::Ping {
        token: token.to_string(),
    })
}

fn error(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.prefix.is_some() || m.command != "ERROR" {
        return None;
    }
    Some(ProtocolEvent::Error {
        reason: m.trailing?.to_string(),
    })
}

fn chat_message(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.command != "PRIVMSG" {
        return None;
    }
    let sender = m.user_nick()?;
    let recipient = *m.params.first()?;
    let body = m.trailing.or_else(|| m.params.get(1).copied())?;
    if body.is_empty() {
        return None;
    }
    Some(ProtocolEvent::ChatMessage {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        body: body.to_string(),
    })
}

const REPLAY_MARKER: &str = "Replaying up to ";

fn replay_notice(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.command != "NOTICE" {
        return None;
    }
    let channel = *m.params.first()?;
    let text = m.trailing?.strip_prefix(REPLAY_MARKER)?;
    let (count, rest) = text.split_once(' ')?;
    if !rest.starts_with("line") || count.is_empty() || count.len() > 2 {
        return None;
    }
    if !count.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let line_count: u8 = count.parse().ok()?;
    (line_count <= 19).then(|| ProtocolEvent::ReplayNotice {
        channel: channel.to_string(),
        line_count,
    })
}

fn names_reply(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.command != "353" || m.params.len() < 2 {
        return None;
    }
    let channel = *m.params.last()?;
    Some(ProtocolEvent::NamesReply {
        channel: channel.to_string(),
        names: m.trailing.unwrap_or_default().to_string(),
    })
}

fn names_end(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.command != "366" || m.params.len() < 2 {
        return None;
    }
    Some(ProtocolEvent::NamesEnd {
        channel: m.params.last()?.to_string(),
    })
}

fn welcome(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    (m.command == "001").then_some(ProtocolEvent::Welcome)
}

fn join(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.command != "JOIN" {
        return None;
    }
    Some(ProtocolEvent::Join {
        nick: m.user_nick()?.to_string(),
        channel: m.first_or_trailing()?.to_string(),
    })
}

fn part(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.command != "PART" {
        return None;
    }
    Some(ProtocolEvent::Part {
        nick: m.user_nick()?.to_string(),
        channel: m.first_or_trailing()?.to_string(),
    })
}

fn nick_changed(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    if m.command != "NICK" {
        return None;
    }
    Some(ProtocolEvent::NickChanged {
        old: m.user_nick()?.to_string(),
        new: m.first_or_trailing()?.to_string(),
    })
}

fn topic_reply(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    (m.command == "332").then_some(ProtocolEvent::TopicReply)
}

fn nick_conflict(m: &Scanned<'_>) -> Option<ProtocolEvent> {
    (m.command == "433").then_some(ProtocolEvent::NickConflict)
}
