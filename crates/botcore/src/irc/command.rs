//! 送往伺服器的 IRC 指令

use std::fmt;

/// 送出的指令；每個指令編碼後恰為一行（不含 `\r\n`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    Pass { password: String },
    Nick { nick: String },
    User {
        user: String,
        host: String,
        server: String,
        real: String,
    },
    Join { channel: String },
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Pong { token: String },
    /// 連線存活探測
    Ping { token: String },
    Oper { user: String, password: String },
}

impl OutboundCommand {
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Privmsg {
            target: target.into(),
            text: text.into(),
        }
    }

    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Notice {
            target: target.into(),
            text: text.into(),
        }
    }

    /// 編碼為單行文字
    ///
    /// 內容中的 CR/LF 會被替換為空白，確保不會夾帶第二個指令。
    pub fn encode(&self) -> String {
        match self {
            Self::Pass { password } => format!("PASS {}", clean(password)),
            Self::Nick { nick } => format!("NICK {}", clean(nick)),
            Self::User {
                user,
                host,
                server,
                real,
            } => format!(
                "USER {} {} {} :{}",
                clean(user),
                clean(host),
                clean(server),
                clean(real)
            ),
            Self::Join { channel } => format!("JOIN {}", clean(channel)),
            Self::Privmsg { target, text } => format!("PRIVMSG {} :{}", clean(target), clean(text)),
            Self::Notice { target, text } => format!("NOTICE {} :{}", clean(target), clean(text)),
            Self::Pong { token } => format!("PONG {}", last_param(token)),
            Self::Ping { token } => format!("PING :{}", clean(token)),
            Self::Oper { user, password } => format!("OPER {} {}", clean(user), clean(password)),
        }
    }

    /// 用於日誌的版本，隱藏密碼
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass { .. } => "PASS ********".to_string(),
            Self::Oper { user, .. } => format!("OPER {} ********", clean(user)),
            other => other.encode(),
        }
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

fn clean(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// PONG 原樣回傳 token；含空白或以 `:` 開頭時必須寫成尾端參數
fn last_param(token: &str) -> String {
    let token = clean(token);
    if token.is_empty() || token.contains(' ') || token.starts_with(':') {
        format!(":{}", token)
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_registration() {
        assert_eq!(
            OutboundCommand::Nick {
                nick: "tooper".to_string()
            }
            .encode(),
            "NICK tooper"
        );
        assert_eq!(
            OutboundCommand::User {
                user: "tooper".to_string(),
                host: "host".to_string(),
                server: "server".to_string(),
                real: "Bud Tooper".to_string(),
            }
            .encode(),
            "USER tooper host server :Bud Tooper"
        );
    }

    #[test]
    fn test_encode_messages() {
        assert_eq!(OutboundCommand::privmsg("#ops", "Event added.").encode(), "PRIVMSG #ops :Event added.");
        assert_eq!(OutboundCommand::notice("#ops", "heads up").encode(), "NOTICE #ops :heads up");
        assert_eq!(
            OutboundCommand::Join {
                channel: "#ops".to_string()
            }
            .encode(),
            "JOIN #ops"
        );
    }

    #[test]
    fn test_encode_pong_echoes_token() {
        let pong = |t: &str| OutboundCommand::Pong { token: t.to_string() }.encode();
        assert_eq!(pong("irc.example.net"), "PONG irc.example.net");
        assert_eq!(pong("two words"), "PONG :two words");
    }

    #[test]
    fn test_payload_newlines_cannot_inject_commands() {
        let cmd = OutboundCommand::privmsg("#ops", "title\r\nQUIT :bye");
        let encoded = cmd.encode();
        assert!(!encoded.contains('\r'));
        assert!(!encoded.contains('\n'));
        assert_eq!(encoded, "PRIVMSG #ops :title  QUIT :bye");
    }

    #[test]
    fn test_redacted_hides_passwords() {
        let oper = OutboundCommand::Oper {
            user: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        assert_eq!(oper.encode(), "OPER admin hunter2");
        assert_eq!(oper.to_string(), "OPER admin ********");
        let pass = OutboundCommand::Pass {
            password: "hunter2".to_string(),
        };
        assert!(!pass.to_string().contains("hunter2"));
    }
}
