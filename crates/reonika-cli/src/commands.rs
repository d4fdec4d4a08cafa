//! Line commands read from stdin.

use reonika_shared::{ChatId, MessageId, UserId};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `chat <user-id>`: find or create a chat and open it.
    Chat(UserId),
    /// `open <chat-id>`
    Open(ChatId),
    Close,
    /// `send <text>` to the open chat.
    Send(String),
    /// `delete <message-id>`
    Delete(MessageId),
    /// `leave <chat-id>`: delete the conversation.
    Leave(ChatId),
    /// `find <query>`: search profiles by display name.
    Find(String),
    Refresh,
    Online,
    Quit,
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "chat" => parse_uuid(rest).map(|id| Command::Chat(UserId(id))),
        "open" => parse_uuid(rest).map(|id| Command::Open(ChatId(id))),
        "close" => Ok(Command::Close),
        "send" if !rest.is_empty() => Ok(Command::Send(rest.to_string())),
        "send" => Err("usage: send <text>".into()),
        "delete" => parse_uuid(rest).map(|id| Command::Delete(MessageId(id))),
        "leave" => parse_uuid(rest).map(|id| Command::Leave(ChatId(id))),
        "find" if !rest.is_empty() => Ok(Command::Find(rest.to_string())),
        "find" => Err("usage: find <name>".into()),
        "refresh" => Ok(Command::Refresh),
        "online" => Ok(Command::Online),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err("empty command".into()),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, String> {
    Uuid::parse_str(s).map_err(|e| format!("invalid id {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let id = Uuid::new_v4();
        assert_eq!(parse(&format!("chat {id}")), Ok(Command::Chat(UserId(id))));
        assert_eq!(parse(&format!("  open   {id} ")), Ok(Command::Open(ChatId(id))));
        assert_eq!(parse("send hello there"), Ok(Command::Send("hello there".into())));
        assert_eq!(parse("close"), Ok(Command::Close));
        assert_eq!(parse("find mar"), Ok(Command::Find("mar".into())));
        assert_eq!(parse("exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("send").is_err());
        assert!(parse("open not-an-id").is_err());
        assert!(parse("dance").is_err());
        assert!(parse("   ").is_err());
    }
}
