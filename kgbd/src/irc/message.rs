//! RFC 1459 message framing.
//!
//! Only the slice of the grammar the bot needs: prefix, command, middle
//! parameters and a trailing parameter. CTCP payloads are the usual
//! `\x01`-wrapped PRIVMSG/NOTICE bodies.

/// Marker byte framing CTCP payloads.
pub const CTCP_DELIM: char = '\x01';

/// One parsed server line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed IRC line {0:?}")]
pub struct ParseError(pub String);

impl Message {
    /// Parse one line (without the trailing CRLF).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return Err(ParseError(line.to_string()));
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped
                .split_once(' ')
                .ok_or_else(|| ParseError(line.to_string()))?;
            rest = tail;
            Some(prefix.to_string())
        } else {
            None
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split_ascii_whitespace();
        let command = words
            .next()
            .ok_or_else(|| ParseError(line.to_string()))?
            .to_string();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Ok(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nick part of the prefix, when the prefix is a user mask.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    /// The full `nick!user@host` mask, when present.
    pub fn source_mask(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| p.contains('!'))
    }
}

/// Extract a CTCP `(tag, argument)` pair from a PRIVMSG body.
pub fn parse_ctcp(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix(CTCP_DELIM)?;
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    match inner.split_once(' ') {
        Some((tag, arg)) => Some((tag, arg)),
        None => Some((inner, "")),
    }
}

// ── Outbound commands ────────────────────────────────────────────────────

pub fn pass(password: &str) -> String {
    format!("PASS {password}")
}

pub fn nick(nick: &str) -> String {
    format!("NICK {nick}")
}

pub fn user(username: &str, realname: &str) -> String {
    format!("USER {username} 0 * :{realname}")
}

pub fn join(channel: &str) -> String {
    format!("JOIN {channel}")
}

pub fn part(channel: &str) -> String {
    format!("PART {channel}")
}

pub fn pong(token: &str) -> String {
    format!("PONG :{token}")
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{text}")
}

pub fn notice(target: &str, text: &str) -> String {
    format!("NOTICE {target} :{text}")
}

pub fn ctcp_reply(target: &str, tag: &str, text: &str) -> String {
    notice(target, &format!("{CTCP_DELIM}{tag} {text}{CTCP_DELIM}"))
}

pub fn quit(reason: &str) -> String {
    format!("QUIT :{reason}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefix_command_and_trailing() {
        let m = Message::parse(":srv.example.net 001 KGB :Welcome to IRC\r\n").unwrap();
        assert_eq!(m.prefix.as_deref(), Some("srv.example.net"));
        assert_eq!(m.command, "001");
        assert_eq!(m.params, vec!["KGB", "Welcome to IRC"]);
    }

    #[test]
    fn parses_privmsg_with_colons_in_trailing() {
        let m = Message::parse(":a!b@c PRIVMSG #chan :hello: world :-)").unwrap();
        assert_eq!(m.command, "PRIVMSG");
        assert_eq!(m.params, vec!["#chan", "hello: world :-)"]);
    }

    #[test]
    fn parses_ping_without_prefix() {
        let m = Message::parse("PING :serv").unwrap();
        assert_eq!(m.prefix, None);
        assert_eq!(m.params, vec!["serv"]);
    }

    #[test]
    fn source_accessors_split_the_mask() {
        let m = Message::parse(":alice!ali@box PRIVMSG #c :hi").unwrap();
        assert_eq!(m.source_nick(), Some("alice"));
        assert_eq!(m.source_mask(), Some("alice!ali@box"));

        let server = Message::parse(":srv.example.net PONG x").unwrap();
        assert_eq!(server.source_nick(), Some("srv.example.net"));
        assert_eq!(server.source_mask(), None);
    }

    #[test]
    fn empty_lines_are_rejected() {
        assert!(Message::parse("").is_err());
        assert!(Message::parse("\r\n").is_err());
    }

    #[test]
    fn ctcp_payloads_split_into_tag_and_argument() {
        assert_eq!(parse_ctcp("\x01VERSION\x01"), Some(("VERSION", "")));
        assert_eq!(parse_ctcp("\x01PING 12345\x01"), Some(("PING", "12345")));
        assert_eq!(parse_ctcp("plain text"), None);
    }

    #[test]
    fn outbound_commands_render_correctly() {
        assert_eq!(privmsg("#c", "hi there"), "PRIVMSG #c :hi there");
        assert_eq!(user("kgb", "KGB bot"), "USER kgb 0 * :KGB bot");
        assert_eq!(
            ctcp_reply("alice", "VERSION", "KGB 2.0"),
            "NOTICE alice :\x01VERSION KGB 2.0\x01"
        );
        assert_eq!(quit("KGB going to drink vodka"), "QUIT :KGB going to drink vodka");
    }
}
