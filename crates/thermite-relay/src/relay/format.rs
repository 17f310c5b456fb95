//! Rendering of channel activity as single display lines.

use std::fmt;

use crate::irc::Inbound;

const CTCP: char = '\x01';

/// A channel event in the shape the relay renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message { status: String, nick: String, text: String },
    Notice { status: String, nick: String, text: String },
    Join { nick: String, channel: String },
    Part { nick: String, channel: String, reason: String },
    Quit { nick: String, reason: String },
    Nick { old: String, new: String },
    Mode { actor: String, modes: String, args: Vec<String> },
    Kick { nick: String, channel: String, victim: String, reason: String },
    Topic { nick: String, channel: String, topic: String },
}

impl ChannelEvent {
    /// Interpret an inbound line. Returns `None` for anything the relay does
    /// not render.
    pub fn from_inbound(inbound: &Inbound) -> Option<Self> {
        let line = &inbound.line;
        let nick = line.nick()?.to_string();
        let param = |i: usize| line.param(i).map(ToString::to_string);
        let status = inbound.status.clone();

        let event = match line.command.as_str() {
            "PRIVMSG" => Self::Message { status, nick, text: param(1)? },
            "NOTICE" => Self::Notice { status, nick, text: param(1)? },
            "JOIN" => Self::Join { nick, channel: param(0)? },
            "PART" => Self::Part {
                nick,
                channel: param(0)?,
                reason: param(1).unwrap_or_default(),
            },
            "QUIT" => Self::Quit { nick, reason: param(0).unwrap_or_default() },
            "NICK" => Self::Nick { old: nick, new: param(0)? },
            "MODE" => Self::Mode {
                actor: nick,
                modes: param(1)?,
                args: line.params.iter().skip(2).cloned().collect(),
            },
            "KICK" => Self::Kick {
                nick,
                channel: param(0)?,
                victim: param(1)?,
                reason: param(2).unwrap_or_default(),
            },
            "TOPIC" => Self::Topic { nick, channel: param(0)?, topic: param(1).unwrap_or_default() },
            _ => return None,
        };
        Some(event)
    }

    /// Whether the event is about a person rather than a channel, so it is
    /// relayed to every source the person was in.
    pub const fn is_identity_scoped(&self) -> bool {
        matches!(self, Self::Quit { .. } | Self::Nick { .. })
    }
}

/// Strip the CTCP delimiters off both ends.
fn ctcp_body(text: &str) -> &str {
    text.trim_matches(CTCP)
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { status, nick, text } => {
                if let Some(action) = text.strip_prefix("\x01ACTION ") {
                    write!(f, "* {status}{nick} {}", action.trim_end_matches(CTCP))
                } else if text.starts_with(CTCP) {
                    write!(f, "- {status}{nick} sent CTCP request: {}", ctcp_body(text))
                } else {
                    write!(f, "<{status}{nick}> {text}")
                }
            }
            Self::Notice { status, nick, text } => {
                if text.starts_with(CTCP) {
                    write!(f, "- {status}{nick} sent CTCP response: {}", ctcp_body(text))
                } else {
                    write!(f, "-{status}{nick}- {text}")
                }
            }
            Self::Join { nick, channel } => write!(f, "- {nick} joined {channel}"),
            Self::Part { nick, channel, reason } => {
                write!(f, "- {nick} parted {channel} ({reason})")
            }
            Self::Quit { nick, reason } => write!(f, "- {nick} quit ({reason})"),
            Self::Nick { old, new } => write!(f, "- {old} changed nick to {new}"),
            Self::Mode { actor, modes, args } => {
                write!(f, "- {actor} set mode {modes}")?;
                if !args.is_empty() {
                    write!(f, " {}", args.join(" "))?;
                }
                Ok(())
            }
            Self::Kick { nick, channel, victim, reason } => {
                write!(f, "- {nick} kicked {victim} from {channel} ({reason})")
            }
            Self::Topic { nick, channel, topic } => {
                write!(f, "- {nick} changed topic of {channel} to: {topic}")
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::irc::Line;

    fn event(raw: &str, status: &str) -> ChannelEvent {
        ChannelEvent::from_inbound(&Inbound {
            line: Line::parse(raw).unwrap(),
            prior_channels: Vec::new(),
            status: status.to_string(),
            rosters: Vec::new(),
        })
        .unwrap()
    }

    fn render(raw: &str, status: &str) -> String {
        event(raw, status).to_string()
    }

    #[test]
    fn messages() {
        assert_eq!(render(":nick!u@h PRIVMSG #c :hi", "@"), "<@nick> hi");
        assert_eq!(render(":nick!u@h PRIVMSG #c :\x01ACTION waves\x01", ""), "* nick waves");
        assert_eq!(
            render(":nick!u@h PRIVMSG #c :\x01VERSION\x01", "+"),
            "- +nick sent CTCP request: VERSION"
        );
        assert_eq!(
            render(":nick!u@h PRIVMSG #c :\x01ACTION\x01", ""),
            "- nick sent CTCP request: ACTION"
        );
    }

    #[test]
    fn notices() {
        assert_eq!(render(":nick!u@h NOTICE #c :heads up", "@+"), "-@+nick- heads up");
        assert_eq!(
            render(":nick!u@h NOTICE #c :\x01PING 123\x01", ""),
            "- nick sent CTCP response: PING 123"
        );
    }

    #[test]
    fn membership() {
        assert_eq!(render(":nick!u@h JOIN #c", ""), "- nick joined #c");
        assert_eq!(render(":nick!u@h JOIN #c * :Real Name", ""), "- nick joined #c");
        assert_eq!(render(":nick!u@h PART #c :bye", ""), "- nick parted #c (bye)");
        assert_eq!(render(":nick!u@h PART #c", ""), "- nick parted #c ()");
        assert_eq!(render(":nick!u@h QUIT :Ping timeout", ""), "- nick quit (Ping timeout)");
        assert_eq!(render(":nick!u@h QUIT", ""), "- nick quit ()");
        assert_eq!(render(":nick!u@h NICK other", ""), "- nick changed nick to other");
        assert_eq!(
            render(":op!u@h KICK #c nick :spam", "@"),
            "- op kicked nick from #c (spam)"
        );
    }

    #[test]
    fn modes() {
        assert_eq!(render(":op!u@h MODE #c +o nick", ""), "- op set mode +o nick");
        assert_eq!(render(":op!u@h MODE #c +ov a b", ""), "- op set mode +ov a b");
        assert_eq!(render(":irc.example.net MODE #c +nt", ""), "- irc.example.net set mode +nt");
    }

    #[test]
    fn topic() {
        assert_eq!(
            render(":nick!u@h TOPIC #c :new topic", ""),
            "- nick changed topic of #c to: new topic"
        );
    }

    #[test]
    fn unrendered_lines() {
        let numeric = Inbound {
            line: Line::parse(":srv 001 me :hi").unwrap(),
            prior_channels: Vec::new(),
            status: String::new(),
            rosters: Vec::new(),
        };
        assert!(ChannelEvent::from_inbound(&numeric).is_none());

        let sourceless = Inbound {
            line: Line::parse("PRIVMSG #c :hi").unwrap(),
            ..numeric
        };
        assert!(ChannelEvent::from_inbound(&sourceless).is_none());
    }

    #[test]
    fn identity_scope() {
        assert!(event(":a!u@h QUIT", "").is_identity_scoped());
        assert!(event(":a!u@h NICK b", "").is_identity_scoped());
        assert!(!event(":a!u@h JOIN #c", "").is_identity_scoped());
    }
}
