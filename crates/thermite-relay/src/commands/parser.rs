//! Recognising commands addressed to the relay.

use crate::irc::CaseMapping;

/// The closed set of commands the relay answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `pipe <source> <reason...>`; arguments validated by the handler.
    Pipe(String),
    Unpipe,
    Say(String),
    Names,
    Backlog,
    Pipes,
}

impl Command {
    /// Look up `name` (already lowercased). Unknown names are `None`.
    pub fn parse(name: &str, args: &str) -> Option<Self> {
        let command = match name {
            "pipe" => Self::Pipe(args.to_string()),
            "unpipe" => Self::Unpipe,
            "say" => Self::Say(args.to_string()),
            "names" => Self::Names,
            "backlog" => Self::Backlog,
            "pipes" => Self::Pipes,
            _ => return None,
        };
        Some(command)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pipe(_) => "pipe",
            Self::Unpipe => "unpipe",
            Self::Say(_) => "say",
            Self::Names => "names",
            Self::Backlog => "backlog",
            Self::Pipes => "pipes",
        }
    }
}

/// Parse `text` as a command if its first word highlights `own_nick`
/// (optionally followed by `:` or `,`) and something follows.
pub fn parse_highlight(text: &str, own_nick: &str, casemapping: CaseMapping) -> Option<Command> {
    let (first, rest) = text.split_once(' ')?;
    let addressed = first.strip_suffix([':', ',']).unwrap_or(first);
    if !casemapping.equals(addressed, own_nick) || rest.is_empty() {
        return None;
    }

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    Command::parse(&name.to_lowercase(), args)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<Command> {
        parse_highlight(text, "relay", CaseMapping::Rfc1459)
    }

    #[test]
    fn highlight_forms() {
        assert_eq!(parse("relay pipes"), Some(Command::Pipes));
        assert_eq!(parse("relay: pipes"), Some(Command::Pipes));
        assert_eq!(parse("Relay, PIPES"), Some(Command::Pipes));
        assert_eq!(parse("relay; pipes"), None);
        assert_eq!(parse("relayx pipes"), None);
        assert_eq!(parse("hey relay pipes"), None);
    }

    #[test]
    fn needs_something_after_the_highlight() {
        assert_eq!(parse("relay"), None);
        assert_eq!(parse("relay "), None);
    }

    #[test]
    fn arguments_are_kept_verbatim() {
        assert_eq!(
            parse("relay pipe #rust lots of  spam"),
            Some(Command::Pipe("#rust lots of  spam".into()))
        );
        assert_eq!(parse("relay say  hi"), Some(Command::Say(" hi".into())));
        assert_eq!(parse("relay say"), Some(Command::Say(String::new())));
    }

    #[test]
    fn unknown_commands_are_ignored() {
        assert_eq!(parse("relay dance"), None);
        assert_eq!(parse("relay __init__"), None);
    }

    #[test]
    fn names_round_trip() {
        for name in ["pipe", "unpipe", "say", "names", "backlog", "pipes"] {
            assert_eq!(Command::parse(name, "").unwrap().name(), name);
        }
    }
}
