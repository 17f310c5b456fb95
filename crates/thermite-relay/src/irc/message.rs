//! IRC line parsing and formatting.

use std::fmt;

/// `nick!user@host`, with user and host optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostmask {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
}

impl Hostmask {
    pub fn parse(source: &str) -> Self {
        let (rest, hostname) = match source.split_once('@') {
            Some((rest, host)) => (rest, Some(host.to_string())),
            None => (source, None),
        };
        let (nickname, username) = match rest.split_once('!') {
            Some((nick, user)) => (nick, Some(user.to_string())),
            None => (rest, None),
        };
        Self {
            nickname: nickname.to_string(),
            username,
            hostname,
        }
    }
}

impl fmt::Display for Hostmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nickname)?;
        if let Some(user) = &self.username {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.hostname {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

/// A single protocol line. Message tags are accepted on input and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub source: Option<String>,
    /// Uppercased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl Line {
    pub fn new(command: &str, params: &[&str]) -> Self {
        Self {
            source: None,
            command: command.to_string(),
            params: params.iter().map(ToString::to_string).collect(),
        }
    }

    /// Parse a raw line (without the trailing CRLF).
    pub fn parse(raw: &str) -> Option<Self> {
        let mut rest = raw.trim_end_matches(['\r', '\n']);

        if rest.starts_with('@') {
            rest = rest.split_once(' ')?.1.trim_start_matches(' ');
        }

        let mut source = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (src, tail) = stripped.split_once(' ')?;
            source = Some(src.to_string());
            rest = tail.trim_start_matches(' ');
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = words.map(ToString::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            source,
            command,
            params,
        })
    }

    pub fn hostmask(&self) -> Option<Hostmask> {
        self.source.as_deref().map(Hostmask::parse)
    }

    /// Nickname of the sender, or the server name for server-sourced lines.
    pub fn nick(&self) -> Option<&str> {
        self.source
            .as_deref()
            .map(|s| s.split(['!', '@']).next().unwrap_or(s))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", &[target, text])
    }

    pub fn notice(target: &str, text: &str) -> Self {
        Self::new("NOTICE", &[target, text])
    }

    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", &[channel])
    }

    pub fn part(channel: &str) -> Self {
        Self::new("PART", &[channel])
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, ":{source} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}
