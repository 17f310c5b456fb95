//! Client-side view of the network: own identity, ISUPPORT, channel rosters.
//!
//! Only the parts the relay needs are tracked: who is in which of our
//! channels, their prefix modes, and their user/host for service filtering.

use std::collections::{HashMap, HashSet};

use super::casemap::CaseMapping;
use super::message::{Hostmask, Line};

/// Assumed lengths when our own user/host have not been observed yet.
const UNKNOWN_USERNAME_LEN: usize = 10;
const UNKNOWN_HOSTNAME_LEN: usize = 63;

/// ISUPPORT `PREFIX`: channel privilege modes and symbols, highest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    pub modes: Vec<char>,
    pub symbols: Vec<char>,
}

impl Default for Prefix {
    fn default() -> Self {
        Self {
            modes: vec!['o', 'v'],
            symbols: vec!['@', '+'],
        }
    }
}

impl Prefix {
    /// Parse `(qaohv)~&@%+`.
    pub fn parse(value: &str) -> Option<Self> {
        let inner = value.strip_prefix('(')?;
        let (modes, symbols) = inner.split_once(')')?;
        let modes: Vec<char> = modes.chars().collect();
        let symbols: Vec<char> = symbols.chars().collect();
        (modes.len() == symbols.len()).then_some(Self { modes, symbols })
    }

    fn mode_for_symbol(&self, symbol: char) -> Option<char> {
        self.symbols
            .iter()
            .position(|s| *s == symbol)
            .map(|i| self.modes[i])
    }
}

/// Subset of RPL_ISUPPORT the relay cares about.
#[derive(Debug, Clone)]
pub struct ISupport {
    pub prefix: Prefix,
    pub chantypes: String,
    pub casemapping: CaseMapping,
    /// `CHANMODES` groups A, B, C, D.
    pub chanmodes: [String; 4],
    pub network: Option<String>,
}

impl Default for ISupport {
    fn default() -> Self {
        Self {
            prefix: Prefix::default(),
            chantypes: "#&".to_string(),
            casemapping: CaseMapping::default(),
            chanmodes: [
                "beI".to_string(),
                "k".to_string(),
                "l".to_string(),
                "imnpst".to_string(),
            ],
            network: None,
        }
    }
}

impl ISupport {
    fn apply_token(&mut self, token: &str) {
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        match key {
            "PREFIX" => {
                if let Some(prefix) = Prefix::parse(value) {
                    self.prefix = prefix;
                }
            }
            "CHANTYPES" => self.chantypes = value.to_string(),
            "CASEMAPPING" => self.casemapping = CaseMapping::from_token(value),
            "CHANMODES" => {
                for (slot, group) in self.chanmodes.iter_mut().zip(value.split(',')) {
                    *slot = group.to_string();
                }
            }
            "NETWORK" => self.network = Some(value.to_string()),
            _ => {}
        }
    }

    /// Whether `mode` consumes an argument when set (`adding`) or unset.
    fn takes_arg(&self, mode: char, adding: bool) -> bool {
        if self.prefix.modes.contains(&mode) {
            return true;
        }
        let [a, b, c, _] = &self.chanmodes;
        a.contains(mode) || b.contains(mode) || (adding && c.contains(mode))
    }
}

/// A channel occupant as seen from our side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
    /// Prefix symbols held, highest first.
    pub status: String,
}

impl Occupant {
    pub fn hostmask(&self) -> String {
        Hostmask {
            nickname: self.nickname.clone(),
            username: self.username.clone(),
            hostname: self.hostname.clone(),
        }
        .to_string()
    }
}

#[derive(Debug, Clone)]
struct Channel {
    name: String,
    /// folded nick -> prefix modes held
    members: HashMap<String, HashSet<char>>,
}

#[derive(Debug, Clone)]
struct User {
    nickname: String,
    username: Option<String>,
    hostname: Option<String>,
    /// folded channel names
    channels: HashSet<String>,
}

/// Tracked state of one connection.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub server_name: Option<String>,
    pub registered: bool,
    pub isupport: ISupport,
    channels: HashMap<String, Channel>,
    users: HashMap<String, User>,
}

impl ServerState {
    pub fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            username: None,
            hostname: None,
            server_name: None,
            registered: false,
            isupport: ISupport::default(),
            channels: HashMap::new(),
            users: HashMap::new(),
        }
    }

    pub fn casemapping(&self) -> CaseMapping {
        self.isupport.casemapping
    }

    pub fn casefold(&self, s: &str) -> String {
        self.isupport.casemapping.fold(s)
    }

    pub fn is_me(&self, nick: &str) -> bool {
        self.isupport.casemapping.equals(nick, &self.nickname)
    }

    pub fn is_channel(&self, name: &str) -> bool {
        name.len() > 1
            && name.starts_with(|c: char| self.isupport.chantypes.contains(c))
            && !name.contains([' ', ',', '\x07'])
    }

    pub fn in_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(&self.casefold(channel))
    }

    /// Display names of the channels `nick` currently shares with us.
    pub fn user_channels(&self, nick: &str) -> Vec<String> {
        let Some(user) = self.users.get(&self.casefold(nick)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = user
            .channels
            .iter()
            .filter_map(|c| self.channels.get(c).map(|ch| ch.name.clone()))
            .collect();
        names.sort();
        names
    }

    /// Prefix symbols `nick` holds in `channel`, in `PREFIX` precedence order.
    pub fn status(&self, channel: &str, nick: &str) -> String {
        self.channels
            .get(&self.casefold(channel))
            .and_then(|ch| ch.members.get(&self.casefold(nick)))
            .map(|modes| self.render_status(modes))
            .unwrap_or_default()
    }

    fn render_status(&self, modes: &HashSet<char>) -> String {
        let prefix = &self.isupport.prefix;
        prefix
            .modes
            .iter()
            .zip(&prefix.symbols)
            .filter(|(mode, _)| modes.contains(*mode))
            .map(|(_, symbol)| *symbol)
            .collect()
    }

    /// Everyone in `channel`, ourselves included, sorted by nickname.
    pub fn occupants(&self, channel: &str) -> Vec<Occupant> {
        let Some(ch) = self.channels.get(&self.casefold(channel)) else {
            return Vec::new();
        };
        let mut occupants: Vec<Occupant> = ch
            .members
            .iter()
            .filter_map(|(folded, modes)| {
                self.users.get(folded).map(|user| Occupant {
                    nickname: user.nickname.clone(),
                    username: user.username.clone(),
                    hostname: user.hostname.clone(),
                    status: self.render_status(modes),
                })
            })
            .collect();
        occupants.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        occupants
    }

    /// Length of `nick!user@host` as the server will prefix our messages.
    pub fn own_mask_len(&self) -> usize {
        self.nickname.len()
            + 1
            + self.username.as_ref().map_or(UNKNOWN_USERNAME_LEN, String::len)
            + 1
            + self.hostname.as_ref().map_or(UNKNOWN_HOSTNAME_LEN, String::len)
    }

    /// Forget everything learned from a previous session.
    pub fn reset(&mut self, nickname: &str) {
        *self = Self::new(nickname);
    }

    /// Update state from one inbound line.
    pub fn apply(&mut self, line: &Line) {
        match line.command.as_str() {
            "001" => {
                if let Some(nick) = line.param(0) {
                    self.nickname = nick.to_string();
                }
                self.server_name.clone_from(&line.source);
                self.registered = true;
            }
            "005" if line.params.len() > 2 => {
                for token in &line.params[1..line.params.len() - 1] {
                    self.isupport.apply_token(token);
                }
            }
            "353" => self.apply_names(line),
            // RPL_HOSTHIDDEN: a cloak or vhost was applied
            "396" => {
                if let Some(host) = line.param(1) {
                    self.hostname = Some(host.to_string());
                }
            }
            "JOIN" => self.apply_join(line),
            "PART" => {
                if let (Some(mask), Some(channel)) = (line.hostmask(), line.param(0)) {
                    self.remove_member(channel, &mask.nickname);
                }
            }
            "KICK" => {
                if let (Some(channel), Some(victim)) = (line.param(0), line.param(1)) {
                    self.remove_member(channel, victim);
                }
            }
            "QUIT" => {
                if let Some(mask) = line.hostmask() {
                    self.remove_user(&mask.nickname);
                }
            }
            "NICK" => {
                if let (Some(mask), Some(new)) = (line.hostmask(), line.param(0)) {
                    self.rename(&mask.nickname, new);
                }
            }
            "MODE" => self.apply_mode(line),
            _ => {}
        }
    }

    fn upsert_user(&mut self, mask: &Hostmask) -> String {
        let folded = self.casefold(&mask.nickname);
        let user = self.users.entry(folded.clone()).or_insert_with(|| User {
            nickname: mask.nickname.clone(),
            username: None,
            hostname: None,
            channels: HashSet::new(),
        });
        if mask.username.is_some() {
            user.username.clone_from(&mask.username);
        }
        if mask.hostname.is_some() {
            user.hostname.clone_from(&mask.hostname);
        }
        folded
    }

    fn add_member(&mut self, channel: &str, mask: &Hostmask, modes: HashSet<char>) {
        let folded_channel = self.casefold(channel);
        if !self.channels.contains_key(&folded_channel) {
            return;
        }
        let folded_nick = self.upsert_user(mask);
        if let Some(user) = self.users.get_mut(&folded_nick) {
            user.channels.insert(folded_channel.clone());
        }
        if let Some(ch) = self.channels.get_mut(&folded_channel) {
            ch.members.insert(folded_nick, modes);
        }
    }

    fn apply_join(&mut self, line: &Line) {
        let (Some(mask), Some(channel)) = (line.hostmask(), line.param(0)) else {
            return;
        };
        let folded_channel = self.casefold(channel);
        if self.is_me(&mask.nickname) {
            self.username.clone_from(&mask.username);
            self.hostname.clone_from(&mask.hostname);
            self.channels.insert(
                folded_channel,
                Channel {
                    name: channel.to_string(),
                    members: HashMap::new(),
                },
            );
        }
        self.add_member(channel, &mask, HashSet::new());
    }

    fn apply_names(&mut self, line: &Line) {
        // 353 <me> <symbol> <channel> :<names>
        let (Some(channel), Some(names)) = (line.param(2), line.param(3)) else {
            return;
        };
        let channel = channel.to_string();
        for entry in names.split(' ').filter(|n| !n.is_empty()) {
            let mut modes = HashSet::new();
            let mut rest = entry;
            while let Some(c) = rest.chars().next() {
                match self.isupport.prefix.mode_for_symbol(c) {
                    Some(mode) => {
                        modes.insert(mode);
                        rest = &rest[c.len_utf8()..];
                    }
                    None => break,
                }
            }
            if !rest.is_empty() {
                self.add_member(&channel, &Hostmask::parse(rest), modes);
            }
        }
    }

    fn remove_member(&mut self, channel: &str, nick: &str) {
        let folded_channel = self.casefold(channel);
        if self.is_me(nick) {
            if let Some(ch) = self.channels.remove(&folded_channel) {
                for member in ch.members.keys() {
                    if let Some(user) = self.users.get_mut(member) {
                        user.channels.remove(&folded_channel);
                    }
                }
            }
        } else {
            let folded_nick = self.casefold(nick);
            if let Some(ch) = self.channels.get_mut(&folded_channel) {
                ch.members.remove(&folded_nick);
            }
            if let Some(user) = self.users.get_mut(&folded_nick) {
                user.channels.remove(&folded_channel);
            }
        }
        self.prune_users();
    }

    fn remove_user(&mut self, nick: &str) {
        let folded_nick = self.casefold(nick);
        if let Some(user) = self.users.remove(&folded_nick) {
            for channel in user.channels {
                if let Some(ch) = self.channels.get_mut(&channel) {
                    ch.members.remove(&folded_nick);
                }
            }
        }
    }

    fn rename(&mut self, old: &str, new: &str) {
        if self.is_me(old) {
            self.nickname = new.to_string();
        }
        let old_folded = self.casefold(old);
        let new_folded = self.casefold(new);
        let Some(mut user) = self.users.remove(&old_folded) else {
            return;
        };
        user.nickname = new.to_string();
        for channel in &user.channels {
            if let Some(ch) = self.channels.get_mut(channel) {
                if let Some(modes) = ch.members.remove(&old_folded) {
                    ch.members.insert(new_folded.clone(), modes);
                }
            }
        }
        self.users.insert(new_folded, user);
    }

    fn apply_mode(&mut self, line: &Line) {
        let (Some(target), Some(modestring)) = (line.param(0), line.param(1)) else {
            return;
        };
        let folded_channel = self.casefold(target);
        if !self.channels.contains_key(&folded_channel) {
            return;
        }
        let mut args = line.params.iter().skip(2);
        let mut adding = true;
        for mode in modestring.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    if !self.isupport.takes_arg(mode, adding) {
                        continue;
                    }
                    let Some(arg) = args.next() else { break };
                    if !self.isupport.prefix.modes.contains(&mode) {
                        continue;
                    }
                    let folded_nick = self.casefold(arg);
                    if let Some(modes) = self
                        .channels
                        .get_mut(&folded_channel)
                        .and_then(|ch| ch.members.get_mut(&folded_nick))
                    {
                        if adding {
                            modes.insert(mode);
                        } else {
                            modes.remove(&mode);
                        }
                    }
                }
            }
        }
    }

    fn prune_users(&mut self) {
        let me = self.casefold(&self.nickname);
        self.users
            .retain(|folded, user| !user.channels.is_empty() || *folded == me);
    }
}
