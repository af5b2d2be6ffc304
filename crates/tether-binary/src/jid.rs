//! Wire addresses.
//!
//! A JID is `user@server` with an optional agent and device index. The
//! device-qualified rendering is `user.agent:device@server` and identifies
//! one linked device of an account.

use crate::error::JidParseError;
use std::fmt;
use std::str::FromStr;

/// Server part of user addresses.
pub const DEFAULT_USER_SERVER: &str = "c.tether.net";
/// Server part of pseudonymous (LID) addresses.
pub const LID_SERVER: &str = "lid";
/// Server part of group addresses.
pub const GROUP_SERVER: &str = "g.tether.net";
/// The server's own address, used as `to`/`from` on protocol stanzas.
pub const SERVER_JID: &str = "s.tether.net";

/// A protocol address.
///
/// `agent` and `device` are zero for plain account addresses; a nonzero
/// device index marks a device-qualified address used in routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Jid {
    /// Local part, empty for server-only addresses.
    pub user: String,
    /// Server part, never empty.
    pub server: String,
    /// Agent discriminator (1 = LID namespace).
    pub agent: u8,
    /// Device index within the account.
    pub device: u16,
}

impl Jid {
    /// Plain `user@server` address.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            agent: 0,
            device: 0,
        }
    }

    /// Device-qualified address.
    pub fn new_ad(user: impl Into<String>, agent: u8, device: u16) -> Self {
        let server = if agent == 1 {
            LID_SERVER
        } else {
            DEFAULT_USER_SERVER
        };
        Self {
            user: user.into(),
            server: server.to_owned(),
            agent,
            device,
        }
    }

    /// The server's own address.
    #[must_use]
    pub fn server_jid() -> Self {
        Self::new("", SERVER_JID)
    }

    /// True if this address carries an agent or device qualifier.
    #[must_use]
    pub fn is_ad(&self) -> bool {
        self.agent != 0 || self.device != 0
    }

    /// True for addresses in the pseudonymous namespace.
    #[must_use]
    pub fn is_lid(&self) -> bool {
        self.server == LID_SERVER
    }

    /// Copy of this address with the device index replaced.
    #[must_use]
    pub fn with_device(&self, device: u16) -> Self {
        let mut jid = self.clone();
        jid.device = device;
        jid
    }

    /// Copy of this address with agent and device stripped.
    #[must_use]
    pub fn to_non_ad(&self) -> Self {
        Self::new(self.user.clone(), self.server.clone())
    }

    /// Address of the same user in the double-ratchet library's
    /// `name:device-index` form.
    #[must_use]
    pub fn signal_address(&self) -> String {
        if self.is_lid() {
            format!("{}_1:{}", self.user, self.device)
        } else {
            format!("{}:{}", self.user, self.device)
        }
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            return write!(f, "{}", self.server);
        }
        match (self.agent, self.device) {
            (0, 0) => write!(f, "{}@{}", self.user, self.server),
            (0, d) => write!(f, "{}:{}@{}", self.user, d, self.server),
            (a, d) => write!(f, "{}.{}:{}@{}", self.user, a, d, self.server),
        }
    }
}

impl FromStr for Jid {
    type Err = JidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((local, server)) = s.rsplit_once('@') else {
            // A bare server name is a valid server-only address.
            if s.is_empty() {
                return Err(JidParseError(s.to_owned()));
            }
            return Ok(Self::new("", s));
        };
        if server.is_empty() {
            return Err(JidParseError(s.to_owned()));
        }

        let (rest, device) = match local.rsplit_once(':') {
            Some((rest, dev)) => {
                let device = dev.parse::<u16>().map_err(|_| JidParseError(s.to_owned()))?;
                (rest, device)
            }
            None => (local, 0),
        };
        let (user, agent) = match rest.rsplit_once('.') {
            Some((user, agent)) => {
                let agent = agent.parse::<u8>().map_err(|_| JidParseError(s.to_owned()))?;
                (user, agent)
            }
            None => (rest, 0),
        };
        if user.is_empty() {
            return Err(JidParseError(s.to_owned()));
        }

        Ok(Self {
            user: user.to_owned(),
            server: server.to_owned(),
            agent,
            device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_roundtrip() {
        let jid: Jid = "15551234567@c.tether.net".parse().unwrap();
        assert_eq!(jid.user, "15551234567");
        assert_eq!(jid.server, DEFAULT_USER_SERVER);
        assert!(!jid.is_ad());
        assert_eq!(jid.to_string(), "15551234567@c.tether.net");
    }

    #[test]
    fn test_ad_roundtrip() {
        let jid: Jid = "15551234567.1:4@lid".parse().unwrap();
        assert_eq!(jid.agent, 1);
        assert_eq!(jid.device, 4);
        assert!(jid.is_ad());
        assert!(jid.is_lid());
        assert_eq!(jid.to_string(), "15551234567.1:4@lid");
    }

    #[test]
    fn test_device_only() {
        let jid: Jid = "200:12@c.tether.net".parse().unwrap();
        assert_eq!(jid.agent, 0);
        assert_eq!(jid.device, 12);
        assert_eq!(jid.to_string(), "200:12@c.tether.net");
    }

    #[test]
    fn test_server_only() {
        let jid: Jid = SERVER_JID.parse().unwrap();
        assert_eq!(jid, Jid::server_jid());
        assert_eq!(jid.to_string(), SERVER_JID);
    }

    #[test]
    fn test_invalid() {
        assert!("".parse::<Jid>().is_err());
        assert!("@server".parse::<Jid>().is_err());
        assert!("user@".parse::<Jid>().is_err());
        assert!("u:x@s".parse::<Jid>().is_err());
    }

    #[test]
    fn test_signal_address() {
        let pn = Jid::new_ad("15551234567", 0, 3);
        assert_eq!(pn.signal_address(), "15551234567:3");
        let lid = Jid::new_ad("98765", 1, 0);
        assert_eq!(lid.signal_address(), "98765_1:0");
    }
}
