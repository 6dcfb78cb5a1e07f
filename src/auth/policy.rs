//! Channel authorization policy
//!
//! Grants are a pure function of (user id, role): recomputed at every
//! token issue, never stored as authored state. Capability flags are
//! least-privilege: operational roles get publish rights on operational
//! channels, customers are read-only observers of their own deliveries.

use crate::channels::Channel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of roles. Exactly one per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Dispatcher,
    Driver,
    Customer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Dispatcher, Role::Driver, Role::Customer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Dispatcher => "dispatcher",
            Role::Driver => "driver",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "dispatcher" => Ok(Role::Dispatcher),
            "driver" => Ok(Role::Driver),
            "customer" => Ok(Role::Customer),
            other => Err(format!(
                "invalid role '{other}': must be admin, dispatcher, driver, or customer"
            )),
        }
    }
}

/// A named channel plus four independent capability flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGrant {
    pub channel: Channel,
    pub subscribe: bool,
    pub publish: bool,
    /// See who else is subscribed
    pub presence: bool,
    /// Replay past events
    pub history: bool,
}

impl ChannelGrant {
    /// Subscribe + history only; no publish, no presence
    pub fn read_only(channel: Channel) -> Self {
        Self {
            channel,
            subscribe: true,
            publish: false,
            presence: false,
            history: true,
        }
    }

    /// Subscribe + publish + history, presence optional
    pub fn writable(channel: Channel, presence: bool) -> Self {
        Self {
            channel,
            subscribe: true,
            publish: true,
            presence,
            history: true,
        }
    }
}

impl fmt::Display for ChannelGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut caps = String::new();
        for (flag, c) in [
            (self.subscribe, 's'),
            (self.publish, 'p'),
            (self.presence, 'r'),
            (self.history, 'h'),
        ] {
            if flag {
                caps.push(c);
            }
        }
        write!(f, "{}:{caps}", self.channel)
    }
}

/// Compute the ordered grant list for a user.
///
/// Order-stable so callers (and tests) can rely on exact lists:
/// the private channel first, announcements second, role extras after.
pub fn channels_for(user_id: &str, role: Role) -> Vec<ChannelGrant> {
    let mut grants = vec![
        ChannelGrant::read_only(Channel::user(user_id)),
        ChannelGrant::read_only(Channel::announcements()),
    ];

    match role {
        Role::Admin => {
            grants.push(ChannelGrant::writable(
                Channel::well_known("admin:notifications"),
                true,
            ));
            grants.push(ChannelGrant::read_only(Channel::well_known(
                "system:monitoring",
            )));
        }
        Role::Dispatcher => {
            grants.push(ChannelGrant::writable(
                Channel::well_known("dispatchers:channel"),
                true,
            ));
            grants.push(ChannelGrant::writable(
                Channel::well_known("deliveries:updates"),
                false,
            ));
        }
        Role::Driver => {
            grants.push(ChannelGrant::writable(
                Channel::well_known("drivers:channel"),
                true,
            ));
            grants.push(ChannelGrant::read_only(Channel::driver_deliveries(
                user_id,
            )));
        }
        Role::Customer => {
            grants.push(ChannelGrant::read_only(Channel::customer_deliveries(
                user_id,
            )));
        }
    }

    grants
}

/// Just the channel names of a grant list, in order
pub fn channel_names(grants: &[ChannelGrant]) -> Vec<String> {
    grants.iter().map(|g| g.channel.to_string()).collect()
}
