// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    net::{AddrParseError, IpAddr, Ipv4Addr, Ipv6Addr},
    num::ParseIntError,
};
use thiserror::Error;

/// Address family of a prefix or address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// The flag iproute2 uses to select this family.
    pub fn ip_flag(&self) -> &'static str {
        match self {
            Self::V4 => "-4",
            Self::V6 => "-6",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "ipv4"),
            Self::V6 => write!(f, "ipv6"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpNet {
    V4(Ipv4Net),
    V6(Ipv6Net),
}

impl std::fmt::Display for IpNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4(p) => p.fmt(f),
            Self::V6(p) => p.fmt(f),
        }
    }
}

impl IpNet {
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, IpPrefixParseError> {
        Ok(match addr {
            IpAddr::V4(a) => Self::V4(Ipv4Net::new(a, len)?),
            IpAddr::V6(a) => Self::V6(Ipv6Net::new(a, len)?),
        })
    }

    /// A full-length prefix covering exactly `addr`.
    pub fn host_net(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => Self::V4(Ipv4Net { addr: a, len: 32 }),
            IpAddr::V6(a) => Self::V6(Ipv6Net { addr: a, len: 128 }),
        }
    }

    /// The zero-length prefix of the given family.
    pub fn default_route(family: Family) -> Self {
        match family {
            Family::V4 => Self::V4(Ipv4Net {
                addr: Ipv4Addr::UNSPECIFIED,
                len: 0,
            }),
            Family::V6 => Self::V6(Ipv6Net {
                addr: Ipv6Addr::UNSPECIFIED,
                len: 0,
            }),
        }
    }

    pub fn addr(&self) -> IpAddr {
        match self {
            Self::V4(s) => s.addr.into(),
            Self::V6(s) => s.addr.into(),
        }
    }

    pub fn length(&self) -> u8 {
        match self {
            Self::V4(s) => s.len,
            Self::V6(s) => s.len,
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Self::V4(_) => Family::V4,
            Self::V6(_) => Family::V6,
        }
    }

    /// This prefix with all host bits cleared.
    pub fn network(&self) -> Self {
        match self {
            Self::V4(p) => Self::V4(p.network()),
            Self::V6(p) => Self::V6(p.network()),
        }
    }
}

#[derive(Debug, Error)]
pub enum IpPrefixParseError {
    #[error("v4 prefix parse error: {0}")]
    V4(#[from] Ipv4PrefixParseError),

    #[error("v6 prefix parse error: {0}")]
    V6(#[from] Ipv6PrefixParseError),
}

impl std::str::FromStr for IpNet {
    type Err = IpPrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(':') {
            return Ok(IpNet::V4(Ipv4Net::from_str(s)?));
        }
        Ok(IpNet::V6(Ipv6Net::from_str(s)?))
    }
}

impl Serialize for IpNet {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpNet {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Ipv4Net> for IpNet {
    fn from(p: Ipv4Net) -> Self {
        Self::V4(p)
    }
}

impl From<Ipv6Net> for IpNet {
    fn from(p: Ipv6Net) -> Self {
        Self::V6(p)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Net {
    pub addr: Ipv4Addr,
    pub len: u8,
}

impl Ipv4Net {
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, Ipv4PrefixParseError> {
        if len > 32 {
            return Err(Ipv4PrefixParseError::Length(len));
        }
        Ok(Self { addr, len })
    }

    pub fn network(&self) -> Self {
        let mask = match self.len {
            0 => 0,
            n => u32::MAX << (32 - u32::from(n)),
        };
        Self {
            addr: Ipv4Addr::from(u32::from(self.addr) & mask),
            len: self.len,
        }
    }
}

impl std::fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

#[derive(Debug, Error)]
pub enum Ipv4PrefixParseError {
    #[error("expected CIDR representation <addr>/<mask>")]
    Cidr,

    #[error("address parse error: {0}")]
    Addr(#[from] AddrParseError),

    #[error("mask parse error: {0}")]
    Mask(#[from] ParseIntError),

    #[error("prefix length {0} exceeds 32")]
    Length(u8),
}

impl std::str::FromStr for Ipv4Net {
    type Err = Ipv4PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) =
            s.split_once('/').ok_or(Ipv4PrefixParseError::Cidr)?;
        Ipv4Net::new(Ipv4Addr::from_str(addr)?, u8::from_str(len)?)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv6Net {
    pub addr: Ipv6Addr,
    pub len: u8,
}

impl Ipv6Net {
    pub fn new(addr: Ipv6Addr, len: u8) -> Result<Self, Ipv6PrefixParseError> {
        if len > 128 {
            return Err(Ipv6PrefixParseError::Length(len));
        }
        Ok(Self { addr, len })
    }

    pub fn network(&self) -> Self {
        let mask = match self.len {
            0 => 0,
            n => u128::MAX << (128 - u32::from(n)),
        };
        Self {
            addr: Ipv6Addr::from(u128::from(self.addr) & mask),
            len: self.len,
        }
    }
}

impl std::fmt::Display for Ipv6Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

#[derive(Debug, Error)]
pub enum Ipv6PrefixParseError {
    #[error("expected CIDR representation <addr>/<mask>")]
    Cidr,

    #[error("address parse error: {0}")]
    Addr(#[from] AddrParseError),

    #[error("mask parse error: {0}")]
    Mask(#[from] ParseIntError),

    #[error("prefix length {0} exceeds 128")]
    Length(u8),
}

impl std::str::FromStr for Ipv6Net {
    type Err = Ipv6PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) =
            s.split_once('/').ok_or(Ipv6PrefixParseError::Cidr)?;
        Ipv6Net::new(Ipv6Addr::from_str(addr)?, u8::from_str(len)?)
    }
}
