// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Peer enumeration for mesh peers running as podman containers.

use crate::{
    iproute::parse_route_line,
    log::peer_log,
    platform::{Exec, PeerEnumerator, SystemExec},
    route::Route,
    Error,
};
use mr_common::net::{Family, IpNet};
use serde::Deserialize;
use slog::Logger;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

const UNIT_PEERS: &str = "podman";

pub const DEFAULT_PODMAN_BIN: &str = "podman";

/// Contents of the peers file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeersConfig {
    pub peers: Vec<PeerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    pub name: String,

    /// Container name, defaults to the peer name.
    pub container: Option<String>,

    /// Podman network whose address is used as the nexthop when none is
    /// configured.
    pub network: Option<String>,

    pub nexthop: Option<IpAddr>,

    /// Subnets this peer always advertises.
    #[serde(default)]
    pub subnets: Vec<IpNet>,

    /// Mesh interface inside the container whose routes are advertised.
    pub discover_device: Option<String>,
}

impl PeerConfig {
    pub fn container(&self) -> &str {
        self.container.as_deref().unwrap_or(&self.name)
    }
}

impl PeersConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("read {}: {e}", path.display()))
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, Error> {
        let cfg: Self = serde_json::from_str(data)?;
        for p in &cfg.peers {
            if p.nexthop.is_none() && p.container().is_empty() {
                return Err(Error::Config(format!(
                    "peer {} has neither a nexthop nor a container",
                    p.name
                )));
            }
        }
        Ok(cfg)
    }
}

#[derive(Debug, Deserialize)]
struct NetworkSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(rename = "GlobalIPv6Address", default)]
    global_ipv6_address: String,
}

/// Pick the nexthop out of `podman inspect` network settings: the address on
/// `network` if one is named, otherwise the first address in network name
/// order.
pub(crate) fn select_nexthop(
    inspect: &str,
    network: Option<&str>,
) -> Result<Option<IpAddr>, Error> {
    let networks: BTreeMap<String, NetworkSettings> =
        serde_json::from_str(inspect.trim())?;

    let address = |n: &NetworkSettings| -> Option<String> {
        [&n.ip_address, &n.global_ipv6_address]
            .into_iter()
            .find(|a| !a.is_empty())
            .cloned()
    };

    let found = match network {
        Some(name) => networks.get(name).and_then(address),
        None => networks.values().find_map(address),
    };

    match found {
        Some(a) => Ok(Some(a.parse()?)),
        None => Ok(None),
    }
}

/// Lists peer routes by asking podman about each configured peer.
pub struct PodmanPeers<E: Exec = SystemExec> {
    exec: E,
    podman: String,
    peers: Vec<PeerConfig>,
    log: Logger,
}

impl PodmanPeers<SystemExec> {
    pub fn new(
        podman: impl Into<String>,
        peers: Vec<PeerConfig>,
        log: Logger,
    ) -> Self {
        Self::with_exec(SystemExec, podman, peers, log)
    }
}

impl<E: Exec> PodmanPeers<E> {
    pub fn with_exec(
        exec: E,
        podman: impl Into<String>,
        peers: Vec<PeerConfig>,
        log: Logger,
    ) -> Self {
        Self {
            exec,
            podman: podman.into(),
            peers,
            log,
        }
    }

    pub fn peers(&self) -> &[PeerConfig] {
        &self.peers
    }

    async fn nexthop(&self, peer: &PeerConfig) -> Result<IpAddr, Error> {
        if let Some(nh) = peer.nexthop {
            return Ok(nh);
        }
        let out = self
            .exec
            .exec(
                &self.podman,
                &[
                    "inspect",
                    "--format",
                    "{{json .NetworkSettings.Networks}}",
                    peer.container(),
                ],
            )
            .await?;
        select_nexthop(&out, peer.network.as_deref())?.ok_or_else(|| {
            Error::Config(format!(
                "peer {} container {} has no address{}",
                peer.name,
                peer.container(),
                peer.network
                    .as_ref()
                    .map(|n| format!(" on network {n}"))
                    .unwrap_or_default(),
            ))
        })
    }

    async fn discover(
        &self,
        peer: &PeerConfig,
        device: &str,
        family: Family,
    ) -> Result<Vec<IpNet>, Error> {
        let out = self
            .exec
            .exec(
                &self.podman,
                &[
                    "exec",
                    peer.container(),
                    "ip",
                    family.ip_flag(),
                    "route",
                    "show",
                    "dev",
                    device,
                ],
            )
            .await?;

        let mut result = Vec::new();
        for line in out.lines() {
            let Some(parsed) = parse_route_line(line, family)? else {
                continue;
            };
            if parsed.destination.length() == 0 {
                peer_log!(self.log,
                    debug,
                    "ignoring default route on {} of peer {}", device, peer.name;
                    "peer" => peer.name.clone()
                );
                continue;
            }
            result.push(parsed.destination);
        }
        Ok(result)
    }

    async fn peer_routes(&self, peer: &PeerConfig) -> Result<Vec<Route>, Error> {
        let nexthop = self.nexthop(peer).await?;

        let mut subnets = peer.subnets.clone();
        if let Some(device) = &peer.discover_device {
            subnets.extend(
                self.discover(peer, device, Family::of(&nexthop)).await?,
            );
        }

        let routes = subnets
            .into_iter()
            .map(|s| Route::new(s, nexthop))
            .collect::<Result<Vec<_>, _>>()?;

        peer_log!(self.log,
            debug,
            "peer {} advertises {} routes via {}", peer.name, routes.len(), nexthop;
            "peer" => peer.name.clone()
        );
        Ok(routes)
    }
}

impl<E: Exec> PeerEnumerator for PodmanPeers<E> {
    async fn list_peer_routes(&self) -> Result<Vec<Route>, Error> {
        let mut result = Vec::new();
        for peer in &self.peers {
            match self.peer_routes(peer).await {
                Ok(routes) => result.extend(routes),
                Err(e) => {
                    peer_log!(self.log,
                        error,
                        "failed to query peer {}: {e}", peer.name;
                        "peer" => peer.name.clone(),
                        "error" => format!("{e}")
                    );
                    return Err(e);
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::test::TestExec;
    use mr_common::{cidr, ip};
    use pretty_assertions::assert_eq;

    const INSPECT: &str = r#"{"netmaker-net":{"EndpointID":"","Gateway":"10.89.0.1","IPAddress":"10.89.0.2","IPPrefixLen":24,"GlobalIPv6Address":""},"podman":{"IPAddress":"10.88.0.7","GlobalIPv6Address":""}}"#;

    fn peers(json: &str) -> Vec<PeerConfig> {
        PeersConfig::parse(json).unwrap().peers
    }

    #[test]
    fn parse_config() {
        let cfg = PeersConfig::parse(
            r#"{"peers": [
                {"name": "netmaker", "subnets": ["10.101.0.0/16"],
                 "discover_device": "netmaker", "network": "netmaker-net"},
                {"name": "client-1", "container": "netclient-1",
                 "nexthop": "10.89.0.3"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(cfg.peers.len(), 2);
        assert_eq!(cfg.peers[0].container(), "netmaker");
        assert_eq!(cfg.peers[0].subnets, vec![cidr!("10.101.0.0/16")]);
        assert_eq!(cfg.peers[1].container(), "netclient-1");
        assert_eq!(cfg.peers[1].nexthop, Some(ip!("10.89.0.3")));

        assert!(PeersConfig::parse(r#"{"peers": [{"name": "x", "subnet": []}]}"#)
            .is_err());
        assert!(PeersConfig::parse(
            r#"{"peers": [{"name": "x", "subnets": ["10.0.0.0/40"]}]}"#
        )
        .is_err());
    }

    #[test]
    fn nexthop_selection() {
        assert_eq!(
            select_nexthop(INSPECT, Some("netmaker-net")).unwrap(),
            Some(ip!("10.89.0.2"))
        );
        assert_eq!(
            select_nexthop(INSPECT, Some("podman")).unwrap(),
            Some(ip!("10.88.0.7"))
        );
        assert_eq!(select_nexthop(INSPECT, None).unwrap(), Some(ip!("10.89.0.2")));
        assert_eq!(select_nexthop(INSPECT, Some("other")).unwrap(), None);
        assert_eq!(
            select_nexthop(
                r#"{"v6net":{"IPAddress":"","GlobalIPv6Address":"fd00::5"}}"#,
                None
            )
            .unwrap(),
            Some(ip!("fd00::5"))
        );
        assert!(select_nexthop("not json", None).is_err());
    }

    #[tokio::test]
    async fn list_peer_routes_with_discovery() {
        let exec = TestExec::default();
        exec.respond(
            "podman inspect --format {{json .NetworkSettings.Networks}} netmaker",
            INSPECT,
        );
        exec.respond(
            "podman exec netmaker ip -4 route show dev netmaker",
            "default via 10.101.0.254\n\
             10.101.0.0/16 proto kernel scope link src 10.101.0.1\n\
             192.168.50.0/24 via 10.101.0.3\n",
        );
        let p = PodmanPeers::with_exec(
            exec,
            "podman",
            peers(
                r#"{"peers": [
                    {"name": "netmaker", "network": "netmaker-net",
                     "subnets": ["10.102.0.7/16"], "discover_device": "netmaker"},
                    {"name": "client-1", "nexthop": "10.89.0.3",
                     "subnets": ["10.200.0.0/24"]}
                ]}"#,
            ),
            util::test::logger(),
        );

        let routes = p.list_peer_routes().await.unwrap();
        let rt = |d: &str, n: &str| Route::new(cidr!(d), ip!(n)).unwrap();
        assert_eq!(
            routes,
            vec![
                rt("10.102.0.0/16", "10.89.0.2"),
                rt("10.101.0.0/16", "10.89.0.2"),
                rt("192.168.50.0/24", "10.89.0.2"),
                rt("10.200.0.0/24", "10.89.0.3"),
            ]
        );
        // the statically addressed peer is never inspected
        assert_eq!(p.exec.history().len(), 2);
    }

    #[tokio::test]
    async fn any_peer_failure_fails_enumeration() {
        let exec = TestExec::default();
        exec.fail(
            "podman inspect --format {{json .NetworkSettings.Networks}} gone",
            "Error: no such object: \"gone\"",
        );
        let p = PodmanPeers::with_exec(
            exec,
            "podman",
            peers(
                r#"{"peers": [
                    {"name": "ok", "nexthop": "10.89.0.3", "subnets": ["10.200.0.0/24"]},
                    {"name": "gone", "subnets": ["10.201.0.0/24"]}
                ]}"#,
            ),
            util::test::logger(),
        );
        assert!(p.list_peer_routes().await.is_err());
    }

    #[tokio::test]
    async fn family_mismatch_fails_enumeration() {
        let p = PodmanPeers::with_exec(
            TestExec::default(),
            "podman",
            peers(
                r#"{"peers": [
                    {"name": "odd", "nexthop": "fd00::3", "subnets": ["10.200.0.0/24"]}
                ]}"#,
            ),
            util::test::logger(),
        );
        assert!(p.list_peer_routes().await.is_err());
    }

    #[tokio::test]
    async fn container_without_address_fails() {
        let exec = TestExec::default();
        exec.respond(
            "podman inspect --format {{json .NetworkSettings.Networks}} c",
            r#"{"podman":{"IPAddress":""}}"#,
        );
        let p = PodmanPeers::with_exec(
            exec,
            "podman",
            peers(r#"{"peers": [{"name": "c", "subnets": []}]}"#),
            util::test::logger(),
        );
        let err = p.list_peer_routes().await.unwrap_err();
        assert!(err.to_string().contains("has no address"), "{err}");
    }
}
