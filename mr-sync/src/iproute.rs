// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing table gateway backed by iproute2.

use crate::{
    log::table_log,
    platform::{Exec, RoutingTableGateway, SystemExec},
    route::Route,
    Error,
};
use mr_common::net::{Family, IpNet};
use slog::Logger;
use std::net::IpAddr;

const UNIT_TABLE: &str = "iproute";

pub const DEFAULT_IP_BIN: &str = "ip";
pub const DEFAULT_RULE_PRIORITY: u32 = 5000;

// Route types that never carry a forwarding nexthop.
const NON_UNICAST_TYPES: &[&str] = &[
    "local",
    "broadcast",
    "multicast",
    "throw",
    "unreachable",
    "prohibit",
    "blackhole",
    "nat",
    "anycast",
];

/// One line of `ip route show` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RouteLine {
    pub(crate) destination: IpNet,
    pub(crate) via: Option<IpAddr>,
}

/// Parse a single line of `ip route show`. Returns `Ok(None)` for lines that
/// do not describe a unicast route (blank lines, multipath continuation lines,
/// blackhole and friends).
pub(crate) fn parse_route_line(
    line: &str,
    family: Family,
) -> Result<Option<RouteLine>, Error> {
    if line.starts_with(char::is_whitespace) {
        return Ok(None);
    }
    let mut tokens = line.split_whitespace().peekable();

    let Some(mut first) = tokens.next() else {
        return Ok(None);
    };
    if first == "unicast" {
        first = match tokens.next() {
            Some(t) => t,
            None => return Err(Error::Parse(format!("truncated route {line}"))),
        };
    }
    if NON_UNICAST_TYPES.contains(&first) {
        return Ok(None);
    }

    let destination = parse_destination(first, family)?;

    let mut via = None;
    while let Some(t) = tokens.next() {
        if t != "via" {
            continue;
        }
        // RFC 5549 style "via inet6 <addr>"
        if let Some(&("inet" | "inet6")) = tokens.peek() {
            tokens.next();
        }
        let addr = tokens
            .next()
            .ok_or_else(|| Error::Parse(format!("via without address: {line}")))?;
        via = Some(addr.parse::<IpAddr>()?);
        break;
    }

    Ok(Some(RouteLine { destination, via }))
}

fn parse_destination(s: &str, family: Family) -> Result<IpNet, Error> {
    if s == "default" {
        return Ok(IpNet::default_route(family));
    }
    if s.contains('/') {
        return Ok(s.parse::<IpNet>()?);
    }
    Ok(IpNet::host_net(s.parse::<IpAddr>()?))
}

// iproute2 reports a numbered table that has never held a route this way.
const NO_SUCH_TABLE: &str = "FIB table does not exist";

/// True if `ip -N rule show` output contains a rule that sends all traffic
/// through `table`. Rules with a narrower selector do not count.
pub(crate) fn has_lookup_rule(output: &str, table: u32) -> bool {
    let table = table.to_string();
    output.lines().any(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        tokens
            .windows(4)
            .any(|w| *w == ["from", "all", "lookup", table.as_str()])
    })
}

fn is_missing_table(e: &Error) -> bool {
    matches!(e, Error::Command { stderr, .. } if stderr.contains(NO_SUCH_TABLE))
}

/// Manages a numbered policy table by running `ip`.
pub struct IpRouteGateway<E: Exec = SystemExec> {
    exec: E,
    ip: String,
    families: Vec<Family>,
    rule_priority: u32,
    log: Logger,
}

impl IpRouteGateway<SystemExec> {
    pub fn new(
        ip: impl Into<String>,
        families: Vec<Family>,
        rule_priority: u32,
        log: Logger,
    ) -> Self {
        Self::with_exec(SystemExec, ip, families, rule_priority, log)
    }
}

impl<E: Exec> IpRouteGateway<E> {
    pub fn with_exec(
        exec: E,
        ip: impl Into<String>,
        families: Vec<Family>,
        rule_priority: u32,
        log: Logger,
    ) -> Self {
        Self {
            exec,
            ip: ip.into(),
            families,
            rule_priority,
            log,
        }
    }

    #[cfg(test)]
    pub(crate) fn exec(&self) -> &E {
        &self.exec
    }

    async fn ip(&self, args: &[&str]) -> Result<String, Error> {
        self.exec.exec(&self.ip, args).await
    }

    async fn list_family(
        &self,
        family: Family,
        table: u32,
    ) -> Result<Vec<Route>, Error> {
        let table_s = table.to_string();
        let out = match self
            .ip(&[family.ip_flag(), "route", "show", "table", &table_s])
            .await
        {
            Ok(out) => out,
            Err(e) if is_missing_table(&e) => {
                table_log!(self.log,
                    debug,
                    "{family} table {table} does not exist yet";
                    "table" => table
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut result = Vec::new();
        for line in out.lines() {
            let parsed = match parse_route_line(line, family) {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    table_log!(self.log,
                        warn,
                        "skipping unparseable route in table {table}: {e}";
                        "line" => line.to_string()
                    );
                    continue;
                }
            };
            let Some(nexthop) = parsed.via else {
                table_log!(self.log,
                    debug,
                    "ignoring route without nexthop in table {table}";
                    "line" => line.to_string()
                );
                continue;
            };
            match Route::new(parsed.destination, nexthop) {
                Ok(r) => result.push(r),
                // Mixed family routes (v4 via inet6) are not managed and are
                // left in place.
                Err(e) => {
                    table_log!(self.log,
                        warn,
                        "ignoring unmanaged route in table {table}: {e}";
                        "line" => line.to_string()
                    );
                }
            }
        }
        Ok(result)
    }

    async fn ensure_family_rule(
        &self,
        family: Family,
        table: u32,
    ) -> Result<bool, Error> {
        let table_s = table.to_string();
        let out = self
            .ip(&["-N", family.ip_flag(), "rule", "show", "table", &table_s])
            .await?;
        if has_lookup_rule(&out, table) {
            return Ok(false);
        }

        let pref = self.rule_priority.to_string();
        self.ip(&[
            family.ip_flag(),
            "rule",
            "add",
            "pref",
            &pref,
            "table",
            &table_s,
        ])
        .await?;
        table_log!(self.log,
            info,
            "created {family} policy rule for table {table}";
            "table" => table,
            "pref" => self.rule_priority
        );
        Ok(true)
    }
}

impl<E: Exec> RoutingTableGateway for IpRouteGateway<E> {
    fn families(&self) -> &[Family] {
        &self.families
    }

    async fn list_installed_routes(
        &self,
        table: u32,
    ) -> Result<Vec<Route>, Error> {
        let mut result = Vec::new();
        for family in &self.families {
            result.extend(self.list_family(*family, table).await?);
        }
        Ok(result)
    }

    async fn add_route(&self, route: &Route, table: u32) -> Result<(), Error> {
        let dst = route.destination().to_string();
        let nh = route.nexthop().to_string();
        let table_s = table.to_string();
        self.ip(&["route", "add", &dst, "via", &nh, "table", &table_s])
            .await?;
        Ok(())
    }

    async fn remove_route(
        &self,
        route: &Route,
        table: u32,
    ) -> Result<(), Error> {
        let dst = route.destination().to_string();
        let nh = route.nexthop().to_string();
        let table_s = table.to_string();
        self.ip(&["route", "del", &dst, "via", &nh, "table", &table_s])
            .await?;
        Ok(())
    }

    async fn ensure_policy_rule(&self, table: u32) -> Result<bool, Error> {
        let mut created = false;
        for family in &self.families {
            created |= self.ensure_family_rule(*family, table).await?;
        }
        Ok(created)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::test::TestExec;
    use mr_common::{cidr, ip};
    use pretty_assertions::assert_eq;

    fn line(destination: &str, via: Option<&str>) -> Option<RouteLine> {
        Some(RouteLine {
            destination: cidr!(destination),
            via: via.map(|v| ip!(v)),
        })
    }

    #[test]
    fn parse_route_lines() {
        let v4 = Family::V4;
        assert_eq!(
            parse_route_line(
                "10.0.1.0/24 via 10.0.0.2 dev podman1 proto static",
                v4
            )
            .unwrap(),
            line("10.0.1.0/24", Some("10.0.0.2"))
        );
        assert_eq!(
            parse_route_line("default via 192.168.1.1 dev eth0", v4).unwrap(),
            line("0.0.0.0/0", Some("192.168.1.1"))
        );
        assert_eq!(
            parse_route_line("10.0.9.9 via 10.0.0.2 dev podman1", v4).unwrap(),
            line("10.0.9.9/32", Some("10.0.0.2"))
        );
        assert_eq!(
            parse_route_line(
                "10.101.0.0/16 dev netmaker proto kernel scope link src 10.101.0.1",
                v4
            )
            .unwrap(),
            line("10.101.0.0/16", None)
        );
        assert_eq!(
            parse_route_line("unicast 10.0.3.0/24 via 10.0.0.4 dev eth0", v4)
                .unwrap(),
            line("10.0.3.0/24", Some("10.0.0.4"))
        );
        assert_eq!(
            parse_route_line(
                "10.0.4.0/24 via inet6 fe80::1 dev eth0",
                v4
            )
            .unwrap(),
            line("10.0.4.0/24", Some("fe80::1"))
        );
        assert_eq!(
            parse_route_line(
                "fd00:1::/64 via fd00::2 dev eth0 metric 1024 pref medium",
                Family::V6
            )
            .unwrap(),
            line("fd00:1::/64", Some("fd00::2"))
        );
        assert_eq!(
            parse_route_line("default via fd00::1 dev eth0", Family::V6)
                .unwrap(),
            line("::/0", Some("fd00::1"))
        );
    }

    #[test]
    fn parse_route_lines_skipped() {
        let v4 = Family::V4;
        assert_eq!(parse_route_line("", v4).unwrap(), None);
        assert_eq!(
            parse_route_line("blackhole 10.9.0.0/16 proto static", v4).unwrap(),
            None
        );
        assert_eq!(
            parse_route_line(
                "\tnexthop via 10.0.0.2 dev eth0 weight 1",
                v4
            )
            .unwrap(),
            None
        );
        assert!(parse_route_line("10.0.1.0/24 via", v4).is_err());
        assert!(parse_route_line("10.0.1.0/99 via 10.0.0.1", v4).is_err());
        assert!(parse_route_line("bogus via 10.0.0.1", v4).is_err());
    }

    #[test]
    fn lookup_rule_detection() {
        assert!(has_lookup_rule("5000:\tfrom all lookup 100\n", 100));
        assert!(!has_lookup_rule("5000:\tfrom all lookup 1000\n", 100));
        assert!(!has_lookup_rule("", 100));
        assert!(!has_lookup_rule("5000:\tfrom 10.0.0.0/8 lookup 100\n", 100));
        assert!(!has_lookup_rule("32766:\tfrom all lookup main\n", 254));
        assert!(has_lookup_rule("32766:\tfrom all lookup 254\n", 254));
    }

    #[tokio::test]
    async fn missing_table_lists_as_empty() {
        let exec = TestExec::default();
        exec.fail(
            "ip -4 route show table 100",
            "Error: ipv4: FIB table does not exist.\nDump terminated",
        );
        exec.fail(
            "ip -6 route show table 100",
            "Error: ipv6: FIB table does not exist.\nDump terminated",
        );
        let gw = IpRouteGateway::with_exec(
            exec,
            "ip",
            vec![Family::V4, Family::V6],
            DEFAULT_RULE_PRIORITY,
            util::test::logger(),
        );
        assert!(gw.list_installed_routes(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_family_routes_are_not_listed() {
        let exec = TestExec::default();
        exec.respond(
            "ip -4 route show table 100",
            "10.0.4.0/24 via inet6 fe80::1 dev eth0\n\
             10.0.5.0/24 via 10.0.0.5 dev eth0\n",
        );
        let gw = IpRouteGateway::with_exec(
            exec,
            "ip",
            vec![Family::V4],
            DEFAULT_RULE_PRIORITY,
            util::test::logger(),
        );
        assert_eq!(
            gw.list_installed_routes(100).await.unwrap(),
            vec![Route::new(cidr!("10.0.5.0/24"), ip!("10.0.0.5")).unwrap()]
        );
    }

    #[tokio::test]
    async fn policy_rule_matched_by_numeric_table_id() {
        let exec = TestExec::default();
        exec.respond("ip -N -4 rule show table 254", "32766:\tfrom all lookup 254\n");
        let gw = IpRouteGateway::with_exec(
            exec,
            "ip",
            vec![Family::V4],
            DEFAULT_RULE_PRIORITY,
            util::test::logger(),
        );
        assert!(!gw.ensure_policy_rule(254).await.unwrap());
        assert_eq!(gw.exec.history(), vec!["ip -N -4 rule show table 254"]);
    }

    #[tokio::test]
    async fn list_routes_across_families() {
        let exec = TestExec::default();
        exec.respond(
            "ip -4 route show table 100",
            "10.0.1.0/24 via 10.0.0.2 dev podman1 proto static\n\
             10.0.2.0/24 dev podman1 scope link\n\
             garbage line\n\
             10.0.3.0/24 via 10.0.0.3 dev podman1\n",
        );
        exec.respond(
            "ip -6 route show table 100",
            "fd00:1::/64 via fd00::2 dev podman1 metric 1024 pref medium\n",
        );
        let gw = IpRouteGateway::with_exec(
            exec,
            "ip",
            vec![Family::V4, Family::V6],
            DEFAULT_RULE_PRIORITY,
            util::test::logger(),
        );

        let routes = gw.list_installed_routes(100).await.unwrap();
        assert_eq!(
            routes,
            vec![
                Route::new(cidr!("10.0.1.0/24"), ip!("10.0.0.2")).unwrap(),
                Route::new(cidr!("10.0.3.0/24"), ip!("10.0.0.3")).unwrap(),
                Route::new(cidr!("fd00:1::/64"), ip!("fd00::2")).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn list_routes_failure_propagates() {
        let exec = TestExec::default();
        exec.fail(
            "ip -4 route show table 100",
            "Error: argument \"100\" is wrong: \"table\" value is invalid",
        );
        let gw = IpRouteGateway::with_exec(
            exec,
            "ip",
            vec![Family::V4],
            DEFAULT_RULE_PRIORITY,
            util::test::logger(),
        );
        assert!(gw.list_installed_routes(100).await.is_err());
    }

    #[tokio::test]
    async fn add_and_remove_commands() {
        let gw = IpRouteGateway::with_exec(
            TestExec::default(),
            "/usr/sbin/ip",
            vec![Family::V4],
            DEFAULT_RULE_PRIORITY,
            util::test::logger(),
        );
        let r = Route::new(cidr!("10.0.1.0/24"), ip!("10.0.0.2")).unwrap();
        gw.add_route(&r, 100).await.unwrap();
        gw.remove_route(&r, 100).await.unwrap();

        assert_eq!(
            gw.exec.history(),
            vec![
                "/usr/sbin/ip route add 10.0.1.0/24 via 10.0.0.2 table 100",
                "/usr/sbin/ip route del 10.0.1.0/24 via 10.0.0.2 table 100",
            ]
        );
    }

    #[tokio::test]
    async fn policy_rule_created_only_when_missing() {
        let exec = TestExec::default();
        exec.respond("ip -N -6 rule show table 100", "5000:\tfrom all lookup 100\n");
        let gw = IpRouteGateway::with_exec(
            exec,
            "ip",
            vec![Family::V4, Family::V6],
            5000,
            util::test::logger(),
        );

        assert!(gw.ensure_policy_rule(100).await.unwrap());
        assert_eq!(
            gw.exec.history(),
            vec![
                "ip -N -4 rule show table 100",
                "ip -4 rule add pref 5000 table 100",
                "ip -N -6 rule show table 100",
            ]
        );

        // Once the kernel reports the rule, a second call is a no-op.
        gw.exec
            .respond("ip -N -4 rule show table 100", "5000:\tfrom all lookup 100\n");
        assert!(!gw.ensure_policy_rule(100).await.unwrap());
        assert_eq!(gw.exec.history().len(), 5);
    }
}
