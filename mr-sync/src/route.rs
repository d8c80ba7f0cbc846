// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Error;
use mr_common::net::{Family, IpNet};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// A destination prefix and the address packets for it are forwarded to.
/// Only built through [`Route::new`], so the destination is always a network
/// address of the nexthop's family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Route {
    destination: IpNet,
    nexthop: IpAddr,
}

impl Route {
    /// Build a route, clearing the host bits of `destination`. The
    /// destination and nexthop must be of the same address family.
    pub fn new(destination: IpNet, nexthop: IpAddr) -> Result<Self, Error> {
        if destination.family() != Family::of(&nexthop) {
            return Err(Error::AddressFamilyMismatch(format!(
                "destination {destination} via {nexthop}"
            )));
        }
        Ok(Self {
            destination: destination.network(),
            nexthop,
        })
    }

    pub fn destination(&self) -> IpNet {
        self.destination
    }

    pub fn nexthop(&self) -> IpAddr {
        self.nexthop
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} via {}", self.destination, self.nexthop)
    }
}

/// A destination advertised with more than one nexthop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub destination: IpNet,
    pub nexthops: Vec<IpAddr>,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nexthops: Vec<String> =
            self.nexthops.iter().map(|x| x.to_string()).collect();
        write!(
            f,
            "{} advertised via {}",
            self.destination,
            nexthops.join(", ")
        )
    }
}

/// Routes the peers want installed, keyed by destination.
///
/// Identical advertisements collapse. A destination advertised with
/// different nexthops is held: it is kept out of the desired mapping and
/// reported as a conflict, and the reconciler leaves it untouched.
#[derive(Debug, Default, Clone)]
pub struct DesiredSet {
    routes: BTreeMap<IpNet, IpAddr>,
    held: BTreeMap<IpNet, BTreeSet<IpAddr>>,
}

impl DesiredSet {
    pub fn from_routes<I: IntoIterator<Item = Route>>(routes: I) -> Self {
        let mut seen: BTreeMap<IpNet, BTreeSet<IpAddr>> = BTreeMap::new();
        for r in routes {
            seen.entry(r.destination).or_default().insert(r.nexthop);
        }

        let mut result = Self::default();
        for (destination, nexthops) in seen {
            if nexthops.len() == 1 {
                if let Some(nh) = nexthops.first() {
                    result.routes.insert(destination, *nh);
                }
            } else {
                result.held.insert(destination, nexthops);
            }
        }
        result
    }

    pub fn get(&self, destination: &IpNet) -> Option<&IpAddr> {
        self.routes.get(destination)
    }

    pub fn is_held(&self, destination: &IpNet) -> bool {
        self.held.contains_key(destination)
    }

    pub fn routes(&self) -> impl Iterator<Item = Route> + '_ {
        self.routes.iter().map(|(d, n)| Route {
            destination: *d,
            nexthop: *n,
        })
    }

    pub fn conflicts(&self) -> impl Iterator<Item = Conflict> + '_ {
        self.held.iter().map(|(d, n)| Conflict {
            destination: *d,
            nexthops: n.iter().copied().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Routes currently installed in the table.
///
/// Kept as (destination, nexthop) pairs so a table that somehow carries two
/// nexthops for one destination still converges.
#[derive(Debug, Default, Clone)]
pub struct ActualSet(BTreeSet<Route>);

impl ActualSet {
    pub fn from_routes<I: IntoIterator<Item = Route>>(routes: I) -> Self {
        Self(routes.into_iter().collect())
    }

    pub fn contains(&self, route: &Route) -> bool {
        self.0.contains(route)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The changes that take the table from its actual to its desired state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diff {
    pub to_add: Vec<Route>,
    pub to_remove: Vec<Route>,
}

impl Diff {
    pub fn compute(desired: &DesiredSet, actual: &ActualSet) -> Self {
        let to_add = desired.routes().filter(|r| !actual.contains(r)).collect();

        let to_remove = actual
            .routes()
            .filter(|r| !desired.is_held(&r.destination))
            .filter(|r| desired.get(&r.destination) != Some(&r.nexthop))
            .copied()
            .collect();

        Self { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}
