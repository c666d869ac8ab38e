//! Hierarchy-aware flooding
//!
//! Bounds flood traffic in a core/aggregation/ToR fabric without a spanning
//! tree. A switch's role and the direction of the ingress port decide which
//! ports may receive a copy; the copies go out in random order.

use crate::Error;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Position of a switch in the fabric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyRole {
    Core,
    Aggr,
    Tor,
}

impl FromStr for HierarchyRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(Self::Core),
            "aggr" => Ok(Self::Aggr),
            "tor" => Ok(Self::Tor),
            _ => Err(Error::UnknownHierarchy(s.to_string())),
        }
    }
}

impl fmt::Display for HierarchyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Core => "core",
            Self::Aggr => "aggr",
            Self::Tor => "tor",
        };
        f.write_str(name)
    }
}

/// Direction a port faces, fixed at attach time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Toward the core
    Upper,
    /// Toward the hosts
    Lower,
}

impl FromStr for PortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            _ => Err(Error::Config(format!("unknown port direction: {s}"))),
        }
    }
}

/// Whether a copy of a flood that came in on a port facing `ingress` may
/// leave through a port facing `egress`
pub fn may_flood(role: HierarchyRole, ingress: PortDirection, egress: PortDirection) -> bool {
    match (role, ingress) {
        (HierarchyRole::Core, _) => true,
        (HierarchyRole::Aggr | HierarchyRole::Tor, PortDirection::Lower) => true,
        (HierarchyRole::Aggr | HierarchyRole::Tor, PortDirection::Upper) => {
            egress == PortDirection::Lower
        }
    }
}

/// Indices of the ports a flood from `ingress` may reach, in port order
pub fn eligible_ports(
    role: HierarchyRole,
    directions: &[PortDirection],
    ingress: usize,
) -> Vec<usize> {
    let Some(&ingress_dir) = directions.get(ingress) else {
        return Vec::new();
    };

    directions
        .iter()
        .enumerate()
        .filter(|&(idx, &dir)| idx != ingress && may_flood(role, ingress_dir, dir))
        .map(|(idx, _)| idx)
        .collect()
}

/// Egress order for a flood from `ingress`
///
/// Draws port indices uniformly from the whole port set, rejecting the
/// ingress port, ineligible ports and ports already chosen, until every
/// eligible port has been picked once.
pub fn flood_order<R: Rng + ?Sized>(
    rng: &mut R,
    role: HierarchyRole,
    directions: &[PortDirection],
    ingress: usize,
) -> Vec<usize> {
    let eligible = eligible_ports(role, directions, ingress);
    if eligible.is_empty() {
        return eligible;
    }

    let mut wanted = vec![false; directions.len()];
    for &idx in &eligible {
        wanted[idx] = true;
    }

    let mut order = Vec::with_capacity(eligible.len());
    while order.len() < eligible.len() {
        let idx = rng.gen_range(0..directions.len());
        if wanted[idx] {
            wanted[idx] = false;
            order.push(idx);
        }
    }
    order
}
