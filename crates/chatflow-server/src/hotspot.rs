//! Hotspot network grouping: connections on the same private subnet are
//! clustered into an ad-hoc, anonymous group identified by the first three
//! octets of the client address.
//!
//! Group members are never shown usernames, only a display color drawn from
//! a fixed palette. Groups are purely in-memory and dissolve when the last
//! member leaves.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::Mutex;

use chatflow_shared::constants::HOTSPOT_COLORS;
use chatflow_shared::types::ConnectionId;

/// Derive the network id from a client address. Only private IPv4 ranges
/// form hotspot groups; public and loopback addresses yield `None`.
pub fn network_id_from_ip(addr: IpAddr) -> Option<String> {
    let v4 = match addr {
        IpAddr::V4(v4) => v4,
        // Mapped addresses show up when the listener is dual-stack.
        IpAddr::V6(v6) => v6.to_ipv4_mapped()?,
    };
    if !is_private_v4(v4) {
        return None;
    }
    let [a, b, c, _] = v4.octets();
    Some(format!("{a}.{b}.{c}"))
}

fn is_private_v4(addr: Ipv4Addr) -> bool {
    let [a, b, ..] = addr.octets();
    match a {
        10 => true,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        _ => false,
    }
}

/// Room name carrying hotspot traffic for one network.
pub fn hotspot_room(network_id: &str) -> String {
    format!("hotspot-{network_id}")
}

#[derive(Debug, Default)]
struct NetworkGroup {
    /// Color held by each member connection.
    colors: HashMap<ConnectionId, String>,
}

impl NetworkGroup {
    /// Pick a color no current member holds. When the palette is exhausted
    /// the fallback is a suffixed palette color, flagged as not unique.
    fn pick_color(&self) -> (String, bool) {
        let taken: Vec<&str> = self.colors.values().map(String::as_str).collect();
        let free: Vec<&str> = HOTSPOT_COLORS
            .iter()
            .copied()
            .filter(|c| !taken.contains(c))
            .collect();
        let mut rng = rand::thread_rng();
        if let Some(color) = free.choose(&mut rng) {
            return (color.to_string(), true);
        }
        let base = HOTSPOT_COLORS
            .choose(&mut rng)
            .copied()
            .unwrap_or("Gray");
        (format!("{base}{:02}", rng.gen_range(0..100)), false)
    }
}

/// Snapshot returned on join: what the new member should be told.
#[derive(Debug, Clone)]
pub struct HotspotMembership {
    pub network_id: String,
    pub color: String,
    /// False when the palette was exhausted and the color carries a
    /// disambiguating suffix that may still collide.
    pub guaranteed: bool,
    pub user_count: usize,
}

/// All live network groups, keyed by network id.
#[derive(Clone, Default)]
pub struct NetworkGroups {
    inner: Arc<Mutex<HashMap<String, NetworkGroup>>>,
}

impl NetworkGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to its network group, creating the group on first
    /// join, and assign it a display color.
    pub async fn join(&self, network_id: &str, conn_id: ConnectionId) -> HotspotMembership {
        let mut groups = self.inner.lock().await;
        let group = groups.entry(network_id.to_string()).or_default();
        let (color, guaranteed) = match group.colors.get(&conn_id) {
            // Re-joining keeps the color already held.
            Some(color) => (color.clone(), true),
            None => {
                let (color, guaranteed) = group.pick_color();
                if !guaranteed {
                    tracing::warn!(network = network_id, "hotspot palette exhausted, using suffixed color");
                }
                group.colors.insert(conn_id, color.clone());
                (color, guaranteed)
            }
        };
        tracing::info!(network = network_id, color = %color, members = group.colors.len(), "hotspot join");
        HotspotMembership {
            network_id: network_id.to_string(),
            color,
            guaranteed,
            user_count: group.colors.len(),
        }
    }

    /// Remove a connection from its group, releasing its color. Empty
    /// groups are destroyed. Returns the released color if the connection
    /// was a member.
    pub async fn leave(&self, network_id: &str, conn_id: ConnectionId) -> Option<String> {
        let mut groups = self.inner.lock().await;
        let group = groups.get_mut(network_id)?;
        let color = group.colors.remove(&conn_id);
        if group.colors.is_empty() {
            groups.remove(network_id);
            tracing::info!(network = network_id, "hotspot group dissolved");
        }
        color
    }

    /// Current member count of a group, zero when it does not exist.
    pub async fn member_count(&self, network_id: &str) -> usize {
        let groups = self.inner.lock().await;
        groups.get(network_id).map_or(0, |g| g.colors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_id_for_private_ranges() {
        let cases = [
            ("10.0.5.17", Some("10.0.5")),
            ("172.16.0.9", Some("172.16.0")),
            ("172.31.255.1", Some("172.31.255")),
            ("192.168.1.42", Some("192.168.1")),
        ];
        for (ip, expected) in cases {
            let addr: IpAddr = ip.parse().unwrap();
            assert_eq!(network_id_from_ip(addr).as_deref(), expected, "{ip}");
        }
    }

    #[test]
    fn public_and_loopback_addresses_do_not_group() {
        for ip in ["8.8.8.8", "127.0.0.1", "172.32.0.1", "192.169.0.1"] {
            let addr: IpAddr = ip.parse().unwrap();
            assert_eq!(network_id_from_ip(addr), None, "{ip}");
        }
    }

    #[test]
    fn mapped_v6_addresses_resolve_to_their_v4_network() {
        let addr: IpAddr = "::ffff:192.168.1.5".parse().unwrap();
        assert_eq!(network_id_from_ip(addr).as_deref(), Some("192.168.1"));
    }

    #[tokio::test]
    async fn colors_are_unique_within_a_group() {
        let groups = NetworkGroups::new();
        let mut colors = Vec::new();
        for _ in 0..HOTSPOT_COLORS.len() {
            let m = groups.join("192.168.1", ConnectionId::new()).await;
            assert!(m.guaranteed);
            colors.push(m.color);
        }
        let mut sorted = colors.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), colors.len(), "palette colors must not repeat");
        for color in &colors {
            assert!(HOTSPOT_COLORS.contains(&color.as_str()));
        }
    }

    #[tokio::test]
    async fn exhausted_palette_falls_back_to_suffixed_color() {
        let groups = NetworkGroups::new();
        for _ in 0..HOTSPOT_COLORS.len() {
            groups.join("10.0.0", ConnectionId::new()).await;
        }
        let overflow = groups.join("10.0.0", ConnectionId::new()).await;
        assert!(!overflow.guaranteed);
        assert!(!HOTSPOT_COLORS.contains(&overflow.color.as_str()));
        assert_eq!(overflow.user_count, HOTSPOT_COLORS.len() + 1);
    }

    #[tokio::test]
    async fn leave_releases_color_and_dissolves_empty_group() {
        let groups = NetworkGroups::new();
        let conn = ConnectionId::new();
        let m = groups.join("10.1.2", conn).await;

        let released = groups.leave("10.1.2", conn).await;
        assert_eq!(released, Some(m.color.clone()));
        assert_eq!(groups.member_count("10.1.2").await, 0);

        // The color is available again for the next joiner.
        let next = groups.join("10.1.2", ConnectionId::new()).await;
        assert!(HOTSPOT_COLORS.contains(&next.color.as_str()));
        assert_eq!(next.user_count, 1);
    }

    #[tokio::test]
    async fn rejoining_keeps_the_held_color() {
        let groups = NetworkGroups::new();
        let conn = ConnectionId::new();
        let first = groups.join("10.9.9", conn).await;
        let second = groups.join("10.9.9", conn).await;
        assert_eq!(first.color, second.color);
        assert_eq!(second.user_count, 1);
    }
}
