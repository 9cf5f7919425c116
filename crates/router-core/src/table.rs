//! The routing table: the engine's sole piece of mutable state.
//!
//! [`RoutingTable`] is a plain, non-async struct with `&mut self` mutators —
//! it holds no lock of its own. The lock lives one layer up, in
//! [`crate::engine::Engine`] (`tokio::sync::Mutex<RoutingTable>`), so every
//! mutator here runs inside somebody else's critical section and each
//! returns a [`TableDiff`] the caller can inspect *after* releasing the
//! lock, per the engine's locking discipline.
//!
//! Destinations and per-neighbor bookkeeping share one struct rather than
//! two: they are always mutated together by every handler below, so
//! splitting them would only move the coupling into the caller.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::time::Instant;

/// Provenance of a route entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Established by direct configuration or a presence message: always
    /// metric 1, next hop equal to the destination itself.
    Local,
    /// Learned from a neighbor's route-vector announcement.
    Learned,
}

/// One row of the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub metric: u32,
    pub next_hop: IpAddr,
    pub last_updated: Instant,
    pub origin: Origin,
}

/// Bookkeeping kept per neighbor: what it most recently advertised, and
/// when it was last heard from (any message kind refreshes this).
#[derive(Debug, Clone, Default)]
struct NeighborState {
    advertised: HashSet<IpAddr>,
    /// `None` is the spec's "0: never heard from".
    last_heard: Option<Instant>,
}

/// The result of one mutator call: everything that changed, for the caller
/// to print and broadcast outside the table's lock.
#[derive(Debug, Clone, Default)]
pub struct TableDiff {
    pub added: Vec<(IpAddr, RouteEntry)>,
    pub updated: Vec<(IpAddr, RouteEntry)>,
    pub removed: Vec<IpAddr>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Destination -> route entry, plus per-neighbor state, all guarded by the
/// same lock one layer up.
#[derive(Debug)]
pub struct RoutingTable {
    self_addr: IpAddr,
    routes: BTreeMap<IpAddr, RouteEntry>,
    neighbors: HashMap<IpAddr, NeighborState>,
}

impl RoutingTable {
    /// Seed the table at startup: one direct entry per configured neighbor
    /// (metric 1, next hop the neighbor itself, origin `Local`), per
    /// spec.md §4.8.
    pub fn new(self_addr: IpAddr, configured_neighbors: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut routes = BTreeMap::new();
        let mut neighbors = HashMap::new();
        let now = Instant::now();
        for n in configured_neighbors {
            if n == self_addr {
                continue;
            }
            routes.insert(
                n,
                RouteEntry {
                    metric: 1,
                    next_hop: n,
                    last_updated: now,
                    origin: Origin::Local,
                },
            );
            neighbors.entry(n).or_insert_with(NeighborState::default);
        }
        Self {
            self_addr,
            routes,
            neighbors,
        }
    }

    pub fn self_addr(&self) -> IpAddr {
        self.self_addr
    }

    /// The current neighbor set (configured peers plus any discovered at
    /// runtime — per DESIGN.md's resolution of the "neighbor set growth"
    /// open question, this single map *is* the neighbor set).
    pub fn neighbor_set(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.neighbors.keys().copied()
    }

    pub fn lookup(&self, dest: &IpAddr) -> Option<&RouteEntry> {
        self.routes.get(dest)
    }

    /// All destinations other than `self_addr`, in ascending order — the
    /// iteration order the announcer and the table printer both rely on.
    pub fn routes(&self) -> impl Iterator<Item = (&IpAddr, &RouteEntry)> {
        self.routes.iter()
    }

    fn neighbor_mut(&mut self, addr: IpAddr) -> &mut NeighborState {
        self.neighbors.entry(addr).or_insert_with(NeighborState::default)
    }

    /// Apply a presence message `@<advertised>` received from kernel source
    /// `source`. Per spec.md §4.3.
    pub fn apply_presence(&mut self, source: IpAddr, advertised: IpAddr, now: Instant) -> TableDiff {
        let mut diff = TableDiff::default();
        self.neighbor_mut(source).last_heard = Some(now);

        if advertised == self.self_addr {
            return diff;
        }

        let needs_write = match self.routes.get(&advertised) {
            None => true,
            Some(e) => e.metric != 1 || e.next_hop != source,
        };
        if needs_write {
            let was_present = self.routes.contains_key(&advertised);
            let entry = RouteEntry {
                metric: 1,
                next_hop: source,
                last_updated: now,
                origin: Origin::Local,
            };
            self.routes.insert(advertised, entry.clone());
            self.neighbor_mut(advertised);
            if was_present {
                diff.updated.push((advertised, entry));
            } else {
                diff.added.push((advertised, entry));
            }
        }
        diff
    }

    /// Apply a parsed route-vector received from `source`. Per spec.md
    /// §4.3: refresh/replace per-destination entries, then withdraw any
    /// destination `source` no longer lists.
    pub fn apply_route_vector(
        &mut self,
        source: IpAddr,
        advertised: HashMap<IpAddr, u32>,
        now: Instant,
    ) -> TableDiff {
        let mut diff = TableDiff::default();

        let neighbor = self.neighbor_mut(source);
        neighbor.last_heard = Some(now);
        let prev = std::mem::replace(&mut neighbor.advertised, advertised.keys().copied().collect());
        let cur: HashSet<IpAddr> = advertised.keys().copied().collect();

        if !self.routes.contains_key(&source) {
            let entry = RouteEntry {
                metric: 1,
                next_hop: source,
                last_updated: now,
                origin: Origin::Learned,
            };
            self.routes.insert(source, entry.clone());
            self.neighbor_mut(source);
            diff.added.push((source, entry));
        }

        for (dest, recv_metric) in &advertised {
            if *dest == self.self_addr {
                continue;
            }
            let candidate = recv_metric + 1;
            match self.routes.get(dest) {
                None => {
                    let entry = RouteEntry {
                        metric: candidate,
                        next_hop: source,
                        last_updated: now,
                        origin: Origin::Learned,
                    };
                    self.routes.insert(*dest, entry.clone());
                    diff.added.push((*dest, entry));
                }
                Some(e) if e.next_hop == source => {
                    if candidate != e.metric {
                        let origin = e.origin;
                        let entry = RouteEntry {
                            metric: candidate,
                            next_hop: source,
                            last_updated: now,
                            origin,
                        };
                        self.routes.insert(*dest, entry.clone());
                        diff.updated.push((*dest, entry));
                    } else {
                        // Refresh the timestamp only; no change recorded.
                        self.routes.get_mut(dest).unwrap().last_updated = now;
                    }
                }
                Some(e) => {
                    if candidate < e.metric {
                        let entry = RouteEntry {
                            metric: candidate,
                            next_hop: source,
                            last_updated: now,
                            origin: Origin::Learned,
                        };
                        self.routes.insert(*dest, entry.clone());
                        diff.updated.push((*dest, entry));
                    }
                    // Tie or worse: keep the incumbent next hop.
                }
            }
        }

        for dest in prev.difference(&cur) {
            if self.routes.get(dest).map(|e| e.next_hop) == Some(source) {
                self.routes.remove(dest);
                diff.removed.push(*dest);
            }
        }

        diff
    }

    /// Declare neighbor `n` inactive: clear its bookkeeping and purge every
    /// route learned through it. `n` stays in the neighbor set — it may
    /// return.
    pub fn age_neighbor(&mut self, n: IpAddr) -> TableDiff {
        let mut diff = TableDiff::default();
        if let Some(state) = self.neighbors.get_mut(&n) {
            state.last_heard = None;
            state.advertised.clear();
        }
        let stale: Vec<IpAddr> = self
            .routes
            .iter()
            .filter(|(_, e)| e.next_hop == n)
            .map(|(d, _)| *d)
            .collect();
        for dest in stale {
            self.routes.remove(&dest);
            diff.removed.push(dest);
        }
        diff
    }

    /// Neighbors whose `last_heard` predates `now - timeout` and is not
    /// already `None`. Used by the neighbor monitor task.
    pub fn inactive_neighbors(&self, now: Instant, timeout: std::time::Duration) -> Vec<IpAddr> {
        self.neighbors
            .iter()
            .filter_map(|(addr, state)| {
                let last = state.last_heard?;
                (now.saturating_duration_since(last) > timeout).then_some(*addr)
            })
            .collect()
    }

    /// Render the fixed-width four-column table with a banner, matching the
    /// reference implementation's `Destino | Métrica | Saída | Origem`
    /// layout exactly (operator-visible output is unchanged).
    pub fn display(&self) -> String {
        let mut out = String::new();
        out.push_str("=== TABELA DE ROTEAMENTO ===\n");
        out.push_str(&format!("Roteador: {}\n", self.self_addr));
        out.push_str(&format!(
            "{:<16} {:<7} {:<16} {:<8}\n",
            "Destino", "Métrica", "Saída", "Origem"
        ));
        for (dest, entry) in &self.routes {
            out.push_str(&format!(
                "{:<16} {:<7} {:<16} {:<8}\n",
                dest.to_string(),
                entry.metric,
                entry.next_hop.to_string(),
                origin_label(entry.origin),
            ));
        }
        out.push_str("===========================");
        out
    }
}

fn origin_label(origin: Origin) -> &'static str {
    match origin {
        Origin::Local => "local",
        Origin::Learned => "learned",
    }
}

/// Render a diff as `+`/`~`/`-` lines, to be printed after [`RoutingTable::display`].
pub fn display_diff(diff: &TableDiff) -> String {
    let mut lines = Vec::new();
    for (dest, entry) in &diff.added {
        lines.push(format!("  + {dest} via {} (metric={})", entry.next_hop, entry.metric));
    }
    for (dest, entry) in &diff.updated {
        lines.push(format!("  ~ {dest} via {} (metric={})", entry.next_hop, entry.metric));
    }
    for dest in &diff.removed {
        lines.push(format!("  - {dest}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn t(n: &str, neighbors: &[&str]) -> RoutingTable {
        RoutingTable::new(ip(n), neighbors.iter().map(|s| ip(s)))
    }

    #[test]
    fn seeds_direct_entries_for_neighbors() {
        let table = t("10.0.0.1", &["10.0.0.2", "10.0.0.3"]);
        let e = table.lookup(&ip("10.0.0.2")).unwrap();
        assert_eq!(e.metric, 1);
        assert_eq!(e.next_hop, ip("10.0.0.2"));
        assert_eq!(e.origin, Origin::Local);
        assert!(table.lookup(&ip("10.0.0.1")).is_none(), "I1: no self entry");
    }

    #[test]
    fn presence_from_self_is_ignored() {
        let mut table = t("10.0.0.1", &["10.0.0.2"]);
        let diff = table.apply_presence(ip("10.0.0.2"), ip("10.0.0.1"), Instant::now());
        assert!(diff.is_empty());
        assert!(table.lookup(&ip("10.0.0.1")).is_none());
    }

    #[test]
    fn presence_adds_new_direct_neighbor() {
        let mut table = t("10.0.0.1", &[]);
        let now = Instant::now();
        let diff = table.apply_presence(ip("10.0.0.9"), ip("10.0.0.9"), now);
        assert_eq!(diff.added.len(), 1);
        let e = table.lookup(&ip("10.0.0.9")).unwrap();
        assert_eq!(e.metric, 1);
        assert_eq!(e.origin, Origin::Local);
    }

    #[test]
    fn route_vector_inserts_learned_route() {
        let mut table = t("10.0.0.1", &["10.0.0.2"]);
        let mut m = HashMap::new();
        m.insert(ip("10.0.0.3"), 1);
        let diff = table.apply_route_vector(ip("10.0.0.2"), m, Instant::now());
        assert_eq!(diff.added.len(), 1);
        let e = table.lookup(&ip("10.0.0.3")).unwrap();
        assert_eq!(e.metric, 2);
        assert_eq!(e.next_hop, ip("10.0.0.2"));
        assert_eq!(e.origin, Origin::Learned);
    }

    #[test]
    fn route_vector_tie_break_keeps_incumbent() {
        let mut table = t("10.0.0.1", &["10.0.0.2", "10.0.0.3"]);
        let now = Instant::now();
        let mut m1 = HashMap::new();
        m1.insert(ip("10.0.0.9"), 2);
        table.apply_route_vector(ip("10.0.0.2"), m1, now);
        let first = table.lookup(&ip("10.0.0.9")).unwrap().clone();
        assert_eq!(first.metric, 3);
        assert_eq!(first.next_hop, ip("10.0.0.2"));

        let mut m2 = HashMap::new();
        m2.insert(ip("10.0.0.9"), 2);
        let diff = table.apply_route_vector(ip("10.0.0.3"), m2, now);
        assert!(diff.is_empty(), "equal-cost announcement must not flip next hop");
        let after = table.lookup(&ip("10.0.0.9")).unwrap();
        assert_eq!(after.next_hop, ip("10.0.0.2"));
    }

    #[test]
    fn route_vector_withdrawal_removes_stale_entry() {
        let mut table = t("10.0.0.1", &["10.0.0.2"]);
        let now = Instant::now();
        let mut m1 = HashMap::new();
        m1.insert(ip("10.0.0.8"), 1);
        m1.insert(ip("10.0.0.9"), 1);
        table.apply_route_vector(ip("10.0.0.2"), m1, now);
        assert!(table.lookup(&ip("10.0.0.9")).is_some());

        let mut m2 = HashMap::new();
        m2.insert(ip("10.0.0.8"), 1);
        let diff = table.apply_route_vector(ip("10.0.0.2"), m2, now);
        assert_eq!(diff.removed, vec![ip("10.0.0.9")]);
        assert!(table.lookup(&ip("10.0.0.9")).is_none());
        assert!(table.lookup(&ip("10.0.0.8")).is_some(), "surviving dest refreshed");
    }

    #[test]
    fn repeated_route_vector_is_idempotent() {
        let mut table = t("10.0.0.1", &["10.0.0.2"]);
        let now = Instant::now();
        let mut m = HashMap::new();
        m.insert(ip("10.0.0.9"), 2);
        table.apply_route_vector(ip("10.0.0.2"), m.clone(), now);
        let diff = table.apply_route_vector(ip("10.0.0.2"), m, now);
        assert!(diff.is_empty(), "P5: repeat announcement produces no diff");
    }

    #[test]
    fn age_neighbor_purges_routes_via_it() {
        let mut table = t("10.0.0.1", &["10.0.0.2"]);
        let now = Instant::now();
        let mut m = HashMap::new();
        m.insert(ip("10.0.0.9"), 1);
        table.apply_route_vector(ip("10.0.0.2"), m, now);

        let diff = table.age_neighbor(ip("10.0.0.2"));
        assert!(diff.removed.contains(&ip("10.0.0.2")));
        assert!(diff.removed.contains(&ip("10.0.0.9")));
        assert!(table.lookup(&ip("10.0.0.2")).is_none());
        assert!(table.lookup(&ip("10.0.0.9")).is_none());
        // Neighbor set does not shrink.
        assert!(table.neighbor_set().any(|n| n == ip("10.0.0.2")));
    }

    #[test]
    fn inactive_neighbors_respects_timeout() {
        let mut table = t("10.0.0.1", &["10.0.0.2"]);
        let t0 = Instant::now();
        table.apply_presence(ip("10.0.0.2"), ip("10.0.0.2"), t0);
        let later = t0 + Duration::from_secs(100);
        let inactive = table.inactive_neighbors(later, Duration::from_secs(15));
        assert_eq!(inactive, vec![ip("10.0.0.2")]);

        let soon = t0 + Duration::from_secs(1);
        assert!(table.inactive_neighbors(soon, Duration::from_secs(15)).is_empty());
    }

    #[test]
    fn never_heard_neighbor_is_not_inactive() {
        let table = t("10.0.0.1", &["10.0.0.2"]);
        let inactive = table.inactive_neighbors(Instant::now() + Duration::from_secs(9999), Duration::from_secs(15));
        assert!(inactive.is_empty(), "last_heard == None means 'never', not 'expired'");
    }
}
