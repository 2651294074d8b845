//! Clique decomposition of zones into fast-searchable units.
//!
//! Instead of keeping all-pairs shortest paths, each zone is partitioned
//! into cliques: room sets reachable from one another without leaving the
//! zone. Cliques remember the edges that leave them and cache the shortest
//! route between every pair of their portal rooms (rooms where routes enter
//! or leave), so a cross-zone query only has to search the small clique
//! graph and stitch cached segments together.
//!
//! Building a zone:
//! 1. Flood-fill from every inter-zone exit or entrance room.
//! 2. Extension pass: claim unclaimed rooms with an exit into a clique.
//! 3. Flood-fill whatever is still unclaimed.
//!
//! A flood that runs into a room another clique already owns merges that
//! clique into its own. Cross-clique exits are collected as unresolved
//! first and attached to their destination clique once every dirty zone has
//! been rebuilt.
//!
//! Clique ids are generation-scoped: a recompute drops the cliques of dirty
//! zones and hands out fresh ids, so ids held across a recompute are stale.

use crate::store::{RoomId, RoomStore};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

pub type CliqueId = u32;

/// An exit leaving a clique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CliqueEdge {
    pub from_room: RoomId,
    pub to_clique: CliqueId,
    pub to_room: RoomId,
}

#[derive(Debug, Clone, Default)]
pub struct Clique {
    pub id: CliqueId,
    pub zone: String,
    pub rooms: BTreeSet<RoomId>,
    pub edges: Vec<CliqueEdge>,
    /// (from_room, to_room) exits whose destination clique is not known yet.
    pub unresolved: BTreeSet<(RoomId, RoomId)>,
    /// Rooms entered by edges of other cliques.
    pub entrances: BTreeSet<RoomId>,
    /// (start, end) portal pair → room path; empty when unreachable inside
    /// the clique.
    routes: HashMap<(RoomId, RoomId), Vec<RoomId>>,
}

impl Clique {
    fn new(id: CliqueId, zone: &str) -> Self {
        Self {
            id,
            zone: zone.to_string(),
            ..Self::default()
        }
    }

    /// Union another clique into this one.
    fn absorb(&mut self, other: Clique) {
        self.rooms.extend(other.rooms);
        self.unresolved.extend(other.unresolved);
        self.entrances.extend(other.entrances);
        for edge in other.edges {
            if !self.edges.contains(&edge) {
                self.edges.push(edge);
            }
        }
    }

    /// Rooms where routes enter or leave this clique.
    pub fn portal_rooms(&self) -> BTreeSet<RoomId> {
        let mut portals = self.entrances.clone();
        portals.extend(self.edges.iter().map(|e| e.from_room));
        portals
    }

    /// Cached path between two portal rooms. An empty path means the pair
    /// was checked and is not connected inside the clique.
    pub fn cached_route(&self, start: RoomId, end: RoomId) -> Option<&[RoomId]> {
        self.routes.get(&(start, end)).map(Vec::as_slice)
    }

    pub fn cached_route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn edges_to(&self, clique: CliqueId) -> impl Iterator<Item = &CliqueEdge> {
        self.edges.iter().filter(move |e| e.to_clique == clique)
    }

    /// Cached hop count between two portal rooms, `None` when they are not
    /// connected inside the clique.
    pub fn hops(&self, start: RoomId, end: RoomId) -> Option<u32> {
        if start == end {
            return Some(0);
        }
        self.cached_route(start, end)
            .filter(|p| !p.is_empty())
            .map(|p| (p.len() - 1) as u32)
    }
}

/// What one recompute did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeStats {
    pub zones_rebuilt: usize,
    pub cliques_built: usize,
    pub routes_cached: usize,
}

/// All cliques of the current generation.
#[derive(Debug, Clone, Default)]
pub struct CliqueMap {
    cliques: BTreeMap<CliqueId, Clique>,
    room_clique: HashMap<RoomId, CliqueId>,
    zone_cliques: BTreeMap<String, Vec<CliqueId>>,
    next_id: CliqueId,
    generation: u64,
}

impl CliqueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clique(&self, id: CliqueId) -> Option<&Clique> {
        self.cliques.get(&id)
    }

    pub fn clique_of(&self, room: RoomId) -> Option<CliqueId> {
        self.room_clique.get(&room).copied()
    }

    pub fn cliques(&self) -> impl Iterator<Item = &Clique> {
        self.cliques.values()
    }

    pub fn zone_cliques(&self, zone: &str) -> &[CliqueId] {
        self.zone_cliques
            .get(zone)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.cliques.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cliques.is_empty()
    }

    /// Bumped on every recompute that did any work.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rebuild the cliques of every dirty zone. Does nothing when the store
    /// has no pending changes.
    pub fn recompute(&mut self, store: &mut RoomStore) -> RecomputeStats {
        let dirty = store.take_dirty();
        if dirty.is_empty() {
            return RecomputeStats::default();
        }

        let zones: Vec<String> = if dirty.all {
            self.cliques.clear();
            self.room_clique.clear();
            self.zone_cliques.clear();
            store.zones().map(|z| z.name.clone()).collect()
        } else {
            dirty.zones.into_iter().collect()
        };

        let mut stats = RecomputeStats::default();
        for zone in &zones {
            self.drop_zone(zone);
            if store.zone(zone).is_some() {
                stats.cliques_built += self.build_zone(store, zone);
                stats.zones_rebuilt += 1;
            }
        }
        self.resolve_exits();
        stats.routes_cached = self.cache_routes(store);
        self.generation += 1;

        log::debug!(
            "Clique recompute #{}: {} zones, {} cliques built, {} routes cached ({} cliques total)",
            self.generation,
            stats.zones_rebuilt,
            stats.cliques_built,
            stats.routes_cached,
            self.cliques.len()
        );
        stats
    }

    fn drop_zone(&mut self, zone: &str) {
        let Some(ids) = self.zone_cliques.remove(zone) else {
            return;
        };
        for id in ids {
            if let Some(clique) = self.cliques.remove(&id) {
                for room in clique.rooms {
                    if self.room_clique.get(&room) == Some(&id) {
                        self.room_clique.remove(&room);
                    }
                }
            }
        }
    }

    fn build_zone(&mut self, store: &RoomStore, zone: &str) -> usize {
        let Some(z) = store.zone(zone) else {
            return 0;
        };
        let mut owner: HashMap<RoomId, CliqueId> = HashMap::new();
        let mut built: BTreeMap<CliqueId, Clique> = BTreeMap::new();

        // 1. seeds: rooms touching another zone
        let mut seeds = z.exit_rooms();
        seeds.extend(store.entrance_rooms(zone));
        for seed in seeds {
            if !owner.contains_key(&seed) {
                let id = self.fresh_id();
                built.insert(id, Clique::new(id, zone));
                flood(store, zone, seed, id, &mut owner, &mut built);
            }
        }

        // 2. extension: unclaimed rooms leading into a clique
        if !built.is_empty() {
            loop {
                let mut claimed = false;
                for &room in &z.rooms {
                    if owner.contains_key(&room) {
                        continue;
                    }
                    let target = store
                        .room(room)
                        .into_iter()
                        .flat_map(|r| r.neighbors())
                        .find_map(|d| owner.get(&d).copied());
                    if let Some(id) = target {
                        owner.insert(room, id);
                        if let Some(c) = built.get_mut(&id) {
                            c.rooms.insert(room);
                        }
                        claimed = true;
                    }
                }
                if !claimed {
                    break;
                }
            }
        }

        // 3. whatever is left forms its own cliques
        for &room in &z.rooms {
            if !owner.contains_key(&room) {
                let id = self.fresh_id();
                built.insert(id, Clique::new(id, zone));
                flood(store, zone, room, id, &mut owner, &mut built);
            }
        }

        // exits leaving each clique, resolved later
        for clique in built.values_mut() {
            for &room in &clique.rooms {
                let Some(r) = store.room(room) else {
                    continue;
                };
                for dest in r.neighbors() {
                    if !clique.rooms.contains(&dest) {
                        clique.unresolved.insert((room, dest));
                    }
                }
            }
        }

        let count = built.len();
        let ids: Vec<CliqueId> = built.keys().copied().collect();
        for (id, clique) in built {
            for &room in &clique.rooms {
                self.room_clique.insert(room, id);
            }
            self.cliques.insert(id, clique);
        }
        self.zone_cliques.insert(zone.to_string(), ids);
        count
    }

    fn fresh_id(&mut self) -> CliqueId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Attach unresolved exits to the clique owning their destination and
    /// re-target edges whose destination clique was rebuilt.
    fn resolve_exits(&mut self) {
        let room_clique = &self.room_clique;
        for clique in self.cliques.values_mut() {
            let pending: BTreeSet<(RoomId, RoomId)> = clique
                .edges
                .iter()
                .map(|e| (e.from_room, e.to_room))
                .chain(clique.unresolved.iter().copied())
                .collect();
            clique.edges.clear();
            clique.unresolved.clear();
            clique.entrances.clear();
            for (from_room, to_room) in pending {
                match room_clique.get(&to_room) {
                    Some(&to_clique) if to_clique != clique.id => clique.edges.push(CliqueEdge {
                        from_room,
                        to_clique,
                        to_room,
                    }),
                    Some(_) => {}
                    None => {
                        clique.unresolved.insert((from_room, to_room));
                    }
                }
            }
        }

        let entrances: Vec<(CliqueId, RoomId)> = self
            .cliques
            .values()
            .flat_map(|c| c.edges.iter().map(|e| (e.to_clique, e.to_room)))
            .collect();
        for (id, room) in entrances {
            if let Some(c) = self.cliques.get_mut(&id) {
                c.entrances.insert(room);
            }
        }
    }

    /// Fill every clique's portal-pair route cache.
    fn cache_routes(&mut self, store: &RoomStore) -> usize {
        let mut cached = 0;
        for clique in self.cliques.values_mut() {
            let portals = clique.portal_rooms();
            let complete = portals.iter().all(|&a| {
                portals
                    .iter()
                    .all(|&b| a == b || clique.routes.contains_key(&(a, b)))
            });
            if complete {
                continue;
            }
            let rooms = &clique.rooms;
            for &start in &portals {
                let costs = cost_expansion(store, start, |r| rooms.contains(&r));
                for &end in &portals {
                    if start == end || clique.routes.contains_key(&(start, end)) {
                        continue;
                    }
                    let path = walk_back(store, &costs, start, end, |r| rooms.contains(&r))
                        .unwrap_or_default();
                    clique.routes.insert((start, end), path);
                    cached += 1;
                }
            }
        }
        cached
    }

    /// Partition problems: rooms in no clique, in the wrong clique, or in a
    /// clique of another zone. Empty when the decomposition is consistent.
    pub fn partition_problems(&self, store: &RoomStore) -> Vec<String> {
        let mut problems = Vec::new();
        for zone in store.zones() {
            let mut seen: BTreeSet<RoomId> = BTreeSet::new();
            for id in self.zone_cliques(&zone.name) {
                let Some(clique) = self.cliques.get(id) else {
                    problems.push(format!("zone '{}' lists missing clique {}", zone.name, id));
                    continue;
                };
                for &room in &clique.rooms {
                    if !seen.insert(room) {
                        problems.push(format!("room #{} is in more than one clique", room));
                    }
                    if self.clique_of(room) != Some(*id) {
                        problems.push(format!("room #{} maps to the wrong clique", room));
                    }
                }
            }
            if seen != zone.rooms {
                problems.push(format!(
                    "zone '{}' has {} rooms but its cliques cover {}",
                    zone.name,
                    zone.rooms.len(),
                    seen.len()
                ));
            }
        }
        problems
    }
}

/// Claim everything reachable from `seed` through exits staying in `zone`.
/// Reaching a room owned by another clique merges that clique into `id`.
fn flood(
    store: &RoomStore,
    zone: &str,
    seed: RoomId,
    id: CliqueId,
    owner: &mut HashMap<RoomId, CliqueId>,
    built: &mut BTreeMap<CliqueId, Clique>,
) {
    let mut queue = VecDeque::new();
    owner.insert(seed, id);
    if let Some(c) = built.get_mut(&id) {
        c.rooms.insert(seed);
    }
    queue.push_back(seed);

    while let Some(current) = queue.pop_front() {
        let Some(room) = store.room(current) else {
            continue;
        };
        for dest in room.neighbors() {
            if store.zone_of(dest) != Some(zone) {
                continue;
            }
            match owner.get(&dest).copied() {
                None => {
                    owner.insert(dest, id);
                    if let Some(c) = built.get_mut(&id) {
                        c.rooms.insert(dest);
                    }
                    queue.push_back(dest);
                }
                Some(other) if other != id => {
                    if let Some(absorbed) = built.remove(&other) {
                        for &r in &absorbed.rooms {
                            owner.insert(r, id);
                        }
                        if let Some(c) = built.get_mut(&id) {
                            c.absorb(absorbed);
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }
}

/// Breadth-first hop costs from `start` over rooms accepted by `allow`.
pub fn cost_expansion<F>(store: &RoomStore, start: RoomId, allow: F) -> HashMap<RoomId, u32>
where
    F: Fn(RoomId) -> bool,
{
    let mut costs = HashMap::new();
    let mut queue = VecDeque::new();
    costs.insert(start, 0);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        let cost = costs[&current];
        let Some(room) = store.room(current) else {
            continue;
        };
        for dest in room.neighbors() {
            if !costs.contains_key(&dest) && allow(dest) {
                costs.insert(dest, cost + 1);
                queue.push_back(dest);
            }
        }
    }
    costs
}

/// Rebuild the path `start → end` from hop costs by stepping back from
/// `end` through predecessors with a strictly smaller cost. The first
/// (lowest id) cheapest predecessor wins.
pub fn walk_back<F>(
    store: &RoomStore,
    costs: &HashMap<RoomId, u32>,
    start: RoomId,
    end: RoomId,
    allow: F,
) -> Option<Vec<RoomId>>
where
    F: Fn(RoomId) -> bool,
{
    let mut cost = *costs.get(&end)?;
    let mut path = vec![end];
    let mut current = end;
    while current != start {
        let (prev, prev_cost) = store
            .incoming(current)
            .filter(|&p| p == start || allow(p))
            .filter_map(|p| costs.get(&p).map(|&c| (p, c)))
            .filter(|&(_, c)| c < cost)
            .min_by_key(|&(_, c)| c)?;
        path.push(prev);
        current = prev;
        cost = prev_cost;
    }
    path.reverse();
    Some(path)
}

/// Shortest room path from `start` to `end` over rooms accepted by `allow`.
pub fn shortest_path<F>(store: &RoomStore, start: RoomId, end: RoomId, allow: F) -> Option<Vec<RoomId>>
where
    F: Fn(RoomId) -> bool,
{
    if start == end {
        return Some(vec![start]);
    }
    let costs = cost_expansion(store, start, &allow);
    walk_back(store, &costs, start, end, &allow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Exit;

    fn link(store: &mut RoomStore, a: RoomId, dir: &str, b: RoomId, back: &str) {
        store.set_exit(a, dir, Exit::to(b)).unwrap();
        store.set_exit(b, back, Exit::to(a)).unwrap();
    }

    /// town: 1-2-3 and 4-5, joined only through field room 10.
    fn split_zone_store() -> RoomStore {
        let mut store = RoomStore::new();
        for id in [1, 2, 3, 4, 5] {
            store.ensure_room(id, "town");
        }
        store.ensure_room(10, "field");
        link(&mut store, 1, "east", 2, "west");
        link(&mut store, 2, "east", 3, "west");
        link(&mut store, 4, "east", 5, "west");
        link(&mut store, 3, "north", 10, "south");
        link(&mut store, 10, "east", 4, "north");
        store
    }

    #[test]
    fn test_partition_covers_every_room_once() {
        let mut store = split_zone_store();
        let mut map = CliqueMap::new();
        map.recompute(&mut store);
        assert!(map.partition_problems(&store).is_empty());
        assert_eq!(map.zone_cliques("town").len(), 2);
        assert_eq!(map.zone_cliques("field").len(), 1);
        assert_eq!(map.clique_of(1), map.clique_of(3));
        assert_ne!(map.clique_of(1), map.clique_of(4));
    }

    #[test]
    fn test_edges_resolve_across_zones() {
        let mut store = split_zone_store();
        let mut map = CliqueMap::new();
        map.recompute(&mut store);

        let west = map.clique(map.clique_of(1).unwrap()).unwrap();
        let field = map.clique_of(10).unwrap();
        assert_eq!(
            west.edges,
            vec![CliqueEdge {
                from_room: 3,
                to_clique: field,
                to_room: 10
            }]
        );
        assert!(west.unresolved.is_empty());
        assert_eq!(west.entrances, BTreeSet::from([3]));
    }

    #[test]
    fn test_extension_claims_one_way_room() {
        // room 6 only has a one-way chute into room 5
        let mut store = split_zone_store();
        store.ensure_room(6, "town");
        store.set_exit(6, "down", Exit::to(5)).unwrap();
        let mut map = CliqueMap::new();
        map.recompute(&mut store);
        assert_eq!(map.clique_of(6), map.clique_of(5));
        assert!(map.partition_problems(&store).is_empty());
    }

    #[test]
    fn test_intersecting_floods_merge() {
        // 7 -> 9 <- 8, nothing leaves the zone
        let mut store = RoomStore::new();
        for id in [7, 8, 9] {
            store.ensure_room(id, "cave");
        }
        store.set_exit(7, "east", Exit::to(9)).unwrap();
        store.set_exit(8, "west", Exit::to(9)).unwrap();
        let mut map = CliqueMap::new();
        map.recompute(&mut store);

        assert_eq!(map.zone_cliques("cave").len(), 1);
        let clique = map.clique(map.clique_of(8).unwrap()).unwrap();
        assert_eq!(clique.rooms, BTreeSet::from([7, 8, 9]));
    }

    #[test]
    fn test_isolated_room_gets_own_clique() {
        let mut store = split_zone_store();
        store.ensure_room(20, "town");
        let mut map = CliqueMap::new();
        map.recompute(&mut store);
        assert_eq!(map.zone_cliques("town").len(), 3);
        assert!(map.partition_problems(&store).is_empty());
    }

    #[test]
    fn test_recompute_is_lazy_and_local() {
        let mut store = split_zone_store();
        let mut map = CliqueMap::new();
        map.recompute(&mut store);
        let field_before = map.clique_of(10).unwrap();
        let generation = map.generation();

        assert_eq!(map.recompute(&mut store), RecomputeStats::default());
        assert_eq!(map.generation(), generation);

        // connect the two halves of town directly; only town is dirty
        link(&mut store, 3, "east", 4, "west");
        let stats = map.recompute(&mut store);
        assert_eq!(stats.zones_rebuilt, 1);
        assert_eq!(map.clique_of(10), Some(field_before));
        assert_eq!(map.zone_cliques("town").len(), 1);

        // the untouched field clique now points at the rebuilt town clique
        let town = map.clique_of(4).unwrap();
        let field = map.clique(field_before).unwrap();
        assert!(field.edges.iter().all(|e| e.to_clique == town));
        assert!(map.partition_problems(&store).is_empty());
    }

    #[test]
    fn test_portal_routes_are_cached() {
        let mut store = split_zone_store();
        store.ensure_room(11, "field");
        link(&mut store, 10, "west", 11, "east");
        link(&mut store, 11, "south", 1, "north");
        let mut map = CliqueMap::new();
        map.recompute(&mut store);

        let west = map.clique(map.clique_of(1).unwrap()).unwrap();
        assert_eq!(west.portal_rooms(), BTreeSet::from([1, 3]));
        assert_eq!(west.cached_route_count(), 2);
        assert_eq!(west.cached_route(1, 3), Some(&[1, 2, 3][..]));
        assert_eq!(west.hops(1, 3), Some(2));
        assert_eq!(west.hops(3, 3), Some(0));
    }

    #[test]
    fn test_shortest_path_prefers_fewest_hops() {
        // square 1 2 / 3 4 plus a long detour 1-5-6-4
        let mut store = RoomStore::new();
        for id in 1..=6 {
            store.ensure_room(id, "z");
        }
        link(&mut store, 1, "east", 2, "west");
        link(&mut store, 2, "south", 4, "north");
        link(&mut store, 1, "south", 3, "north");
        link(&mut store, 3, "east", 4, "west");
        link(&mut store, 1, "up", 5, "down");
        link(&mut store, 5, "east", 6, "west");
        link(&mut store, 6, "down", 4, "up");

        let path = shortest_path(&store, 1, 4, |_| true).unwrap();
        assert_eq!(path, vec![1, 2, 4]);
        assert_eq!(shortest_path(&store, 4, 4, |_| true), Some(vec![4]));
        let avoiding = shortest_path(&store, 1, 4, |r| r != 2 && r != 3).unwrap();
        assert_eq!(avoiding, vec![1, 5, 6, 4]);
    }
}
