//! Route search over the clique graph.
//!
//! A query runs in up to three stages:
//!
//! 1. **Same clique**: plain breadth-first search inside the clique. Its
//!    length is the bound any route leaving the clique has to beat.
//! 2. **Clique route**: recursive search over the clique adjacency graph
//!    for the cheapest clique sequence (direct hop, then one intermediate
//!    clique, then unbounded recursion with branch-and-bound pruning).
//!    Costs are exact hop counts: the steps from `start` to the first
//!    handoff, the cached portal-to-portal routes in between and the steps
//!    from the last entrance to `end`.
//! 3. **Stitching**: pick, for every consecutive clique pair, the handoff
//!    edge and intra-clique segment minimizing the full room path.
//!
//! A clique may be re-entered through a different entrance, so a zone whose
//! rooms only connect through a neighbour still routes optimally.
//!
//! Zone avoidance is soft: cliques in avoided zones are never used as
//! intermediate hops, but the start and end cliques are always allowed.
//! If the clique stages cannot produce a path (one-way exits inside a
//! clique, stale cliques) a whole-map BFS honouring the same avoidance is
//! tried before giving up with an empty route.

use crate::cliques::{cost_expansion, shortest_path, Clique, CliqueEdge, CliqueId, CliqueMap};
use crate::store::{RoomId, RoomStore};
use std::collections::{BTreeSet, HashMap};

/// Shortest room path from `start` to `end`, both included.
///
/// Returns `[start]` when both are the same room and an empty vec when no
/// route exists. `cliques` must be up to date with `store`.
pub fn find_route(
    store: &RoomStore,
    cliques: &CliqueMap,
    start: RoomId,
    end: RoomId,
    avoid_zones: &[&str],
) -> Vec<RoomId> {
    if !store.contains(start) || !store.contains(end) {
        log::debug!("Route {} → {}: unknown room", start, end);
        return Vec::new();
    }
    if start == end {
        return vec![start];
    }

    let avoid: BTreeSet<&str> = avoid_zones.iter().copied().collect();
    let start_clique = cliques.clique_of(start);
    let end_clique = cliques.clique_of(end);

    if let Some(path) = clique_path(store, cliques, start, end, &avoid) {
        return path;
    }

    let allowed = |room: RoomId| {
        room == end
            || store.zone_of(room).is_some_and(|z| !avoid.contains(z))
            || cliques
                .clique_of(room)
                .is_some_and(|c| Some(c) == start_clique || Some(c) == end_clique)
    };
    match shortest_path(store, start, end, allowed) {
        Some(path) => {
            log::debug!("Route {} → {} found by whole-map search", start, end);
            path
        }
        None => Vec::new(),
    }
}

fn clique_path(
    store: &RoomStore,
    cliques: &CliqueMap,
    start: RoomId,
    end: RoomId,
    avoid: &BTreeSet<&str>,
) -> Option<Vec<RoomId>> {
    let legs = Legs::new(store, cliques, start, end)?;
    let local = if legs.start_clique == legs.end_clique {
        let clique = cliques.clique(legs.start_clique)?;
        segment(store, clique, start, end)
    } else {
        None
    };
    let bound = local.as_ref().map_or(u32::MAX, |p| (p.len() - 1) as u32);

    let Some((sequence, cost)) = clique_route(
        cliques,
        &legs,
        legs.start_clique,
        start,
        BTreeSet::new(),
        avoid,
        bound,
    ) else {
        return local;
    };
    log::debug!(
        "Route {} → {}: {} cliques, {} steps",
        start,
        end,
        sequence.len(),
        cost
    );
    stitch(store, cliques, &sequence, start, end)
}

// ── Clique-level search ─────────────────────────────────────────────────

/// Step counts inside the two end cliques of one query. Every other leg
/// runs between portal rooms and comes from the clique route caches.
#[derive(Debug, Clone)]
pub struct Legs {
    pub start: RoomId,
    pub end: RoomId,
    pub start_clique: CliqueId,
    pub end_clique: CliqueId,
    /// portal room → steps from `start`
    from_start: HashMap<RoomId, u32>,
    /// portal room → steps to `end`
    to_end: HashMap<RoomId, u32>,
}

impl Legs {
    /// `None` when either room has no clique.
    pub fn new(store: &RoomStore, cliques: &CliqueMap, start: RoomId, end: RoomId) -> Option<Self> {
        let start_clique = cliques.clique(cliques.clique_of(start)?)?;
        let end_clique = cliques.clique(cliques.clique_of(end)?)?;

        let costs = cost_expansion(store, start, |r| start_clique.rooms.contains(&r));
        let from_start = start_clique
            .portal_rooms()
            .into_iter()
            .filter_map(|p| costs.get(&p).map(|&c| (p, c)))
            .collect();
        let to_end = end_clique
            .portal_rooms()
            .into_iter()
            .filter_map(|p| segment(store, end_clique, p, end).map(|path| (p, (path.len() - 1) as u32)))
            .collect();

        Some(Self {
            start,
            end,
            start_clique: start_clique.id,
            end_clique: end_clique.id,
            from_start,
            to_end,
        })
    }

    /// Steps inside `clique` from the room it was entered by to `exit`.
    fn inside(&self, clique: &Clique, entry: RoomId, exit: RoomId) -> Option<u32> {
        if clique.id == self.start_clique && entry == self.start && entry != exit {
            return self.from_start.get(&exit).copied();
        }
        clique.hops(entry, exit)
    }

    /// Steps from taking `edge` to standing in `end`, if it enters the end
    /// clique.
    fn finish(&self, edge: &CliqueEdge) -> Option<u32> {
        if edge.to_clique != self.end_clique {
            return None;
        }
        self.to_end.get(&edge.to_room).map(|c| c + 1)
    }

    /// Whether the route may pass through `clique`.
    fn may_cross(&self, clique: &Clique, avoid: &BTreeSet<&str>) -> bool {
        clique.id == self.start_clique
            || clique.id == self.end_clique
            || !avoid.contains(clique.zone.as_str())
    }
}

/// Cheapest clique sequence from `here`, entered through `entry`, to the
/// end clique of `legs`, with its exact step count.
///
/// `(clique, entrance)` pairs in `on_path` are not entered again, and
/// intermediate cliques in avoided zones are skipped. Only results cheaper
/// than `bound` are returned.
pub fn clique_route(
    cliques: &CliqueMap,
    legs: &Legs,
    here: CliqueId,
    entry: RoomId,
    mut on_path: BTreeSet<(CliqueId, RoomId)>,
    avoid: &BTreeSet<&str>,
    bound: u32,
) -> Option<(Vec<CliqueId>, u32)> {
    let clique = cliques.clique(here)?;
    on_path.insert((here, entry));
    let mut best: Option<(Vec<CliqueId>, u32)> = None;
    let mut bound = bound;

    // direct hop
    for edge in clique.edges_to(legs.end_clique) {
        let Some(out) = legs.inside(clique, entry, edge.from_room) else {
            continue;
        };
        let Some(last) = legs.finish(edge) else {
            continue;
        };
        let cost = out + last;
        if cost < bound {
            bound = cost;
            best = Some((vec![here, legs.end_clique], cost));
        }
    }

    // (edge, next clique, steps up to and including the handoff)
    let hops: Vec<(&CliqueEdge, &Clique, u32)> = clique
        .edges
        .iter()
        .filter(|e| !on_path.contains(&(e.to_clique, e.to_room)))
        .filter_map(|e| {
            let next = cliques.clique(e.to_clique)?;
            let out = legs.inside(clique, entry, e.from_room)?;
            Some((e, next, out + 1))
        })
        .filter(|(_, next, _)| legs.may_cross(next, avoid))
        .collect();

    // one intermediate clique
    for &(edge, mid, out) in &hops {
        if mid.id == legs.end_clique {
            continue;
        }
        for onward in mid.edges_to(legs.end_clique) {
            let Some(through) = legs.inside(mid, edge.to_room, onward.from_room) else {
                continue;
            };
            let Some(last) = legs.finish(onward) else {
                continue;
            };
            let cost = out + through + last;
            if cost < bound {
                bound = cost;
                best = Some((vec![here, mid.id, legs.end_clique], cost));
            }
        }
    }

    // unbounded recursion
    for &(edge, next, out) in &hops {
        if out >= bound {
            continue;
        }
        let Some((tail, tail_cost)) = clique_route(
            cliques,
            legs,
            next.id,
            edge.to_room,
            on_path.clone(),
            avoid,
            bound - out,
        ) else {
            continue;
        };
        let cost = out + tail_cost;
        if cost < bound {
            bound = cost;
            let mut sequence = vec![here];
            sequence.extend(tail);
            best = Some((sequence, cost));
        }
    }
    best
}

// ── Room-level stitching ────────────────────────────────────────────────

/// Turn a clique sequence into the shortest room path through it.
pub fn stitch(
    store: &RoomStore,
    cliques: &CliqueMap,
    sequence: &[CliqueId],
    start: RoomId,
    end: RoomId,
) -> Option<Vec<RoomId>> {
    if sequence.is_empty() {
        return None;
    }
    let mut memo = HashMap::new();
    best_from(store, cliques, sequence, 0, start, end, &mut memo)
}

fn best_from(
    store: &RoomStore,
    cliques: &CliqueMap,
    sequence: &[CliqueId],
    index: usize,
    entry: RoomId,
    end: RoomId,
    memo: &mut HashMap<(usize, RoomId), Option<Vec<RoomId>>>,
) -> Option<Vec<RoomId>> {
    if let Some(hit) = memo.get(&(index, entry)) {
        return hit.clone();
    }
    let clique = cliques.clique(sequence[index])?;

    let result = if index + 1 == sequence.len() {
        segment(store, clique, entry, end)
    } else {
        let mut best: Option<Vec<RoomId>> = None;
        for edge in clique.edges_to(sequence[index + 1]) {
            let Some(head) = segment(store, clique, entry, edge.from_room) else {
                continue;
            };
            let Some(tail) = best_from(store, cliques, sequence, index + 1, edge.to_room, end, memo)
            else {
                continue;
            };
            if best
                .as_ref()
                .map_or(true, |b| head.len() + tail.len() < b.len())
            {
                let mut path = head;
                path.extend(tail);
                best = Some(path);
            }
        }
        best
    };

    memo.insert((index, entry), result.clone());
    result
}

/// Path between two rooms of one clique, from the cache when possible.
fn segment(store: &RoomStore, clique: &Clique, from: RoomId, to: RoomId) -> Option<Vec<RoomId>> {
    if from == to {
        return Some(vec![from]);
    }
    if let Some(cached) = clique.cached_route(from, to) {
        return (!cached.is_empty()).then(|| cached.to_vec());
    }
    shortest_path(store, from, to, |r| clique.rooms.contains(&r))
}

/// Exit directions walked along a room path. `None` if two consecutive
/// rooms are not linked by a recorded exit.
pub fn route_directions(store: &RoomStore, path: &[RoomId]) -> Option<Vec<String>> {
    path.windows(2)
        .map(|pair| {
            store
                .room(pair[0])
                .and_then(|r| r.direction_to(pair[1]))
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Exit;

    fn link(store: &mut RoomStore, a: RoomId, dir: &str, b: RoomId, back: &str) {
        store.set_exit(a, dir, Exit::to(b)).unwrap();
        store.set_exit(b, back, Exit::to(a)).unwrap();
    }

    fn rooms(store: &mut RoomStore, zone: &str, ids: &[RoomId]) {
        for &id in ids {
            store.ensure_room(id, zone);
        }
    }

    fn route(store: &mut RoomStore, start: RoomId, end: RoomId, avoid: &[&str]) -> Vec<RoomId> {
        let mut cliques = CliqueMap::new();
        cliques.recompute(store);
        find_route(store, &cliques, start, end, avoid)
    }

    fn linear_zone() -> RoomStore {
        // 1 <-> 2 <-> 3 <-> 4 <-> 5
        let mut store = RoomStore::new();
        rooms(&mut store, "road", &[1, 2, 3, 4, 5]);
        for id in 1..5 {
            link(&mut store, id, "east", id + 1, "west");
        }
        store
    }

    #[test]
    fn test_linear_route() {
        let mut store = linear_zone();
        assert_eq!(route(&mut store, 1, 5, &[]), vec![1, 2, 3, 4, 5]);
        assert_eq!(route(&mut store, 5, 2, &[]), vec![5, 4, 3, 2]);
    }

    #[test]
    fn test_same_room() {
        let mut store = linear_zone();
        assert_eq!(route(&mut store, 1, 1, &[]), vec![1]);
    }

    #[test]
    fn test_disconnected_rooms() {
        let mut store = linear_zone();
        rooms(&mut store, "island", &[50]);
        assert!(route(&mut store, 1, 50, &[]).is_empty());
        assert!(route(&mut store, 1, 999, &[]).is_empty());
    }

    #[test]
    fn test_route_across_zones() {
        // A: 1-2, B: 3-4, C: 5-6 in a chain
        let mut store = RoomStore::new();
        rooms(&mut store, "A", &[1, 2]);
        rooms(&mut store, "B", &[3, 4]);
        rooms(&mut store, "C", &[5, 6]);
        for id in 1..6 {
            link(&mut store, id, "east", id + 1, "west");
        }
        assert_eq!(route(&mut store, 1, 6, &[]), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(route(&mut store, 6, 1, &[]), vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_handoff_choice_minimizes_total() {
        // A: 1-2-3, B: 10-11-12-13; 1<->10 and 3<->13
        let mut store = RoomStore::new();
        rooms(&mut store, "A", &[1, 2, 3]);
        rooms(&mut store, "B", &[10, 11, 12, 13]);
        link(&mut store, 1, "east", 2, "west");
        link(&mut store, 2, "east", 3, "west");
        link(&mut store, 10, "east", 11, "west");
        link(&mut store, 11, "east", 12, "west");
        link(&mut store, 12, "east", 13, "west");
        link(&mut store, 1, "north", 10, "south");
        link(&mut store, 3, "north", 13, "south");

        assert_eq!(route(&mut store, 1, 13, &[]), vec![1, 2, 3, 13]);
        assert_eq!(route(&mut store, 2, 11, &[]), vec![2, 1, 10, 11]);
    }

    fn detour_world() -> RoomStore {
        // A(1) -> Z(2) -> C(5) is short; A(1) -> Y(3,4) -> C(5) is longer
        let mut store = RoomStore::new();
        rooms(&mut store, "A", &[1]);
        rooms(&mut store, "Z", &[2]);
        rooms(&mut store, "Y", &[3, 4]);
        rooms(&mut store, "C", &[5]);
        link(&mut store, 1, "east", 2, "west");
        link(&mut store, 2, "east", 5, "west");
        link(&mut store, 1, "north", 3, "south");
        link(&mut store, 3, "east", 4, "west");
        link(&mut store, 4, "south", 5, "north");
        store
    }

    #[test]
    fn test_avoidance_takes_detour() {
        let mut store = detour_world();
        assert_eq!(route(&mut store, 1, 5, &[]), vec![1, 2, 5]);
        assert_eq!(route(&mut store, 1, 5, &["Z"]), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_avoidance_never_crosses_avoided_zone() {
        let mut store = detour_world();
        store.remove_exit(1, "north").unwrap();
        store.remove_exit(3, "south").unwrap();
        assert!(route(&mut store, 1, 5, &["Z"]).is_empty());
        // endpoints inside the avoided zone are still allowed
        assert_eq!(route(&mut store, 2, 5, &["Z"]), vec![2, 5]);
        assert_eq!(route(&mut store, 1, 2, &["Z"]), vec![1, 2]);
    }

    #[test]
    fn test_recursive_search_over_long_chain() {
        // five single-room zones in a row; forces the unbounded stage
        let mut store = RoomStore::new();
        for id in 1..=5 {
            rooms(&mut store, &format!("zone{}", id), &[id]);
        }
        for id in 1..5 {
            link(&mut store, id, "east", id + 1, "west");
        }
        assert_eq!(route(&mut store, 1, 5, &[]), vec![1, 2, 3, 4, 5]);
    }

    fn assert_matches_bfs(store: &mut RoomStore, start: RoomId, end: RoomId) {
        let routed = route(store, start, end, &[]);
        let bfs = shortest_path(store, start, end, |_| true).unwrap_or_default();
        assert_eq!(routed.len(), bfs.len(), "{} → {}: {:?} vs {:?}", start, end, routed, bfs);
        assert!(route_directions(store, &routed).is_some());
    }

    #[test]
    fn test_cheaper_intermediate_wins_over_lower_id() {
        // a: 1-2-3-4; 4 -> b(10) -> d(30) and 1 -> c(20) -> d(30)
        let mut store = RoomStore::new();
        rooms(&mut store, "a", &[1, 2, 3, 4]);
        rooms(&mut store, "b", &[10]);
        rooms(&mut store, "c", &[20]);
        rooms(&mut store, "d", &[30]);
        for id in 1..4 {
            link(&mut store, id, "east", id + 1, "west");
        }
        link(&mut store, 4, "north", 10, "south");
        link(&mut store, 10, "north", 30, "south");
        link(&mut store, 1, "up", 20, "down");
        link(&mut store, 20, "up", 30, "down");

        assert_eq!(route(&mut store, 1, 30, &[]), vec![1, 20, 30]);
        assert_eq!(route(&mut store, 30, 1, &[]), vec![30, 20, 1]);
        assert_eq!(route(&mut store, 4, 30, &[]), vec![4, 10, 30]);
    }

    #[test]
    fn test_end_clique_cost_counts() {
        // d: 30-31-32-33; 1 -> b(10) -> 30 and 1 -> c(20) -> 33
        let mut store = RoomStore::new();
        rooms(&mut store, "a", &[1]);
        rooms(&mut store, "b", &[10]);
        rooms(&mut store, "c", &[20]);
        rooms(&mut store, "d", &[30, 31, 32, 33]);
        for id in 30..33 {
            link(&mut store, id, "east", id + 1, "west");
        }
        link(&mut store, 1, "north", 10, "south");
        link(&mut store, 10, "north", 30, "south");
        link(&mut store, 1, "up", 20, "down");
        link(&mut store, 20, "up", 33, "down");

        assert_eq!(route(&mut store, 1, 33, &[]), vec![1, 20, 33]);
        assert_eq!(route(&mut store, 1, 31, &[]), vec![1, 10, 30, 31]);
        assert_eq!(route(&mut store, 1, 33, &["c"]), vec![1, 10, 30, 31, 32, 33]);
    }

    #[test]
    fn test_shortcut_through_neighbouring_zone() {
        // town: 1-2-3-4-5 in one clique; field 10 joins 1 and 5; moor 20 hangs off 5
        let mut store = linear_zone();
        rooms(&mut store, "field", &[10]);
        rooms(&mut store, "moor", &[20]);
        link(&mut store, 1, "north", 10, "west");
        link(&mut store, 10, "east", 5, "north");
        link(&mut store, 5, "south", 20, "north");

        assert_eq!(route(&mut store, 1, 5, &[]), vec![1, 10, 5]);
        assert_eq!(route(&mut store, 1, 20, &[]), vec![1, 10, 5, 20]);
        assert_eq!(route(&mut store, 1, 5, &["field"]), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_grid_routes_match_bfs() {
        // 4x4 grid, one zone per quadrant, a few walls and one-way doors
        let mut store = RoomStore::new();
        let id = |x: u32, y: u32| y * 4 + x + 1;
        for y in 0..4 {
            for x in 0..4 {
                let zone = format!("q{}{}", x / 2, y / 2);
                store.ensure_room(id(x, y), &zone);
            }
        }
        let walls = [(id(0, 0), id(1, 0)), (id(2, 1), id(2, 2)), (id(1, 3), id(2, 3))];
        let one_way = [(id(1, 1), id(2, 1)), (id(3, 2), id(3, 3))];
        for y in 0..4 {
            for x in 0..4 {
                let here = id(x, y);
                for (dir, back, next) in [
                    ("east", "west", (x + 1 < 4).then(|| id(x + 1, y))),
                    ("south", "north", (y + 1 < 4).then(|| id(x, y + 1))),
                ] {
                    let Some(next) = next else {
                        continue;
                    };
                    if walls.contains(&(here, next)) {
                        continue;
                    }
                    store.set_exit(here, dir, Exit::to(next)).unwrap();
                    if !one_way.contains(&(here, next)) {
                        store.set_exit(next, back, Exit::to(here)).unwrap();
                    }
                }
            }
        }

        for start in 1..=16 {
            for end in 1..=16 {
                assert_matches_bfs(&mut store, start, end);
            }
        }
    }

    #[test]
    fn test_route_directions() {
        let mut store = linear_zone();
        let path = route(&mut store, 3, 1, &[]);
        assert_eq!(
            route_directions(&store, &path),
            Some(vec!["west".to_string(), "west".to_string()])
        );
        assert_eq!(route_directions(&store, &[1, 5]), None);
    }
}
