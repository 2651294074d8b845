//! Mapper: the single owner of a profile's map state.
//!
//! Wires the pieces together: ingestion goes through the [`AutoMapper`] into
//! the [`RoomStore`], every "current room changed" is appended to the
//! [`ExplorationHistory`], and route queries bring the [`CliqueMap`] up to
//! date before searching.

use crate::automapper::{AutoMapper, RoomChange, RoomUpdate};
use crate::cliques::{CliqueMap, RecomputeStats};
use crate::config::MapperConfig;
use crate::history::{encode_speedwalk, ExplorationHistory, Speedwalk};
use crate::persistence::{self, PersistError};
use crate::route;
use crate::store::{MapError, Room, RoomId, RoomStore, StoreStats, Zone};
use std::io::{Read, Write};

/// Counts for diagnostics and the harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    pub store: StoreStats,
    pub cliques: usize,
    pub cached_routes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Mapper {
    store: RoomStore,
    cliques: CliqueMap,
    automapper: AutoMapper,
    history: ExplorationHistory,
}

impl Mapper {
    pub fn new(config: MapperConfig) -> Self {
        Self::with_store(RoomStore::new(), config)
    }

    /// Start from an existing map, e.g. one just loaded from disk.
    pub fn with_store(mut store: RoomStore, config: MapperConfig) -> Self {
        store.mark_all_dirty();
        Self {
            store,
            cliques: CliqueMap::new(),
            automapper: AutoMapper::new(config),
            history: ExplorationHistory::new(),
        }
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// Direct access for manual edits. Changes are tracked by the store's
    /// dirty set and picked up by the next route query.
    pub fn store_mut(&mut self) -> &mut RoomStore {
        &mut self.store
    }

    pub fn cliques(&self) -> &CliqueMap {
        &self.cliques
    }

    pub fn automapper(&self) -> &AutoMapper {
        &self.automapper
    }

    pub fn history(&self) -> &ExplorationHistory {
        &self.history
    }

    pub fn current_room(&self) -> Option<RoomId> {
        self.automapper.current_room()
    }

    /// Place the player manually. Starts a new history segment.
    pub fn set_current_room(&mut self, room: RoomId) -> Result<(), MapError> {
        if !self.store.contains(room) {
            return Err(MapError::UnknownRoom(room));
        }
        self.automapper.set_current_room(Some(room));
        self.history.reset_at(room);
        Ok(())
    }

    /// Reconnect: forget the ingestion latch, the capture in flight and the
    /// movement log. The map itself is kept.
    pub fn reset_session(&mut self) {
        self.automapper.reset_session();
        self.automapper.set_current_room(None);
        self.history.clear();
    }

    // ── Ingestion ───────────────────────────────────────────────────────

    pub fn handle_room_update(&mut self, update: &RoomUpdate) -> Result<Option<RoomChange>, MapError> {
        let change = self.automapper.handle_room_update(&mut self.store, update)?;
        Ok(self.record(change))
    }

    pub fn handle_command(&mut self, command: &str, echoed: bool) {
        self.automapper.handle_command(&mut self.store, command, echoed);
    }

    pub fn handle_line(&mut self, line: &str) -> Option<RoomChange> {
        let change = self.automapper.handle_line(&mut self.store, line);
        self.record(change)
    }

    pub fn handle_prompt(&mut self) -> Option<RoomChange> {
        let change = self.automapper.handle_prompt(&mut self.store);
        self.record(change)
    }

    fn record(&mut self, change: Option<RoomChange>) -> Option<RoomChange> {
        if let Some(c) = &change {
            match c.from {
                Some(from) => self.history.record_move(from, c.to, &c.direction),
                None => self.history.reset_at(c.to),
            }
        }
        change
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.store.room(id)
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.store.zone(name)
    }

    pub fn search_for_rooms(&self, keywords: &str, names_only: bool, zone_filter: Option<&str>) -> Vec<RoomId> {
        self.store.search_for_rooms(keywords, names_only, zone_filter)
    }

    pub fn connected_zones(&self, zone: &str) -> Vec<String> {
        self.store.connected_zones(zone)
    }

    pub fn waypoint(&self, name: &str) -> Option<RoomId> {
        self.store.waypoint(name)
    }

    pub fn set_waypoint(&mut self, name: &str, room: RoomId) -> Result<(), MapError> {
        self.store.set_waypoint(name, room)
    }

    pub fn remove_waypoint(&mut self, name: &str) -> bool {
        self.store.remove_waypoint(name)
    }

    /// Bring the cliques up to date with pending store changes.
    pub fn recompute(&mut self) -> RecomputeStats {
        let stats = self.cliques.recompute(&mut self.store);
        if stats.zones_rebuilt > 0 {
            log::debug!(
                "Recomputed {} zones: {} cliques, {} cached routes",
                stats.zones_rebuilt,
                stats.cliques_built,
                stats.routes_cached
            );
        }
        stats
    }

    /// Shortest room path from `start` to `end`; empty when unreachable.
    pub fn find_route(&mut self, start: RoomId, end: RoomId, avoid_zones: &[&str]) -> Vec<RoomId> {
        self.recompute();
        route::find_route(&self.store, &self.cliques, start, end, avoid_zones)
    }

    /// Route from the current room to a waypoint.
    pub fn route_to_waypoint(&mut self, name: &str, avoid_zones: &[&str]) -> Vec<RoomId> {
        match (self.current_room(), self.waypoint(name)) {
            (Some(start), Some(end)) => self.find_route(start, end, avoid_zones),
            _ => Vec::new(),
        }
    }

    pub fn route_directions(&self, path: &[RoomId]) -> Option<Vec<String>> {
        route::route_directions(&self.store, path)
    }

    pub fn speedwalk_for_route(&self, path: &[RoomId]) -> Option<String> {
        self.route_directions(path).map(|dirs| encode_speedwalk(&dirs))
    }

    // ── History ─────────────────────────────────────────────────────────

    pub fn describe_history(&self, length: usize, reverse: bool) -> Vec<String> {
        self.history.describe(&self.store, length, reverse)
    }

    pub fn history_speedwalk(&self, length: usize, reverse: bool) -> Speedwalk {
        self.history.speedwalk(&self.store, length, reverse)
    }

    pub fn simplify_history(&mut self, aggressive: bool) -> usize {
        self.history.simplify(&self.store, aggressive)
    }

    pub fn stats(&self) -> MapStats {
        MapStats {
            store: self.store.stats(),
            cliques: self.cliques.len(),
            cached_routes: self.cliques.cliques().map(|c| c.cached_route_count()).sum(),
        }
    }

    // ── Save/Load ───────────────────────────────────────────────────────

    pub fn save<W: Write>(&self, writer: W) -> Result<(), PersistError> {
        persistence::save_map(writer, &self.store)
    }

    /// Replace the map with one read from `reader`. The session (current
    /// room, history, ingestion latch) starts over.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<(), PersistError> {
        let store = persistence::load_map(reader)?;
        self.replace_store(store);
        Ok(())
    }

    pub fn export_json(&self) -> Result<String, PersistError> {
        persistence::export_json(&self.store)
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), PersistError> {
        let store = persistence::import_json(json)?;
        self.replace_store(store);
        Ok(())
    }

    fn replace_store(&mut self, store: RoomStore) {
        self.store = store;
        self.store.mark_all_dirty();
        self.cliques = CliqueMap::new();
        self.reset_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automapper::ExitUpdate;
    use std::collections::BTreeMap;

    fn update(id: RoomId, name: &str, zone: &str, exits: &[(&str, RoomId)]) -> RoomUpdate {
        RoomUpdate {
            id,
            name: name.to_string(),
            zone: zone.to_string(),
            room_type: String::new(),
            exits: exits
                .iter()
                .map(|(dir, dest)| {
                    (
                        dir.to_string(),
                        ExitUpdate {
                            destination: Some(*dest),
                            ..ExitUpdate::default()
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Walks 1 → 2 → 3 (town → town → forest) over the structured channel.
    fn walked_mapper() -> Mapper {
        let mut mapper = Mapper::new(MapperConfig::default());
        mapper
            .handle_room_update(&update(1, "Gate", "town", &[("north", 2)]))
            .unwrap();
        mapper
            .handle_room_update(&update(2, "Road", "town", &[("south", 1), ("north", 3)]))
            .unwrap();
        mapper
            .handle_room_update(&update(3, "Clearing", "forest", &[("south", 2)]))
            .unwrap();
        mapper
    }

    #[test]
    fn test_moves_are_recorded() {
        let mapper = walked_mapper();
        assert_eq!(mapper.current_room(), Some(3));
        assert_eq!(mapper.history().len(), 3);
        assert!(mapper.history().steps()[0].is_reset());
        assert_eq!(mapper.history_speedwalk(0, false).path, "2n");
        assert_eq!(mapper.history_speedwalk(0, true).path, "2s");
    }

    #[test]
    fn test_route_recomputes_lazily() {
        let mut mapper = walked_mapper();
        assert!(mapper.cliques().is_empty());
        assert_eq!(mapper.find_route(1, 3, &[]), vec![1, 2, 3]);
        assert!(!mapper.cliques().is_empty());
        assert!(!mapper.store().has_dirty());

        // a manual edit is picked up by the next query
        mapper.store_mut().remove_exit(2, "north").unwrap();
        assert!(mapper.find_route(1, 3, &[]).is_empty());
    }

    #[test]
    fn test_route_to_waypoint() {
        let mut mapper = walked_mapper();
        mapper.set_waypoint("Town Gate", 1).unwrap();
        let path = mapper.route_to_waypoint("town", &[]);
        assert_eq!(path, vec![3, 2, 1]);
        assert_eq!(mapper.speedwalk_for_route(&path), Some("2s".to_string()));
        assert!(mapper.route_to_waypoint("nowhere", &[]).is_empty());
    }

    #[test]
    fn test_set_current_room_starts_new_segment() {
        let mut mapper = walked_mapper();
        assert_eq!(mapper.set_current_room(99), Err(MapError::UnknownRoom(99)));
        mapper.set_current_room(1).unwrap();
        assert!(mapper.history().steps()[3].is_reset());
        assert_eq!(mapper.describe_history(1, false), vec!["restarted at Gate"]);
    }

    #[test]
    fn test_reset_session_keeps_map() {
        let mut mapper = walked_mapper();
        mapper.reset_session();
        assert!(mapper.history().is_empty());
        assert_eq!(mapper.current_room(), None);
        assert_eq!(mapper.store().room_count(), 3);
    }

    #[test]
    fn test_load_replaces_map_and_session() {
        let source = walked_mapper();
        let mut buffer = Vec::new();
        source.save(&mut buffer).unwrap();

        let mut mapper = Mapper::new(MapperConfig::default());
        mapper.load(&buffer[..]).unwrap();
        assert_eq!(mapper.current_room(), None);
        assert_eq!(mapper.stats().store.rooms, 3);
        assert_eq!(mapper.find_route(3, 1, &[]), vec![3, 2, 1]);
        assert_eq!(mapper.stats().cliques, 2);
    }
}
