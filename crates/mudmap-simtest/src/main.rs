//! mudmap Headless Mapping Harness
//!
//! Builds a synthetic multi-zone world, replays a text transcript and checks
//! the clique decomposition and route search against plain BFS.
//! Runs entirely in-process with no MUD connection and no client.
//!
//! Usage:
//!   cargo run -p mudmap-simtest
//!   cargo run -p mudmap-simtest -- --verbose

use mudmap_logic::automapper::{ExitUpdate, RoomUpdate};
use mudmap_logic::cliques::shortest_path;
use mudmap_logic::config::MapperConfig;
use mudmap_logic::store::RoomId;
use mudmap_logic::Mapper;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

// ── Synthetic world parameters ──────────────────────────────────────────

const SEED: u64 = 42;
const ZONES: u32 = 4;
const WIDTH: u32 = 6;
const HEIGHT: u32 = 6;
const ROUTE_SAMPLES: usize = 200;
/// Chance an internal link is missing, and that it is one-way.
const DROP_CHANCE: f64 = 0.12;
const ONE_WAY_CHANCE: f64 = 0.06;

/// (command, lines the MUD answers with)
const TRANSCRIPT: &[(&str, &[&str])] = &[
    ("look", &["Temple Square", "The heart of the city.", "Obvious exits: north east south"]),
    ("north", &["Temple Steps", "Obvious exits: north south"]),
    ("north", &["Temple", "A quiet hall.", "Obvious exits: south"]),
    ("south", &["Temple Steps", "Obvious exits: north south"]),
    ("south", &["Temple Square", "The heart of the city.", "Obvious exits: north east south"]),
    ("east", &["Market Street", "Obvious exits: east west [north]"]),
    ("east", &["Bakery", "It smells of bread.", "Obvious exits: west"]),
    ("say hello", &["You say 'hello'"]),
    ("west", &["Market Street", "Obvious exits: east west [north]"]),
    ("west", &["Temple Square", "Obvious exits: north east south"]),
];

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    println!("=== mudmap Mapping Harness ===\n");

    let mut rng = StdRng::seed_from_u64(SEED);
    let mut results = Vec::new();

    // 1. Configuration
    results.extend(validate_config(verbose));

    // 2. Synthetic world construction
    let (mut mapper, rooms, world_results) = build_world(&mut rng);
    results.extend(world_results);

    // 3. Clique partition
    results.extend(validate_partition(&mut mapper, verbose));

    // 4. Routing against BFS
    results.extend(validate_routing(&mut mapper, &rooms, &mut rng, verbose));

    // 5. Zone avoidance
    results.extend(validate_avoidance(&mut mapper, &rooms, &mut rng, verbose));

    // 6. Incremental edits
    results.extend(validate_incremental(&mut mapper, &rooms, &mut rng, verbose));

    // 7. Save/Load
    results.extend(validate_persistence(&mut mapper, &rooms, &mut rng, verbose));

    // 8. Transcript replay & history
    results.extend(validate_transcript(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn pick(rooms: &[RoomId], rng: &mut StdRng) -> RoomId {
    rooms[rng.gen_range(0..rooms.len())]
}

// ── 1. Configuration ────────────────────────────────────────────────────

fn validate_config(_verbose: bool) -> Vec<TestResult> {
    println!("--- Configuration ---");
    let mut results = Vec::new();

    let problems = MapperConfig::default().validate();
    results.push(TestResult {
        name: "config_default_valid".into(),
        passed: problems.is_empty(),
        detail: if problems.is_empty() {
            "default vocabulary has no problems".into()
        } else {
            problems.join("; ")
        },
    });

    let custom = MapperConfig::from_json(
        r#"{ "direction_aliases": { "climb": "up" }, "default_zone": "wilds" }"#,
    );
    results.push(TestResult {
        name: "config_json_aliases".into(),
        passed: custom
            .as_ref()
            .is_ok_and(|c| c.movement_direction("climb").as_deref() == Some("up")),
        detail: match &custom {
            Ok(c) => format!("default zone '{}', {} aliases", c.default_zone, c.direction_aliases.len()),
            Err(e) => format!("parse error: {}", e),
        },
    });

    results
}

// ── 2. Synthetic world ──────────────────────────────────────────────────

fn room_id(zone: u32, x: u32, y: u32) -> RoomId {
    zone * 100 + y * WIDTH + x + 1
}

fn add_exit(exits: &mut BTreeMap<RoomId, BTreeMap<String, ExitUpdate>>, from: RoomId, dir: &str, to: RoomId) {
    exits.entry(from).or_default().insert(
        dir.to_string(),
        ExitUpdate {
            destination: Some(to),
            ..ExitUpdate::default()
        },
    );
}

/// Link two grid neighbours, sometimes leaving the link out or one-way.
fn maybe_link(
    rng: &mut StdRng,
    exits: &mut BTreeMap<RoomId, BTreeMap<String, ExitUpdate>>,
    a: RoomId,
    dir: &str,
    b: RoomId,
    back: &str,
) {
    let roll: f64 = rng.gen();
    if roll < DROP_CHANCE {
        return;
    }
    add_exit(exits, a, dir, b);
    if roll >= DROP_CHANCE + ONE_WAY_CHANCE {
        add_exit(exits, b, back, a);
    }
}

/// `ZONES` grids of `WIDTH`×`HEIGHT` rooms in a row, joined east-west on
/// two rows, plus a shaft from the first zone to the last.
fn build_world(rng: &mut StdRng) -> (Mapper, Vec<RoomId>, Vec<TestResult>) {
    println!("--- Synthetic World ---");
    let mut results = Vec::new();
    let mut exits: BTreeMap<RoomId, BTreeMap<String, ExitUpdate>> = BTreeMap::new();
    let mut zones: BTreeMap<RoomId, String> = BTreeMap::new();

    for zone in 0..ZONES {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let id = room_id(zone, x, y);
                zones.insert(id, format!("zone{}", zone));
                exits.entry(id).or_default();
                if x + 1 < WIDTH {
                    maybe_link(rng, &mut exits, id, "east", room_id(zone, x + 1, y), "west");
                }
                if y + 1 < HEIGHT {
                    maybe_link(rng, &mut exits, id, "south", room_id(zone, x, y + 1), "north");
                }
            }
        }
    }
    for zone in 0..ZONES - 1 {
        for y in [1, HEIGHT - 2] {
            add_exit(&mut exits, room_id(zone, WIDTH - 1, y), "east", room_id(zone + 1, 0, y));
            add_exit(&mut exits, room_id(zone + 1, 0, y), "west", room_id(zone, WIDTH - 1, y));
        }
    }
    let top = room_id(0, 0, 0);
    let bottom = room_id(ZONES - 1, WIDTH - 1, HEIGHT - 1);
    add_exit(&mut exits, top, "down", bottom);
    add_exit(&mut exits, bottom, "up", top);

    let mut mapper = Mapper::new(MapperConfig::default());
    let mut rejected = Vec::new();
    for (id, room_exits) in exits {
        let update = RoomUpdate {
            id,
            name: format!("Room {}", id),
            zone: zones.get(&id).cloned().unwrap_or_default(),
            room_type: String::new(),
            exits: room_exits,
        };
        if let Err(e) = mapper.handle_room_update(&update) {
            rejected.push(format!("#{}: {}", id, e));
        }
    }
    mapper.reset_session();

    results.push(TestResult {
        name: "world_updates_accepted".into(),
        passed: rejected.is_empty(),
        detail: if rejected.is_empty() {
            "every structured record applied".into()
        } else {
            rejected.join("; ")
        },
    });

    let stats = mapper.stats().store;
    let expected_rooms = (ZONES * WIDTH * HEIGHT) as usize;
    results.push(TestResult {
        name: "world_room_count".into(),
        passed: stats.rooms == expected_rooms && stats.zones == ZONES as usize,
        detail: format!(
            "{} rooms in {} zones, {} exits",
            stats.rooms, stats.zones, stats.exits
        ),
    });

    let linked = (0..ZONES - 1).all(|z| {
        mapper
            .connected_zones(&format!("zone{}", z))
            .contains(&format!("zone{}", z + 1))
    });
    results.push(TestResult {
        name: "world_zone_index".into(),
        passed: linked,
        detail: format!("zone0 connects to {:?}", mapper.connected_zones("zone0")),
    });

    let rooms = zones.keys().copied().collect();
    (mapper, rooms, results)
}

// ── 3. Clique partition ─────────────────────────────────────────────────

fn validate_partition(mapper: &mut Mapper, _verbose: bool) -> Vec<TestResult> {
    println!("--- Clique Partition ---");
    let mut results = Vec::new();

    let stats = mapper.recompute();
    results.push(TestResult {
        name: "partition_full_recompute".into(),
        passed: stats.zones_rebuilt == ZONES as usize && stats.cliques_built >= ZONES as usize,
        detail: format!(
            "{} zones → {} cliques, {} routes cached",
            stats.zones_rebuilt, stats.cliques_built, stats.routes_cached
        ),
    });

    let problems = mapper.cliques().partition_problems(mapper.store());
    results.push(TestResult {
        name: "partition_exact_cover".into(),
        passed: problems.is_empty(),
        detail: if problems.is_empty() {
            "every room in exactly one clique of its zone".into()
        } else {
            problems.join("; ")
        },
    });

    let again = mapper.recompute();
    results.push(TestResult {
        name: "partition_lazy".into(),
        passed: again.zones_rebuilt == 0,
        detail: "clean store → no rebuild".into(),
    });

    results
}

// ── 4. Routing ──────────────────────────────────────────────────────────

fn path_is_walkable(mapper: &Mapper, path: &[RoomId], start: RoomId, end: RoomId) -> bool {
    path.first() == Some(&start)
        && path.last() == Some(&end)
        && mapper.route_directions(path).is_some()
}

fn validate_routing(
    mapper: &mut Mapper,
    rooms: &[RoomId],
    rng: &mut StdRng,
    _verbose: bool,
) -> Vec<TestResult> {
    println!("--- Routing ---");
    let mut results = Vec::new();

    let any = rooms[0];
    results.push(TestResult {
        name: "route_same_room".into(),
        passed: mapper.find_route(any, any, &[]) == vec![any],
        detail: "same room → single-room path".into(),
    });

    let (mut reachable, mut missing, mut invalid, mut longer, mut shorter) = (0, 0, 0, 0, 0);
    let mut worst_stretch: f64 = 1.0;
    for _ in 0..ROUTE_SAMPLES {
        let a = pick(rooms, rng);
        let b = pick(rooms, rng);
        let routed = mapper.find_route(a, b, &[]);
        let Some(bfs) = shortest_path(mapper.store(), a, b, |_| true) else {
            if !routed.is_empty() {
                invalid += 1;
            }
            continue;
        };
        reachable += 1;
        if routed.is_empty() {
            missing += 1;
        } else if !path_is_walkable(mapper, &routed, a, b) {
            invalid += 1;
        } else if routed.len() < bfs.len() {
            shorter += 1;
        } else if routed.len() > bfs.len() {
            longer += 1;
            worst_stretch = worst_stretch.max(routed.len() as f64 / bfs.len() as f64);
        }
    }

    results.push(TestResult {
        name: "route_finds_reachable".into(),
        passed: missing == 0,
        detail: format!("{}/{} reachable pairs routed", reachable - missing, reachable),
    });
    results.push(TestResult {
        name: "route_walkable".into(),
        passed: invalid == 0,
        detail: format!("{} routes with a gap or wrong endpoint", invalid),
    });
    results.push(TestResult {
        name: "route_length_matches_bfs".into(),
        passed: shorter == 0 && longer == 0,
        detail: format!(
            "{}/{} optimal, {} shorter than BFS, worst stretch {:.2}",
            reachable - missing - invalid - longer - shorter,
            reachable,
            shorter,
            worst_stretch
        ),
    });

    results
}

// ── 5. Zone avoidance ───────────────────────────────────────────────────

fn validate_avoidance(
    mapper: &mut Mapper,
    rooms: &[RoomId],
    rng: &mut StdRng,
    _verbose: bool,
) -> Vec<TestResult> {
    println!("--- Zone Avoidance ---");
    let mut results = Vec::new();
    let (mut crossings, mut missed, mut suboptimal, mut checked) = (0, 0, 0, 0);

    for _ in 0..ROUTE_SAMPLES / 2 {
        let a = pick(rooms, rng);
        let b = pick(rooms, rng);
        let avoided = format!("zone{}", rng.gen_range(0..ZONES));
        let path = mapper.find_route(a, b, &[avoided.as_str()]);

        let store = mapper.store();
        let cliques = mapper.cliques();
        let ends = [cliques.clique_of(a), cliques.clique_of(b)];
        let allowed = |room: RoomId| {
            room == b
                || store.zone_of(room) != Some(avoided.as_str())
                || ends.contains(&cliques.clique_of(room))
        };
        checked += 1;
        if path.iter().any(|&r| !allowed(r)) {
            crossings += 1;
        }
        match shortest_path(store, a, b, allowed) {
            Some(_) if path.is_empty() => missed += 1,
            Some(best) if best.len() != path.len() => suboptimal += 1,
            _ => {}
        }
    }

    results.push(TestResult {
        name: "avoid_no_intermediate_crossing".into(),
        passed: crossings == 0,
        detail: format!("{}/{} routes entered an avoided zone mid-route", crossings, checked),
    });
    results.push(TestResult {
        name: "avoid_still_routes".into(),
        passed: missed == 0,
        detail: format!("{} avoidable routes not found", missed),
    });
    results.push(TestResult {
        name: "avoid_routes_are_shortest".into(),
        passed: suboptimal == 0,
        detail: format!("{} detours longer than the restricted BFS", suboptimal),
    });

    results
}

// ── 6. Incremental edits ────────────────────────────────────────────────

fn validate_incremental(
    mapper: &mut Mapper,
    rooms: &[RoomId],
    rng: &mut StdRng,
    _verbose: bool,
) -> Vec<TestResult> {
    println!("--- Incremental Edits ---");
    let mut results = Vec::new();

    let mut removed = 0;
    for _ in 0..10 {
        let room = pick(rooms, rng);
        let dir = mapper
            .room(room)
            .and_then(|r| r.exits.keys().next().cloned());
        if let Some(dir) = dir {
            if mapper.store_mut().remove_exit(room, &dir).unwrap_or(false) {
                removed += 1;
            }
        }
    }
    let stats = mapper.recompute();
    results.push(TestResult {
        name: "incremental_partial_rebuild".into(),
        passed: removed == 0 || (stats.zones_rebuilt > 0 && stats.zones_rebuilt <= ZONES as usize),
        detail: format!("{} exits removed → {} zones rebuilt", removed, stats.zones_rebuilt),
    });

    let problems = mapper.cliques().partition_problems(mapper.store());
    results.push(TestResult {
        name: "incremental_partition".into(),
        passed: problems.is_empty(),
        detail: if problems.is_empty() {
            "partition intact after edits".into()
        } else {
            problems.join("; ")
        },
    });

    let mut broken = 0;
    for _ in 0..ROUTE_SAMPLES / 2 {
        let a = pick(rooms, rng);
        let b = pick(rooms, rng);
        let routed = mapper.find_route(a, b, &[]);
        let bfs = shortest_path(mapper.store(), a, b, |_| true);
        let ok = match bfs {
            Some(bfs) => routed.len() == bfs.len() && path_is_walkable(mapper, &routed, a, b),
            None => routed.is_empty(),
        };
        if !ok {
            broken += 1;
        }
    }
    results.push(TestResult {
        name: "incremental_routes".into(),
        passed: broken == 0,
        detail: format!("{} routes disagree with BFS", broken),
    });

    results
}

// ── 7. Save/Load ────────────────────────────────────────────────────────

fn validate_persistence(
    mapper: &mut Mapper,
    rooms: &[RoomId],
    rng: &mut StdRng,
    _verbose: bool,
) -> Vec<TestResult> {
    println!("--- Save/Load ---");
    let mut results = Vec::new();

    let mut buffer = Vec::new();
    if let Err(e) = mapper.save(&mut buffer) {
        results.push(TestResult {
            name: "persist_save".into(),
            passed: false,
            detail: format!("save failed: {}", e),
        });
        return results;
    }

    let mut loaded = Mapper::new(MapperConfig::default());
    let load = loaded.load(&buffer[..]);
    results.push(TestResult {
        name: "persist_roundtrip_stats".into(),
        passed: load.is_ok() && loaded.stats().store == mapper.stats().store,
        detail: format!("{} bytes, {:?}", buffer.len(), loaded.stats().store),
    });

    // both sides start from a full decomposition so tie-breaks agree
    mapper.store_mut().mark_all_dirty();
    let mut differing = 0;
    for _ in 0..ROUTE_SAMPLES / 4 {
        let a = pick(rooms, rng);
        let b = pick(rooms, rng);
        if mapper.find_route(a, b, &[]) != loaded.find_route(a, b, &[]) {
            differing += 1;
        }
    }
    results.push(TestResult {
        name: "persist_routes_match".into(),
        passed: differing == 0,
        detail: format!("{} routes differ after reload", differing),
    });

    results
}

// ── 8. Transcript replay ────────────────────────────────────────────────

fn named(mapper: &Mapper, name: &str) -> Option<RoomId> {
    mapper.store().rooms().find(|r| r.name == name).map(|r| r.id)
}

fn validate_transcript(verbose: bool) -> Vec<TestResult> {
    println!("--- Transcript Replay ---");
    let mut results = Vec::new();
    let mut mapper = Mapper::new(MapperConfig::default());

    for (command, lines) in TRANSCRIPT {
        mapper.handle_command(command, true);
        for line in *lines {
            mapper.handle_line(line);
        }
        mapper.handle_prompt();
    }

    results.push(TestResult {
        name: "transcript_room_count".into(),
        passed: mapper.store().room_count() == 5,
        detail: format!("{} rooms mapped", mapper.store().room_count()),
    });

    let square = named(&mapper, "Temple Square");
    results.push(TestResult {
        name: "transcript_back_home".into(),
        passed: square.is_some() && mapper.current_room() == square,
        detail: format!("current room {:?}", mapper.current_room()),
    });

    let market_door = named(&mapper, "Market Street")
        .and_then(|id| mapper.room(id))
        .and_then(|r| r.exit("north").cloned());
    results.push(TestResult {
        name: "transcript_locked_door".into(),
        passed: market_door
            .as_ref()
            .is_some_and(|e| e.is_door && e.is_locked && e.is_lockable && e.destination.is_none()),
        detail: "[north] recorded as an unexplored locked door".into(),
    });

    let route = match (named(&mapper, "Bakery"), named(&mapper, "Temple")) {
        (Some(a), Some(b)) => mapper.find_route(a, b, &[]),
        _ => Vec::new(),
    };
    let walk = mapper.speedwalk_for_route(&route);
    results.push(TestResult {
        name: "transcript_route".into(),
        passed: walk.as_deref() == Some("2w2n"),
        detail: format!("Bakery → Temple: {:?}", walk),
    });

    let forward = mapper.history_speedwalk(0, false);
    if verbose {
        for line in mapper.describe_history(0, false) {
            println!("    {}", line);
        }
    }
    results.push(TestResult {
        name: "transcript_history".into(),
        passed: forward.path == "2n2s2e2w" && forward.warnings.is_empty(),
        detail: format!("walked '{}'", forward.path),
    });

    let removed = mapper.simplify_history(false);
    results.push(TestResult {
        name: "transcript_simplify".into(),
        passed: mapper.history().len() == 1 && mapper.history().steps()[0].is_reset(),
        detail: format!("{} backtracking steps removed", removed),
    });

    let record = r#"{ "id": 999, "name": "Elsewhere", "exits": { "n": { "is_door": true, "door_status": "locked" } } }"#;
    let ignored = match serde_json::from_str::<RoomUpdate>(record) {
        Ok(update) => mapper
            .handle_room_update(&update)
            .is_ok_and(|change| change.is_none()),
        Err(e) => {
            log::error!("Latch record did not parse: {}", e);
            false
        }
    };
    results.push(TestResult {
        name: "transcript_latch".into(),
        passed: ignored && mapper.room(999).is_none(),
        detail: "structured records ignored once text mapping is active".into(),
    });

    results
}
