//! Exploration history: the session's movement log.
//!
//! Steps are appended as the player moves. Two views are derived from the
//! log: human-readable trip descriptions and speedwalk strings (optionally
//! reversed, to walk back the way you came). `simplify` rewrites the log to
//! drop backtracking.
//!
//! # Speedwalk format
//!
//! Consecutive identical directions collapse into `<count><dir>` with the
//! count omitted for single steps: north, north, east → `2ne`. Non-compass
//! exits are parenthesised: `2n(enter portal)`.

use crate::directions;
use crate::store::{RoomId, RoomStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of the movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStep {
    /// Room the step started from; `None` marks a history reset.
    pub start: Option<RoomId>,
    pub destination: RoomId,
    /// Empty for automatic moves (teleports, being dragged, follow).
    pub direction: String,
}

impl HistoryStep {
    pub fn is_reset(&self) -> bool {
        self.start.is_none()
    }

    pub fn is_auto_move(&self) -> bool {
        self.direction.is_empty()
    }
}

/// A speedwalk string plus everything that made it unreliable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Speedwalk {
    pub path: String,
    pub warnings: Vec<String>,
}

/// How to walk a step backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reversal {
    /// A recorded exit leads back.
    Exact(String),
    /// No recorded exit leads back; the generic opposite is a guess.
    Guess(String),
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct ExplorationHistory {
    steps: Vec<HistoryStep>,
}

impl ExplorationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[HistoryStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn record_move(&mut self, from: RoomId, to: RoomId, direction: &str) {
        self.steps.push(HistoryStep {
            start: Some(from),
            destination: to,
            direction: direction.to_string(),
        });
    }

    /// Mark that the player appeared in `room` with no known path from the
    /// previous position.
    pub fn reset_at(&mut self, room: RoomId) {
        self.steps.push(HistoryStep {
            start: None,
            destination: room,
            direction: String::new(),
        });
    }

    /// The last `length` steps, or all of them when `length` is 0.
    fn window(&self, length: usize) -> &[HistoryStep] {
        if length == 0 || length >= self.steps.len() {
            &self.steps
        } else {
            &self.steps[self.steps.len() - length..]
        }
    }

    // ── Descriptions ────────────────────────────────────────────────────

    /// One sentence per step, e.g. `north to Town Square`. In reverse mode
    /// the sentences describe walking back, latest step first.
    pub fn describe(&self, store: &RoomStore, length: usize, reverse: bool) -> Vec<String> {
        let label = |id: RoomId| {
            store
                .room(id)
                .map(|r| r.label())
                .unwrap_or_else(|| format!("room #{}", id))
        };
        let window = self.window(length);

        if !reverse {
            return window
                .iter()
                .map(|step| {
                    if step.is_reset() {
                        format!("restarted at {}", label(step.destination))
                    } else if step.is_auto_move() {
                        format!("moved to {}", label(step.destination))
                    } else {
                        format!("{} to {}", step.direction, label(step.destination))
                    }
                })
                .collect();
        }

        window
            .iter()
            .rev()
            .map(|step| {
                let Some(start) = step.start else {
                    return format!("history reset at {}", label(step.destination));
                };
                match reverse_of(store, step) {
                    Reversal::Exact(dir) => format!("{} to {}", dir, label(start)),
                    Reversal::Guess(dir) => format!("{} to {} (guessed)", dir, label(start)),
                    Reversal::Unknown => format!("unknown way back to {}", label(start)),
                }
            })
            .collect()
    }

    // ── Speedwalks ──────────────────────────────────────────────────────

    /// Speedwalk over the last `length` steps (0 = all), forwards or back.
    pub fn speedwalk(&self, store: &RoomStore, length: usize, reverse: bool) -> Speedwalk {
        let window = self.window(length);
        let mut dirs = Vec::with_capacity(window.len());
        let mut warnings = Vec::new();

        let ordered: Vec<(usize, &HistoryStep)> = if reverse {
            window.iter().enumerate().rev().collect()
        } else {
            window.iter().enumerate().collect()
        };

        for (index, step) in ordered {
            if step.is_reset() {
                if index > 0 {
                    warnings.push(format!(
                        "history was reset at room #{}; the path across it is not connected",
                        step.destination
                    ));
                }
                continue;
            }

            if !reverse {
                if step.is_auto_move() {
                    warnings.push(format!(
                        "move to room #{} was automatic and cannot be walked",
                        step.destination
                    ));
                } else {
                    dirs.push(step.direction.clone());
                }
                continue;
            }

            let reversal = reverse_of(store, step);
            if step.is_auto_move() {
                warnings.push(format!(
                    "move to room #{} was automatic; walking it back is not guaranteed",
                    step.destination
                ));
            }
            match reversal {
                Reversal::Exact(dir) => dirs.push(dir),
                Reversal::Guess(dir) => {
                    warnings.push(format!(
                        "guessed '{}' to get back from room #{}",
                        dir, step.destination
                    ));
                    dirs.push(dir);
                }
                Reversal::Unknown => warnings.push(format!(
                    "no known way back from room #{}",
                    step.destination
                )),
            }
        }

        Speedwalk {
            path: encode_speedwalk(&dirs),
            warnings,
        }
    }

    // ── Simplification ──────────────────────────────────────────────────

    /// Remove backtracking from the log. Returns how many steps were removed.
    ///
    /// Revisiting a room drops every step since the first visit. In
    /// aggressive mode a step whose destination has an exit back into an
    /// earlier room on the path replaces everything after that room, even
    /// though the shortcut was never walked.
    pub fn simplify(&mut self, store: &RoomStore, aggressive: bool) -> usize {
        let before = self.steps.len();
        let mut result: Vec<HistoryStep> = Vec::with_capacity(before);
        // room → length of `result` while standing in it
        let mut open: HashMap<RoomId, usize> = HashMap::new();

        for step in std::mem::take(&mut self.steps) {
            let Some(start) = step.start else {
                open.clear();
                open.insert(step.destination, result.len() + 1);
                result.push(step);
                continue;
            };
            open.entry(start).or_insert(result.len());

            if let Some(&at) = open.get(&step.destination) {
                result.truncate(at);
                open.retain(|_, pos| *pos <= at);
                continue;
            }

            let dest = step.destination;
            result.push(step);
            open.insert(dest, result.len());

            if aggressive {
                if let Some((room, at)) = shortcut_from(store, &open, dest, result.len()) {
                    let direction = forward_direction(store, room, dest);
                    result.truncate(at);
                    open.retain(|_, pos| *pos <= at);
                    result.push(HistoryStep {
                        start: Some(room),
                        destination: dest,
                        direction,
                    });
                    open.insert(dest, result.len());
                }
            }
        }

        self.steps = result;
        before - self.steps.len()
    }
}

/// Earliest open room reachable by an exit of `dest` that would skip at
/// least one step. Returns (room, position).
fn shortcut_from(
    store: &RoomStore,
    open: &HashMap<RoomId, usize>,
    dest: RoomId,
    here: usize,
) -> Option<(RoomId, usize)> {
    let room = store.room(dest)?;
    room.neighbors()
        .filter(|r| *r != dest)
        .filter_map(|r| open.get(&r).map(|&pos| (r, pos)))
        .filter(|&(_, pos)| pos + 1 < here)
        .min_by_key(|&(_, pos)| pos)
}

/// Direction from `from` to `to` for a shortcut step. Falls back to the
/// opposite of the return exit when `from` has no recorded exit to `to`.
fn forward_direction(store: &RoomStore, from: RoomId, to: RoomId) -> String {
    if let Some(dir) = store.room(from).and_then(|r| r.direction_to(to)) {
        return dir.to_string();
    }
    log::warn!(
        "Inconsistent map: room #{} has an exit to #{} but no exit back",
        to,
        from
    );
    store
        .room(to)
        .and_then(|r| r.direction_to(from))
        .and_then(directions::opposite)
        .unwrap_or_default()
        .to_string()
}

fn reverse_of(store: &RoomStore, step: &HistoryStep) -> Reversal {
    let Some(start) = step.start else {
        return Reversal::Unknown;
    };
    let opposite = directions::opposite(&step.direction);
    if let Some(room) = store.room(step.destination) {
        if let Some(opp) = opposite {
            if room.exit(opp).and_then(|e| e.destination) == Some(start) {
                return Reversal::Exact(opp.to_string());
            }
        }
        if let Some(dir) = room.direction_to(start) {
            return Reversal::Exact(dir.to_string());
        }
    }
    match opposite {
        Some(opp) => Reversal::Guess(opp.to_string()),
        None => Reversal::Unknown,
    }
}

/// Collapse a direction list into a speedwalk string.
pub fn encode_speedwalk(dirs: &[String]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < dirs.len() {
        let mut count = 1;
        while i + count < dirs.len() && dirs[i + count] == dirs[i] {
            count += 1;
        }
        if count > 1 {
            out.push_str(&count.to_string());
        }
        out.push_str(&directions::abbreviate(&dirs[i]));
        i += count;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Exit;

    fn link(store: &mut RoomStore, a: RoomId, dir: &str, b: RoomId, back: &str) {
        store.set_exit(a, dir, Exit::to(b)).unwrap();
        store.set_exit(b, back, Exit::to(a)).unwrap();
    }

    /// 1 Gate -n- 2 Road -n- 3 Square -e- 4 Inn
    fn town() -> RoomStore {
        let mut store = RoomStore::new();
        for (id, name) in [(1, "Gate"), (2, "Road"), (3, "Square"), (4, "Inn")] {
            store.ensure_room(id, "town");
            store.set_room_name(id, name).unwrap();
        }
        link(&mut store, 1, "north", 2, "south");
        link(&mut store, 2, "north", 3, "south");
        link(&mut store, 3, "east", 4, "west");
        store
    }

    fn walked() -> ExplorationHistory {
        let mut history = ExplorationHistory::new();
        history.record_move(1, 2, "north");
        history.record_move(2, 3, "north");
        history.record_move(3, 4, "east");
        history
    }

    #[test]
    fn test_speedwalk_collapses_repeats() {
        let store = town();
        let walk = walked().speedwalk(&store, 0, false);
        assert_eq!(walk.path, "2ne");
        assert!(walk.warnings.is_empty());
    }

    #[test]
    fn test_reverse_speedwalk_uses_recorded_exits() {
        let store = town();
        let walk = walked().speedwalk(&store, 0, true);
        assert_eq!(walk.path, "w2s");
        assert!(walk.warnings.is_empty());

        let last_two = walked().speedwalk(&store, 2, true);
        assert_eq!(last_two.path, "ws");
    }

    #[test]
    fn test_reverse_guess_is_flagged() {
        let mut store = town();
        store.remove_exit(4, "west").unwrap();
        let walk = walked().speedwalk(&store, 0, true);
        assert_eq!(walk.path, "w2s");
        assert_eq!(walk.warnings.len(), 1);
        assert!(walk.warnings[0].contains("guessed"));
    }

    #[test]
    fn test_reverse_through_auto_move_warns() {
        let store = town();
        let mut history = walked();
        history.record_move(4, 1, "");
        let walk = history.speedwalk(&store, 1, true);
        assert_eq!(walk.path, "");
        assert_eq!(walk.warnings.len(), 2);
    }

    #[test]
    fn test_reset_boundary_warns() {
        let store = town();
        let mut history = walked();
        history.reset_at(1);
        history.record_move(1, 2, "north");
        let walk = history.speedwalk(&store, 0, false);
        assert_eq!(walk.path, "2nen");
        assert_eq!(walk.warnings.len(), 1);

        // a reset at the very start of the range is not a crossing
        let tail = history.speedwalk(&store, 2, false);
        assert_eq!(tail.path, "n");
        assert!(tail.warnings.is_empty());
    }

    #[test]
    fn test_describe() {
        let store = town();
        let history = walked();
        assert_eq!(
            history.describe(&store, 0, false),
            vec!["north to Road", "north to Square", "east to Inn"]
        );
        assert_eq!(
            history.describe(&store, 2, true),
            vec!["west to Square", "south to Road"]
        );
    }

    #[test]
    fn test_describe_marks_guesses() {
        let mut store = town();
        store.remove_exit(2, "south").unwrap();
        let lines = walked().describe(&store, 0, true);
        assert_eq!(lines[2], "south to Gate (guessed)");
    }

    #[test]
    fn test_simplify_collapses_loops() {
        // A→B→C→B→D becomes A→B→D
        let store = town();
        let mut history = ExplorationHistory::new();
        history.record_move(1, 2, "north");
        history.record_move(2, 3, "north");
        history.record_move(3, 2, "south");
        history.record_move(2, 5, "east");

        assert_eq!(history.simplify(&store, false), 2);
        let rooms: Vec<(Option<RoomId>, RoomId)> = history
            .steps()
            .iter()
            .map(|s| (s.start, s.destination))
            .collect();
        assert_eq!(rooms, vec![(Some(1), 2), (Some(2), 5)]);
    }

    #[test]
    fn test_simplify_round_trip_empties() {
        let store = town();
        let mut history = ExplorationHistory::new();
        history.record_move(1, 2, "north");
        history.record_move(2, 1, "south");
        history.simplify(&store, false);
        assert!(history.is_empty());
    }

    #[test]
    fn test_simplify_keeps_history_across_reset() {
        let store = town();
        let mut history = walked();
        history.reset_at(2);
        history.record_move(2, 3, "north");
        // room 3 was visited before the reset, but that visit is closed
        assert_eq!(history.simplify(&store, false), 0);
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn test_aggressive_simplify_takes_shortcut() {
        // Gate(1) also connects straight to the Inn(4)
        let mut store = town();
        link(&mut store, 1, "east", 4, "south");
        let mut history = walked();

        assert_eq!(history.clone().simplify(&store, false), 0);
        assert_eq!(history.simplify(&store, true), 2);
        assert_eq!(
            history.steps(),
            &[HistoryStep {
                start: Some(1),
                destination: 4,
                direction: "east".to_string(),
            }]
        );
    }

    #[test]
    fn test_aggressive_shortcut_without_return_exit() {
        // the Inn leads south to the Gate, but the Gate has no way to the Inn
        let mut store = town();
        store.set_exit(4, "south", Exit::to(1)).unwrap();
        let mut history = walked();
        history.simplify(&store, true);
        assert_eq!(history.len(), 1);
        assert_eq!(history.steps()[0].direction, "north");
    }

    #[test]
    fn test_encode_speedwalk() {
        let dirs: Vec<String> = ["north", "north", "enter portal", "up", "up", "up"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(encode_speedwalk(&dirs), "2n(enter portal)3u");
        assert_eq!(encode_speedwalk(&[]), "");
    }
}
