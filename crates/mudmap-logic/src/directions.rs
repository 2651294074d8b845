//! Movement directions with their abbreviations and opposites.
//!
//! Exits are keyed by their full lowercase direction name (`"north"`,
//! `"northeast"`, `"up"`). Custom exits (`"enter portal"`, `"climb"`) are
//! stored verbatim and have no opposite.

/// The built-in compass set: (full name, abbreviation, opposite).
const COMPASS: [(&str, &str, &str); 10] = [
    ("north", "n", "south"),
    ("south", "s", "north"),
    ("east", "e", "west"),
    ("west", "w", "east"),
    ("up", "u", "down"),
    ("down", "d", "up"),
    ("northeast", "ne", "southwest"),
    ("northwest", "nw", "southeast"),
    ("southeast", "se", "northwest"),
    ("southwest", "sw", "northeast"),
];

/// Resolve a typed command or exit token to a canonical compass direction.
///
/// Accepts both the full name and the abbreviation, case-insensitively.
pub fn canonical(token: &str) -> Option<&'static str> {
    let lower = token.trim().to_ascii_lowercase();
    COMPASS
        .iter()
        .find(|(full, short, _)| *full == lower || *short == lower)
        .map(|(full, _, _)| *full)
}

/// The generic opposite of a compass direction.
pub fn opposite(dir: &str) -> Option<&'static str> {
    COMPASS
        .iter()
        .find(|(full, _, _)| *full == dir)
        .map(|(_, _, opp)| *opp)
}

/// Short speedwalk token for a direction: `n`, `ne`, `u`.
/// Non-compass exits are wrapped in parentheses so they survive collapsing.
pub fn abbreviate(dir: &str) -> String {
    match COMPASS.iter().find(|(full, _, _)| *full == dir) {
        Some((_, short, _)) => (*short).to_string(),
        None => format!("({})", dir),
    }
}

/// All canonical compass directions in display order.
pub fn all() -> impl Iterator<Item = &'static str> {
    COMPASS.iter().map(|(full, _, _)| *full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_accepts_short_and_long() {
        assert_eq!(canonical("n"), Some("north"));
        assert_eq!(canonical("North"), Some("north"));
        assert_eq!(canonical(" sw "), Some("southwest"));
        assert_eq!(canonical("portal"), None);
    }

    #[test]
    fn test_opposites_are_symmetric() {
        for dir in all() {
            let opp = opposite(dir).unwrap();
            assert_eq!(opposite(opp), Some(dir));
        }
        assert_eq!(opposite("enter portal"), None);
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("north"), "n");
        assert_eq!(abbreviate("northeast"), "ne");
        assert_eq!(abbreviate("enter portal"), "(enter portal)");
    }
}
