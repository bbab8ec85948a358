// ─── Game Version ───
// Numeric `{major}.{minor}.{patch}` ordering for release ids.

use std::fmt;

/// A release id such as `1.20.4`. Missing components count as zero and any
/// pre-release suffix (`-pre1`, `-rc2`, ` Pre-Release 1`) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GameVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// `None` for ids that are not dotted numbers (snapshots like `24w14a`).
    pub fn parse(id: &str) -> Option<Self> {
        let core = id
            .trim()
            .split(|c: char| c == '-' || c == ' ' || c == '+')
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.');

        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self::new(major, minor, patch))
    }

    /// Two-digit year of a weekly snapshot id (`24w14a` -> 24).
    pub fn snapshot_year(id: &str) -> Option<u32> {
        let lower = id.to_ascii_lowercase();
        let week_pos = lower.find('w')?;
        let year = &lower[..week_pos];
        if year.len() != 2 {
            return None;
        }
        year.parse().ok()
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

/// Sorts release ids newest first. Unparseable ids keep their relative
/// order and go last.
pub fn sort_newest_first(ids: &mut [String]) {
    ids.sort_by(|a, b| match (GameVersion::parse(a), GameVersion::parse(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_ids() {
        assert_eq!(GameVersion::parse("1.20.4"), Some(GameVersion::new(1, 20, 4)));
        assert_eq!(GameVersion::parse("1.18"), Some(GameVersion::new(1, 18, 0)));
        assert_eq!(GameVersion::parse("1.20.5-pre1"), Some(GameVersion::new(1, 20, 5)));
        assert_eq!(
            GameVersion::parse("1.14 Pre-Release 2"),
            Some(GameVersion::new(1, 14, 0))
        );
        assert_eq!(GameVersion::parse("24w14a"), None);
        assert_eq!(GameVersion::parse("1.2.3.4"), None);
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        assert!(GameVersion::parse("1.9").unwrap() < GameVersion::parse("1.10").unwrap());
        assert!(GameVersion::parse("1.20.10").unwrap() > GameVersion::parse("1.20.9").unwrap());
    }

    #[test]
    fn snapshot_year() {
        assert_eq!(GameVersion::snapshot_year("24w14a"), Some(24));
        assert_eq!(GameVersion::snapshot_year("1.20.4"), None);
    }

    #[test]
    fn sorts_newest_first() {
        let mut ids = vec![
            "1.19.4".to_string(),
            "weird".to_string(),
            "1.20.10".to_string(),
            "1.20.2".to_string(),
        ];
        sort_newest_first(&mut ids);
        assert_eq!(ids, vec!["1.20.10", "1.20.2", "1.19.4", "weird"]);
    }
}
