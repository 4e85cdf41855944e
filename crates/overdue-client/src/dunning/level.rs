use serde::Serialize;

/// Position of an invoice in the escalation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DunningLevel {
    Clean,
    Level1,
    Level2,
    Level3,
}

impl DunningLevel {
    pub const ESCALATED: [DunningLevel; 3] = [Self::Level1, Self::Level2, Self::Level3];

    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Clean => 0,
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
        }
    }

    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Clean),
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            3 => Some(Self::Level3),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Level1 => "level1",
            Self::Level2 => "level2",
            Self::Level3 => "level3",
        }
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Clean => Some(Self::Level1),
            Self::Level1 => Some(Self::Level2),
            Self::Level2 => Some(Self::Level3),
            Self::Level3 => None,
        }
    }

    /// The only level from which `self` may be entered.
    pub const fn required_predecessor(self) -> Option<Self> {
        match self {
            Self::Clean => None,
            Self::Level1 => Some(Self::Clean),
            Self::Level2 => Some(Self::Level1),
            Self::Level3 => Some(Self::Level2),
        }
    }

    /// Zero-based slot for per-level policy arrays; `None` for `Clean`.
    pub(crate) const fn policy_slot(self) -> Option<usize> {
        match self {
            Self::Clean => None,
            Self::Level1 => Some(0),
            Self::Level2 => Some(1),
            Self::Level3 => Some(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DunningLevel;

    #[test]
    fn levels_round_trip_through_their_stored_integer() {
        for value in 0..=3 {
            let level = DunningLevel::from_i64(value);
            assert_eq!(level.map(DunningLevel::as_i64), Some(value));
        }
        assert_eq!(DunningLevel::from_i64(4), None);
        assert_eq!(DunningLevel::from_i64(-1), None);
    }

    #[test]
    fn each_level_is_entered_only_from_the_one_below() {
        assert_eq!(DunningLevel::Level3.required_predecessor(), Some(DunningLevel::Level2));
        assert_eq!(DunningLevel::Level2.required_predecessor(), Some(DunningLevel::Level1));
        assert_eq!(DunningLevel::Level1.required_predecessor(), Some(DunningLevel::Clean));
        assert_eq!(DunningLevel::Level3.next(), None);
    }
}
