use super::LedgerEntry;

pub const STAT_COMMENTS: &str = "comments";
pub const STAT_VOTES_CAST: &str = "votes_cast";
pub const STAT_PAGES_READ: &str = "pages_read";
pub const STAT_THEME_SWITCHES: &str = "theme_switches";

/// Facts about the moment of evaluation that are not stored on the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationContext {
    /// Local hour of day, 0-23
    pub hour: u32,
}

/// One unlockable badge
#[derive(Clone, Copy)]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    /// Points granted once, when the badge unlocks
    pub bonus_points: u64,
    pub unlocked_when: fn(&LedgerEntry, &EvaluationContext) -> bool,
}

pub const ACHIEVEMENTS: &[Achievement] = &[
    Achievement {
        id: "first_comment",
        title: "First words",
        bonus_points: 5,
        unlocked_when: |entry, _| entry.stat(STAT_COMMENTS) >= 1,
    },
    Achievement {
        id: "conversationalist",
        title: "Ten comments",
        bonus_points: 25,
        unlocked_when: |entry, _| entry.stat(STAT_COMMENTS) >= 10,
    },
    Achievement {
        id: "curious_reader",
        title: "Read five entries",
        bonus_points: 5,
        unlocked_when: |entry, _| entry.stat(STAT_PAGES_READ) >= 5,
    },
    Achievement {
        id: "bookworm",
        title: "Read twenty-five entries",
        bonus_points: 20,
        unlocked_when: |entry, _| entry.stat(STAT_PAGES_READ) >= 25,
    },
    Achievement {
        id: "critic",
        title: "Cast five votes",
        bonus_points: 10,
        unlocked_when: |entry, _| entry.stat(STAT_VOTES_CAST) >= 5,
    },
    Achievement {
        id: "chameleon",
        title: "Switch theme three times",
        bonus_points: 5,
        unlocked_when: |entry, _| entry.stat(STAT_THEME_SWITCHES) >= 3,
    },
    Achievement {
        id: "night_owl",
        title: "Active after midnight",
        bonus_points: 10,
        unlocked_when: |_, ctx| ctx.hour <= 4,
    },
    Achievement {
        id: "early_bird",
        title: "Active at dawn",
        bonus_points: 10,
        unlocked_when: |_, ctx| (5..=7).contains(&ctx.hour),
    },
    Achievement {
        id: "centurion",
        title: "One hundred points",
        bonus_points: 0,
        unlocked_when: |entry, _| entry.points >= 100,
    },
];

pub fn find(id: &str) -> Option<&'static Achievement> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

/// Unlock every badge whose rule holds, granting bonus points.
///
/// Runs until a full pass unlocks nothing, since bonuses can satisfy point
/// rules. Returns the ids unlocked, in unlock order.
pub fn evaluate(entry: &mut LedgerEntry, ctx: &EvaluationContext) -> Vec<&'static str> {
    let mut unlocked = Vec::new();
    loop {
        let mut changed = false;
        for achievement in ACHIEVEMENTS {
            if entry.badges.contains(achievement.id) || !(achievement.unlocked_when)(entry, ctx) {
                continue;
            }
            entry.badges.insert(achievement.id.to_string());
            entry.points = entry.points.saturating_add(achievement.bonus_points);
            unlocked.push(achievement.id);
            changed = true;
        }
        if !changed {
            return unlocked;
        }
    }
}
