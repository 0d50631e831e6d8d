use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub name: String,
    pub points: u64,
}

/// Replace `name`'s row and keep the best `size` rows, highest first.
///
/// The sort is stable, so equal scores keep their previous relative order.
pub fn upsert(rows: &mut Vec<LeaderboardRow>, name: &str, points: u64, size: usize) {
    match rows.iter_mut().find(|row| row.name == name) {
        Some(row) => row.points = points,
        None => rows.push(LeaderboardRow {
            name: name.to_string(),
            points,
        }),
    }
    rows.sort_by(|a, b| b.points.cmp(&a.points));
    rows.truncate(size);
}
