//! Dashboard counters

use crate::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Counts shown by the operator status summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabStats {
    pub active_projects: i64,
    pub live_samples: i64,
    pub samples_awaiting_tests: i64,
    pub open_assignments: i64,
    pub pending_approvals: i64,
    pub audit_entries: i64,
}

pub fn lab_stats(conn: &Connection) -> Result<LabStats> {
    Ok(conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM projects WHERE status = 'active' AND is_deleted = 0),
            (SELECT COUNT(*) FROM samples WHERE is_deleted = 0),
            (SELECT COUNT(*) FROM samples WHERE is_deleted = 0 AND status = 'registered'),
            (SELECT COUNT(*) FROM test_assignments
              WHERE is_deleted = 0 AND status IN ('assigned', 'in_progress')),
            (SELECT COUNT(*) FROM test_results WHERE is_deleted = 0 AND status = 'submitted'),
            (SELECT COUNT(*) FROM audit_log)",
        [],
        |row| {
            Ok(LabStats {
                active_projects: row.get(0)?,
                live_samples: row.get(1)?,
                samples_awaiting_tests: row.get(2)?,
                open_assignments: row.get(3)?,
                pending_approvals: row.get(4)?,
                audit_entries: row.get(5)?,
            })
        },
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::seed_reference_data;
    use crate::Store;
    use chrono::DateTime;

    #[test]
    fn empty_and_seeded_counts() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(lab_stats(store.conn()).unwrap(), LabStats::default());

        seed_reference_data(store.conn(), DateTime::from_timestamp(0, 0).unwrap_or_default())
            .unwrap();
        let stats = lab_stats(store.conn()).unwrap();
        assert_eq!(stats.active_projects, 2);
        assert_eq!(stats.live_samples, 0);
    }
}
