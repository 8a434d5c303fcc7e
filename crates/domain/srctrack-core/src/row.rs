use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorState {
    Absent,
    Tracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurrentState {
    Absent,
    Tracked,
    Changed,
}

/// Presence of one project path before (last commit) and after (working tree) a scan.
///
/// Rows only live as long as a scan result; the shadow store persists its snapshot,
/// never the rows themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRow {
    pub path: String,
    pub prior: PriorState,
    pub current: CurrentState,
}

impl ChangeRow {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prior: PriorState::Absent,
            current: CurrentState::Changed,
        }
    }

    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prior: PriorState::Tracked,
            current: CurrentState::Changed,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prior: PriorState::Tracked,
            current: CurrentState::Absent,
        }
    }

    pub fn unchanged(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prior: PriorState::Tracked,
            current: CurrentState::Tracked,
        }
    }

    pub fn is_added(&self) -> bool {
        self.prior == PriorState::Absent && self.current == CurrentState::Changed
    }

    pub fn is_modified(&self) -> bool {
        self.prior == PriorState::Tracked && self.current == CurrentState::Changed
    }

    pub fn is_deleted(&self) -> bool {
        self.current == CurrentState::Absent
    }

    pub fn is_changed(&self) -> bool {
        self.is_added() || self.is_modified() || self.is_deleted()
    }

    /// Added or modified: the path still exists in the working tree.
    pub fn is_non_delete(&self) -> bool {
        self.is_changed() && !self.is_deleted()
    }
}

pub fn paths_where(rows: &[ChangeRow], pred: impl Fn(&ChangeRow) -> bool) -> Vec<String> {
    rows.iter()
        .filter(|r| pred(r))
        .map(|r| r.path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_fold_onto_states() {
        assert!(ChangeRow::added("a").is_added());
        assert!(!ChangeRow::added("a").is_modified());
        assert!(ChangeRow::modified("a").is_modified());
        assert!(ChangeRow::deleted("a").is_deleted());
        assert!(!ChangeRow::deleted("a").is_non_delete());
        assert!(!ChangeRow::unchanged("a").is_changed());
    }

    #[test]
    fn paths_where_keeps_row_order() {
        let rows = vec![
            ChangeRow::added("b"),
            ChangeRow::deleted("c"),
            ChangeRow::added("a"),
        ];
        assert_eq!(paths_where(&rows, ChangeRow::is_added), vec!["b", "a"]);
    }
}
