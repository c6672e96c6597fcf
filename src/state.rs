use serde::Serialize;

use crate::schemas::{Expense, Group, Identity, Member};
use crate::stats::{compute_group_stats, GroupStats};

/// Everything the presentation layer renders. Only the session coordinator
/// mutates it, through the setters below.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    identity: Option<Identity>,
    loading: bool,
    groups: Vec<Group>,
    active_group: Option<Group>,
    members: Vec<Member>,
    expenses: Vec<Expense>,
}

impl Default for AppState {
    fn default() -> Self {
        AppState {
            identity: None,
            loading: true,
            groups: Vec::new(),
            active_group: None,
            members: Vec::new(),
            expenses: Vec::new(),
        }
    }
}

impl AppState {
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn active_group(&self) -> Option<&Group> {
        self.active_group.as_ref()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn stats(&self) -> GroupStats {
        compute_group_stats(&self.members, &self.expenses)
    }

    pub fn set_identity(&mut self, identity: Option<Identity>) {
        self.identity = identity;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_groups(&mut self, groups: Vec<Group>) {
        self.groups = groups;
    }

    pub fn set_active_group(&mut self, group: Option<Group>) {
        self.active_group = group;
    }

    pub fn set_members(&mut self, members: Vec<Member>) {
        self.members = members;
    }

    pub fn set_expenses(&mut self, expenses: Vec<Expense>) {
        self.expenses = expenses;
    }

    pub(crate) fn groups_mut(&mut self) -> &mut Vec<Group> {
        &mut self.groups
    }

    /// Drops everything tied to the previous identity.
    pub fn reset(&mut self) {
        *self = AppState::default();
    }
}

/// Serializable view handed to the presentation layer.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(flatten)]
    pub state: AppState,
    pub stats: GroupStats,
}

impl From<&AppState> for Snapshot {
    fn from(state: &AppState) -> Self {
        Snapshot {
            state: state.clone(),
            stats: state.stats(),
        }
    }
}
