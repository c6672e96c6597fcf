//! Members and expenses of the active group.
//!
//! Every change goes through a full reload: a write is followed by
//! re-reading both collections, never by patching local state. Each load is
//! tagged with a generation so a slow response for an older selection
//! cannot overwrite a newer one.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{FetchError, WriteError};
use crate::gateway::RemoteCollectionGateway;
use crate::schemas::{Expense, Group, Member, NewExpense, NewMember};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    group_id: Option<String>,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupData {
    pub members: Vec<Member>,
    pub expenses: Vec<Expense>,
}

pub struct GroupWorkspace {
    gateway: Arc<RemoteCollectionGateway>,
    latest_generation: u64,
}

impl GroupWorkspace {
    pub fn new(gateway: Arc<RemoteCollectionGateway>) -> Self {
        GroupWorkspace {
            gateway,
            latest_generation: 0,
        }
    }

    /// Issues a ticket for loading `group`, superseding every earlier one.
    pub fn begin_load(&mut self, group: Option<&Group>) -> LoadTicket {
        self.latest_generation += 1;
        LoadTicket {
            generation: self.latest_generation,
            group_id: group.map(|group| group.id.clone()),
        }
    }

    /// Fetches both collections concurrently. Either failure fails the pair.
    pub async fn fetch(&self, ticket: &LoadTicket) -> Result<GroupData, FetchError> {
        let Some(group_id) = ticket.group_id() else {
            return Ok(GroupData::default());
        };
        let (members, expenses) = futures::try_join!(
            self.gateway.list_members(group_id),
            self.gateway.list_expenses(group_id),
        )?;
        Ok(GroupData { members, expenses })
    }

    /// Applies a finished load unless a newer ticket was issued meanwhile.
    /// A failed load empties both collections.
    pub fn apply(
        &self,
        state: &mut AppState,
        ticket: &LoadTicket,
        outcome: Result<GroupData, FetchError>,
    ) -> bool {
        if ticket.generation != self.latest_generation {
            debug!(
                generation = ticket.generation,
                latest = self.latest_generation,
                "discarding stale group load"
            );
            return false;
        }
        let data = outcome.unwrap_or_else(|err| {
            error!(group = ?ticket.group_id, error = %err, "error loading group data");
            GroupData::default()
        });
        state.set_members(data.members);
        state.set_expenses(data.expenses);
        true
    }

    /// Reloads members and expenses for `group`, or clears them for `None`.
    pub async fn load_for(&mut self, state: &mut AppState, group: Option<&Group>) {
        let ticket = self.begin_load(group);
        let outcome = self.fetch(&ticket).await;
        self.apply(state, &ticket, outcome);
    }

    pub async fn add_expense(
        &mut self,
        state: &mut AppState,
        group: &Group,
        expense: NewExpense,
    ) -> Result<Expense, WriteError> {
        let expense = self.gateway.add_expense(&group.id, expense).await?;
        self.load_for(state, Some(group)).await;
        Ok(expense)
    }

    pub async fn delete_expense(
        &mut self,
        state: &mut AppState,
        group: &Group,
        id: &str,
    ) -> Result<(), WriteError> {
        self.gateway.delete_expense(id).await?;
        self.load_for(state, Some(group)).await;
        Ok(())
    }

    pub async fn add_member(
        &mut self,
        state: &mut AppState,
        group: &Group,
        member: NewMember,
    ) -> Result<Member, WriteError> {
        let member = self.gateway.add_member(&group.id, member).await?;
        self.load_for(state, Some(group)).await;
        Ok(member)
    }

    pub async fn remove_member(
        &mut self,
        state: &mut AppState,
        group: &Group,
        id: &str,
    ) -> Result<(), WriteError> {
        self.gateway.remove_member(id).await?;
        self.load_for(state, Some(group)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::schemas::NewGroup;
    use crate::store::{CollectionName, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<RemoteCollectionGateway>,
        workspace: GroupWorkspace,
        state: AppState,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RemoteCollectionGateway::new(store.clone()));
        Fixture {
            store,
            workspace: GroupWorkspace::new(gateway.clone()),
            gateway,
            state: AppState::default(),
        }
    }

    async fn group(gateway: &RemoteCollectionGateway, name: &str) -> Group {
        gateway
            .create_group(NewGroup {
                name: name.to_string(),
                description: None,
                created_by: "u1".to_string(),
            })
            .await
            .unwrap()
    }

    fn member(name: &str) -> NewMember {
        NewMember {
            name: name.to_string(),
            email: Some(format!("{name}@example.com")),
        }
    }

    fn expense(description: &str, amount: f64) -> NewExpense {
        NewExpense {
            description: description.to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
            paid_by: "m1".to_string(),
            category: Some("food".to_string()),
            split_with: vec!["m1".to_string(), "m2".to_string()],
        }
    }

    #[tokio::test]
    async fn loads_with_each_collections_order() {
        let Fixture {
            gateway,
            mut workspace,
            mut state,
            ..
        } = fixture();
        let trip = group(&gateway, "Trip").await;
        for name in ["Asha", "Ben", "Chen"] {
            workspace.add_member(&mut state, &trip, member(name)).await.unwrap();
        }
        for (description, amount) in [("Fuel", 40.0), ("Lunch", 25.0)] {
            workspace
                .add_expense(&mut state, &trip, expense(description, amount))
                .await
                .unwrap();
        }

        let names: Vec<_> = state.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Asha", "Ben", "Chen"]);
        assert!(state.members().windows(2).all(|p| p[0].created_at <= p[1].created_at));
        let descriptions: Vec<_> = state.expenses().iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, ["Lunch", "Fuel"]);
        assert!(state.expenses().windows(2).all(|p| p[0].created_at >= p[1].created_at));
    }

    #[tokio::test]
    async fn no_group_clears_everything() {
        let Fixture {
            gateway,
            mut workspace,
            mut state,
            ..
        } = fixture();
        let trip = group(&gateway, "Trip").await;
        workspace.add_member(&mut state, &trip, member("Asha")).await.unwrap();
        assert_eq!(state.members().len(), 1);

        workspace.load_for(&mut state, None).await;
        assert!(state.members().is_empty());
        assert!(state.expenses().is_empty());
    }

    #[tokio::test]
    async fn one_failed_read_empties_both_collections() {
        for failing in [CollectionName::Members, CollectionName::Expenses] {
            let Fixture {
                store,
                gateway,
                mut workspace,
                mut state,
            } = fixture();
            let trip = group(&gateway, "Trip").await;
            workspace.add_member(&mut state, &trip, member("Asha")).await.unwrap();
            workspace
                .add_expense(&mut state, &trip, expense("Taxi", 12.0))
                .await
                .unwrap();
            assert_eq!((state.members().len(), state.expenses().len()), (1, 1));

            store.fail_reads(failing, true);
            workspace.load_for(&mut state, Some(&trip)).await;
            assert!(state.members().is_empty(), "{failing} failure left members");
            assert!(state.expenses().is_empty(), "{failing} failure left expenses");
        }
    }

    #[tokio::test]
    async fn stale_loads_are_discarded() {
        let Fixture {
            gateway,
            mut workspace,
            mut state,
            ..
        } = fixture();
        let first = group(&gateway, "First").await;
        let second = group(&gateway, "Second").await;
        gateway.add_member(&first.id, member("Old")).await.unwrap();
        gateway.add_member(&second.id, member("New")).await.unwrap();

        let stale = workspace.begin_load(Some(&first));
        let fresh = workspace.begin_load(Some(&second));
        assert!(fresh.generation() > stale.generation());

        let fresh_data = workspace.fetch(&fresh).await;
        assert!(workspace.apply(&mut state, &fresh, fresh_data));
        // The older response arrives last and must not win
        let stale_data = workspace.fetch(&stale).await;
        assert!(!workspace.apply(&mut state, &stale, stale_data));

        assert_eq!(state.members().len(), 1);
        assert_eq!(state.members()[0].name, "New");
    }

    #[tokio::test]
    async fn deleting_removes_exactly_one_record() {
        let Fixture {
            gateway,
            mut workspace,
            mut state,
            ..
        } = fixture();
        let trip = group(&gateway, "Trip").await;
        let asha = workspace.add_member(&mut state, &trip, member("Asha")).await.unwrap();
        workspace.add_member(&mut state, &trip, member("Ben")).await.unwrap();
        let taxi = workspace
            .add_expense(&mut state, &trip, expense("Taxi", 12.0))
            .await
            .unwrap();
        workspace
            .add_expense(&mut state, &trip, expense("Hotel", 80.0))
            .await
            .unwrap();

        workspace.remove_member(&mut state, &trip, &asha.id).await.unwrap();
        workspace.delete_expense(&mut state, &trip, &taxi.id).await.unwrap();

        assert_eq!(state.members().len(), 1);
        assert_eq!(state.members()[0].name, "Ben");
        assert_eq!(state.expenses().len(), 1);
        assert_eq!(state.expenses()[0].description, "Hotel");
    }

    #[tokio::test]
    async fn failed_write_skips_the_reload() {
        let Fixture {
            store,
            gateway,
            mut workspace,
            mut state,
        } = fixture();
        let trip = group(&gateway, "Trip").await;
        workspace.add_member(&mut state, &trip, member("Asha")).await.unwrap();
        store.fail_writes(CollectionName::Members, true);
        // A reload would also fail and empty the workspace
        store.fail_reads(CollectionName::Expenses, true);

        let result = workspace.add_member(&mut state, &trip, member("Ben")).await;
        assert!(matches!(result, Err(WriteError::Insert { .. })));
        assert_eq!(state.members().len(), 1);
    }

    #[tokio::test]
    async fn returned_timestamps_are_placeholders() {
        let Fixture {
            gateway,
            mut workspace,
            mut state,
            ..
        } = fixture();
        let before = Utc::now();
        let trip = group(&gateway, "Trip").await;
        let added = workspace.add_member(&mut state, &trip, member("Asha")).await.unwrap();
        assert!(added.created_at >= before);
        assert_eq!(state.members()[0].id, added.id);
    }
}
