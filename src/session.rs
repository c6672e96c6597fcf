//! The coordinator behind the presentation layer.
//!
//! Handlers never return errors: failures are logged and the state is left
//! as it was (or emptied, for failed workspace loads).

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::catalog::GroupCatalog;
use crate::gateway::RemoteCollectionGateway;
use crate::schemas::{Group, GroupPatch, Identity, NewExpense, NewMember};
use crate::state::{AppState, Snapshot};
use crate::stats::GroupStats;
use crate::workspace::GroupWorkspace;

pub struct Session {
    catalog: GroupCatalog,
    workspace: GroupWorkspace,
    state: AppState,
}

impl Session {
    pub fn new(gateway: Arc<RemoteCollectionGateway>) -> Self {
        Session {
            catalog: GroupCatalog::new(gateway.clone()),
            workspace: GroupWorkspace::new(gateway),
            state: AppState::default(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn stats(&self) -> GroupStats {
        self.state.stats()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from(&self.state)
    }

    pub async fn on_identity_change(&mut self, identity: Option<Identity>) {
        let Some(identity) = identity else {
            info!("identity cleared");
            self.state.reset();
            self.workspace.load_for(&mut self.state, None).await;
            return;
        };
        info!(%identity, "loading groups");
        self.state.set_identity(Some(identity.clone()));
        match self.catalog.list(&identity).await {
            Ok(groups) => {
                let first = groups.first().cloned();
                self.state.set_groups(groups);
                self.select_group(first).await;
            }
            Err(err) => error!(error = %err, "error loading groups"),
        }
        self.state.set_loading(false);
    }

    pub async fn select_group(&mut self, group: Option<Group>) {
        self.state.set_active_group(group.clone());
        self.workspace.load_for(&mut self.state, group.as_ref()).await;
    }

    /// Selects the catalog group with `id`, or clears the selection.
    pub async fn select_group_by_id(&mut self, id: Option<&str>) {
        let group = match id {
            Some(id) => match self.state.groups().iter().find(|group| group.id == id) {
                Some(group) => Some(group.clone()),
                None => {
                    debug!(id, "ignoring selection of an unknown group");
                    return;
                }
            },
            None => None,
        };
        self.select_group(group).await;
    }

    /// The created group goes to the front of the catalog, where the next
    /// newest-first reload will also put it, and becomes the active group.
    pub async fn create_group(&mut self, name: &str, description: Option<&str>) {
        let Some(identity) = self.state.identity().cloned() else {
            debug!("no identity, ignoring create_group");
            return;
        };
        match self.catalog.create(&identity, name, description).await {
            Ok(group) => {
                info!(id = %group.id, name = %group.name, "created group");
                self.state.groups_mut().insert(0, group.clone());
                self.select_group(Some(group)).await;
            }
            Err(err) => error!(error = %err, "error creating group"),
        }
    }

    pub async fn update_group(&mut self, id: &str, patch: GroupPatch) {
        let Some(identity) = self.state.identity().cloned() else {
            debug!("no identity, ignoring update_group");
            return;
        };
        if let Err(err) = self.catalog.update(id, &patch).await {
            error!(error = %err, "error updating group");
            return;
        }
        match self.catalog.list(&identity).await {
            Ok(groups) => {
                let active = self
                    .state
                    .active_group()
                    .and_then(|active| groups.iter().find(|group| group.id == active.id))
                    .cloned();
                self.state.set_groups(groups);
                if active.is_some() {
                    self.state.set_active_group(active);
                }
            }
            Err(err) => error!(error = %err, "error reloading groups"),
        }
    }

    /// Members and expenses of the deleted group stay in the store.
    pub async fn delete_group(&mut self, id: &str) {
        if let Err(err) = self.catalog.delete(id).await {
            error!(error = %err, "error deleting group");
            return;
        }
        self.state.groups_mut().retain(|group| group.id != id);
        if self.state.active_group().is_some_and(|active| active.id == id) {
            let first = self.state.groups().first().cloned();
            self.select_group(first).await;
        }
    }

    fn writable_group(&self, action: &str) -> Option<Group> {
        if self.state.identity().is_none() {
            debug!(action, "no identity, ignoring");
            return None;
        }
        let group = self.state.active_group().cloned();
        if group.is_none() {
            debug!(action, "no active group, ignoring");
        }
        group
    }

    pub async fn add_member(&mut self, member: NewMember) {
        let Some(group) = self.writable_group("add_member") else {
            return;
        };
        if let Err(err) = self.workspace.add_member(&mut self.state, &group, member).await {
            error!(error = %err, "error adding member");
        }
    }

    pub async fn remove_member(&mut self, id: &str) {
        let Some(group) = self.writable_group("remove_member") else {
            return;
        };
        if let Err(err) = self.workspace.remove_member(&mut self.state, &group, id).await {
            error!(error = %err, "error removing member");
        }
    }

    pub async fn add_expense(&mut self, expense: NewExpense) {
        let Some(group) = self.writable_group("add_expense") else {
            return;
        };
        if let Err(err) = self.workspace.add_expense(&mut self.state, &group, expense).await {
            error!(error = %err, "error adding expense");
        }
    }

    pub async fn delete_expense(&mut self, id: &str) {
        let Some(group) = self.writable_group("delete_expense") else {
            return;
        };
        if let Err(err) = self.workspace.delete_expense(&mut self.state, &group, id).await {
            error!(error = %err, "error deleting expense");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CollectionName, MemoryStore};

    fn session() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RemoteCollectionGateway::new(store.clone()));
        (store, Session::new(gateway))
    }

    #[tokio::test]
    async fn starts_loading_until_an_identity_arrives() {
        let (_, mut session) = session();
        assert!(session.state().is_loading());
        session.on_identity_change(Some("u1".to_string())).await;
        assert!(!session.state().is_loading());
        assert_eq!(session.state().identity().map(String::as_str), Some("u1"));
        assert!(session.state().groups().is_empty());
        assert!(session.state().active_group().is_none());
    }

    #[tokio::test]
    async fn handlers_need_an_identity() {
        let (store, mut session) = session();
        session.create_group("Goa", None).await;
        session
            .add_member(NewMember {
                name: "Asha".to_string(),
                email: None,
            })
            .await;
        assert_eq!(store.record_count(CollectionName::Groups), 0);
        assert_eq!(store.record_count(CollectionName::Members), 0);
    }

    #[tokio::test]
    async fn newest_group_becomes_active_on_sign_in() {
        let (store, mut session) = session();
        session.on_identity_change(Some("u1".to_string())).await;
        session.create_group("Older", None).await;
        session.create_group("Newer", None).await;

        let gateway = Arc::new(RemoteCollectionGateway::new(store));
        let mut returning = Session::new(gateway);
        returning.on_identity_change(Some("u1".to_string())).await;
        let names: Vec<_> = returning.state().groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Newer", "Older"]);
        assert_eq!(returning.state().active_group().unwrap().name, "Newer");
    }

    #[tokio::test]
    async fn failed_group_listing_still_leaves_loading() {
        let (store, mut session) = session();
        store.fail_reads(CollectionName::Groups, true);
        session.on_identity_change(Some("u1".to_string())).await;
        assert!(!session.state().is_loading());
        assert!(session.state().groups().is_empty());
    }

    #[tokio::test]
    async fn sign_out_clears_state() {
        let (_, mut session) = session();
        session.on_identity_change(Some("u1".to_string())).await;
        session.create_group("Goa", None).await;
        assert!(session.state().active_group().is_some());

        session.on_identity_change(None).await;
        assert!(session.state().is_loading());
        assert!(session.state().identity().is_none());
        assert!(session.state().groups().is_empty());
        assert!(session.state().active_group().is_none());
    }

    #[tokio::test]
    async fn rename_keeps_the_selection() {
        let (_, mut session) = session();
        session.on_identity_change(Some("u1".to_string())).await;
        session.create_group("Flat", None).await;
        let id = session.state().active_group().unwrap().id.clone();

        session
            .update_group(
                &id,
                GroupPatch {
                    name: Some("Flat 4B".to_string()),
                    description: Some("rent and bills".to_string()),
                },
            )
            .await;
        let active = session.state().active_group().unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.name, "Flat 4B");
        assert_eq!(session.state().groups()[0].name, "Flat 4B");
    }

    #[tokio::test]
    async fn blank_rename_is_rejected() {
        let (_, mut session) = session();
        session.on_identity_change(Some("u1".to_string())).await;
        session.create_group("Flat", None).await;
        let id = session.state().active_group().unwrap().id.clone();

        session
            .update_group(
                &id,
                GroupPatch {
                    name: Some("   ".to_string()),
                    description: None,
                },
            )
            .await;
        assert_eq!(session.state().groups()[0].name, "Flat");
        assert_eq!(session.state().active_group().unwrap().name, "Flat");
    }

    #[tokio::test]
    async fn deleting_the_active_group_selects_the_next() {
        let (store, mut session) = session();
        session.on_identity_change(Some("u1".to_string())).await;
        session.create_group("Flat", None).await;
        session
            .add_member(NewMember {
                name: "Asha".to_string(),
                email: None,
            })
            .await;
        session.create_group("Goa", None).await;
        let goa = session.state().active_group().unwrap().id.clone();

        session.delete_group(&goa).await;
        assert_eq!(session.state().groups().len(), 1);
        let active = session.state().active_group().unwrap();
        assert_eq!(active.name, "Flat");
        assert_eq!(session.state().members().len(), 1);
        assert_eq!(store.record_count(CollectionName::Members), 1);
    }

    #[tokio::test]
    async fn unknown_group_selection_is_ignored() {
        let (_, mut session) = session();
        session.on_identity_change(Some("u1".to_string())).await;
        session.create_group("Flat", None).await;
        session.select_group_by_id(Some("nope")).await;
        assert_eq!(session.state().active_group().unwrap().name, "Flat");
        session.select_group_by_id(None).await;
        assert!(session.state().active_group().is_none());
    }
}
