use std::sync::Arc;

use tracing::error;

use crate::error::{FetchError, WriteError};
use crate::gateway::RemoteCollectionGateway;
use crate::schemas::{Group, GroupPatch, NewGroup};
use crate::store::CollectionName;

/// Groups owned by an identity.
#[derive(Clone)]
pub struct GroupCatalog {
    gateway: Arc<RemoteCollectionGateway>,
}

impl GroupCatalog {
    pub fn new(gateway: Arc<RemoteCollectionGateway>) -> Self {
        GroupCatalog { gateway }
    }

    /// Newest first. An empty list is normal for a new identity.
    pub async fn list(&self, identity: &str) -> Result<Vec<Group>, FetchError> {
        self.gateway.list_groups(identity).await
    }

    /// The returned `created_at` is provisional until the next [`Self::list`].
    pub async fn create(
        &self,
        identity: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Group, WriteError> {
        let name = name.trim();
        if name.is_empty() {
            error!("rejecting group without a name");
            return Err(WriteError::InvalidRecord {
                collection: CollectionName::Groups,
                reason: "group name must not be blank".to_string(),
            });
        }
        let description = description
            .map(str::trim)
            .filter(|description| !description.is_empty())
            .map(str::to_owned);
        self.gateway
            .create_group(NewGroup {
                name: name.to_owned(),
                description,
                created_by: identity.to_owned(),
            })
            .await
    }

    /// Names are trimmed and must stay non-blank. A blank description is
    /// left untouched, as on create.
    pub async fn update(&self, id: &str, patch: &GroupPatch) -> Result<(), WriteError> {
        let name = patch.name.as_deref().map(str::trim);
        if name.is_some_and(str::is_empty) {
            error!(id, "rejecting rename to a blank name");
            return Err(WriteError::InvalidRecord {
                collection: CollectionName::Groups,
                reason: "group name must not be blank".to_string(),
            });
        }
        let patch = GroupPatch {
            name: name.map(str::to_owned),
            description: patch
                .description
                .as_deref()
                .map(str::trim)
                .filter(|description| !description.is_empty())
                .map(str::to_owned),
        };
        self.gateway.update_group(id, &patch).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), WriteError> {
        self.gateway.delete_group(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn catalog() -> (Arc<MemoryStore>, GroupCatalog) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(RemoteCollectionGateway::new(store.clone()));
        (store, GroupCatalog::new(gateway))
    }

    #[tokio::test]
    async fn new_identity_has_no_groups() {
        let (_, catalog) = catalog();
        assert!(catalog.list("fresh").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let (_, catalog) = catalog();
        for name in ["Flat", "Office", "Trip to Goa"] {
            catalog.create("u1", name, None).await.unwrap();
        }
        let groups = catalog.list("u1").await.unwrap();
        assert_eq!(groups[0].name, "Trip to Goa");
        assert!(groups.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
    }

    #[tokio::test]
    async fn trims_input_and_rejects_blank_names() {
        let (store, catalog) = catalog();
        let group = catalog.create("u1", "  Goa ", Some("   ")).await.unwrap();
        assert_eq!(group.name, "Goa");
        assert_eq!(group.description, None);
        assert_eq!(group.created_by, "u1");

        let err = catalog.create("u1", "   ", None).await.unwrap_err();
        assert!(matches!(err, WriteError::InvalidRecord { .. }));
        assert_eq!(store.record_count(CollectionName::Groups), 1);
    }

    #[tokio::test]
    async fn renames_are_trimmed_and_never_blank() {
        let (_, catalog) = catalog();
        let group = catalog.create("u1", "Flat", Some("rent")).await.unwrap();

        let blank = GroupPatch {
            name: Some("   ".to_string()),
            description: None,
        };
        let err = catalog.update(&group.id, &blank).await.unwrap_err();
        assert!(matches!(err, WriteError::InvalidRecord { .. }));

        let rename = GroupPatch {
            name: Some(" Flat 4B ".to_string()),
            description: Some("  ".to_string()),
        };
        catalog.update(&group.id, &rename).await.unwrap();
        let groups = catalog.list("u1").await.unwrap();
        assert_eq!(groups[0].name, "Flat 4B");
        assert_eq!(groups[0].description.as_deref(), Some("rent"));
    }

    #[tokio::test]
    async fn write_failures_are_rethrown() {
        let (store, catalog) = catalog();
        store.fail_writes(CollectionName::Groups, true);
        assert!(catalog.create("u1", "Goa", None).await.is_err());
        store.fail_writes(CollectionName::Groups, false);
        assert!(catalog.list("u1").await.unwrap().is_empty());
    }
}
