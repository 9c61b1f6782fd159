//! Admin-facing notification reads and acknowledgements.

use std::sync::Arc;
use tracing::info;

use crate::domain::aggregates::{Notification, NotificationFilter};
use crate::store::NotificationStore;
use crate::{InventoryError, Result};

pub struct NotificationService<N> {
    store: Arc<N>,
}

impl<N> Clone for NotificationService<N> {
    fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<N: NotificationStore> NotificationService<N> {
    pub fn new(store: Arc<N>) -> Self { Self { store } }

    /// Newest first.
    pub async fn list(&self, filter: &NotificationFilter) -> Result<Vec<Notification>> {
        Ok(self.store.notifications(filter).await?)
    }

    pub async fn unread_count(&self) -> Result<u64> {
        Ok(self.store.count_unread().await?)
    }

    pub async fn mark_read(&self, id: &str) -> Result<Notification> {
        self.update(id, Notification::mark_read).await
    }

    pub async fn mark_all_read(&self) -> Result<u64> {
        let changed = self.store.mark_all_read().await?;
        info!(changed, "marked all notifications read");
        Ok(changed)
    }

    /// Resolves an alert. A later trigger for the same variant opens a new one.
    pub async fn mark_action_taken(&self, id: &str) -> Result<Notification> {
        self.update(id, Notification::mark_action_taken).await
    }

    async fn update(&self, id: &str, change: impl FnOnce(&mut Notification)) -> Result<Notification> {
        let mut notification = self.store.notification(id).await?
            .ok_or_else(|| InventoryError::NotFound(format!("notification {id}")))?;
        change(&mut notification);
        self.store.save_notification(&notification).await?;
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{AlertMetadata, NotificationKind};
    use crate::store::MemoryStore;

    async fn seeded() -> (NotificationService<MemoryStore>, Vec<String>) {
        let store = Arc::new(MemoryStore::new());
        let mut ids = vec![];
        for (kind, variant) in [(NotificationKind::LowStock, "v1"), (NotificationKind::OutOfStock, "v2")] {
            let alert = Notification::stock_alert(kind, "p1", variant, "t", "m", AlertMetadata::default());
            ids.push(alert.id.clone());
            store.upsert_open_alert(alert).await.unwrap();
        }
        (NotificationService::new(store), ids)
    }

    #[tokio::test]
    async fn test_read_flow() {
        let (svc, ids) = seeded().await;
        assert_eq!(svc.unread_count().await.unwrap(), 2);
        assert!(svc.mark_read(&ids[0]).await.unwrap().is_read);
        assert_eq!(svc.unread_count().await.unwrap(), 1);
        assert_eq!(svc.mark_all_read().await.unwrap(), 1);
        assert_eq!(svc.unread_count().await.unwrap(), 0);
        assert!(matches!(svc.mark_read("nope").await, Err(InventoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_action_taken_marks_read_and_filters() {
        let (svc, ids) = seeded().await;
        let n = svc.mark_action_taken(&ids[1]).await.unwrap();
        assert!(n.action_taken && n.is_read && n.action_at.is_some());

        let open = svc.list(&NotificationFilter { action_taken: Some(false), ..Default::default() }).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, NotificationKind::LowStock);
        let all = svc.list(&NotificationFilter::default()).await.unwrap();
        assert_eq!(all[0].id, ids[1]);
    }
}
