use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::host::{
    Member, MemberRegistry, NoticeBuffer, Notices, OptionStore, Severity, UserDirectory, UserId,
    UserMetaStore,
};

/// Host backed by in-process maps. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryHost {
    members: RwLock<HashMap<UserId, Member>>,
    meta: RwLock<HashMap<(UserId, String), String>>,
    options: RwLock<HashMap<String, String>>,
    notices: NoticeBuffer,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw meta value, bypassing the trait (for inspection)
    pub async fn meta_raw(&self, user: UserId, key: &str) -> Option<String> {
        let meta = self.meta.read().await;
        meta.get(&(user, key.to_string())).cloned()
    }

    pub async fn member_count(&self) -> usize {
        let members = self.members.read().await;
        members.len()
    }

    pub fn notices(&self) -> &NoticeBuffer {
        &self.notices
    }
}

#[async_trait]
impl UserDirectory for MemoryHost {
    async fn find_member(&self, id: UserId) -> Result<Option<Member>> {
        let members = self.members.read().await;
        Ok(members.get(&id).cloned())
    }
}

#[async_trait]
impl MemberRegistry for MemoryHost {
    async fn upsert_member(&self, member: Member) -> Result<()> {
        let mut members = self.members.write().await;
        members.insert(member.id, member);
        Ok(())
    }

    async fn remove_member(&self, id: UserId) -> Result<bool> {
        let removed = {
            let mut members = self.members.write().await;
            members.remove(&id).is_some()
        };

        let mut meta = self.meta.write().await;
        meta.retain(|(user, _), _| *user != id);
        Ok(removed)
    }
}

#[async_trait]
impl UserMetaStore for MemoryHost {
    async fn get_meta(&self, user: UserId, key: &str) -> Result<Option<String>> {
        Ok(self.meta_raw(user, key).await)
    }

    async fn set_meta(&self, user: UserId, key: &str, value: &str) -> Result<()> {
        let mut meta = self.meta.write().await;
        meta.insert((user, key.to_string()), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl OptionStore for MemoryHost {
    async fn get_option(&self, name: &str) -> Result<Option<String>> {
        let options = self.options.read().await;
        Ok(options.get(name).cloned())
    }

    async fn set_option(&self, name: &str, value: &str) -> Result<()> {
        let mut options = self.options.write().await;
        options.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl Notices for MemoryHost {
    async fn add_message(&self, user: UserId, text: &str, severity: Severity) {
        self.notices.add_message(user, text, severity).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_meta_is_per_user() {
        let host = MemoryHost::new();
        host.set_meta(1, "key", "one").await.unwrap();
        host.set_meta(2, "key", "two").await.unwrap();

        assert_eq!(host.get_meta(1, "key").await.unwrap().as_deref(), Some("one"));
        assert_eq!(host.get_meta(2, "key").await.unwrap().as_deref(), Some("two"));
        assert_eq!(host.get_meta(3, "key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_member_drops_meta() {
        let host = MemoryHost::new();
        host.upsert_member(Member::new(1).with_roles(["subscriber"])).await.unwrap();
        host.set_meta(1, "key", "value").await.unwrap();

        assert!(host.remove_member(1).await.unwrap());
        assert!(!host.remove_member(1).await.unwrap());
        assert_eq!(host.find_member(1).await.unwrap(), None);
        assert_eq!(host.meta_raw(1, "key").await, None);
    }

    #[tokio::test]
    async fn test_options() {
        let host = MemoryHost::new();
        assert_eq!(host.get_option("missing").await.unwrap(), None);

        host.set_option("name", "value").await.unwrap();
        assert_eq!(host.get_option("name").await.unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_notices_delegate_to_buffer() {
        let host = MemoryHost::new();
        host.add_message(4, "limit reached", Severity::Error).await;
        assert_eq!(host.notices().take(4).await.len(), 1);
    }
}
