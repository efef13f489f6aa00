use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo::{StoreError, StoreResult, UserStore};
use super::repo_types::{NewUser, ProfileChanges, UserRecord, DEFAULT_PHOTO};

/// In-process store with the same uniqueness and visibility rules as the
/// Postgres one. Email uniqueness spans inactive users too, like the
/// table's unique index.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn email_taken(users: &HashMap<Uuid, UserRecord>, email: &str, except: Option<Uuid>) -> bool {
        users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> StoreResult<UserRecord> {
        let mut users = self.users.write().await;
        if Self::email_taken(&users, &user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            photo: DEFAULT_PHOTO.to_string(),
            password_hash: user.password_hash,
            role: user.role,
            password_changed_at: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.active && u.email == email)
            .cloned())
    }

    async fn find_active_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.get(&id).filter(|u| u.active).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<UserRecord>> {
        let users = self.users.read().await;
        let mut active: Vec<UserRecord> = users.values().filter(|u| u.active).cloned().collect();
        active.sort_by_key(|u| u.created_at);
        Ok(active)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> StoreResult<Option<UserRecord>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id).filter(|u| u.active) else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_string();
        user.password_changed_at = Some(changed_at);
        Ok(Some(user.clone()))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> StoreResult<Option<UserRecord>> {
        let mut users = self.users.write().await;
        if let Some(email) = changes.email.as_deref() {
            if Self::email_taken(&users, email, Some(id)) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let Some(user) = users.get_mut(&id).filter(|u| u.active) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(phone) = changes.phone {
            user.phone = phone;
        }
        Ok(Some(user.clone()))
    }

    async fn deactivate(&self, id: Uuid) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id).filter(|u| u.active) {
            Some(user) => {
                user.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ana".into(),
            email: email.into(),
            phone: String::new(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_sets_defaults() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("ana@x.com")).await.unwrap();
        assert!(user.active);
        assert_eq!(user.photo, DEFAULT_PHOTO);
        assert!(user.password_changed_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::new();
        store.create(new_user("ana@x.com")).await.unwrap();
        let err = store.create(new_user("ana@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_users_are_invisible() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("ana@x.com")).await.unwrap();
        assert!(store.deactivate(user.id).await.unwrap());
        assert!(!store.deactivate(user.id).await.unwrap());

        assert!(store.find_active_by_id(user.id).await.unwrap().is_none());
        assert!(store
            .find_active_by_email("ana@x.com")
            .await
            .unwrap()
            .is_none());
        assert!(store.list_active().await.unwrap().is_empty());
        assert!(store
            .update_password(user.id, "new", OffsetDateTime::now_utc())
            .await
            .unwrap()
            .is_none());
        // still reserves the address
        assert!(store.create(new_user("ana@x.com")).await.is_err());
    }

    #[tokio::test]
    async fn profile_email_change_respects_uniqueness() {
        let store = MemoryUserStore::new();
        let ana = store.create(new_user("ana@x.com")).await.unwrap();
        store.create(new_user("bob@x.com")).await.unwrap();

        let err = store
            .update_profile(
                ana.id,
                ProfileChanges {
                    email: Some("bob@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));

        let updated = store
            .update_profile(
                ana.id,
                ProfileChanges {
                    email: Some("ana@x.com".into()),
                    phone: Some("555".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.phone, "555");
        assert_eq!(updated.name, "Ana");
    }
}
