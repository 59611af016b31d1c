//! In-memory identity registry.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::entities::{PresenceStatus, UpdateUserRequest, User};
use crate::types::{UserError, UserResult};
use crate::utils::validation;

#[derive(Default)]
struct RegistryState {
    users: HashMap<String, User>,
    order: Vec<String>,
    removed: HashSet<String>,
}

/// Maps user identifiers to profiles for the lifetime of a session.
///
/// Reads never mutate. Removal keeps a record of the identifier so that
/// sender lookups on historical messages can resolve to a tombstone.
#[derive(Default)]
pub struct UserRegistry {
    state: RwLock<RegistryState>,
}

impl UserRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new user
    pub fn register(&self, user: User) -> UserResult<User> {
        validation::validate_user(&user)?;

        let mut state = self.write();
        if state.users.contains_key(&user.id) {
            return Err(UserError::already_exists(&user.id));
        }

        state.removed.remove(&user.id);
        state.order.push(user.id.clone());
        state.users.insert(user.id.clone(), user.clone());

        info!(user_id = %user.id, "registered user");
        Ok(user)
    }

    /// Get a user by id
    pub fn get(&self, user_id: &str) -> UserResult<User> {
        self.read()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| UserError::not_found(user_id))
    }

    /// Look up a message sender; unknown or removed users resolve to a tombstone
    pub fn resolve(&self, user_id: &str) -> User {
        self.read()
            .users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| User::tombstone(user_id))
    }

    /// Check whether a user is currently registered
    pub fn contains(&self, user_id: &str) -> bool {
        self.read().users.contains_key(user_id)
    }

    /// Check whether a user was registered and later removed
    pub fn is_removed(&self, user_id: &str) -> bool {
        self.read().removed.contains(user_id)
    }

    /// Apply a profile patch
    pub fn update(&self, user_id: &str, request: &UpdateUserRequest) -> UserResult<User> {
        validation::validate_update(request)?;

        let mut state = self.write();
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| UserError::not_found(user_id))?;

        if user.apply(request) {
            debug!(user_id, "updated user profile");
        }
        Ok(user.clone())
    }

    /// Change presence status only
    pub fn set_presence(&self, user_id: &str, presence: PresenceStatus) -> UserResult<User> {
        self.update(
            user_id,
            &UpdateUserRequest {
                presence: Some(presence),
                ..Default::default()
            },
        )
    }

    /// Remove a user. Historical messages keep the id and resolve to a tombstone.
    pub fn remove(&self, user_id: &str) -> UserResult<User> {
        let mut state = self.write();
        let user = state
            .users
            .remove(user_id)
            .ok_or_else(|| UserError::not_found(user_id))?;

        state.order.retain(|id| id != user_id);
        state.removed.insert(user_id.to_string());

        info!(user_id, "removed user");
        Ok(user)
    }

    /// All registered users in registration order
    pub fn list(&self) -> Vec<User> {
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect()
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.read().users.len()
    }

    /// Whether no users are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
