//! SSO ticket resolution.
//!
//! The real lookup lives outside this crate (database, cache). The server only
//! needs one call: trade a ticket for a user, invalidating the ticket when it
//! resolves.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: u32,
    pub username: String,
}

pub trait IdentityResolver: Send + Sync {
    /// The user a ticket belongs to, or `None` for an unknown ticket.
    /// A resolved ticket must not resolve again.
    fn resolve_user<'a>(&'a self, ticket: &'a str) -> BoxFuture<'a, Result<Option<UserIdentity>>>;
}

/// Single-use tickets held in memory. Useful for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryIdentityResolver {
    tickets: Mutex<HashMap<String, UserIdentity>>,
}

impl InMemoryIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ticket(&self, ticket: impl Into<String>, user: UserIdentity) {
        let mut tickets = self.tickets.lock().unwrap_or_else(|p| p.into_inner());
        tickets.insert(ticket.into(), user);
    }

    pub fn pending(&self) -> usize {
        self.tickets.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl IdentityResolver for InMemoryIdentityResolver {
    fn resolve_user<'a>(&'a self, ticket: &'a str) -> BoxFuture<'a, Result<Option<UserIdentity>>> {
        Box::pin(async move {
            let mut tickets = self.tickets.lock().unwrap_or_else(|p| p.into_inner());
            let user = tickets.remove(ticket);
            if let Some(user) = &user {
                debug!(user_id = user.id, "Ticket redeemed");
            }
            Ok(user)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticket_is_single_use() {
        let resolver = InMemoryIdentityResolver::new();
        let user = UserIdentity {
            id: 1,
            username: "alice".into(),
        };
        resolver.insert_ticket("abc", user.clone());

        assert_eq!(resolver.resolve_user("abc").await.unwrap(), Some(user));
        assert_eq!(resolver.resolve_user("abc").await.unwrap(), None);
        assert_eq!(resolver.pending(), 0);
    }

    #[tokio::test]
    async fn unknown_ticket_resolves_to_none() {
        let resolver = InMemoryIdentityResolver::new();
        assert!(resolver.resolve_user("nope").await.unwrap().is_none());
    }
}
