//! Request-triggered user flows: sign-up, city list changes, lookup, removal.
//!
//! Authentication is the caller's business; these operations trust the email
//! they are given.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    dispatch::NotificationDispatcher,
    error::{Error, Result},
    model::User,
    resolver::CityResolver,
    store::UserStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// New user stored with these resolved city names.
    Registered { cities: Vec<String> },
    /// The email was already taken; nothing changed.
    AlreadyRegistered,
}

pub struct UserRegistration {
    users: Arc<dyn UserStore>,
    resolver: Arc<CityResolver>,
    dispatcher: Arc<NotificationDispatcher>,
    welcomes: Mutex<Vec<JoinHandle<()>>>,
}

impl UserRegistration {
    pub fn new(
        users: Arc<dyn UserStore>,
        resolver: Arc<CityResolver>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            users,
            resolver,
            dispatcher,
            welcomes: Mutex::new(Vec::new()),
        }
    }

    /// Signs a user up. A welcome task is published in the background and
    /// does not affect the result.
    pub async fn register(&self, email: &str, cities: &[String]) -> Result<Registration> {
        let email = validate_email(email)?;

        if self.users.user_exists(email).await? {
            tracing::info!(%email, "user already registered");
            return Ok(Registration::AlreadyRegistered);
        }

        let cities = self.resolver.resolve_and_register(cities).await?;
        let user = User {
            email: email.to_string(),
            cities,
        };

        match self.users.insert_user(&user).await {
            Ok(()) => {}
            Err(Error::Conflict(_)) => {
                tracing::info!(%email, "user registered concurrently");
                return Ok(Registration::AlreadyRegistered);
            }
            Err(e) => return Err(e),
        }

        // Not awaited and never retried.
        let handle = self.dispatcher.spawn_welcome(email);
        let mut welcomes = self.welcomes.lock();
        welcomes.retain(|h| !h.is_finished());
        welcomes.push(handle);
        drop(welcomes);

        tracing::info!(%email, cities = ?user.cities, "user registered");
        Ok(Registration::Registered { cities: user.cities })
    }

    /// Replaces a user's city list and returns the stored names.
    pub async fn change_cities(&self, email: &str, cities: &[String]) -> Result<Vec<String>> {
        let email = validate_email(email)?;

        if !self.users.user_exists(email).await? {
            return Err(Error::NotFound(format!("user {email}")));
        }

        let cities = self.resolver.resolve_and_register(cities).await?;
        self.users.update_cities(email, &cities).await?;
        tracing::info!(%email, cities = ?cities, "user cities updated");
        Ok(cities)
    }

    pub async fn get(&self, email: &str) -> Result<User> {
        let email = validate_email(email)?;
        self.users
            .get_user(email)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {email}")))
    }

    pub async fn delete(&self, email: &str) -> Result<()> {
        let email = validate_email(email)?;
        if !self.users.delete_user(email).await? {
            return Err(Error::NotFound(format!("user {email}")));
        }
        tracing::info!(%email, "user deleted");
        Ok(())
    }

    /// Waits for welcome publishes still in flight. Meant for shutdown, so a
    /// short-lived process does not cancel them on exit.
    pub async fn flush_welcomes(&self) {
        let pending = std::mem::take(&mut *self.welcomes.lock());
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "welcome task panicked");
            }
        }
    }
}

fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::Validation("email is required".into()));
    }
    if !email.contains('@') {
        return Err(Error::Validation(format!("'{email}' is not an email address")));
    }
    Ok(email)
}
