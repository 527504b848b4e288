//! Startup seeding of roles and users.
//!
//! Both steps only write when their collection is empty, so running them on
//! every start is safe.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::domain::ports::PasswordEncoder;
use crate::domain::{Error, Record, RecordId, Repository, Role, StoreContext, StoreResult, User};

/// Role granted to the seeded administrator.
pub const ADMIN_ROLE: &str = "admin";
/// Role granted to every seeded customer.
pub const CUSTOMER_ROLE: &str = "customer";
/// Display name of the seeded administrator.
pub const ADMIN_NAME: &str = "Adminus Admistradore";
/// Email address of the seeded administrator.
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// User entry of a JSON seed file, with a raw password.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedUser {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Raw password, encoded before it is stored.
    pub password: String,
}

impl SeedUser {
    /// Parse a JSON array of `{name, email, password}` objects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::decode`] when `json` is not such an array.
    pub fn parse_list(json: &str) -> StoreResult<Vec<Self>> {
        serde_json::from_str(json).map_err(|err| Error::decode(format!("invalid seed users: {err}")))
    }
}

/// Seeds the default roles and users.
pub struct Bootstrap {
    roles: Repository<Role>,
    users: Repository<User>,
    encoder: Arc<dyn PasswordEncoder>,
}

impl Bootstrap {
    /// Seeder writing through `context`, encoding passwords with `encoder`.
    pub fn new(context: &StoreContext, encoder: Arc<dyn PasswordEncoder>) -> Self {
        Self {
            roles: context.repository(),
            users: context.repository(),
            encoder,
        }
    }

    /// Create the `admin` and `customer` roles when no role exists.
    ///
    /// Returns the number of roles created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::store_unavailable`] when the store cannot be reached.
    pub async fn ensure_roles(&self) -> StoreResult<usize> {
        if self.roles.count().await? > 0 {
            return Ok(0);
        }
        let created = self
            .roles
            .save_all([Role::new(ADMIN_ROLE), Role::new(CUSTOMER_ROLE)])
            .await?;
        info!(count = created.len(), "created admin and customer roles");
        Ok(created.len())
    }

    /// Create `seed` users with the customer role, plus the administrator,
    /// when no user exists.
    ///
    /// Returns the number of users created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::not_found`] when a required role is missing and
    /// [`Error::invalid_record`] when a seed user fails validation.
    pub async fn ensure_users(&self, seed: &[SeedUser], admin_password: &str) -> StoreResult<usize> {
        if self.users.count().await? > 0 {
            return Ok(0);
        }
        let admin_role = self.role_id(ADMIN_ROLE).await?;
        let customer_role = self.role_id(CUSTOMER_ROLE).await?;

        let mut users = Vec::with_capacity(seed.len() + 1);
        for entry in seed {
            let mut user = User::new(
                entry.name.as_str(),
                entry.email.as_str(),
                self.encode(&entry.password)?,
            );
            user.add_role(customer_role.clone());
            users.push(user);
        }
        let mut admin = User::new(ADMIN_NAME, ADMIN_EMAIL, self.encode(admin_password)?);
        admin.add_role(admin_role);
        users.push(admin);

        let saved = self.users.save_all(users).await?;
        info!(count = saved.len(), "loaded user data and created users");
        Ok(saved.len())
    }

    async fn role_id(&self, name: &str) -> StoreResult<RecordId> {
        self.roles
            .find_first_by_index(Role::NAME, name)
            .await?
            .and_then(|role| role.id().cloned())
            .ok_or_else(|| Error::not_found(format!("role '{name}' does not exist")))
    }

    fn encode(&self, raw: &str) -> StoreResult<String> {
        self.encoder
            .encode(raw)
            .map_err(|err| Error::internal(err.to_string()))
    }
}
