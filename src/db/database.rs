use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::db::retry::{run_with_retry, RetryPolicy};
use crate::model::{time_based_id, Customer, ExportPayload, Invoice, Role, User, UserRole};
use crate::{Error, Result, StorageEngine};

/// Storage key of the email → [`User`] mapping.
pub const USERS_KEY: &str = "users";
/// Storage key of the [`Customer`] sequence.
pub const CUSTOMERS_KEY: &str = "customers";
/// Storage key of the [`Invoice`] sequence.
pub const INVOICES_KEY: &str = "invoices";
/// Storage key of the [`Role`] sequence.
pub const ROLES_KEY: &str = "roles";

/// The application database: named, retryable access to the four collections
/// plus whole-database export and import.
///
/// One `Database` is constructed at process start against a shared
/// [`StorageEngine`] and passed by reference to whoever needs it; there is no
/// hidden global handle. Every operation is an independent read-modify-write
/// of a whole collection with no lock held across the suspension, so two
/// logically concurrent writers race with last-writer-wins semantics at
/// collection granularity.
pub struct Database {
    engine: Arc<dyn StorageEngine>,
    retry: RetryPolicy,
}

impl Database {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self::with_retry_policy(engine, RetryPolicy::default())
    }

    /// Like [`Database::new`] with an explicit retry policy. Tests shrink the
    /// delay through this; production callers keep the default.
    pub fn with_retry_policy(engine: Arc<dyn StorageEngine>, retry: RetryPolicy) -> Self {
        Self { engine, retry }
    }

    /// Creates any missing collections with their empty defaults.
    ///
    /// Idempotent: present collections are left untouched, so calling this on
    /// every process start is safe. Must run before any other operation.
    pub async fn initialize(&self) -> Result<()> {
        run_with_retry(&self.retry, "initialize database", move || {
            self.initialize_once().boxed()
        })
        .await
    }

    async fn initialize_once(&self) -> Result<()> {
        self.ensure_default(USERS_KEY, Value::Object(serde_json::Map::new()))
            .await?;
        for key in [CUSTOMERS_KEY, INVOICES_KEY, ROLES_KEY] {
            self.ensure_default(key, Value::Array(Vec::new())).await?;
        }
        info!("Database initialized");
        Ok(())
    }

    async fn ensure_default(&self, key: &str, default: Value) -> Result<()> {
        match self.engine.get_item(key).await? {
            Some(existing) if !existing.is_null() => Ok(()),
            _ => self.engine.set_item(key, default).await,
        }
    }

    /// Creates a user keyed by email.
    ///
    /// The id comes from the millisecond clock; uniqueness is best-effort.
    /// Fails with [`Error::DuplicateEntity`] if the email is already taken.
    /// The whole mapping is rewritten, not patched.
    pub async fn create_user(&self, email: &str, password: &str, role: UserRole) -> Result<()> {
        run_with_retry(&self.retry, "create user", move || {
            self.create_user_once(email, password, role).boxed()
        })
        .await
    }

    async fn create_user_once(&self, email: &str, password: &str, role: UserRole) -> Result<()> {
        let mut users = self.read_users().await?;
        if users.contains_key(email) {
            return Err(Error::DuplicateEntity);
        }
        let user = User {
            id: time_based_id(),
            email: email.to_string(),
            password: password.to_string(),
            role,
        };
        users.insert(email.to_string(), user);
        self.write_collection(USERS_KEY, &users).await?;
        info!("User created successfully: {}", email);
        Ok(())
    }

    /// Checks `password` against the stored one.
    ///
    /// An unknown email verifies as `false` rather than an error. Comparison
    /// is plain equality; passwords are stored unhashed.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        run_with_retry(&self.retry, "verify password", move || {
            self.verify_password_once(email, password).boxed()
        })
        .await
    }

    async fn verify_password_once(&self, email: &str, password: &str) -> Result<bool> {
        let users = self.read_users().await?;
        Ok(users
            .get(email)
            .map(|user| user.password == password)
            .unwrap_or(false))
    }

    /// Replaces a user's password after checking the current one.
    ///
    /// Fails with [`Error::AuthenticationFailure`] if the user is absent or
    /// `current_password` does not match.
    pub async fn update_user_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        run_with_retry(&self.retry, "update user password", move || {
            self.update_user_password_once(email, current_password, new_password)
                .boxed()
        })
        .await
    }

    async fn update_user_password_once(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut users = self.read_users().await?;
        let user = match users.get_mut(email) {
            Some(user) if user.password == current_password => user,
            _ => return Err(Error::AuthenticationFailure),
        };
        user.password = new_password.to_string();
        self.write_collection(USERS_KEY, &users).await?;
        info!("Password updated successfully for: {}", email);
        Ok(())
    }

    /// Serializes all four collections into a single JSON document.
    ///
    /// A collection that was never initialized exports as `null`; it is not
    /// defaulted here.
    pub async fn export_data(&self) -> Result<String> {
        run_with_retry(&self.retry, "export data", move || self.export_data_once().boxed()).await
    }

    async fn export_data_once(&self) -> Result<String> {
        let payload = ExportPayload {
            users: self.read_raw(USERS_KEY).await?,
            customers: self.read_raw(CUSTOMERS_KEY).await?,
            invoices: self.read_raw(INVOICES_KEY).await?,
            roles: self.read_raw(ROLES_KEY).await?,
        };
        Ok(serde_json::to_string(&payload)?)
    }

    /// Parses `blob` and overwrites all four collections with its contents.
    ///
    /// The blob must be exactly the four-field document produced by
    /// [`Database::export_data`]; any other shape is rejected as
    /// [`Error::MalformedPayload`] before anything is written. A field that
    /// is missing or `null` resets its collection to the absent state, so
    /// importing a partial blob is destructive.
    pub async fn import_data(&self, blob: &str) -> Result<()> {
        run_with_retry(&self.retry, "import data", move || {
            self.import_data_once(blob).boxed()
        })
        .await
    }

    async fn import_data_once(&self, blob: &str) -> Result<()> {
        let payload: ExportPayload =
            serde_json::from_str(blob).map_err(|e| Error::MalformedPayload(e.to_string()))?;
        self.write_raw(USERS_KEY, &payload.users).await?;
        self.write_raw(CUSTOMERS_KEY, &payload.customers).await?;
        self.write_raw(INVOICES_KEY, &payload.invoices).await?;
        self.write_raw(ROLES_KEY, &payload.roles).await?;
        info!("Data imported successfully");
        Ok(())
    }

    /// Returns the full email → [`User`] mapping, empty if never initialized.
    pub async fn users(&self) -> Result<HashMap<String, User>> {
        run_with_retry(&self.retry, "load users", move || self.read_users().boxed()).await
    }

    /// Removes the user stored under `email`, if any, and rewrites the
    /// mapping. Removing an unknown email is a no-op.
    pub async fn delete_user(&self, email: &str) -> Result<()> {
        run_with_retry(&self.retry, "delete user", move || {
            self.delete_user_once(email).boxed()
        })
        .await
    }

    async fn delete_user_once(&self, email: &str) -> Result<()> {
        let mut users = self.read_users().await?;
        users.remove(email);
        self.write_collection(USERS_KEY, &users).await
    }

    /// Returns the customer sequence, empty if never initialized.
    pub async fn customers(&self) -> Result<Vec<Customer>> {
        run_with_retry(&self.retry, "load customers", move || {
            self.read_seq(CUSTOMERS_KEY).boxed()
        })
        .await
    }

    /// Replaces the whole customer sequence. Callers read the collection,
    /// transform it, and write it back; there is no partial mutation
    /// primitive.
    pub async fn replace_customers(&self, customers: &[Customer]) -> Result<()> {
        run_with_retry(&self.retry, "save customers", move || {
            self.write_collection(CUSTOMERS_KEY, customers).boxed()
        })
        .await
    }

    /// Returns the invoice sequence, empty if never initialized.
    pub async fn invoices(&self) -> Result<Vec<Invoice>> {
        run_with_retry(&self.retry, "load invoices", move || {
            self.read_seq(INVOICES_KEY).boxed()
        })
        .await
    }

    /// Replaces the whole invoice sequence.
    pub async fn replace_invoices(&self, invoices: &[Invoice]) -> Result<()> {
        run_with_retry(&self.retry, "save invoices", move || {
            self.write_collection(INVOICES_KEY, invoices).boxed()
        })
        .await
    }

    /// Returns the role sequence, empty if never initialized.
    pub async fn roles(&self) -> Result<Vec<Role>> {
        run_with_retry(&self.retry, "load roles", move || self.read_seq(ROLES_KEY).boxed()).await
    }

    /// Replaces the whole role sequence.
    pub async fn replace_roles(&self, roles: &[Role]) -> Result<()> {
        run_with_retry(&self.retry, "save roles", move || {
            self.write_collection(ROLES_KEY, roles).boxed()
        })
        .await
    }

    async fn read_users(&self) -> Result<HashMap<String, User>> {
        Ok(self.read_raw(USERS_KEY).await?.unwrap_or_default())
    }

    async fn read_seq<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        Ok(self.read_raw(key).await?.unwrap_or_default())
    }

    /// Reads a collection without defaulting; a stored `null` counts as
    /// absent, matching what a legacy export wrote for uninitialized keys.
    async fn read_raw<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.engine.get_item(key).await? {
            None => Ok(None),
            Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn write_collection<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.engine.set_item(key, serde_json::to_value(value)?).await
    }

    async fn write_raw<T: Serialize>(&self, key: &str, value: &Option<T>) -> Result<()> {
        match value {
            Some(v) => self.engine.set_item(key, serde_json::to_value(v)?).await,
            None => self.engine.remove_item(key).await,
        }
    }
}
