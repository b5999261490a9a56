use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use invoicedb::db::RetryPolicy;
use invoicedb::engine::LocalStore;
use invoicedb::model::{Customer, Invoice, InvoiceStatus, Role, UserRole};
use invoicedb::{Database, Error, Result, StorageRead, StorageWrite};
use serde_json::Value;

/// Engine wrapper that fails a configured number of calls with the transient
/// class before delegating to the wrapped store.
struct FlakyEngine {
    inner: LocalStore,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyEngine {
    fn new(failures: u32) -> Self {
        Self {
            inner: LocalStore::new(HashMap::new(), None),
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    fn trip(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(Error::InvalidState("engine not ready".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageRead for FlakyEngine {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        self.trip()?;
        self.inner.get_item(key).await
    }
}

#[async_trait]
impl StorageWrite for FlakyEngine {
    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        self.trip()?;
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.trip()?;
        self.inner.remove_item(key).await
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        delay: Duration::from_millis(25),
    }
}

fn sample_invoice(id: &str, customer_id: &str) -> Invoice {
    Invoice {
        id: id.to_string(),
        customer_id: customer_id.to_string(),
        total: 250.0,
        created_at: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap(),
        status: InvoiceStatus::Final,
    }
}

#[tokio::test]
async fn test_full_lifecycle_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(LocalStore::open(dir.path()).unwrap());
        let db = Database::new(store);
        db.initialize().await.unwrap();

        db.create_user("admin@shop.cd", "s3cret", UserRole::Admin)
            .await
            .unwrap();
        db.replace_customers(&[Customer {
            id: "c1".to_string(),
            name: "Acme".to_string(),
            phone: "+243 99 000 0000".to_string(),
            address: "12 Main St".to_string(),
            city: "Kinshasa".to_string(),
        }])
        .await
        .unwrap();
        db.replace_invoices(&[sample_invoice("20240517-001", "c1")])
            .await
            .unwrap();
        db.replace_roles(&[Role {
            id: "r1".to_string(),
            name: "accounting".to_string(),
            permissions: vec!["invoices:read".to_string()],
        }])
        .await
        .unwrap();
    }

    // A new process over the same directory sees everything.
    let store = Arc::new(LocalStore::open(dir.path()).unwrap());
    let db = Database::new(store);
    db.initialize().await.unwrap();

    assert!(db.verify_password("admin@shop.cd", "s3cret").await.unwrap());
    assert_eq!(db.customers().await.unwrap().len(), 1);
    assert_eq!(
        db.invoices().await.unwrap(),
        vec![sample_invoice("20240517-001", "c1")]
    );
    assert_eq!(db.roles().await.unwrap()[0].name, "accounting");
}

#[tokio::test]
async fn test_export_import_between_stores() {
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();

    let source = Database::new(Arc::new(LocalStore::open(source_dir.path()).unwrap()));
    source.initialize().await.unwrap();
    source
        .create_user("a@x.com", "p1", UserRole::Team)
        .await
        .unwrap();
    source
        .replace_invoices(&[sample_invoice("20240517-002", "ghost")])
        .await
        .unwrap();

    let blob = source.export_data().await.unwrap();

    let target = Database::new(Arc::new(LocalStore::open(target_dir.path()).unwrap()));
    target.import_data(&blob).await.unwrap();

    assert_eq!(target.users().await.unwrap(), source.users().await.unwrap());
    assert_eq!(
        target.invoices().await.unwrap(),
        source.invoices().await.unwrap()
    );
    // The dangling customer reference imports verbatim.
    assert_eq!(target.invoices().await.unwrap()[0].customer_id, "ghost");
}

#[tokio::test]
async fn test_retry_then_succeed() {
    // The first two engine calls fail transiently, so the first two attempts
    // of create_user die on their initial read and the third goes through.
    let flaky = Arc::new(FlakyEngine::new(2));
    let db = Database::with_retry_policy(flaky.clone(), fast_policy());

    let started = Instant::now();
    db.create_user("a@x.com", "p1", UserRole::Team).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(db.verify_password("a@x.com", "p1").await.unwrap());
}

#[tokio::test]
async fn test_retry_exhaustion_leaves_no_partial_write() {
    let flaky = Arc::new(FlakyEngine::new(u32::MAX));
    let db = Database::with_retry_policy(flaky.clone(), fast_policy());

    let err = db
        .create_user("a@x.com", "p1", UserRole::Team)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OperationFailed(ref op) if op == "create user"));
    assert_eq!(err.to_string(), "Failed to create user. Please try again.");
    // Initial attempt plus three retries, each dying on its first engine call.
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
    // Nothing reached the underlying store.
    assert_eq!(flaky.inner.get_item("users").await.unwrap(), None);
}

#[tokio::test]
async fn test_rejections_skip_the_retry_delay() {
    let flaky = Arc::new(FlakyEngine::new(0));
    let db = Database::with_retry_policy(
        flaky.clone(),
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(5),
        },
    );
    db.initialize().await.unwrap();
    db.create_user("a@x.com", "p1", UserRole::Team).await.unwrap();

    let started = Instant::now();
    let err = db
        .create_user("a@x.com", "p1", UserRole::Team)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateEntity));
    assert!(started.elapsed() < Duration::from_secs(1));
}
