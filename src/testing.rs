//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::channel::{connections, ChannelRelay, NewConnection};
use crate::conversation::ConversationEngine;
use crate::error::{Error, Result};
use crate::identity::{departments, users, Department, NewUser, Role, User};
use crate::notify::Notifier;
use crate::store::Database;

/// Relay that records what it was asked to send.
#[derive(Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingRelay {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelRelay for RecordingRelay {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::UpstreamRelayFailure("gateway answered 503".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        Ok(())
    }
}

/// A fresh database with two departments and a handful of staff.
///
/// Suporte: `agent_support`. Vendas: `manager_sales`, `agent_sales`,
/// `agent_sales_2`. `admin` has no department.
pub struct TestEnv {
    _dir: TempDir,
    pub db: Database,
    pub notifier: Notifier,
    pub relay: Arc<RecordingRelay>,
    pub engine: ConversationEngine,
    pub support: Department,
    pub sales: Department,
    pub admin: User,
    pub manager_sales: User,
    pub agent_sales: User,
    pub agent_sales_2: User,
    pub agent_support: User,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_default_department("Suporte")
    }

    /// Same staff, but customer conversations default to `default_department`.
    pub fn with_default_department(default_department: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("switchboard.db")).unwrap();
        let conn = db.connect().unwrap();

        let support = departments::create_department(&conn, "Suporte", Some("Customer support")).unwrap();
        let sales = departments::create_department(&conn, "Vendas", None).unwrap();

        let staff = |username: &str, name: &str, role: Role, department: Option<i64>| {
            users::create_user(
                &conn,
                &NewUser {
                    username: username.to_string(),
                    name: name.to_string(),
                    email: format!("{}@example.com", username),
                    password_hash: "hash".to_string(),
                    role,
                    department_id: department,
                },
            )
            .unwrap()
        };
        let admin = staff("admin", "Ana Admin", Role::Admin, None);
        let manager_sales = staff("marcos", "Marcos Manager", Role::Manager, Some(sales.id));
        let agent_sales = staff("sofia", "Sofia Sales", Role::Agent, Some(sales.id));
        let agent_sales_2 = staff("saulo", "Saulo Sales", Role::Agent, Some(sales.id));
        let agent_support = staff("paulo", "Paulo Support", Role::Agent, Some(support.id));

        let support = departments::require_department(&conn, support.id).unwrap();
        let sales = departments::require_department(&conn, sales.id).unwrap();
        drop(conn);

        let notifier = Notifier::new();
        let relay = Arc::new(RecordingRelay::default());
        let engine = ConversationEngine::new(
            db.clone(),
            notifier.clone(),
            relay.clone(),
            default_department,
        );

        Self {
            _dir: dir,
            db,
            notifier,
            relay,
            engine,
            support,
            sales,
            admin,
            manager_sales,
            agent_sales,
            agent_sales_2,
            agent_support,
        }
    }

    /// Register an active channel connection answering to `verify_token`.
    pub fn connect_channel(&self, verify_token: &str) {
        let conn = self.db.connect().unwrap();
        connections::connect(
            &conn,
            &NewConnection {
                phone_number: "551140000000".to_string(),
                access_token: "access-token".to_string(),
                webhook_verify_token: verify_token.to_string(),
                business_account_id: "1234567".to_string(),
            },
        )
        .unwrap();
    }
}
