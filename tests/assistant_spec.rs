//! End-to-end behaviour of the assistant against the SQLite store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use teamsync_assistant::assistant::*;
use teamsync_assistant::config::AssistantConfig;
use teamsync_assistant::db::Database;
use teamsync_assistant::models::*;
use teamsync_assistant::store::*;
use tokio::sync::Notify;
use uuid::Uuid;

/// Wraps a store and counts every call made through it.
struct CountingStore {
    inner: Database,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    fn new(inner: Database) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for CountingStore {
    async fn query(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query).await
    }

    async fn insert(&self, record: NewRecord) -> Result<Uuid, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(record).await
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: &Patch,
    ) -> Result<usize, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let changed = self.inner.update(table, filters, patch).await?;
        self.writes.fetch_add(changed, Ordering::SeqCst);
        Ok(changed)
    }
}

/// Every call fails.
struct BrokenStore;

#[async_trait]
impl DataStore for BrokenStore {
    async fn query(&self, _query: &Query) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Other("connection reset".to_string()))
    }

    async fn insert(&self, _record: NewRecord) -> Result<Uuid, StoreError> {
        Err(StoreError::Other("connection reset".to_string()))
    }

    async fn update(&self, _: Table, _: &[Filter], _: &Patch) -> Result<usize, StoreError> {
        Err(StoreError::Other("connection reset".to_string()))
    }
}

/// Queries block until released.
#[derive(Default)]
struct GatedStore {
    entered: AtomicBool,
    release: Notify,
}

#[async_trait]
impl DataStore for GatedStore {
    async fn query(&self, _query: &Query) -> Result<Vec<Row>, StoreError> {
        self.entered.store(true, Ordering::SeqCst);
        self.release.notified().await;
        Ok(Vec::new())
    }

    async fn insert(&self, _record: NewRecord) -> Result<Uuid, StoreError> {
        Ok(Uuid::new_v4())
    }

    async fn update(&self, _: Table, _: &[Filter], _: &Patch) -> Result<usize, StoreError> {
        Ok(0)
    }
}

fn database() -> Database {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    db
}

fn setup() -> (Assistant, Arc<CountingStore>, Database) {
    let db = database();
    let store = Arc::new(CountingStore::new(db.clone()));
    let assistant = Assistant::new(store.clone(), AssistantConfig::default());
    (assistant, store, db)
}

fn signed_in() -> SessionState {
    SessionState::new(Some(Uuid::new_v4()))
}

/// Submits messages spaced far enough apart to pass the rate gate.
struct Conversation<'a> {
    assistant: &'a Assistant,
    session: SessionState,
    clock: Instant,
}

impl<'a> Conversation<'a> {
    fn new(assistant: &'a Assistant) -> Self {
        Self {
            assistant,
            session: signed_in(),
            clock: Instant::now(),
        }
    }

    async fn say(&mut self, text: &str) -> SubmitOutcome {
        self.clock += Duration::from_secs(2);
        self.assistant
            .submit_at(&mut self.session, text, self.clock)
            .await
    }

    async fn reply(&mut self, text: &str) -> String {
        match self.say(text).await {
            SubmitOutcome::Replied { message } => message,
            other => panic!("expected a reply to {:?}, got {:?}", text, other),
        }
    }
}

fn create_project(db: &Database, title: &str) -> Project {
    db.create_project(CreateProjectInput::new(title))
        .expect("Failed to create project")
}

mod guard {
    use super::*;

    #[tokio::test]
    async fn long_input_is_rejected_without_touching_the_store() {
        let (assistant, store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        let long = format!("list projects {}", "x".repeat(500));
        let message = chat.reply(&long).await;

        assert!(message.starts_with("Message too long."));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn messages_inside_the_interval_are_throttled() {
        let (assistant, store, _db) = setup();
        let mut session = signed_in();
        let start = Instant::now();

        let first = assistant.submit_at(&mut session, "help", start).await;
        assert!(matches!(first, SubmitOutcome::Replied { .. }));

        for offset in [1, 500, 999] {
            let outcome = assistant
                .submit_at(
                    &mut session,
                    "list projects",
                    start + Duration::from_millis(offset),
                )
                .await;
            assert_eq!(
                outcome,
                SubmitOutcome::Rejected {
                    message: "Please wait before sending another message.".to_string()
                }
            );
        }

        assert_eq!(session.transcript().count(Role::Assistant), 1);
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(store.calls(), 0);

        let later = assistant
            .submit_at(&mut session, "list projects", start + Duration::from_millis(1000))
            .await;
        assert!(matches!(later, SubmitOutcome::Replied { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_not_recorded() {
        let (assistant, _store, _db) = setup();
        let mut session = signed_in();

        let outcome = assistant.submit(&mut session, "   ").await;

        assert_eq!(
            outcome,
            SubmitOutcome::Rejected {
                message: "Please type something.".to_string()
            }
        );
        assert!(session.transcript().is_empty());
        assert!(session.last_accepted().is_none());
    }

    #[tokio::test]
    async fn anonymous_sessions_are_asked_to_sign_in() {
        let (assistant, store, _db) = setup();
        let mut session = SessionState::new(None);

        let outcome = assistant.submit(&mut session, "list projects").await;

        assert_eq!(
            outcome.message(),
            Some("Please sign in to use the assistant.")
        );
        assert_eq!(session.transcript().len(), 2);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_assistant_explains_itself() {
        let assistant = Assistant::unconfigured(AssistantConfig::default());
        let mut session = signed_in();

        let outcome = assistant.submit(&mut session, "list projects").await;

        let message = outcome.message().expect("no message");
        assert!(message.contains("TEAMSYNC_DB_PATH"));
        assert!(!assistant.is_configured());
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn create_then_list_round_trip() {
        let (assistant, _store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        let created = chat.reply("create project Launch due 2025-01-31").await;
        assert_eq!(created, "Created project \"Launch\" (due 1/31/2025).");

        let listing = chat.reply("list projects").await;
        assert_eq!(listing, "• Launch (planning) – 0%, due 1/31/2025");
    }

    #[tokio::test]
    async fn created_project_is_managed_by_the_session_user() {
        let (assistant, _store, db) = setup();
        let mut chat = Conversation::new(&assistant);
        let user = chat.session.user_id();

        chat.reply("create project Hiring Plan").await;

        let projects = db.get_all_projects().expect("Query failed");
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].manager_id, user);
        assert!(projects[0].deadline.is_none());
    }

    #[tokio::test]
    async fn create_without_title_writes_nothing() {
        let (assistant, store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("create project due 2025-01-31").await;

        assert_eq!(message, "Please provide a project title.");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn list_with_no_projects() {
        let (assistant, _store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        assert_eq!(chat.reply("list projects").await, "You have no projects yet.");
    }

    #[tokio::test]
    async fn list_shows_at_most_ten_projects() {
        let (assistant, _store, db) = setup();
        for i in 0..12 {
            create_project(&db, &format!("Project {}", i));
        }
        let mut chat = Conversation::new(&assistant);

        let listing = chat.reply("list projects").await;
        assert_eq!(listing.lines().count(), 10);
    }

    #[tokio::test]
    async fn set_status_updates_one_project() {
        let (assistant, _store, db) = setup();
        let project = create_project(&db, "Website Redesign");
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("set status website redesign to active").await;

        assert_eq!(
            message,
            "Updated status of \"website redesign\" to active."
        );
        let found = db.get_project(project.id).expect("Query failed").expect("missing");
        assert_eq!(found.status, ProjectStatus::Active);
    }

    #[tokio::test]
    async fn set_status_for_unknown_project_writes_nothing() {
        let (assistant, store, db) = setup();
        create_project(&db, "Launch");
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("set status Nonexistent Project to active").await;

        assert_eq!(message, "No project found matching \"Nonexistent Project\".");
        assert_eq!(store.writes(), 0);
        let projects = db.get_all_projects().expect("Query failed");
        assert_eq!(projects[0].status, ProjectStatus::Planning);
    }

    #[tokio::test]
    async fn set_status_percent_is_literal() {
        let (assistant, _store, db) = setup();
        let wildcard_victim = create_project(&db, "Foobar");
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("set status Foo% to active").await;

        assert_eq!(message, "No project found matching \"Foo%\".");
        let found = db
            .get_project(wildcard_victim.id)
            .expect("Query failed")
            .expect("missing");
        assert_eq!(found.status, ProjectStatus::Planning);
    }

    #[tokio::test]
    async fn title_match_ignores_accented_case() {
        let (assistant, _store, db) = setup();
        let project = create_project(&db, "Été Plan");
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("set status été plan to active").await;

        assert_eq!(message, "Updated status of \"été plan\" to active.");
        let found = db.get_project(project.id).expect("Query failed").expect("missing");
        assert_eq!(found.status, ProjectStatus::Active);
    }

    #[tokio::test]
    async fn set_status_with_bad_status_gives_usage() {
        let (assistant, store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("set status Launch to shipped").await;

        assert!(message.starts_with("Try: set status"));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn set_progress_clamps_into_range() {
        let (assistant, _store, db) = setup();
        let project = create_project(&db, "Launch");
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("set progress Launch to -5").await;
        assert_eq!(message, "Updated progress of \"Launch\" to 0%.");
        let found = db.get_project(project.id).expect("Query failed").expect("missing");
        assert_eq!(found.progress, 0);

        let message = chat.reply("set progress Launch to 150%").await;
        assert_eq!(message, "Updated progress of \"Launch\" to 100%.");
        let found = db.get_project(project.id).expect("Query failed").expect("missing");
        assert_eq!(found.progress, 100);

        chat.reply("set progress Launch to 42.6").await;
        let found = db.get_project(project.id).expect("Query failed").expect("missing");
        assert_eq!(found.progress, 43);
    }

    #[tokio::test]
    async fn set_progress_on_duplicate_titles_updates_all_and_warns() {
        let (assistant, _store, db) = setup();
        create_project(&db, "Beta Test");
        create_project(&db, "Beta Test");
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("set progress Beta Test to 50").await;

        assert_eq!(
            message,
            "Warning: Updated 2 projects matching \"Beta Test\". Consider using more specific titles."
        );
        for project in db.get_all_projects().expect("Query failed") {
            assert_eq!(project.progress, 50);
        }
    }

    #[tokio::test]
    async fn set_progress_rejects_overlong_titles() {
        let (assistant, store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        let message = chat
            .reply(&format!("set progress {} to 10", "t".repeat(201)))
            .await;

        assert_eq!(message, "Project title must be between 1 and 200 characters.");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn overdue_tasks_lists_open_late_tasks() {
        let (assistant, _store, db) = setup();
        let project = create_project(&db, "Ops");
        let due = Utc::now() - chrono::Duration::days(3);
        let task_input = |title: &str, status| CreateTaskInput {
            title: title.to_string(),
            description: None,
            status: Some(status),
            priority: None,
            due_date: Some(due),
            assigned_to: None,
            created_by: Uuid::new_v4(),
        };
        db.create_task(project.id, task_input("Rotate keys", TaskStatus::InProgress))
            .expect("Failed to create task");
        db.create_task(project.id, task_input("Old migration", TaskStatus::Done))
            .expect("Failed to create task");
        let mut chat = Conversation::new(&assistant);

        let message = chat.reply("any overdue tasks?").await;

        assert_eq!(
            message,
            format!("• Rotate keys – due {} (in_progress)", format_date(due))
        );
    }

    #[tokio::test]
    async fn overdue_tasks_when_none() {
        let (assistant, _store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        assert_eq!(
            chat.reply("overdue tasks").await,
            "No overdue tasks. Great job!"
        );
    }

    #[tokio::test]
    async fn help_and_unrecognized() {
        let (assistant, store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        assert_eq!(chat.reply("help").await, help_text());
        assert_eq!(
            chat.reply("make me a sandwich").await,
            format!("I didn't understand.\n{}", help_text())
        );
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn transcript_records_both_sides() {
        let (assistant, _store, _db) = setup();
        let mut chat = Conversation::new(&assistant);

        chat.reply("  help  ").await;

        let messages = chat.session.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "help");
        assert_eq!(messages[1].role, Role::Assistant);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn store_errors_keep_only_the_user_message() {
        let assistant = Assistant::new(Arc::new(BrokenStore), AssistantConfig::default());
        let mut session = signed_in();

        let outcome = assistant.submit(&mut session, "list projects").await;

        assert_eq!(
            outcome,
            SubmitOutcome::Failed {
                message: "Something went wrong. Please try again.".to_string()
            }
        );
        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn slow_store_times_out_and_frees_the_session() {
        let store = Arc::new(GatedStore::default());
        let config = AssistantConfig {
            request_timeout: Duration::from_millis(50),
            ..AssistantConfig::default()
        };
        let assistant = Assistant::new(store, config);
        let mut session = signed_in();
        let start = Instant::now();

        let outcome = assistant
            .submit_at(&mut session, "list projects", start)
            .await;
        assert!(matches!(outcome, SubmitOutcome::Failed { .. }));
        assert_eq!(session.transcript().count(Role::Assistant), 0);

        let next = assistant
            .submit_at(&mut session, "help", start + Duration::from_secs(2))
            .await;
        assert!(matches!(next, SubmitOutcome::Replied { .. }));
    }
}

mod locked_database {
    use super::*;

    #[tokio::test]
    async fn lock_wait_is_cut_off_by_the_timeout() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("teamsync.db");
        let db = Database::open(path.clone()).expect("Failed to open");
        db.migrate().expect("Failed to migrate");
        create_project(&db, "Launch");

        let locker = rusqlite::Connection::open(&path).expect("Failed to open second connection");
        locker
            .execute_batch("BEGIN EXCLUSIVE;")
            .expect("Failed to lock database");

        let config = AssistantConfig {
            request_timeout: Duration::from_millis(100),
            ..AssistantConfig::default()
        };
        let assistant = Assistant::new(Arc::new(db.clone()), config);
        let mut session = signed_in();
        let start = Instant::now();

        let outcome = assistant
            .submit_at(&mut session, "set status Launch to active", start)
            .await;
        let waited = start.elapsed();

        assert_eq!(
            outcome,
            SubmitOutcome::Failed {
                message: "The data store took too long to answer. Please try again.".to_string()
            }
        );
        assert!(waited < Duration::from_secs(2), "waited {:?}", waited);

        locker.execute_batch("ROLLBACK;").expect("Failed to unlock database");

        let next = assistant
            .submit_at(&mut session, "help", start + Duration::from_secs(2))
            .await;
        assert!(matches!(next, SubmitOutcome::Replied { .. }));
    }
}

mod busy {
    use super::*;

    #[tokio::test]
    async fn submissions_while_busy_are_ignored() {
        let store = Arc::new(GatedStore::default());
        let assistant = Arc::new(Assistant::new(store.clone(), AssistantConfig::default()));
        let handle = SessionHandle::new(signed_in());

        let running = {
            let handle = handle.clone();
            let assistant = assistant.clone();
            tokio::spawn(async move { handle.submit(&assistant, "list projects").await })
        };
        while !store.entered.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let ignored = handle.submit(&assistant, "help").await;
        assert_eq!(ignored, SubmitOutcome::Ignored);

        store.release.notify_one();
        let finished = running.await.expect("task panicked");
        assert_eq!(
            finished,
            SubmitOutcome::Replied {
                message: "You have no projects yet.".to_string()
            }
        );

        let messages = handle.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.content != "help"));
    }
}
