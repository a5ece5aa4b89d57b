// ABOUTME: Integration tests for table export and import against SQLite files
// ABOUTME: Covers round-trips, ordering, atomicity, idempotency and the import protocol

use anyhow::{bail, Result};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tsvio::backend::{RowVisitor, TransferBackend};
use tsvio::schema::{self, TableSchema};
use tsvio::sqlite::backend::SqliteBackend;
use tsvio::transfer::{export_table, import_table, ImportProgress, NoProgress, SelectionOptions};

const SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT,
        created TEXT,
        modified TEXT
    );
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        author_id INTEGER REFERENCES users(id),
        title TEXT NOT NULL,
        body TEXT
    );
    PRAGMA foreign_keys = ON;
";

fn setup_db(dir: &TempDir) -> SqliteBackend {
    let conn = rusqlite::Connection::open(dir.path().join("app.db")).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    SqliteBackend::new(conn)
}

fn seed_users(db: &SqliteBackend) {
    // Inserted out of key order on purpose
    db.connection()
        .execute_batch(
            "INSERT INTO users VALUES (3, 'Carol', 'carol@example.com', '2024-01-03', NULL);
             INSERT INTO users VALUES (1, 'Alice\tA.', NULL, '2024-01-01', '2024-02-01');
             INSERT INTO users VALUES (2, 'Bob
Builder', 'bob@example.com', '2024-01-02', NULL);",
        )
        .unwrap();
}

fn users(db: &SqliteBackend) -> Vec<(i64, String, Option<String>)> {
    let mut stmt = db
        .connection()
        .prepare("SELECT id, name, email FROM users ORDER BY id")
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

fn count(db: &SqliteBackend, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
}

fn write_file(path: &Path, lines: &[&str]) {
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_schema_reflects_live_table() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);

    assert_eq!(
        schema::columns(&mut db, "users").await.unwrap(),
        vec!["id", "name", "email", "created", "modified"]
    );
    assert_eq!(schema::primary_key(&mut db, "users").await.unwrap(), vec!["id"]);

    // No caching: a column added after the first call shows up
    db.connection()
        .execute_batch("ALTER TABLE users ADD COLUMN nickname TEXT")
        .unwrap();
    let columns = schema::columns(&mut db, "users").await.unwrap();
    assert_eq!(columns.last().map(String::as_str), Some("nickname"));

    let err = schema::columns(&mut db, "ghosts").await.unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
}

#[tokio::test]
async fn test_export_writes_header_and_sorted_rows() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let path = dir.path().join("users.txt");

    let summary = export_table(&mut db, "users", &path, &SelectionOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.fields, 2);

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        "id\tname\temail\n\
         1\tAlice\\tA.\t\\N\n\
         2\tBob\\nBuilder\tbob@example.com\n\
         3\tCarol\tcarol@example.com\n"
    );
}

#[tokio::test]
async fn test_export_no_fields_writes_only_keys() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let path = dir.path().join("users.txt");

    export_table(&mut db, "users", &path, &SelectionOptions::key_only())
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "id\n1\n2\n3\n");
}

#[tokio::test]
async fn test_export_unknown_field_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let path = dir.path().join("users.txt");
    fs::write(&path, "previous contents\n").unwrap();

    let err = export_table(&mut db, "users", &path, &SelectionOptions::with_fields("nickname"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    assert_eq!(fs::read_to_string(&path).unwrap(), "previous contents\n");
}

#[tokio::test]
async fn test_export_missing_table_is_schema_error() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    let path = dir.path().join("ghosts.txt");

    let err = export_table(&mut db, "ghosts", &path, &SelectionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    assert_eq!(err.table(), "ghosts");
    assert!(!path.exists());
}

#[tokio::test]
async fn test_round_trip_restores_rows() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let before = users(&db);
    let path = dir.path().join("users.txt");

    export_table(&mut db, "users", &path, &SelectionOptions::default())
        .await
        .unwrap();
    db.connection().execute_batch("DELETE FROM users").unwrap();

    let summary = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.deleted, 0);
    assert_eq!(users(&db), before);
}

#[tokio::test]
async fn test_import_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    let path = dir.path().join("users.txt");
    write_file(&path, &["id\tname\temail", "1\tAlice\t\\N", "2\tBob\tbob@example.com"]);

    import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap();
    let first = users(&db);

    let summary = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.deleted, 2);
    assert_eq!(users(&db), first);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
async fn test_import_field_count_mismatch_rolls_back() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let before = users(&db);
    let path = dir.path().join("users.txt");

    let mut lines = vec!["id\tname\temail".to_string()];
    for id in 10..22 {
        lines.push(format!("{}\tuser{}\tu{}@example.com", id, id, id));
    }
    lines.push("22\tbroken".to_string());
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_file(&path, &refs);

    let err = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "FormatError");
    assert!(err.to_string().contains("line 14"), "{}", err);

    assert_eq!(users(&db), before);
    assert!(db.foreign_keys_enabled().unwrap());
}

#[tokio::test]
async fn test_import_insert_failure_rolls_back() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let before = users(&db);
    let path = dir.path().join("users.txt");
    // NULL name violates NOT NULL on the second record
    write_file(&path, &["id\tname", "1\tAlice", "2\t\\N", "3\tCarol"]);

    let err = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "PersistenceError");
    assert!(err.to_string().contains("line 3"), "{}", err);

    assert_eq!(users(&db), before);
    assert!(db.foreign_keys_enabled().unwrap());
}

#[tokio::test]
async fn test_import_unknown_header_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let path = dir.path().join("users.txt");
    write_file(&path, &["id\tname\tnickname", "1\tAlice\tAl"]);

    let err = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    assert_eq!(count(&db, "users"), 3);
}

#[tokio::test]
async fn test_import_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);

    let err = import_table(&mut db, "users", &dir.path().join("users.txt"), &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "IOError");
}

#[tokio::test]
async fn test_import_ignores_foreign_keys_during_load() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    let path = dir.path().join("posts.txt");
    // Author 42 does not exist yet; users would be loaded afterwards
    write_file(&path, &["id\tauthor\ttitle", "1\t42\tHello"]);

    import_table(&mut db, "posts", &path, &mut NoProgress)
        .await
        .unwrap();

    let author: i64 = db
        .connection()
        .query_row("SELECT author_id FROM posts WHERE id = 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(author, 42);
    assert!(db.foreign_keys_enabled().unwrap());
}

#[tokio::test]
async fn test_relation_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    db.connection()
        .execute_batch(
            "INSERT INTO posts VALUES (2, 3, 'Second', NULL);
             INSERT INTO posts VALUES (1, 1, 'First', 'body');",
        )
        .unwrap();
    let path = dir.path().join("posts.txt");

    export_table(&mut db, "posts", &path, &SelectionOptions::default())
        .await
        .unwrap();
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        "id\tauthor_id\ttitle\tbody\tauthor\n\
         1\t1\tFirst\tbody\t1\n\
         2\t3\tSecond\t\\N\t3\n"
    );

    let summary = import_table(&mut db, "posts", &path, &mut NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(count(&db, "posts"), 2);
}

#[tokio::test]
async fn test_empty_string_key_round_trips() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    db.connection()
        .execute_batch(
            "CREATE TABLE codes (code TEXT PRIMARY KEY);
             INSERT INTO codes VALUES ('a'), ('');",
        )
        .unwrap();
    let path = dir.path().join("codes.txt");

    export_table(&mut db, "codes", &path, &SelectionOptions::key_only())
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "code\n\na\n");

    let summary = import_table(&mut db, "codes", &path, &mut NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.rows, 2);

    let empty: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM codes WHERE code = ''", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(empty, 1);
    assert_eq!(count(&db, "codes"), 2);
}

#[tokio::test]
async fn test_import_blank_line_inside_body_is_format_error() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let before = users(&db);
    let path = dir.path().join("users.txt");
    write_file(&path, &["id\tname", "1\tAlice", "", "2\tBob"]);

    let err = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "FormatError");
    assert!(err.to_string().contains("line 3"), "{}", err);
    assert_eq!(users(&db), before);
}

#[tokio::test]
async fn test_import_invalid_utf8_is_format_error() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    seed_users(&db);
    let before = users(&db);
    let path = dir.path().join("users.txt");
    fs::write(&path, b"id\tname\n1\tAlice\n2\tB\xe9b\n").unwrap();

    let err = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "FormatError");
    assert!(err.to_string().contains("line 3"), "{}", err);
    assert_eq!(users(&db), before);
    assert!(db.foreign_keys_enabled().unwrap());
}

#[tokio::test]
async fn test_export_composite_key_orders_ties_by_later_keys() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    // The index on (post_id, pos) would hand rows back in pos order
    db.connection()
        .execute_batch(
            "CREATE TABLE posts_tags (
                 post_id INTEGER,
                 tag_id INTEGER,
                 pos INTEGER,
                 PRIMARY KEY (post_id, tag_id)
             ) WITHOUT ROWID;
             CREATE INDEX posts_tags_pos ON posts_tags (post_id, pos);
             INSERT INTO posts_tags VALUES (2, 1, 1), (1, 3, 1), (1, 1, 2), (1, 2, 3);",
        )
        .unwrap();
    let path = dir.path().join("posts_tags.txt");

    export_table(&mut db, "posts_tags", &path, &SelectionOptions::default())
        .await
        .unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "post_id\ttag_id\tpos\n\
         1\t1\t2\n\
         1\t2\t3\n\
         1\t3\t1\n\
         2\t1\t1\n"
    );
}

#[derive(Default)]
struct CountingProgress {
    ticks: Vec<u64>,
    finished: Option<u64>,
}

impl ImportProgress for CountingProgress {
    fn records_saved(&mut self, count: u64) {
        self.ticks.push(count);
    }

    fn finished(&mut self, count: u64) {
        self.finished = Some(count);
    }
}

#[tokio::test]
async fn test_progress_every_tenth_record() {
    let dir = TempDir::new().unwrap();
    let mut db = setup_db(&dir);
    let path = dir.path().join("users.txt");

    let mut lines = vec!["id\tname".to_string()];
    for id in 1..=25 {
        lines.push(format!("{}\tuser{}", id, id));
    }
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_file(&path, &refs);

    let mut progress = CountingProgress::default();
    import_table(&mut db, "users", &path, &mut progress)
        .await
        .unwrap();
    assert_eq!(progress.ticks, vec![10, 20]);
    assert_eq!(progress.finished, Some(25));
}

/// Backend wrapper recording the order of calls, with injectable failures
struct Recorder {
    inner: SqliteBackend,
    calls: Vec<String>,
    inserts: usize,
    fail_insert_at: Option<usize>,
    fail_commit: bool,
}

impl Recorder {
    fn new(inner: SqliteBackend) -> Self {
        Self {
            inner,
            calls: Vec::new(),
            inserts: 0,
            fail_insert_at: None,
            fail_commit: false,
        }
    }
}

impl TransferBackend for Recorder {
    fn engine(&self) -> &'static str {
        self.inner.engine()
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableSchema> {
        self.inner.describe_table(table).await
    }

    async fn scan_ordered(
        &mut self,
        table: &str,
        columns: &[String],
        order_by: &[String],
        visit: &mut RowVisitor<'_>,
    ) -> Result<u64> {
        self.inner.scan_ordered(table, columns, order_by, visit).await
    }

    async fn set_referential_integrity(&mut self, enabled: bool) -> Result<()> {
        self.calls.push(format!("integrity({})", enabled));
        self.inner.set_referential_integrity(enabled).await
    }

    async fn begin(&mut self) -> Result<()> {
        self.calls.push("begin".into());
        self.inner.begin().await
    }

    async fn commit(&mut self) -> Result<()> {
        self.calls.push("commit".into());
        if self.fail_commit {
            bail!("simulated commit failure");
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.calls.push("rollback".into());
        self.inner.rollback().await
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64> {
        self.calls.push("delete".into());
        self.inner.delete_all(table).await
    }

    async fn insert_row(
        &mut self,
        table: &str,
        columns: &[String],
        values: &[Option<String>],
    ) -> Result<()> {
        self.inserts += 1;
        self.calls.push("insert".into());
        if self.fail_insert_at == Some(self.inserts) {
            bail!("simulated insert failure");
        }
        self.inner.insert_row(table, columns, values).await
    }
}

fn calls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_import_protocol_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.txt");
    write_file(&path, &["id\tname", "1\tAlice", "2\tBob"]);
    let mut db = Recorder::new(setup_db(&dir));

    import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap();
    assert_eq!(
        db.calls,
        calls(&[
            "integrity(false)",
            "begin",
            "delete",
            "insert",
            "insert",
            "integrity(true)",
            "commit",
        ])
    );
}

#[tokio::test]
async fn test_import_failure_at_record_k_restores_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.txt");
    write_file(&path, &["id\tname", "1\tAlice", "2\tBob", "3\tCarol"]);
    let mut db = Recorder::new(setup_db(&dir));
    seed_users(&db.inner);
    let before = users(&db.inner);
    db.fail_insert_at = Some(2);

    let err = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "PersistenceError");
    assert_eq!(
        db.calls,
        calls(&[
            "integrity(false)",
            "begin",
            "delete",
            "insert",
            "insert",
            "rollback",
            "integrity(true)",
        ])
    );
    assert_eq!(users(&db.inner), before);
    assert!(db.inner.foreign_keys_enabled().unwrap());
}

#[tokio::test]
async fn test_commit_failure_rolls_back_and_restores_integrity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.txt");
    write_file(&path, &["id\tname", "9\tZed"]);
    let mut db = Recorder::new(setup_db(&dir));
    seed_users(&db.inner);
    let before = users(&db.inner);
    db.fail_commit = true;

    let err = import_table(&mut db, "users", &path, &mut NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "PersistenceError");
    assert_eq!(
        db.calls,
        calls(&[
            "integrity(false)",
            "begin",
            "delete",
            "insert",
            "integrity(true)",
            "commit",
            "rollback",
            "integrity(true)",
        ])
    );
    assert_eq!(users(&db.inner), before);
    assert!(db.inner.foreign_keys_enabled().unwrap());
}
