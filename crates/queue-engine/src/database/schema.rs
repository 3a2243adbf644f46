//! Database schema definitions for the queue
//!
//! Tables:
//! - `responsibilities`: service types and their priority weight
//! - `employees`, `workstations` and their responsibility bindings
//! - `queue`: live tickets
//! - `clients_log`: completed tickets
//! - `escalation_tiers`, `escalation_recipients`: long-wait escalation setup
//!
//! Ticket ids come from an `AUTOINCREMENT` key so a number is never handed out
//! twice until the sequence is explicitly restarted.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;

const TABLES: &[(&str, &str)] = &[
    (
        "responsibilities",
        r#"
        CREATE TABLE IF NOT EXISTS responsibilities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            priority INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "employees",
        r#"
        CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            second_name TEXT NOT NULL,
            status INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "workstations",
        r#"
        CREATE TABLE IF NOT EXISTS workstations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            employee_id INTEGER REFERENCES employees(id) ON DELETE SET NULL
        )
        "#,
    ),
    (
        "employee_responsibilities",
        r#"
        CREATE TABLE IF NOT EXISTS employee_responsibilities (
            employee_id INTEGER NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
            responsibility_id INTEGER NOT NULL REFERENCES responsibilities(id) ON DELETE CASCADE,
            PRIMARY KEY (employee_id, responsibility_id)
        )
        "#,
    ),
    (
        "workstation_responsibilities",
        r#"
        CREATE TABLE IF NOT EXISTS workstation_responsibilities (
            workstation_id INTEGER NOT NULL REFERENCES workstations(id) ON DELETE CASCADE,
            responsibility_id INTEGER NOT NULL REFERENCES responsibilities(id) ON DELETE CASCADE,
            PRIMARY KEY (workstation_id, responsibility_id)
        )
        "#,
    ),
    (
        "queue",
        r#"
        CREATE TABLE IF NOT EXISTS queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            priority INTEGER NOT NULL,
            service_type TEXT NOT NULL,
            workstation_id INTEGER,
            status INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            call_time INTEGER,
            confirm_time INTEGER,
            quality INTEGER
        )
        "#,
    ),
    (
        "clients_log",
        r#"
        CREATE TABLE IF NOT EXISTS clients_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id INTEGER NOT NULL,
            priority INTEGER NOT NULL,
            service_type TEXT NOT NULL,
            workstation_id INTEGER,
            status INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            call_time INTEGER,
            confirm_time INTEGER,
            end_time INTEGER NOT NULL,
            quality INTEGER,
            employee_id INTEGER,
            employee_first_name TEXT,
            employee_second_name TEXT,
            workstation_name TEXT
        )
        "#,
    ),
    (
        "escalation_tiers",
        r#"
        CREATE TABLE IF NOT EXISTS escalation_tiers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            threshold_secs INTEGER NOT NULL,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "escalation_recipients",
        r#"
        CREATE TABLE IF NOT EXISTS escalation_recipients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL,
            tier_id INTEGER NOT NULL REFERENCES escalation_tiers(id) ON DELETE CASCADE
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_queue_status ON queue(status, id)",
    "CREATE INDEX IF NOT EXISTS idx_queue_workstation ON queue(workstation_id)",
    "CREATE INDEX IF NOT EXISTS idx_clients_log_ticket ON clients_log(ticket_id)",
    "CREATE INDEX IF NOT EXISTS idx_recipients_tier ON escalation_recipients(tier_id)",
];

/// Create every table and index that does not exist yet
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    debug!("📋 Creating queue database schema");

    for (name, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
        debug!("✅ {} table ready", name);
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}
