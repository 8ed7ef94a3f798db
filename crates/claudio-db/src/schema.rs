use rusqlite::Connection;

/// Current schema version. Bump this when adding migrations.
pub const CURRENT_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    // Create base tables (idempotent)
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    migrate(conn)?;
    Ok(())
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version = current_version(conn)?;

    if version < 1 {
        // v1 is the base schema; record it so later migrations can build on it.
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            [CURRENT_VERSION],
        )?;
        log::info!("database schema initialized at version {CURRENT_VERSION}");
    }

    Ok(())
}
