use rusqlite::{params, Connection, OptionalExtension};

pub fn get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
    Ok(())
}

/// Set `key` to `value`, or remove it when `value` is `None`.
pub fn put(conn: &Connection, key: &str, value: Option<&str>) -> rusqlite::Result<()> {
    match value {
        Some(value) => set(conn, key, value),
        None => delete(conn, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_overwrite() {
        let conn = crate::open_in_memory().unwrap();
        assert_eq!(get(&conn, "theme").unwrap(), None);

        set(&conn, "theme", "amber").unwrap();
        assert_eq!(get(&conn, "theme").unwrap().as_deref(), Some("amber"));

        set(&conn, "theme", "glass").unwrap();
        assert_eq!(get(&conn, "theme").unwrap().as_deref(), Some("glass"));
    }

    #[test]
    fn test_put_none_deletes() {
        let conn = crate::open_in_memory().unwrap();
        put(&conn, "k", Some("v")).unwrap();
        put(&conn, "k", None).unwrap();
        assert_eq!(get(&conn, "k").unwrap(), None);

        // Deleting a missing key is fine.
        delete(&conn, "missing").unwrap();
    }
}
