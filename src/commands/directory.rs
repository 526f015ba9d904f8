//! Existence checks for the records orders and bookings point at, plus the
//! thin registration calls used to populate them.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Client, CreateGameTable, GameTable, Staff};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;

/// Lookup seam for clients, staff, tables and bookings.
pub trait Directory {
    fn staff_exists(&self, id: i64) -> Result<bool>;
    fn client_exists(&self, id: i64) -> Result<bool>;
    fn table_exists(&self, id: i64) -> Result<bool>;
    fn booking_exists(&self, id: i64) -> Result<bool>;

    fn require_staff(&self, id: i64) -> Result<()> {
        require(self.staff_exists(id)?, "staff member", id)
    }

    fn require_client(&self, id: i64) -> Result<()> {
        require(self.client_exists(id)?, "client", id)
    }

    fn require_table(&self, id: i64) -> Result<()> {
        require(self.table_exists(id)?, "table", id)
    }

    fn require_booking(&self, id: i64) -> Result<()> {
        require(self.booking_exists(id)?, "booking", id)
    }
}

fn require(found: bool, entity: &'static str, id: i64) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(Error::not_found(entity, id))
    }
}

fn exists(conn: &Connection, table: &str, id: i64) -> Result<bool> {
    let found = conn
        .query_row(&format!("SELECT 1 FROM {table} WHERE id = ?1"), [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Store-backed lookups; a `Transaction` derefs to this.
impl Directory for Connection {
    fn staff_exists(&self, id: i64) -> Result<bool> {
        exists(self, "staff", id)
    }

    fn client_exists(&self, id: i64) -> Result<bool> {
        exists(self, "clients", id)
    }

    fn table_exists(&self, id: i64) -> Result<bool> {
        exists(self, "game_tables", id)
    }

    fn booking_exists(&self, id: i64) -> Result<bool> {
        exists(self, "bookings", id)
    }
}

/// Fixed directory, handy where no store is involved.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    pub staff: HashSet<i64>,
    pub clients: HashSet<i64>,
    pub tables: HashSet<i64>,
    pub bookings: HashSet<i64>,
}

impl Directory for InMemoryDirectory {
    fn staff_exists(&self, id: i64) -> Result<bool> {
        Ok(self.staff.contains(&id))
    }

    fn client_exists(&self, id: i64) -> Result<bool> {
        Ok(self.clients.contains(&id))
    }

    fn table_exists(&self, id: i64) -> Result<bool> {
        Ok(self.tables.contains(&id))
    }

    fn booking_exists(&self, id: i64) -> Result<bool> {
        Ok(self.bookings.contains(&id))
    }
}

pub fn create_staff(db: &Database, name: &str) -> Result<Staff> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("staff name cannot be empty"));
    }
    let now = Utc::now();
    db.write(|tx| {
        tx.execute(
            "INSERT INTO staff (name, created_at) VALUES (?1, ?2)",
            rusqlite::params![name, now],
        )?;
        Ok(Staff {
            id: tx.last_insert_rowid(),
            name: name.to_string(),
            created_at: now,
        })
    })
}

pub fn create_client(db: &Database, full_name: &str, phone_number: Option<&str>) -> Result<Client> {
    let full_name = full_name.trim();
    if full_name.is_empty() {
        return Err(Error::validation("client name cannot be empty"));
    }
    let now = Utc::now();
    db.write(|tx| {
        tx.execute(
            "INSERT INTO clients (full_name, phone_number, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![full_name, phone_number, now],
        )?;
        Ok(Client {
            id: tx.last_insert_rowid(),
            full_name: full_name.to_string(),
            phone_number: phone_number.map(str::to_string),
            created_at: now,
        })
    })
}

pub fn create_table(db: &Database, table: CreateGameTable) -> Result<GameTable> {
    let name = table.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("table name cannot be empty"));
    }
    if let Some(rate) = table.hourly_rate {
        if rate.is_negative() {
            return Err(Error::validation("hourly rate cannot be negative"));
        }
    }
    let now = Utc::now();
    db.write(|tx| {
        tx.execute(
            "INSERT INTO game_tables (name, capacity, hourly_rate, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![name, table.capacity, table.hourly_rate, now],
        )?;
        Ok(GameTable {
            id: tx.last_insert_rowid(),
            name,
            capacity: table.capacity,
            hourly_rate: table.hourly_rate,
            created_at: now,
        })
    })
}

pub(crate) fn get_table(conn: &Connection, id: i64) -> Result<GameTable> {
    conn.query_row(
        "SELECT id, name, capacity, hourly_rate, created_at FROM game_tables WHERE id = ?1",
        [id],
        |row| {
            Ok(GameTable {
                id: row.get(0)?,
                name: row.get(1)?,
                capacity: row.get(2)?,
                hourly_rate: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::not_found("table", id))
}
