use crate::config::Config;
use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub struct Database {
    pub conn: Mutex<Connection>,
    config: Config,
}

impl Database {
    pub fn open(config: Config) -> Result<Self> {
        if let Some(dir) = config.database_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    Error::internal(format!("failed to create database directory {}: {e}", dir.display()))
                })?;
            }
        }

        let conn = Connection::open(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "opened database");
        Self::with_connection(conn, config)
    }

    pub fn open_in_memory(config: Config) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: Config) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Database {
            conn: Mutex::new(conn),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "
            -- Catalog
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pricelist_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category_id INTEGER NOT NULL,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                price TEXT NOT NULL,
                item_type TEXT NOT NULL,
                is_available INTEGER NOT NULL DEFAULT 1,
                tracks_stock INTEGER NOT NULL DEFAULT 0,
                current_stock INTEGER CHECK (current_stock IS NULL OR current_stock >= 0),
                initial_stock INTEGER,
                low_stock_threshold INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (
                    (tracks_stock = 1 AND current_stock IS NOT NULL AND initial_stock IS NOT NULL)
                    OR (tracks_stock = 0 AND current_stock IS NULL AND low_stock_threshold IS NULL)
                ),
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );

            -- People and resources the core only checks for existence
            CREATE TABLE IF NOT EXISTS staff (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                phone_number TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS game_tables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                capacity INTEGER,
                hourly_rate TEXT,
                created_at TEXT NOT NULL
            );

            -- Stock ledger. Rows are append-only.
            CREATE TABLE IF NOT EXISTS inventory_movements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pricelist_item_id INTEGER NOT NULL,
                staff_id INTEGER,
                movement_type TEXT NOT NULL,
                quantity_changed INTEGER NOT NULL,
                reason TEXT,
                movement_date TEXT NOT NULL,
                FOREIGN KEY (pricelist_item_id) REFERENCES pricelist_items(id),
                FOREIGN KEY (staff_id) REFERENCES staff(id)
            );

            CREATE TRIGGER IF NOT EXISTS inventory_movements_no_update
            BEFORE UPDATE ON inventory_movements
            BEGIN
                SELECT RAISE(ABORT, 'inventory movements are append-only');
            END;

            CREATE TRIGGER IF NOT EXISTS inventory_movements_no_delete
            BEFORE DELETE ON inventory_movements
            BEGIN
                SELECT RAISE(ABORT, 'inventory movements are append-only');
            END;

            -- Bookings
            CREATE TABLE IF NOT EXISTS bookings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER,
                table_id INTEGER NOT NULL,
                staff_id INTEGER,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                number_of_guests INTEGER,
                status TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK (end_time > start_time),
                FOREIGN KEY (client_id) REFERENCES clients(id),
                FOREIGN KEY (table_id) REFERENCES game_tables(id),
                FOREIGN KEY (staff_id) REFERENCES staff(id)
            );

            CREATE INDEX IF NOT EXISTS bookings_table_window
                ON bookings (table_id, start_time, end_time);

            CREATE TRIGGER IF NOT EXISTS bookings_no_overlap_insert
            BEFORE INSERT ON bookings
            WHEN NEW.status IN ('confirmed', 'checked-in')
            BEGIN
                SELECT RAISE(ABORT, 'booking_overlap')
                WHERE EXISTS (
                    SELECT 1 FROM bookings b
                    WHERE b.table_id = NEW.table_id
                      AND b.status IN ('confirmed', 'checked-in')
                      AND b.start_time < NEW.end_time
                      AND b.end_time > NEW.start_time
                );
            END;

            CREATE TRIGGER IF NOT EXISTS bookings_no_overlap_update
            BEFORE UPDATE OF table_id, start_time, end_time, status ON bookings
            WHEN NEW.status IN ('confirmed', 'checked-in')
            BEGIN
                SELECT RAISE(ABORT, 'booking_overlap')
                WHERE EXISTS (
                    SELECT 1 FROM bookings b
                    WHERE b.id != NEW.id
                      AND b.table_id = NEW.table_id
                      AND b.status IN ('confirmed', 'checked-in')
                      AND b.start_time < NEW.end_time
                      AND b.end_time > NEW.start_time
                );
            END;

            -- Orders
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER,
                booking_id INTEGER,
                staff_id INTEGER,
                table_id INTEGER,
                order_time TEXT NOT NULL,
                status TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                discount_amount TEXT NOT NULL,
                final_amount TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (client_id) REFERENCES clients(id),
                FOREIGN KEY (booking_id) REFERENCES bookings(id),
                FOREIGN KEY (staff_id) REFERENCES staff(id),
                FOREIGN KEY (table_id) REFERENCES game_tables(id)
            );

            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                pricelist_item_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                unit_price TEXT NOT NULL,
                total_price TEXT NOT NULL,
                notes TEXT,
                FOREIGN KEY (order_id) REFERENCES orders(id),
                FOREIGN KEY (pricelist_item_id) REFERENCES pricelist_items(id)
            );
            ",
        )?;

        // Columns added after the first release (pass connection to avoid deadlock)
        Self::migrate_conn(&conn)?;

        Ok(())
    }

    fn migrate_conn(conn: &Connection) -> Result<()> {
        ensure_column(conn, "orders", "payment_method", "TEXT")?;
        ensure_column(conn, "bookings", "total_price", "TEXT")?;
        Ok(())
    }

    /// A panic inside `write` drops its transaction, which rolls back, so a
    /// poisoned lock still guards a consistent connection.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering poisoned database connection lock");
            self.conn.clear_poison();
            poisoned.into_inner()
        }))
    }

    /// Run read-only work against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits when `f` succeeds. On error the transaction is dropped, which rolls
    /// back every write made inside it.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn ensure_column(conn: &Connection, table: &str, column: &str, ddl: &str) -> Result<()> {
    let columns: Vec<String> = conn
        .prepare(&format!("PRAGMA table_info({table})"))?
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .collect();

    if !columns.iter().any(|c| c == column) {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl}"), [])?;
    }
    Ok(())
}
