pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod money;
pub mod telemetry;


pub use config::Config;
pub use db::Database;
pub use error::{Error, ErrorKind, Result};
pub use money::Money;

/// Open the configured database and bring its schema up to date.
pub fn open(config: Config) -> Result<Database> {
    let db = Database::open(config)?;
    db.initialize()?;
    Ok(db)
}
