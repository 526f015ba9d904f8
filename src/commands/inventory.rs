//! Stock ledger.
//!
//! `current_stock` on a tracked item always equals its `initial_stock` plus the
//! sum of its movements. Every stock change goes through [`post`], which pairs
//! the counter update with exactly one movement row inside the caller's
//! transaction.

use crate::commands::directory::Directory;
use crate::commands::{catalog, page_bounds, Conditions};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    CreateMovement, InventoryMovement, MovementFilters, MovementKind, NewMovement, Page,
    PageRequest, StockAudit,
};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction};

/// Add `delta` to a tracked item's stock and return the new level.
///
/// Does not write the movement row; use [`post`] unless the caller records it itself.
pub fn adjust_stock(tx: &Transaction<'_>, item_id: i64, delta: i64) -> Result<i64> {
    let updated: Option<i64> = tx
        .query_row(
            "UPDATE pricelist_items
             SET current_stock = current_stock + ?1, updated_at = ?2
             WHERE id = ?3 AND tracks_stock = 1 AND current_stock + ?1 >= 0
             RETURNING current_stock",
            rusqlite::params![delta, Utc::now(), item_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(stock) = updated {
        return Ok(stock);
    }

    // Nothing matched: work out why.
    let item = catalog::price_and_stock(tx, item_id)?;
    if !item.tracks_stock {
        return Err(Error::ItemNotTracked(item_id));
    }
    Err(Error::InsufficientStock {
        item_id,
        name: item.name,
        requested: -delta,
        available: item.current_stock.unwrap_or(0),
    })
}

pub fn record_movement(tx: &Transaction<'_>, movement: &NewMovement) -> Result<i64> {
    tx.execute(
        "INSERT INTO inventory_movements
             (pricelist_item_id, staff_id, movement_type, quantity_changed, reason, movement_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            movement.pricelist_item_id,
            movement.staff_id,
            movement.kind,
            movement.delta,
            movement.reason,
            Utc::now()
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Apply `movement.delta` to stock and append the matching ledger row.
/// Returns the id of the movement.
pub fn post(tx: &Transaction<'_>, movement: &NewMovement) -> Result<i64> {
    if movement.delta == 0 {
        return Err(Error::validation("stock movement must change the quantity"));
    }
    let stock = adjust_stock(tx, movement.pricelist_item_id, movement.delta)?;
    let id = record_movement(tx, movement)?;
    tracing::debug!(
        item_id = movement.pricelist_item_id,
        kind = %movement.kind,
        delta = movement.delta,
        stock,
        "stock posted"
    );
    Ok(id)
}

/// Staff-entered purchase or correction.
#[tracing::instrument(skip(db, request), fields(item_id = request.pricelist_item_id))]
pub fn create_movement(
    db: &Database,
    request: CreateMovement,
    acting_staff_id: i64,
) -> Result<InventoryMovement> {
    let kind: MovementKind = request.movement_type.parse()?;
    if !kind.is_manual() {
        return Err(Error::validation(format!(
            "movement type '{kind}' is recorded automatically and cannot be entered by hand"
        )));
    }
    if request.quantity <= 0 {
        return Err(Error::validation("quantity must be positive"));
    }

    let id = db
        .write(|tx| {
            tx.require_staff(acting_staff_id)?;
            post(
                tx,
                &NewMovement {
                    pricelist_item_id: request.pricelist_item_id,
                    staff_id: Some(acting_staff_id),
                    kind,
                    delta: kind.sign() * request.quantity,
                    reason: request.reason.clone(),
                },
            )
        })
        .map_err(|e| {
            if e.kind() == crate::error::ErrorKind::Conflict {
                tracing::warn!(error = %e, "manual stock movement rejected");
            }
            e
        })?;

    db.read(|conn| get_movement(conn, id))
}

const MOVEMENT_SELECT: &str = "
    SELECT im.id, im.pricelist_item_id, pi.name, im.staff_id, s.name, im.movement_type,
           im.quantity_changed, im.reason, im.movement_date
    FROM inventory_movements im
    JOIN pricelist_items pi ON im.pricelist_item_id = pi.id
    LEFT JOIN staff s ON im.staff_id = s.id";

fn movement_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InventoryMovement> {
    Ok(InventoryMovement {
        id: row.get(0)?,
        pricelist_item_id: row.get(1)?,
        item_name: row.get(2)?,
        staff_id: row.get(3)?,
        staff_name: row.get(4)?,
        movement_type: row.get(5)?,
        quantity_changed: row.get(6)?,
        reason: row.get(7)?,
        movement_date: row.get(8)?,
    })
}

pub fn get_movement(conn: &Connection, id: i64) -> Result<InventoryMovement> {
    conn.query_row(
        &format!("{MOVEMENT_SELECT} WHERE im.id = ?1"),
        [id],
        movement_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("inventory movement", id))
}

/// Newest first.
pub fn list_movements(
    db: &Database,
    filters: &MovementFilters,
    page: PageRequest,
) -> Result<Page<InventoryMovement>> {
    let mut conditions = Conditions::default();
    if let Some(item_id) = filters.pricelist_item_id {
        conditions.push("im.pricelist_item_id =", item_id);
    }
    if let Some(staff_id) = filters.staff_id {
        conditions.push("im.staff_id =", staff_id);
    }
    if let Some(kind) = filters.movement_type.as_deref().filter(|k| !k.is_empty()) {
        let kind: MovementKind = kind.parse()?;
        conditions.push("im.movement_type =", kind.as_str().to_string());
    }
    let where_clause = conditions.where_clause();
    let (page, page_size, offset) = page_bounds(db, page);

    db.read(|conn| {
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM inventory_movements im{where_clause}"),
            rusqlite::params_from_iter(conditions.args()),
            |row| row.get(0),
        )?;

        let limit = conditions.limit(page_size, offset);
        let mut stmt = conn.prepare(&format!(
            "{MOVEMENT_SELECT}{where_clause} ORDER BY im.movement_date DESC, im.id DESC{limit}"
        ))?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(conditions.args()), movement_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    })
}

/// Compare a tracked item's stock with its ledger.
pub fn audit_item(db: &Database, item_id: i64) -> Result<StockAudit> {
    db.read(|conn| {
        let item = catalog::price_and_stock(conn, item_id)?;
        if !item.tracks_stock {
            return Err(Error::ItemNotTracked(item_id));
        }
        let (initial_stock, current_stock): (i64, i64) = conn.query_row(
            "SELECT initial_stock, current_stock FROM pricelist_items WHERE id = ?1",
            [item_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let movement_total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(quantity_changed), 0) FROM inventory_movements WHERE pricelist_item_id = ?1",
            [item_id],
            |row| row.get(0),
        )?;

        let audit = StockAudit {
            pricelist_item_id: item_id,
            initial_stock,
            movement_total,
            current_stock,
        };
        if !audit.is_consistent() {
            tracing::error!(?audit, "stock ledger out of balance");
        }
        Ok(audit)
    })
}
