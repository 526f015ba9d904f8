//! Order processing.
//!
//! Creating an order prices every line from the catalog, deducts tracked stock
//! through the ledger and writes the header and lines in one transaction.
//! Cancelling or deleting an order that still holds stock puts it back.

use crate::commands::directory::Directory;
use crate::commands::{catalog, inventory, page_bounds, Conditions};
use crate::db::Database;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{
    CreateOrder, MovementKind, NewMovement, Order, OrderFilters, OrderItem, OrderStatus,
    OrderSummary, OrderWithItems, Page, PageRequest,
};
use crate::money::Money;
use chrono::{Days, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};

const SALE_REASON: &str = "Order creation";

/// Checks the staff member, client, table and booking an order points at.
pub fn require_references<D: Directory + ?Sized>(directory: &D, order: &CreateOrder) -> Result<()> {
    directory.require_staff(order.staff_id)?;
    if let Some(id) = order.client_id {
        directory.require_client(id)?;
    }
    if let Some(id) = order.table_id {
        directory.require_table(id)?;
    }
    if let Some(id) = order.booking_id {
        directory.require_booking(id)?;
    }
    Ok(())
}

#[tracing::instrument(skip(db, order), fields(staff_id = order.staff_id, lines = order.items.len()))]
pub fn create_order(db: &Database, order: CreateOrder) -> Result<OrderWithItems> {
    if order.items.is_empty() {
        return Err(Error::validation("order must contain at least one item"));
    }
    if let Some(line) = order.items.iter().find(|line| line.quantity <= 0) {
        return Err(Error::validation(format!(
            "quantity for item {} must be positive",
            line.pricelist_item_id
        )));
    }
    let discount = order.discount_amount.unwrap_or(Money::ZERO);
    if discount.is_negative() {
        return Err(Error::validation("discount cannot be negative"));
    }
    let status = match order.status.as_deref().map(str::trim) {
        None | Some("") => OrderStatus::Pending,
        Some(s) => s.parse()?,
    };
    let payment_method = order
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    let order_id = db
        .write(|tx| {
            let conn: &Connection = tx;
            require_references(conn, &order)?;

            // Price and deduct line by line; later lines see earlier deductions.
            let mut total = Money::ZERO;
            let mut priced = Vec::with_capacity(order.items.len());
            for line in &order.items {
                let item = catalog::price_and_stock(tx, line.pricelist_item_id)?;
                if item.tracks_stock {
                    let available = item.current_stock.unwrap_or(0);
                    if available < line.quantity {
                        return Err(Error::InsufficientStock {
                            item_id: item.id,
                            name: item.name,
                            requested: line.quantity,
                            available,
                        });
                    }
                    inventory::post(
                        tx,
                        &NewMovement {
                            pricelist_item_id: item.id,
                            staff_id: Some(order.staff_id),
                            kind: MovementKind::Sale,
                            delta: -line.quantity,
                            reason: Some(SALE_REASON.to_string()),
                        },
                    )?;
                }
                let line_total = item.price.times(line.quantity)?;
                total = total.plus(line_total)?;
                priced.push((line, item.price, line_total));
            }
            let final_amount = total.less_discount(discount);

            let now = Utc::now();
            tx.execute(
                "INSERT INTO orders
                     (client_id, booking_id, staff_id, table_id, order_time, status,
                      total_amount, discount_amount, final_amount, payment_method, notes,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?5, ?5)",
                rusqlite::params![
                    order.client_id,
                    order.booking_id,
                    order.staff_id,
                    order.table_id,
                    now,
                    status,
                    total,
                    discount,
                    final_amount,
                    payment_method,
                    order.notes
                ],
            )?;
            let order_id = tx.last_insert_rowid();

            for (line, unit_price, line_total) in priced {
                tx.execute(
                    "INSERT INTO order_items
                         (order_id, pricelist_item_id, quantity, unit_price, total_price, notes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        order_id,
                        line.pricelist_item_id,
                        line.quantity,
                        unit_price,
                        line_total,
                        line.notes
                    ],
                )?;
            }
            Ok(order_id)
        })
        .map_err(|e| {
            if e.kind() == ErrorKind::Conflict {
                tracing::warn!(error = %e, "order rejected");
            }
            e
        })?;

    tracing::info!(order_id, "order created");
    get_order(db, order_id)
}

const ORDER_SELECT: &str = "
    SELECT o.id, o.client_id, o.booking_id, o.staff_id, o.table_id, o.status,
           o.total_amount, o.discount_amount, o.final_amount, o.payment_method, o.notes,
           o.order_time, o.created_at, o.updated_at,
           c.full_name, s.name, t.name
    FROM orders o
    LEFT JOIN clients c ON o.client_id = c.id
    LEFT JOIN staff s ON o.staff_id = s.id
    LEFT JOIN game_tables t ON o.table_id = t.id";

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<OrderSummary> {
    Ok(OrderSummary {
        order: Order {
            id: row.get(0)?,
            client_id: row.get(1)?,
            booking_id: row.get(2)?,
            staff_id: row.get(3)?,
            table_id: row.get(4)?,
            status: row.get(5)?,
            total_amount: row.get(6)?,
            discount_amount: row.get(7)?,
            final_amount: row.get(8)?,
            payment_method: row.get(9)?,
            notes: row.get(10)?,
            order_time: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        },
        client_name: row.get(14)?,
        staff_name: row.get(15)?,
        table_name: row.get(16)?,
    })
}

fn load_summary(conn: &Connection, id: i64) -> Result<OrderSummary> {
    conn.query_row(&format!("{ORDER_SELECT} WHERE o.id = ?1"), [id], summary_from_row)
        .optional()?
        .ok_or_else(|| Error::not_found("order", id))
}

fn load_items(conn: &Connection, order_id: i64) -> Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT oi.id, oi.order_id, oi.pricelist_item_id, pi.name, oi.quantity,
                oi.unit_price, oi.total_price, oi.notes
         FROM order_items oi
         LEFT JOIN pricelist_items pi ON oi.pricelist_item_id = pi.id
         WHERE oi.order_id = ?1
         ORDER BY oi.id",
    )?;
    let items = stmt
        .query_map([order_id], |row| {
            Ok(OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                pricelist_item_id: row.get(2)?,
                item_name: row.get(3)?,
                quantity: row.get(4)?,
                unit_price: row.get(5)?,
                total_price: row.get(6)?,
                notes: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

pub fn get_order(db: &Database, id: i64) -> Result<OrderWithItems> {
    db.read(|conn| {
        let order = load_summary(conn, id)?;
        let items = load_items(conn, id)?;
        Ok(OrderWithItems { order, items })
    })
}

/// Orders newest first, with display names.
pub fn list_orders(
    db: &Database,
    filters: &OrderFilters,
    page: PageRequest,
) -> Result<Page<OrderSummary>> {
    let mut conditions = Conditions::default();
    if let Some(id) = filters.client_id {
        conditions.push("o.client_id =", id);
    }
    if let Some(id) = filters.staff_id {
        conditions.push("o.staff_id =", id);
    }
    if let Some(id) = filters.table_id {
        conditions.push("o.table_id =", id);
    }
    if let Some(status) = filters.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status: OrderStatus = status.parse()?;
        conditions.push("o.status =", status);
    }
    if let Some(date) = filters.date {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = start
            .checked_add_days(Days::new(1))
            .ok_or_else(|| Error::validation("date out of range"))?;
        conditions.push("o.order_time >=", start);
        conditions.push("o.order_time <", end);
    }
    let where_clause = conditions.where_clause();
    let (page, page_size, offset) = page_bounds(db, page);

    db.read(|conn| {
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM orders o{where_clause}"),
            rusqlite::params_from_iter(conditions.args()),
            |row| row.get(0),
        )?;

        let limit = conditions.limit(page_size, offset);
        let mut stmt = conn.prepare(&format!(
            "{ORDER_SELECT}{where_clause} ORDER BY o.order_time DESC, o.id DESC{limit}"
        ))?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(conditions.args()), summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    })
}

/// Put every tracked line of an order back on the shelf.
fn return_stock(
    tx: &Transaction<'_>,
    order: &Order,
    kind: MovementKind,
    reason: &str,
) -> Result<()> {
    for line in load_items(tx, order.id)? {
        let item = catalog::price_and_stock(tx, line.pricelist_item_id)?;
        if !item.tracks_stock {
            continue;
        }
        inventory::post(
            tx,
            &NewMovement {
                pricelist_item_id: line.pricelist_item_id,
                staff_id: order.staff_id,
                kind,
                delta: line.quantity,
                reason: Some(reason.to_string()),
            },
        )?;
    }
    Ok(())
}

#[tracing::instrument(skip(db))]
pub fn update_order_status(db: &Database, id: i64, status: &str) -> Result<OrderWithItems> {
    let status: OrderStatus = status.parse()?;

    db.write(|tx| {
        let order = load_summary(tx, id)?.order;
        if status == OrderStatus::Cancelled && !order.status.stock_returned() {
            return_stock(
                tx,
                &order,
                MovementKind::ReturnCancellation,
                &format!("Order {id} cancelled"),
            )?;
        }
        tx.execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status, Utc::now(), id],
        )?;
        Ok(())
    })?;

    tracing::info!(order_id = id, %status, "order status updated");
    get_order(db, id)
}

#[tracing::instrument(skip(db))]
pub fn delete_order(db: &Database, id: i64) -> Result<()> {
    db.write(|tx| {
        let order = load_summary(tx, id)?.order;
        if !order.status.stock_returned() {
            return_stock(
                tx,
                &order,
                MovementKind::ReturnDeletion,
                &format!("Order {id} deleted"),
            )?;
        }
        tx.execute("DELETE FROM order_items WHERE order_id = ?1", [id])?;
        tx.execute("DELETE FROM orders WHERE id = ?1", [id])?;
        Ok(())
    })?;

    tracing::info!(order_id = id, "order deleted");
    Ok(())
}
