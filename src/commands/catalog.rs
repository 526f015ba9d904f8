use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Category, CreateCategory, CreateItem, ItemSnapshot, ItemType, PricelistItem};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

const ITEM_COLUMNS: &str =
    "pi.id, pi.category_id, c.name, pi.name, pi.description, pi.price, pi.item_type, pi.is_available,
     pi.tracks_stock, pi.current_stock, pi.initial_stock, pi.low_stock_threshold, pi.created_at, pi.updated_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<PricelistItem> {
    Ok(PricelistItem {
        id: row.get(0)?,
        category_id: row.get(1)?,
        category_name: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        price: row.get(5)?,
        item_type: row.get(6)?,
        is_available: row.get(7)?,
        tracks_stock: row.get(8)?,
        current_stock: row.get(9)?,
        initial_stock: row.get(10)?,
        low_stock_threshold: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub fn create_category(db: &Database, category: CreateCategory) -> Result<Category> {
    let name = category.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("category name cannot be empty"));
    }
    let now = Utc::now();

    db.write(|tx| {
        tx.execute(
            "INSERT INTO categories (name, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![name, category.description, now],
        )?;
        Ok(Category {
            id: tx.last_insert_rowid(),
            name,
            description: category.description,
            created_at: now,
            updated_at: now,
        })
    })
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Category> {
    conn.query_row(
        "SELECT id, name, description, created_at, updated_at FROM categories WHERE id = ?1",
        [id],
        |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::not_found("category", id))
}

#[tracing::instrument(skip(db, item), fields(item_name = %item.name))]
pub fn create_item(db: &Database, item: CreateItem) -> Result<PricelistItem> {
    let name = item.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("item name cannot be empty"));
    }
    if !item.price.is_positive() {
        return Err(Error::validation("price must be greater than zero"));
    }
    let item_type: ItemType = item.item_type.parse()?;

    // Stock columns exist only for tracked items.
    let (current_stock, low_stock_threshold) = if item.tracks_stock {
        let stock = item.current_stock.unwrap_or(0);
        if stock < 0 {
            return Err(Error::validation("current stock cannot be negative"));
        }
        if item.low_stock_threshold.is_some_and(|t| t < 0) {
            return Err(Error::validation("low stock threshold cannot be negative"));
        }
        (Some(stock), item.low_stock_threshold)
    } else {
        if item.current_stock.is_some() || item.low_stock_threshold.is_some() {
            return Err(Error::validation(
                "stock values can only be set on items that track stock",
            ));
        }
        (None, None)
    };

    let now = Utc::now();
    let id = db.write(|tx| {
        get_category(tx, item.category_id)?;
        tx.execute(
            "INSERT INTO pricelist_items
                 (category_id, name, description, price, item_type, is_available, tracks_stock,
                  current_stock, initial_stock, low_stock_threshold, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?7, ?8, ?9, ?9)",
            rusqlite::params![
                item.category_id,
                name,
                item.description,
                item.price,
                item_type,
                item.tracks_stock,
                current_stock,
                low_stock_threshold,
                now
            ],
        )?;
        Ok(tx.last_insert_rowid())
    })?;

    tracing::info!(item_id = id, tracks_stock = item.tracks_stock, "pricelist item created");
    get_item(db, id)
}

pub fn get_item(db: &Database, id: i64) -> Result<PricelistItem> {
    db.read(|conn| {
        conn.query_row(
            &format!(
                "SELECT {ITEM_COLUMNS}
                 FROM pricelist_items pi
                 LEFT JOIN categories c ON pi.category_id = c.id
                 WHERE pi.id = ?1"
            ),
            [id],
            item_from_row,
        )
        .optional()?
        .ok_or_else(|| Error::not_found("pricelist item", id))
    })
}

/// Tracked items at or below their low-stock threshold, lowest stock first.
pub fn low_stock_items(db: &Database) -> Result<Vec<PricelistItem>> {
    db.read(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM pricelist_items pi
             LEFT JOIN categories c ON pi.category_id = c.id
             WHERE pi.tracks_stock = 1
               AND pi.low_stock_threshold IS NOT NULL
               AND pi.current_stock <= pi.low_stock_threshold
             ORDER BY pi.current_stock ASC, pi.name"
        ))?;
        let items = stmt
            .query_map([], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    })
}

/// Price, name and stock of an item as the given connection sees it.
pub fn price_and_stock(conn: &Connection, item_id: i64) -> Result<ItemSnapshot> {
    conn.query_row(
        "SELECT id, name, price, tracks_stock, current_stock FROM pricelist_items WHERE id = ?1",
        [item_id],
        |row| {
            Ok(ItemSnapshot {
                id: row.get(0)?,
                name: row.get(1)?,
                price: row.get(2)?,
                tracks_stock: row.get(3)?,
                current_stock: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::not_found("pricelist item", item_id))
}
