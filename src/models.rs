use crate::error::Error;
use crate::money::Money;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Enum stored as a fixed set of strings. Generates the string mapping plus the
/// `rusqlite` conversions; parsing an unknown value yields `Error::Validation`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::validation(format!("invalid {} '{}'", $label, other))),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: Error| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

// ===== Catalog =====

text_enum!(ItemType, "item type" {
    Bar => "bar",
    Hookah => "hookah",
    Snack => "snack",
    Service => "service",
});

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PricelistItem {
    pub id: i64,
    pub category_id: i64,
    pub category_name: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub item_type: ItemType,
    pub is_available: bool,
    pub tracks_stock: bool,
    pub current_stock: Option<i64>,
    pub initial_stock: Option<i64>,
    pub low_stock_threshold: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateItem {
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub item_type: String,
    #[serde(default)]
    pub tracks_stock: bool,
    pub current_stock: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

/// What order pricing needs to know about an item at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub id: i64,
    pub name: String,
    pub price: Money,
    pub tracks_stock: bool,
    pub current_stock: Option<i64>,
}

// ===== Stock ledger =====

text_enum!(
    /// Why stock moved. Manual kinds can be posted directly by staff; the rest
    /// are written by the order processor.
    MovementKind, "movement type" {
        Sale => "sale",
        Purchase => "purchase",
        AdjustmentIn => "adjustment_in",
        AdjustmentOut => "adjustment_out",
        ReturnCancellation => "return_cancellation",
        ReturnDeletion => "return_deletion",
    }
);

impl MovementKind {
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            MovementKind::Purchase | MovementKind::AdjustmentIn | MovementKind::AdjustmentOut
        )
    }

    /// Sign applied to a positive quantity of this kind.
    pub fn sign(&self) -> i64 {
        match self {
            MovementKind::Sale | MovementKind::AdjustmentOut => -1,
            _ => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InventoryMovement {
    pub id: i64,
    pub pricelist_item_id: i64,
    pub item_name: Option<String>,
    pub staff_id: Option<i64>,
    pub staff_name: Option<String>,
    pub movement_type: MovementKind,
    pub quantity_changed: i64,
    pub reason: Option<String>,
    pub movement_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMovement {
    pub pricelist_item_id: i64,
    pub staff_id: Option<i64>,
    pub kind: MovementKind,
    pub delta: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMovement {
    pub pricelist_item_id: i64,
    pub movement_type: String,
    pub quantity: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MovementFilters {
    pub pricelist_item_id: Option<i64>,
    pub staff_id: Option<i64>,
    pub movement_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StockAudit {
    pub pricelist_item_id: i64,
    pub initial_stock: i64,
    pub movement_total: i64,
    pub current_stock: i64,
}

impl StockAudit {
    pub fn is_consistent(&self) -> bool {
        self.initial_stock + self.movement_total == self.current_stock
    }
}

// ===== People and resources =====

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Staff {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Client {
    pub id: i64,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GameTable {
    pub id: i64,
    pub name: String,
    pub capacity: Option<i64>,
    pub hourly_rate: Option<Money>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGameTable {
    pub name: String,
    pub capacity: Option<i64>,
    pub hourly_rate: Option<Money>,
}

// ===== Orders =====

text_enum!(OrderStatus, "order status" {
    Pending => "pending",
    Preparing => "preparing",
    Ready => "ready",
    Served => "served",
    Completed => "completed",
    Paid => "paid",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    /// Stock for orders in these states has already gone back on the shelf.
    pub fn stock_returned(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    pub id: i64,
    pub client_id: Option<i64>,
    pub booking_id: Option<i64>,
    pub staff_id: Option<i64>,
    pub table_id: Option<i64>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub order_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub pricelist_item_id: i64,
    pub item_name: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub notes: Option<String>,
}

/// Order header joined with display names.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub client_name: Option<String>,
    pub staff_name: Option<String>,
    pub table_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderWithItems {
    pub order: OrderSummary,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderItem {
    pub pricelist_item_id: i64,
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrder {
    pub staff_id: i64,
    pub client_id: Option<i64>,
    pub booking_id: Option<i64>,
    pub table_id: Option<i64>,
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub discount_amount: Option<Money>,
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OrderFilters {
    pub client_id: Option<i64>,
    pub staff_id: Option<i64>,
    pub table_id: Option<i64>,
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
}

// ===== Bookings =====

text_enum!(BookingStatus, "booking status" {
    Pending => "pending",
    Confirmed => "confirmed",
    CheckedIn => "checked-in",
    Cancelled => "cancelled",
    Completed => "completed",
    NoShow => "no-show",
});

impl BookingStatus {
    /// Statuses that hold the table and count toward overlap detection.
    pub const OCCUPYING: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::CheckedIn];

    pub fn is_occupying(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    pub id: i64,
    pub client_id: Option<i64>,
    pub table_id: i64,
    pub staff_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub number_of_guests: Option<i64>,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub total_price: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub client_name: Option<String>,
    pub staff_name: Option<String>,
    pub table_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBooking {
    pub table_id: i64,
    pub client_id: Option<i64>,
    pub staff_id: Option<i64>,
    pub start_time: String,
    pub end_time: String,
    pub number_of_guests: Option<i64>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

/// Partial booking update. A field left at `None` is untouched; for the
/// nullable columns `Some(None)` clears the stored value.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BookingPatch {
    #[serde(default)]
    pub table_id: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub number_of_guests: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
}

impl BookingPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table_id: i64) -> Self {
        self.table_id = Some(table_id);
        self
    }

    pub fn window(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_time = Some(start.into());
        self.end_time = Some(end.into());
        self
    }

    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start_time = Some(start.into());
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end_time = Some(end.into());
        self
    }

    pub fn guests(mut self, guests: Option<i64>) -> Self {
        self.number_of_guests = Some(guests);
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn moves_window(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}

// A key that is present maps to `Some(..)`, even when its value is null.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BookingFilters {
    pub client_id: Option<i64>,
    pub table_id: Option<i64>,
    pub staff_id: Option<i64>,
    pub status: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

// ===== Paging =====

/// 1-based page request. Zero values fall back to the configured defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        PageRequest { page, page_size }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}
