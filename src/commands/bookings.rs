//! Table bookings.
//!
//! A booking in an occupying status (`confirmed`, `checked-in`) holds its table
//! for the half-open window `[start, end)`. The availability check and the
//! write share one immediate transaction, and the store's overlap triggers
//! reject anything that slips past it.

use crate::commands::directory::{self, Directory};
use crate::commands::{page_bounds, Conditions};
use crate::config::BookingRules;
use crate::db::Database;
use crate::error::{is_booking_overlap, Error, ErrorKind, Result};
use crate::models::{
    Booking, BookingDetails, BookingFilters, BookingPatch, BookingStatus, CreateBooking, Page,
    PageRequest,
};
use crate::money::{out_of_range, Money};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::{Connection, OptionalExtension, Row};

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM:SS` read as UTC.
pub fn parse_time(value: &str, field: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .map(|t| t.and_utc())
        .map_err(|_| {
            Error::validation(format!(
                "{field} must be RFC 3339 or YYYY-MM-DDTHH:MM:SS, got '{value}'"
            ))
        })
}

/// Check a booking window against the configured rules.
///
/// `check_past` is false when an update leaves the start time where it was.
pub(crate) fn validate_window(
    rules: &BookingRules,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    check_past: bool,
) -> Result<()> {
    if end <= start {
        return Err(Error::validation("end time must be after start time"));
    }
    let duration = end - start;
    if duration < rules.min_duration {
        return Err(Error::validation(format!(
            "minimum booking duration is {} minutes",
            rules.min_duration.num_minutes()
        )));
    }
    if duration > rules.max_duration {
        return Err(Error::validation(format!(
            "maximum booking duration is {} minutes",
            rules.max_duration.num_minutes()
        )));
    }
    if check_past && start < now - rules.clock_skew {
        return Err(Error::validation("booking start time cannot be in the past"));
    }
    Ok(())
}

/// Hourly rate prorated over the window, to the cent.
fn booking_price(
    hourly_rate: Option<Money>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Option<Money>> {
    let Some(rate) = hourly_rate else {
        return Ok(None);
    };
    let seconds = Decimal::from((end - start).num_seconds());
    rate.0
        .checked_mul(seconds)
        .and_then(|amount| amount.checked_div(Decimal::from(3600)))
        .map(|amount| Some(Money(amount).round_cents()))
        .ok_or_else(out_of_range)
}

/// Checks the table, client and staff a booking points at.
pub fn require_parties<D: Directory + ?Sized>(
    directory: &D,
    table_id: i64,
    client_id: Option<i64>,
    staff_id: Option<i64>,
) -> Result<()> {
    directory.require_table(table_id)?;
    if let Some(id) = client_id {
        directory.require_client(id)?;
    }
    if let Some(id) = staff_id {
        directory.require_staff(id)?;
    }
    Ok(())
}

fn table_is_free(
    conn: &Connection,
    table_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<i64>,
) -> Result<bool> {
    let [occupying_a, occupying_b] = BookingStatus::OCCUPYING;
    let clashes: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE table_id = ?1
           AND status IN (?2, ?3)
           AND start_time < ?5
           AND end_time > ?4
           AND (?6 IS NULL OR id != ?6)",
        rusqlite::params![table_id, occupying_a, occupying_b, start, end, exclude],
        |row| row.get(0),
    )?;
    Ok(clashes == 0)
}

/// Whether `table_id` is free for `[start, end)`, ignoring `exclude`.
pub fn check_availability(
    db: &Database,
    table_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<i64>,
) -> Result<bool> {
    if end <= start {
        return Err(Error::validation("end time must be after start time"));
    }
    db.read(|conn| table_is_free(conn, table_id, start, end, exclude))
}

/// Maps a trigger rejection to the same error the explicit check raises.
fn overlap_as_unavailable(table_id: i64) -> impl FnOnce(rusqlite::Error) -> Error {
    move |err| {
        if is_booking_overlap(&err) {
            Error::ResourceNotAvailable { table_id }
        } else {
            Error::from(err)
        }
    }
}

fn log_conflict(err: Error) -> Error {
    if err.kind() == ErrorKind::Conflict {
        tracing::warn!(error = %err, "booking rejected");
    }
    err
}

fn validate_guests(guests: Option<i64>) -> Result<()> {
    match guests {
        Some(n) if n <= 0 => Err(Error::validation("number of guests must be positive")),
        _ => Ok(()),
    }
}

fn parse_status(status: Option<&str>) -> Result<Option<BookingStatus>> {
    match status.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

#[tracing::instrument(skip(db, request), fields(table_id = request.table_id))]
pub fn create_booking(db: &Database, request: CreateBooking) -> Result<BookingDetails> {
    let start = parse_time(&request.start_time, "start_time")?;
    let end = parse_time(&request.end_time, "end_time")?;
    validate_window(&db.config().booking, start, end, Utc::now(), true)?;
    validate_guests(request.number_of_guests)?;
    let status = parse_status(request.status.as_deref())?.unwrap_or(BookingStatus::Confirmed);
    let table_id = request.table_id;

    let id = db
        .write(|tx| {
            let conn: &Connection = tx;
            require_parties(conn, table_id, request.client_id, request.staff_id)?;
            let table = directory::get_table(conn, table_id)?;
            if status.is_occupying() && !table_is_free(tx, table_id, start, end, None)? {
                return Err(Error::ResourceNotAvailable { table_id });
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO bookings
                     (client_id, table_id, staff_id, start_time, end_time, number_of_guests,
                      status, notes, total_price, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                rusqlite::params![
                    request.client_id,
                    table_id,
                    request.staff_id,
                    start,
                    end,
                    request.number_of_guests,
                    status,
                    request.notes,
                    booking_price(table.hourly_rate, start, end)?,
                    now
                ],
            )
            .map_err(overlap_as_unavailable(table_id))?;
            Ok(tx.last_insert_rowid())
        })
        .map_err(log_conflict)?;

    tracing::info!(booking_id = id, %status, "booking created");
    get_booking(db, id)
}

const BOOKING_SELECT: &str = "
    SELECT b.id, b.client_id, b.table_id, b.staff_id, b.start_time, b.end_time,
           b.number_of_guests, b.status, b.notes, b.total_price, b.created_at, b.updated_at,
           c.full_name, s.name, t.name
    FROM bookings b
    LEFT JOIN clients c ON b.client_id = c.id
    LEFT JOIN staff s ON b.staff_id = s.id
    LEFT JOIN game_tables t ON b.table_id = t.id";

fn details_from_row(row: &Row<'_>) -> rusqlite::Result<BookingDetails> {
    Ok(BookingDetails {
        booking: Booking {
            id: row.get(0)?,
            client_id: row.get(1)?,
            table_id: row.get(2)?,
            staff_id: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            number_of_guests: row.get(6)?,
            status: row.get(7)?,
            notes: row.get(8)?,
            total_price: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        },
        client_name: row.get(12)?,
        staff_name: row.get(13)?,
        table_name: row.get(14)?,
    })
}

fn load_booking(conn: &Connection, id: i64) -> Result<Booking> {
    conn.query_row(&format!("{BOOKING_SELECT} WHERE b.id = ?1"), [id], details_from_row)
        .optional()?
        .map(|details| details.booking)
        .ok_or_else(|| Error::not_found("booking", id))
}

pub fn get_booking(db: &Database, id: i64) -> Result<BookingDetails> {
    db.read(|conn| {
        conn.query_row(&format!("{BOOKING_SELECT} WHERE b.id = ?1"), [id], details_from_row)
            .optional()?
            .ok_or_else(|| Error::not_found("booking", id))
    })
}

/// Bookings by start time, latest first.
pub fn list_bookings(
    db: &Database,
    filters: &BookingFilters,
    page: PageRequest,
) -> Result<Page<BookingDetails>> {
    let mut conditions = Conditions::default();
    if let Some(id) = filters.client_id {
        conditions.push("b.client_id =", id);
    }
    if let Some(id) = filters.table_id {
        conditions.push("b.table_id =", id);
    }
    if let Some(id) = filters.staff_id {
        conditions.push("b.staff_id =", id);
    }
    if let Some(status) = parse_status(filters.status.as_deref())? {
        conditions.push("b.status =", status);
    }
    if let Some(from) = filters.date_from {
        conditions.push("b.start_time >=", from);
    }
    if let Some(to) = filters.date_to {
        conditions.push("b.end_time <=", to);
    }
    let where_clause = conditions.where_clause();
    let (page, page_size, offset) = page_bounds(db, page);

    db.read(|conn| {
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM bookings b{where_clause}"),
            rusqlite::params_from_iter(conditions.args()),
            |row| row.get(0),
        )?;

        let limit = conditions.limit(page_size, offset);
        let mut stmt = conn.prepare(&format!(
            "{BOOKING_SELECT}{where_clause} ORDER BY b.start_time DESC, b.id DESC{limit}"
        ))?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(conditions.args()), details_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    })
}

#[tracing::instrument(skip(db, patch))]
pub fn update_booking(db: &Database, id: i64, patch: BookingPatch) -> Result<BookingDetails> {
    let new_status = parse_status(patch.status.as_deref())?;
    if let Some(guests) = patch.number_of_guests {
        validate_guests(guests)?;
    }
    let rules = db.config().booking;

    db.write(|tx| {
        let current = load_booking(tx, id)?;
        if current.status.is_terminal() {
            return Err(Error::validation(format!(
                "cannot update a booking that is already '{}'",
                current.status
            )));
        }

        let table_id = patch.table_id.unwrap_or(current.table_id);
        let table = directory::get_table(tx, table_id)?;

        let (start, end) = if patch.moves_window() {
            let start = match patch.start_time.as_deref() {
                Some(s) => parse_time(s, "start_time")?,
                None => current.start_time,
            };
            let end = match patch.end_time.as_deref() {
                Some(s) => parse_time(s, "end_time")?,
                None => current.end_time,
            };
            validate_window(&rules, start, end, Utc::now(), start != current.start_time)?;
            (start, end)
        } else {
            (current.start_time, current.end_time)
        };

        let status = new_status.unwrap_or(current.status);
        let table_changed = table_id != current.table_id;
        let window_changed = start != current.start_time || end != current.end_time;
        let starts_occupying = status.is_occupying() && !current.status.is_occupying();
        if status.is_occupying()
            && (table_changed || window_changed || starts_occupying)
            && !table_is_free(tx, table_id, start, end, Some(id))?
        {
            return Err(Error::ResourceNotAvailable { table_id });
        }

        let total_price = if table_changed || window_changed {
            booking_price(table.hourly_rate, start, end)?
        } else {
            current.total_price
        };
        let guests = patch.number_of_guests.unwrap_or(current.number_of_guests);
        let notes = patch.notes.clone().unwrap_or(current.notes);

        tx.execute(
            "UPDATE bookings
             SET table_id = ?1, start_time = ?2, end_time = ?3, number_of_guests = ?4,
                 status = ?5, notes = ?6, total_price = ?7, updated_at = ?8
             WHERE id = ?9",
            rusqlite::params![
                table_id,
                start,
                end,
                guests,
                status,
                notes,
                total_price,
                Utc::now(),
                id
            ],
        )
        .map_err(overlap_as_unavailable(table_id))?;
        Ok(())
    })
    .map_err(log_conflict)?;

    tracing::info!(booking_id = id, "booking updated");
    get_booking(db, id)
}

/// Move a booking to `target`. A booking that already finished or was
/// cancelled only accepts its own status again.
fn set_status(db: &Database, id: i64, target: BookingStatus) -> Result<BookingDetails> {
    db.write(|tx| {
        let current = load_booking(tx, id)?;
        if current.status.is_terminal() && current.status != target {
            return Err(Error::StatusTransition {
                from: current.status.to_string(),
                to: target.to_string(),
            });
        }
        tx.execute(
            "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![target, Utc::now(), id],
        )
        .map_err(overlap_as_unavailable(current.table_id))?;
        Ok(())
    })
    .map_err(log_conflict)?;

    tracing::info!(booking_id = id, status = %target, "booking status changed");
    get_booking(db, id)
}

#[tracing::instrument(skip(db))]
pub fn cancel_booking(db: &Database, id: i64) -> Result<BookingDetails> {
    set_status(db, id, BookingStatus::Cancelled)
}

#[tracing::instrument(skip(db))]
pub fn complete_booking(db: &Database, id: i64) -> Result<BookingDetails> {
    set_status(db, id, BookingStatus::Completed)
}

#[tracing::instrument(skip(db))]
pub fn delete_booking(db: &Database, id: i64) -> Result<()> {
    db.write(|tx| {
        let deleted = tx.execute("DELETE FROM bookings WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(Error::not_found("booking", id));
        }
        Ok(())
    })
    .map_err(|e| {
        if e.kind() == ErrorKind::ReferentialConflict {
            tracing::warn!(booking_id = id, "booking still referenced by an order");
            return Error::ReferentialConflict(format!("booking {id} is referenced by an order"));
        }
        e
    })?;

    tracing::info!(booking_id = id, "booking deleted");
    Ok(())
}
