pub mod bookings;
pub mod catalog;
pub mod directory;
pub mod inventory;
pub mod orders;

use crate::db::Database;
use crate::models::PageRequest;
use rusqlite::ToSql;

/// Resolve a page request to `(page, page_size, offset)` using the configured
/// defaults and cap.
pub(crate) fn page_bounds(db: &Database, request: PageRequest) -> (u32, u32, i64) {
    let paging = db.config().paging;
    let page = request.page.max(1);
    let page_size = match request.page_size {
        0 => paging.default_page_size,
        n => n.min(paging.max_page_size),
    };
    let offset = i64::from(page - 1) * i64::from(page_size);
    (page, page_size, offset)
}

/// `WHERE` clause builder with numbered placeholders.
#[derive(Default)]
pub(crate) struct Conditions {
    clauses: Vec<String>,
    args: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    /// `lhs` is everything before the placeholder, e.g. `"o.status ="`.
    pub fn push(&mut self, lhs: &str, value: impl ToSql + 'static) {
        self.args.push(Box::new(value));
        self.clauses.push(format!("{lhs} ?{}", self.args.len()));
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn args(&self) -> impl Iterator<Item = &dyn ToSql> {
        self.args.iter().map(|arg| arg.as_ref())
    }

    /// Appends the paging arguments and returns the matching ` LIMIT .. OFFSET ..`
    /// clause. Run any count query before calling this.
    pub fn limit(&mut self, page_size: u32, offset: i64) -> String {
        self.args.push(Box::new(i64::from(page_size)));
        self.args.push(Box::new(offset));
        format!(" LIMIT ?{} OFFSET ?{}", self.args.len() - 1, self.args.len())
    }
}
