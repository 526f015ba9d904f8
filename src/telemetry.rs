//! Tracing/logging initialization.

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber: JSON lines, filter taken from `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = subscriber(std::io::stdout).try_init();
}

fn subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_target(false)
        .with_writer(writer)
        .finish()
}

#[cfg(test)]
mod tests {
    use crate::commands::catalog;
    use crate::config::Config;
    use crate::db::Database;
    use crate::models::{CreateCategory, CreateItem};
    use crate::money::Money;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn events_are_json_lines_without_target() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = super::subscriber(move || writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(order_id = 7, "order rejected");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["message"], "order rejected");
        assert_eq!(line["fields"]["order_id"], 7);
        assert_eq!(line["level"], "ERROR");
        assert!(line.get("target").is_none());
    }

    #[test]
    fn item_span_keeps_its_own_name() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = super::subscriber(move || writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            let db = Database::open_in_memory(Config::default()).unwrap();
            db.initialize().unwrap();
            let category = catalog::create_category(
                &db,
                CreateCategory { name: "Beer".into(), description: None },
            )
            .unwrap();
            catalog::create_item(
                &db,
                CreateItem {
                    category_id: category.id,
                    name: "Heineken".into(),
                    description: None,
                    price: Money::new(500, 2),
                    item_type: "bar".into(),
                    tracks_stock: false,
                    current_stock: None,
                    low_stock_threshold: None,
                },
            )
            .unwrap();
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let created = output
            .lines()
            .find(|line| line.contains("pricelist item created"))
            .unwrap();
        let line: serde_json::Value = serde_json::from_str(created).unwrap();
        assert_eq!(line["span"]["name"], "create_item");
        assert_eq!(line["span"]["item_name"], "Heineken");
    }
}
