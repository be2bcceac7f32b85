//! Connection interruption runs in its own test binary: `interrupt_all`
//! reaches every tracked connection in the process.

use std::thread;
use std::time::Duration;

use rusqlite::ErrorCode;
use schema_tick_sqlite::Database;
use schema_tick_sqlite::tracker::{interrupt_all, open_count};

#[test]
fn test_interrupt_all_signals_every_live_handle() {
    let idle = Database::open_in_memory().unwrap();
    let busy = Database::open_in_memory().unwrap();
    assert_eq!(open_count(), 2);

    let worker = thread::spawn(move || {
        busy.query_row(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT COUNT(*) FROM c",
            [],
            |row| row.get::<_, i64>(0),
        )
    });
    let mut signalled = 0;
    while !worker.is_finished() {
        signalled = signalled.max(interrupt_all());
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(signalled, 2);

    let err = worker.join().unwrap().unwrap_err();
    assert_eq!(err.sqlite_error_code(), Some(ErrorCode::OperationInterrupted));

    // An interrupt only affects statements already running.
    let one: i64 = idle.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
    assert_eq!(one, 1);
    assert_eq!(open_count(), 1);
}
