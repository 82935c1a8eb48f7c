//! Shared fixtures and pagination properties over the event log.

use rusqlite::Connection;

use crate::event::{add_event, count_events, list_events, CreateEventParams, Event};
use crate::paginator::{BatchInfo, CursorKind, PageArgs};
use crate::tenant::add_tenant;

/// Creates an in-memory SQLite database with migrations applied.
pub(crate) fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    vault_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

/// Registers a tenant for `agent_id` and returns its id.
pub(crate) fn seed_tenant(conn: &Connection, agent_id: &str) -> String {
    add_tenant(conn, agent_id, agent_id)
        .expect("should add tenant")
        .id
}

pub(crate) fn seed_event(
    conn: &Connection,
    tenant_id: &str,
    connection_id: Option<&str>,
    description: &str,
) -> Event {
    add_event(
        conn,
        &CreateEventParams {
            tenant_id: tenant_id.to_string(),
            connection_id: connection_id.map(str::to_string),
            job_id: None,
            description: description.to_string(),
        },
    )
    .expect("should add event")
}

fn seed_events(conn: &Connection, tenant_id: &str, n: usize) -> Vec<Event> {
    (1..=n)
        .map(|i| seed_event(conn, tenant_id, None, &format!("event {i}")))
        .collect()
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

#[test]
fn cursors_increase_with_insertion_order() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let other = seed_tenant(&conn, "agent-2");

    let mut cursors = Vec::new();
    for i in 0..6 {
        let owner = if i % 2 == 0 { &tenant } else { &other };
        cursors.push(seed_event(&conn, owner, None, "e").cursor);
    }
    assert!(cursors.windows(2).all(|w| w[0] < w[1]), "{cursors:?}");
}

#[test]
fn two_of_five_then_after_second() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let events = seed_events(&conn, &tenant, 5);

    let first = list_events(&conn, &tenant, None, &BatchInfo::head(2)).unwrap();
    assert_eq!(ids(&first.items), ids(&events[..2]));
    assert!(first.has_next_page);
    assert!(!first.has_previous_page);

    let second = list_events(
        &conn,
        &tenant,
        None,
        &BatchInfo::head(2).after(events[1].cursor),
    )
    .unwrap();
    assert_eq!(ids(&second.items), ids(&events[2..4]));
    assert!(second.has_next_page);
    assert!(second.has_previous_page);

    let last = list_events(
        &conn,
        &tenant,
        None,
        &BatchInfo::head(2).after(events[3].cursor),
    )
    .unwrap();
    assert_eq!(ids(&last.items), ids(&events[4..]));
    assert!(!last.has_next_page);
    assert!(last.has_previous_page);
}

#[test]
fn forward_chaining_reproduces_the_full_sequence() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let events = seed_events(&conn, &tenant, 7);

    for size in 1..=8 {
        let mut seen = Vec::new();
        let mut batch = BatchInfo::head(size);
        loop {
            let page = list_events(&conn, &tenant, None, &batch).unwrap();
            seen.extend(page.items.iter().cloned());
            if !page.has_next_page {
                break;
            }
            let last = page.items.last().expect("a page with more has items");
            batch = BatchInfo::head(size).after(last.cursor);
        }
        assert_eq!(ids(&seen), ids(&events), "page size {size}");
    }
}

#[test]
fn opaque_cursors_chain_through_page_args() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let events = seed_events(&conn, &tenant, 3);

    let first = list_events(&conn, &tenant, None, &BatchInfo::head(1)).unwrap();
    let args = PageArgs {
        first: Some(2),
        after: first.end_cursor(CursorKind::Event),
        ..PageArgs::default()
    };
    let batch = args.to_batch(CursorKind::Event).unwrap();
    let next = list_events(&conn, &tenant, None, &batch).unwrap();
    assert_eq!(ids(&next.items), ids(&events[1..]));
}

#[test]
fn tail_pages_match_forward_slices() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let events = seed_events(&conn, &tenant, 5);

    let tail = list_events(&conn, &tenant, None, &BatchInfo::tail(2)).unwrap();
    assert_eq!(ids(&tail.items), ids(&events[3..]));
    assert!(tail.has_previous_page);
    assert!(!tail.has_next_page);

    let before = list_events(
        &conn,
        &tenant,
        None,
        &BatchInfo::tail(2).before(events[3].cursor),
    )
    .unwrap();
    assert_eq!(ids(&before.items), ids(&events[1..3]));
    assert!(before.has_previous_page);
    assert!(before.has_next_page);

    let all = list_events(&conn, &tenant, None, &BatchInfo::tail(10)).unwrap();
    assert_eq!(ids(&all.items), ids(&events));
    assert!(!all.has_previous_page);
}

#[test]
fn backward_chaining_reproduces_the_full_sequence() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let events = seed_events(&conn, &tenant, 5);

    let mut pages = Vec::new();
    let mut batch = BatchInfo::tail(2);
    loop {
        let page = list_events(&conn, &tenant, None, &batch).unwrap();
        let first = page.items.first().map(|e| e.cursor);
        let more = page.has_previous_page;
        pages.push(page.items);
        match (more, first) {
            (true, Some(cursor)) => batch = BatchInfo::tail(2).before(cursor),
            _ => break,
        }
    }
    pages.reverse();
    let seen: Vec<Event> = pages.into_iter().flatten().collect();
    assert_eq!(ids(&seen), ids(&events));
}

#[test]
fn zero_count_page_is_empty() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    seed_events(&conn, &tenant, 2);

    let page = list_events(&conn, &tenant, None, &BatchInfo::head(0)).unwrap();
    assert!(page.items.is_empty());
    assert!(page.has_next_page);
    assert!(!page.has_previous_page);
}

#[test]
fn pages_and_counts_are_tenant_and_connection_scoped() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let other = seed_tenant(&conn, "agent-2");

    let a = seed_event(&conn, &tenant, Some("c1"), "a");
    seed_event(&conn, &other, Some("c1"), "foreign");
    seed_event(&conn, &tenant, Some("c2"), "b");
    let c = seed_event(&conn, &tenant, Some("c1"), "c");

    let page = list_events(&conn, &tenant, Some("c1"), &BatchInfo::head(10)).unwrap();
    assert_eq!(ids(&page.items), vec![a.id.as_str(), c.id.as_str()]);
    assert_eq!(count_events(&conn, &tenant, Some("c1")).unwrap(), 2);
    assert_eq!(count_events(&conn, &tenant, None).unwrap(), 3);
    assert_eq!(count_events(&conn, &other, None).unwrap(), 1);
}

#[test]
fn combined_after_and_before_is_rejected() {
    let conn = test_db();
    let tenant = seed_tenant(&conn, "agent-1");
    let err = list_events(&conn, &tenant, None, &BatchInfo::head(2).after(1).before(3))
        .unwrap_err();
    assert!(matches!(err, crate::StoreError::InvalidArgument(_)));
}
