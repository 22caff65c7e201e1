mod support;

use support::{assert_close, ingest, make_event, setup_db, setup_user, ts};
use usage_db::{DEFAULT_DAY_HISTORY, DEFAULT_MONTH_HISTORY};

const NOW: &str = "2024-03-20T12:00:00Z";

fn periods(rows: &[usage_core::AggregatedUsage]) -> Vec<&str> {
    rows.iter().map(|row| row.period.as_str()).collect()
}

#[test]
fn daily_usage_prepends_live_today() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    ingest(
        db,
        "u1",
        0,
        vec![
            make_event("u1", "2024-03-01T10:00:00Z", "s1", 1.0),
            make_event("u1", "2024-03-19T10:00:00Z", "s1", 2.0),
            make_event("u1", "2024-03-20T08:00:00Z", "s1", 4.0),
        ],
    );
    db.insert_usage_events(&[make_event("u1", "2024-03-20T11:00:00Z", "s2", 8.0)])
        .expect("unsummarized insert");

    let rows = db
        .usage_by_day("u1", 0, ts(NOW), DEFAULT_DAY_HISTORY)
        .expect("by day");

    assert_eq!(periods(&rows), vec!["2024-03-20", "2024-03-19", "2024-03-01"]);
    assert_close(rows[0].cost_usd, 12.0);
    assert_close(rows[1].cost_usd, 2.0);
}

#[test]
fn quiet_today_is_omitted() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    ingest(
        db,
        "u1",
        0,
        vec![make_event("u1", "2024-03-19T10:00:00Z", "s1", 2.0)],
    );

    let rows = db
        .usage_by_day("u1", 0, ts(NOW), DEFAULT_DAY_HISTORY)
        .expect("by day");

    assert_eq!(periods(&rows), vec!["2024-03-19"]);
}

#[test]
fn daily_usage_stays_inside_current_cycle() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    ingest(
        db,
        "u1",
        15,
        vec![
            make_event("u1", "2024-03-14T10:00:00Z", "s1", 1.0),
            make_event("u1", "2024-03-15T00:00:00Z", "s1", 2.0),
            make_event("u1", "2024-03-18T10:00:00Z", "s1", 4.0),
        ],
    );

    let rows = db
        .usage_by_day("u1", 15, ts(NOW), DEFAULT_DAY_HISTORY)
        .expect("by day");

    assert_eq!(periods(&rows), vec!["2024-03-18", "2024-03-15"]);
}

#[test]
fn daily_history_respects_limit_and_ignores_future_days() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    let events = (1..=10)
        .map(|day| make_event("u1", &format!("2024-03-{:02}T10:00:00Z", day), "s1", 1.0))
        .chain(std::iter::once(make_event(
            "u1",
            "2024-04-02T10:00:00Z",
            "s1",
            1.0,
        )))
        .collect();
    ingest(db, "u1", 0, events);

    let rows = db.usage_by_day("u1", 0, ts(NOW), 3).expect("by day");

    assert_eq!(periods(&rows), vec!["2024-03-10", "2024-03-09", "2024-03-08"]);
}

#[test]
fn monthly_usage_merges_live_month_with_history() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    let mut events: Vec<_> = (1..=12)
        .map(|month| make_event("u1", &format!("2023-{:02}-05T10:00:00Z", month), "s1", 1.0))
        .collect();
    events.push(make_event("u1", "2024-01-05T10:00:00Z", "s1", 1.0));
    events.push(make_event("u1", "2024-03-02T10:00:00Z", "s1", 3.0));
    ingest(db, "u1", 0, events);

    let rows = db
        .usage_by_month("u1", ts(NOW), DEFAULT_MONTH_HISTORY)
        .expect("by month");

    assert_eq!(rows.len(), 1 + DEFAULT_MONTH_HISTORY);
    assert_eq!(rows[0].period, "2024-03");
    assert_close(rows[0].cost_usd, 3.0);
    assert_eq!(rows[1].period, "2024-01");
    assert_eq!(rows[12].period, "2023-02");
}

#[test]
fn cycle_usage_is_empty_without_billing() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    ingest(
        db,
        "u1",
        0,
        vec![make_event("u1", "2024-03-19T10:00:00Z", "s1", 2.0)],
    );

    assert!(db.usage_by_cycle("u1", 0, ts(NOW)).expect("cycles").is_empty());
    assert!(db.usage_by_cycle("u1", 40, ts(NOW)).expect("cycles").is_empty());
}

#[test]
fn cycle_usage_labels_live_and_closed_cycles() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    ingest(
        db,
        "u1",
        15,
        vec![
            make_event("u1", "2024-01-20T10:00:00Z", "s1", 1.0),
            make_event("u1", "2024-02-20T10:00:00Z", "s1", 2.0),
            make_event("u1", "2024-03-16T10:00:00Z", "s1", 4.0),
        ],
    );

    let rows = db.usage_by_cycle("u1", 15, ts(NOW)).expect("cycles");

    assert_eq!(
        periods(&rows),
        vec!["Mar 15 – Apr 14", "Feb 15 – Mar 14", "Jan 15 – Feb 14"]
    );
    assert_close(rows[0].cost_usd, 4.0);
    assert_close(rows[2].cost_usd, 1.0);
}

#[test]
fn total_usage_adds_live_day_to_summarized_history() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    ingest(
        db,
        "u1",
        15,
        vec![
            make_event("u1", "2024-02-20T10:00:00Z", "s1", 1.0),
            make_event("u1", "2024-03-16T10:00:00Z", "s1", 2.0),
            make_event("u1", "2024-03-20T09:00:00Z", "s1", 4.0),
        ],
    );
    db.insert_usage_events(&[make_event("u1", "2024-03-20T10:00:00Z", "s2", 8.0)])
        .expect("unsummarized insert");

    let all_time = db.total_usage("u1", 0, ts(NOW)).expect("total");
    assert_eq!(all_time.period, "Total");
    assert_close(all_time.cost_usd, 15.0);
    assert_eq!(all_time.tokens.input_tokens, 400);

    let this_cycle = db.total_usage("u1", 15, ts(NOW)).expect("total");
    assert_close(this_cycle.cost_usd, 14.0);
}

#[test]
fn queries_never_mix_users() {
    let mut test_db = setup_db();
    let db = &mut test_db.db;
    setup_user(db, "u1");
    setup_user(db, "u2");
    ingest(
        db,
        "u2",
        0,
        vec![
            make_event("u2", "2024-03-19T10:00:00Z", "s1", 2.0),
            make_event("u2", "2024-03-20T10:00:00Z", "s1", 2.0),
        ],
    );

    assert!(
        db.usage_by_day("u1", 0, ts(NOW), DEFAULT_DAY_HISTORY)
            .expect("by day")
            .is_empty()
    );
    assert!(
        db.total_usage("u1", 0, ts(NOW))
            .expect("total")
            .is_empty()
    );
}
