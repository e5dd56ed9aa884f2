use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use super::{from_millis, now_millis, timetables, to_millis};
use crate::error::{AppError, AppResult};
use crate::models::{Entry, EntryFilter, NewEntry};

const ENTRY_COLUMNS: &str = "e.id, e.title, e.description, e.date, e.precision, e.tags,
     e.recurrence_rule, e.reminder_at, e.timetable_id, e.created_at";

pub(crate) fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    let precision: String = row.get(4)?;
    let tags: String = row.get(5)?;
    let rule: String = row.get(6)?;
    let reminder_at: Option<i64> = row.get(7)?;

    Ok(Entry {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: from_millis(row.get(3)?, 3)?,
        precision: precision
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        tags: serde_json::from_str::<BTreeSet<String>>(&tags)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        recurrence_rule: rule
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        reminder_at: reminder_at.map(|ms| from_millis(ms, 7)).transpose()?,
        timetable_id: row.get(8)?,
        created_at: from_millis(row.get(9)?, 9)?,
    })
}

fn tags_json(tags: &BTreeSet<String>) -> AppResult<String> {
    serde_json::to_string(tags).map_err(|e| AppError::Internal(e.into()))
}

/// Inserts without an ownership check; callers scope the timetable first.
pub fn insert_entry(conn: &Connection, entry: &NewEntry) -> AppResult<Entry> {
    let created_at = now_millis();
    conn.execute(
        "INSERT INTO entries
         (title, description, date, precision, tags, recurrence_rule, reminder_at, timetable_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            &entry.title,
            &entry.description,
            to_millis(entry.date),
            entry.precision.as_str(),
            tags_json(&entry.tags)?,
            entry.recurrence_rule.as_str(),
            entry.reminder_at.map(to_millis),
            entry.timetable_id,
            created_at,
        ],
    )?;

    let id = conn.last_insert_rowid();
    // Read back so the returned record has the stored millisecond resolution.
    let stored = conn.query_row(
        &format!("SELECT {} FROM entries e WHERE e.id = ?1", ENTRY_COLUMNS),
        [id],
        entry_from_row,
    )?;
    Ok(stored)
}

pub fn create_entry(conn: &Connection, owner_id: i64, entry: &NewEntry) -> AppResult<Entry> {
    timetables::get_timetable(conn, owner_id, entry.timetable_id)?;
    insert_entry(conn, entry)
}

/// Inserts every row in one transaction. Rows are expected to be validated already.
pub fn bulk_create_entries(
    conn: &Connection,
    owner_id: i64,
    timetable_id: i64,
    rows: &[NewEntry],
) -> AppResult<Vec<Entry>> {
    timetables::get_timetable(conn, owner_id, timetable_id)?;

    let tx = conn.unchecked_transaction()?;
    let mut created = Vec::with_capacity(rows.len());
    for row in rows {
        let row = NewEntry {
            timetable_id,
            ..row.clone()
        };
        created.push(insert_entry(&tx, &row)?);
    }
    tx.commit()?;
    Ok(created)
}

pub fn get_entry(conn: &Connection, owner_id: i64, id: i64) -> AppResult<Entry> {
    conn.query_row(
        &format!(
            "SELECT {} FROM entries e
             JOIN timetables t ON t.id = e.timetable_id
             WHERE e.id = ?1 AND t.owner_id = ?2",
            ENTRY_COLUMNS
        ),
        [id, owner_id],
        entry_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found(format!("entry {}", id)))
}

/// Entries of one timetable, ascending by date.
pub fn list_entries(conn: &Connection, owner_id: i64, timetable_id: i64) -> AppResult<Vec<Entry>> {
    search_entries(conn, owner_id, timetable_id, &EntryFilter::default())
}

/// Substring, date range and tag search within one timetable, ascending by date.
pub fn search_entries(
    conn: &Connection,
    owner_id: i64,
    timetable_id: i64,
    filter: &EntryFilter,
) -> AppResult<Vec<Entry>> {
    timetables::get_timetable(conn, owner_id, timetable_id)?;

    let mut conditions = vec!["e.timetable_id = ?1".to_string()];
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(timetable_id)];

    // instr() is case-sensitive, unlike LIKE
    if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
        params.push(Box::new(query.to_string()));
        let idx = params.len();
        conditions.push(format!(
            "(instr(e.title, ?{idx}) > 0 OR instr(e.description, ?{idx}) > 0)"
        ));
    }
    if let Some(start) = filter.start {
        params.push(Box::new(to_millis(start)));
        conditions.push(format!("e.date >= ?{}", params.len()));
    }
    if let Some(end) = filter.end {
        params.push(Box::new(to_millis(end)));
        conditions.push(format!("e.date <= ?{}", params.len()));
    }

    let sql = format!(
        "SELECT {} FROM entries e
         WHERE {}
         ORDER BY e.date ASC, e.id ASC",
        ENTRY_COLUMNS,
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let entries = stmt
        .query_map(param_refs.as_slice(), entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    // Tags are stored as JSON text, so containment is only checked here.
    Ok(entries.into_iter().filter(|e| filter.matches(e)).collect())
}

pub fn update_entry(conn: &Connection, owner_id: i64, id: i64, entry: &NewEntry) -> AppResult<Entry> {
    let changed = conn.execute(
        "UPDATE entries SET title = ?1, description = ?2, date = ?3, precision = ?4,
                tags = ?5, recurrence_rule = ?6
         WHERE id = ?7
           AND timetable_id IN (SELECT id FROM timetables WHERE owner_id = ?8)",
        rusqlite::params![
            &entry.title,
            &entry.description,
            to_millis(entry.date),
            entry.precision.as_str(),
            tags_json(&entry.tags)?,
            entry.recurrence_rule.as_str(),
            id,
            owner_id,
        ],
    )?;
    if changed == 0 {
        return Err(AppError::not_found(format!("entry {}", id)));
    }
    get_entry(conn, owner_id, id)
}

pub fn delete_entry(conn: &Connection, owner_id: i64, id: i64) -> AppResult<()> {
    let deleted = conn.execute(
        "DELETE FROM entries
         WHERE id = ?1 AND timetable_id IN (SELECT id FROM timetables WHERE owner_id = ?2)",
        [id, owner_id],
    )?;
    if deleted == 0 {
        return Err(AppError::not_found(format!("entry {}", id)));
    }
    Ok(())
}

/// Sets or clears the reminder; a past instant fires on the next sweep.
pub fn set_reminder(
    conn: &Connection,
    owner_id: i64,
    id: i64,
    reminder_at: Option<DateTime<Utc>>,
) -> AppResult<Entry> {
    let changed = conn.execute(
        "UPDATE entries SET reminder_at = ?1
         WHERE id = ?2 AND timetable_id IN (SELECT id FROM timetables WHERE owner_id = ?3)",
        rusqlite::params![reminder_at.map(to_millis), id, owner_id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found(format!("entry {}", id)));
    }
    get_entry(conn, owner_id, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{accounts, test_support, timetables};
    use crate::models::{normalize_tags, Precision, RecurrenceRule};

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    fn new_entry(timetable_id: i64, title: &str, date: &str, tags: &[&str]) -> NewEntry {
        NewEntry {
            title: title.to_string(),
            description: format!("{} notes", title),
            date: utc(date),
            precision: Precision::Day,
            tags: normalize_tags(tags.iter().map(|t| t.to_string())),
            recurrence_rule: RecurrenceRule::None,
            reminder_at: None,
            timetable_id,
        }
    }

    #[test]
    fn corrupt_tag_column_is_an_error() {
        let (conn, owner, timetable) = test_support::seeded();
        let new = new_entry(timetable, "Tagged", "2024-05-01T00:00:00Z", &["a"]);
        let created = create_entry(&conn, owner, &new).unwrap();
        conn.execute("UPDATE entries SET tags = 'not json' WHERE id = ?1", [created.id])
            .unwrap();

        assert!(matches!(get_entry(&conn, owner, created.id), Err(AppError::Database(_))));
        assert!(matches!(list_entries(&conn, owner, timetable), Err(AppError::Database(_))));
    }

    #[test]
    fn created_entry_round_trips_through_list() {
        let (conn, owner, timetable) = test_support::seeded();
        let mut new = new_entry(timetable, "Moon landing", "1969-07-20T20:17:40.123Z", &["space"]);
        new.precision = Precision::Minute;
        new.recurrence_rule = RecurrenceRule::Daily;
        new.reminder_at = Some(utc("2030-01-01T00:00:00Z"));

        let created = create_entry(&conn, owner, &new).unwrap();
        let listed = list_entries(&conn, owner, timetable).unwrap();
        assert_eq!(listed, vec![created.clone()]);

        let fetched = &listed[0];
        assert_eq!(fetched.title, new.title);
        assert_eq!(fetched.description, new.description);
        assert_eq!(fetched.date, new.date);
        assert_eq!(fetched.precision, new.precision);
        assert_eq!(fetched.tags, new.tags);
        assert_eq!(fetched.recurrence_rule, new.recurrence_rule);
        assert_eq!(fetched.reminder_at, new.reminder_at);
        assert_eq!(fetched.timetable_id, timetable);
    }

    #[test]
    fn list_is_ascending_by_date() {
        let (conn, owner, timetable) = test_support::seeded();
        for (title, date) in [
            ("c", "2024-03-01T00:00:00Z"),
            ("a", "1990-01-01T00:00:00Z"),
            ("b", "2001-09-11T00:00:00Z"),
        ] {
            create_entry(&conn, owner, &new_entry(timetable, title, date, &[])).unwrap();
        }
        let titles: Vec<_> = list_entries(&conn, owner, timetable)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn search_matches_case_sensitive_substring_in_title_or_description() {
        let (conn, owner, timetable) = test_support::seeded();
        create_entry(&conn, owner, &new_entry(timetable, "Team Meeting", "2024-01-02T10:00:00Z", &[])).unwrap();
        create_entry(&conn, owner, &new_entry(timetable, "team meeting", "2024-01-03T10:00:00Z", &[])).unwrap();
        let mut described = new_entry(timetable, "Lunch", "2024-01-04T12:00:00Z", &[]);
        described.description = "Meet the new hires".into();
        create_entry(&conn, owner, &described).unwrap();

        let filter = EntryFilter {
            query: Some("Meet".into()),
            ..Default::default()
        };
        let titles: Vec<_> = search_entries(&conn, owner, timetable, &filter)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Team Meeting", "Lunch"]);
    }

    #[test]
    fn search_tags_require_superset() {
        let (conn, owner, timetable) = test_support::seeded();
        create_entry(&conn, owner, &new_entry(timetable, "both", "2024-01-01T00:00:00Z", &["work", "urgent"])).unwrap();
        create_entry(&conn, owner, &new_entry(timetable, "work", "2024-01-02T00:00:00Z", &["work"])).unwrap();
        create_entry(&conn, owner, &new_entry(timetable, "home", "2024-01-03T00:00:00Z", &["home"])).unwrap();
        create_entry(&conn, owner, &new_entry(timetable, "none", "2024-01-04T00:00:00Z", &[])).unwrap();

        let mut filter = EntryFilter {
            tags: normalize_tags(vec!["work".to_string()]),
            ..Default::default()
        };
        let found: Vec<_> = search_entries(&conn, owner, timetable, &filter)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(found, vec!["both", "work"]);

        filter.tags.insert("urgent".into());
        let found = search_entries(&conn, owner, timetable, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "both");
    }

    #[test]
    fn search_date_bounds_are_inclusive() {
        let (conn, owner, timetable) = test_support::seeded();
        for (title, date) in [
            ("before", "2023-12-31T23:59:59Z"),
            ("start", "2024-01-01T00:00:00Z"),
            ("end", "2024-01-31T00:00:00Z"),
            ("after", "2024-01-31T00:00:01Z"),
        ] {
            create_entry(&conn, owner, &new_entry(timetable, title, date, &[])).unwrap();
        }
        let filter = EntryFilter {
            start: Some(utc("2024-01-01T00:00:00Z")),
            end: Some(utc("2024-01-31T00:00:00Z")),
            ..Default::default()
        };
        let titles: Vec<_> = search_entries(&conn, owner, timetable, &filter)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["start", "end"]);
    }

    #[test]
    fn entries_outside_ownership_are_not_found() {
        let (conn, owner, timetable) = test_support::seeded();
        let entry = create_entry(&conn, owner, &new_entry(timetable, "mine", "2024-01-01T00:00:00Z", &[])).unwrap();
        let eve = accounts::create_user(&conn, "eve", "pw").unwrap();

        assert!(matches!(get_entry(&conn, eve.id, entry.id), Err(AppError::NotFound(_))));
        assert!(matches!(delete_entry(&conn, eve.id, entry.id), Err(AppError::NotFound(_))));
        assert!(matches!(list_entries(&conn, eve.id, timetable), Err(AppError::NotFound(_))));
        assert!(matches!(
            set_reminder(&conn, eve.id, entry.id, Some(Utc::now())),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            create_entry(&conn, eve.id, &new_entry(timetable, "sneaky", "2024-01-01T00:00:00Z", &[])),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(get_entry(&conn, owner, entry.id).unwrap(), entry);
    }

    #[test]
    fn update_and_delete() {
        let (conn, owner, timetable) = test_support::seeded();
        let entry = create_entry(&conn, owner, &new_entry(timetable, "draft", "2024-01-01T00:00:00Z", &[])).unwrap();

        let mut changed = new_entry(timetable, "final", "2024-02-01T00:00:00Z", &["done"]);
        changed.precision = Precision::Month;
        let updated = update_entry(&conn, owner, entry.id, &changed).unwrap();
        assert_eq!(updated.title, "final");
        assert_eq!(updated.precision, Precision::Month);
        assert_eq!(updated.created_at, entry.created_at);

        delete_entry(&conn, owner, entry.id).unwrap();
        assert!(matches!(get_entry(&conn, owner, entry.id), Err(AppError::NotFound(_))));
        assert!(matches!(update_entry(&conn, owner, entry.id, &changed), Err(AppError::NotFound(_))));
    }

    #[test]
    fn bulk_create_pins_rows_to_target_timetable() {
        let (conn, owner, timetable) = test_support::seeded();
        let rows = vec![
            new_entry(999, "one", "2024-01-01T00:00:00Z", &[]),
            new_entry(timetable, "two", "2024-01-02T00:00:00Z", &[]),
        ];
        let created = bulk_create_entries(&conn, owner, timetable, &rows).unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|e| e.timetable_id == timetable));
    }

    #[test]
    fn deleting_a_timetable_cascades_only_to_its_entries() {
        let (conn, owner, history) = test_support::seeded();
        let work = timetables::create_timetable(&conn, owner, "Work").unwrap();
        for i in 0..3 {
            create_entry(&conn, owner, &new_entry(history, &format!("h{i}"), "2024-01-01T00:00:00Z", &[])).unwrap();
        }
        let kept = create_entry(&conn, owner, &new_entry(work.id, "w", "2024-01-01T00:00:00Z", &[])).unwrap();

        assert_eq!(timetables::delete_timetable(&conn, owner, history).unwrap(), 3);

        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries WHERE timetable_id = ?1", [history], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
        assert_eq!(list_entries(&conn, owner, work.id).unwrap(), vec![kept]);

        timetables::delete_all_timetables(&conn, owner).unwrap();
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0)).unwrap();
        assert_eq!(remaining, 0);
    }
}
