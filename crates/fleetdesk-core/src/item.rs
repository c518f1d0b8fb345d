//! Per-company catalogue of things that can be put on a delivery.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::activity::{self, CompanyScope, Subject};
use crate::db::{like_pattern, Page, PageRequest};
use crate::error::{DeskError, Result, ValidationErrors};
use crate::validate;

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub code: Option<String>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemInput {
    pub name: Option<String>,
    pub code: Option<String>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub active: Option<bool>,
    pub search: Option<String>,
}

const COLS: &str = "id, company_id, name, code, unit, notes, is_active, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        code: row.get(3)?,
        unit: row.get(4)?,
        notes: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn taken(conn: &Connection, company_id: i64, column: &str, value: &str, except: Option<i64>) -> Result<bool> {
    let n: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM items WHERE company_id = ?1 AND {column} = ?2 AND (?3 IS NULL OR id <> ?3)"
        ),
        params![company_id, value, except],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Shared create/update checks. `except` is the item being edited.
fn check(
    conn: &Connection,
    company_id: i64,
    name: Option<&str>,
    code: Option<&str>,
    unit: Option<&str>,
    except: Option<i64>,
) -> Result<()> {
    let mut errors = ValidationErrors::new();
    validate::required(&mut errors, "name", name, Some(255));
    validate::max_len(&mut errors, "code", code, Some(255));
    validate::max_len(&mut errors, "unit", unit, Some(50));
    if let Some(name) = name {
        if taken(conn, company_id, "name", name, except)? {
            errors.add("name", "The name has already been taken.");
        }
    }
    if let Some(code) = code {
        if taken(conn, company_id, "code", code, except)? {
            errors.add("code", "The code has already been taken.");
        }
    }
    errors.into_result()
}

impl Item {
    /// Alphabetical, fixed page size.
    pub fn list(
        conn: &Connection,
        company_id: i64,
        filter: &ItemFilter,
        page: PageRequest,
    ) -> Result<Page<Item>> {
        let pattern = filter.search.as_deref().map(like_pattern);
        let filter_sql = "company_id = ?1
            AND (?2 IS NULL OR is_active = ?2)
            AND (?3 IS NULL OR name LIKE ?3 ESCAPE '\\' OR code LIKE ?3 ESCAPE '\\')";

        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM items WHERE {filter_sql}"),
            params![company_id, filter.active, pattern],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM items WHERE {filter_sql} ORDER BY name LIMIT ?4 OFFSET ?5"
        ))?;
        let rows = stmt
            .query_map(
                params![company_id, filter.active, pattern, page.limit(), page.offset()],
                from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page::new(rows, page, total))
    }

    pub fn get(conn: &Connection, company_id: i64, id: i64) -> Result<Item> {
        conn.query_row(
            &format!("SELECT {COLS} FROM items WHERE company_id = ?1 AND id = ?2"),
            params![company_id, id],
            from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("Item"))
    }

    pub fn create(conn: &Connection, scope: &CompanyScope, input: ItemInput) -> Result<Item> {
        let name = validate::normalize(input.name);
        let code = validate::normalize(input.code);
        let unit = validate::normalize(input.unit);
        let notes = validate::normalize(input.notes);
        check(
            conn,
            scope.company_id,
            name.as_deref(),
            code.as_deref(),
            unit.as_deref(),
            None,
        )?;

        let now = Utc::now();
        conn.execute(
            "INSERT INTO items (company_id, name, code, unit, notes, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                scope.company_id,
                name,
                code,
                unit,
                notes,
                input.is_active.unwrap_or(true),
                now
            ],
        )?;
        let item = Self::get(conn, scope.company_id, conn.last_insert_rowid())?;
        activity::record(
            conn,
            scope,
            "item_created",
            &format!("Item '{}' created", item.name),
            Some(Subject::new("item", item.id)),
            None,
        )?;
        Ok(item)
    }

    /// Full replace of the editable fields; `is_active` keeps its value
    /// when omitted.
    pub fn update(conn: &Connection, scope: &CompanyScope, id: i64, input: ItemInput) -> Result<Item> {
        let current = Self::get(conn, scope.company_id, id)?;
        let name = validate::normalize(input.name);
        let code = validate::normalize(input.code);
        let unit = validate::normalize(input.unit);
        let notes = validate::normalize(input.notes);
        check(
            conn,
            scope.company_id,
            name.as_deref(),
            code.as_deref(),
            unit.as_deref(),
            Some(id),
        )?;

        conn.execute(
            "UPDATE items SET name = ?2, code = ?3, unit = ?4, notes = ?5, is_active = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                name,
                code,
                unit,
                notes,
                input.is_active.unwrap_or(current.is_active),
                Utc::now()
            ],
        )?;
        let item = Self::get(conn, scope.company_id, id)?;
        activity::record(
            conn,
            scope,
            "item_updated",
            &format!("Item '{}' updated", item.name),
            Some(Subject::new("item", item.id)),
            None,
        )?;
        Ok(item)
    }

    pub fn delete(conn: &Connection, scope: &CompanyScope, id: i64) -> Result<()> {
        let item = Self::get(conn, scope.company_id, id)?;
        let used: i64 = conn.query_row(
            "SELECT COUNT(*) FROM delivery_items WHERE item_id = ?1",
            [id],
            |r| r.get(0),
        )?;
        if used > 0 {
            return Err(DeskError::Conflict(
                "Cannot delete item that is used in deliveries. You can deactivate it instead."
                    .to_string(),
            ));
        }
        conn.execute("DELETE FROM items WHERE id = ?1", [id])?;
        activity::record(
            conn,
            scope,
            "item_deleted",
            &format!("Item '{}' deleted", item.name),
            None,
            None,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::company::{Company, NewCompany};
    use crate::db::Store;

    fn setup() -> (Store, CompanyScope) {
        let store = Store::in_memory().unwrap();
        let id = store
            .write(|tx| Ok(Company::create(tx, &NewCompany::named("Acme"))?.id))
            .unwrap();
        (store, CompanyScope::new(id, None))
    }

    fn named(name: &str, code: Option<&str>) -> ItemInput {
        ItemInput {
            name: Some(name.into()),
            code: code.map(Into::into),
            ..ItemInput::default()
        }
    }

    #[test]
    fn create_defaults_active() {
        let (store, scope) = setup();
        let item = store
            .write(|tx| Item::create(tx, &scope, named("Box", Some("BX"))))
            .unwrap();
        assert!(item.is_active);
        assert_eq!(item.code.as_deref(), Some("BX"));
    }

    #[test]
    fn name_and_code_unique_per_company() {
        let (store, scope) = setup();
        store
            .write(|tx| Item::create(tx, &scope, named("Box", Some("BX"))))
            .unwrap();
        let err = store
            .write(|tx| Item::create(tx, &scope, named("Box", Some("BX"))))
            .unwrap_err();
        match err {
            DeskError::Validation(v) => {
                assert!(v.has("name"));
                assert!(v.has("code"));
            }
            other => panic!("unexpected {other:?}"),
        }

        // Items without a code never collide on it.
        store
            .write(|tx| {
                Item::create(tx, &scope, named("A", None))?;
                Item::create(tx, &scope, named("B", None))
            })
            .unwrap();
    }

    #[test]
    fn unit_length_checked() {
        let (store, scope) = setup();
        let mut input = named("Box", None);
        input.unit = Some("x".repeat(51));
        let err = store.write(|tx| Item::create(tx, &scope, input)).unwrap_err();
        assert!(matches!(err, DeskError::Validation(ref v) if v.has("unit")));
    }

    #[test]
    fn update_keeps_active_flag_when_omitted() {
        let (store, scope) = setup();
        let item = store
            .write(|tx| {
                let mut input = named("Box", None);
                input.is_active = Some(false);
                Item::create(tx, &scope, input)
            })
            .unwrap();
        let updated = store
            .write(|tx| Item::update(tx, &scope, item.id, named("Crate", None)))
            .unwrap();
        assert_eq!(updated.name, "Crate");
        assert!(!updated.is_active);
    }

    #[test]
    fn list_filters() {
        let (store, scope) = setup();
        store
            .write(|tx| {
                Item::create(tx, &scope, named("Widget", Some("W-1")))?;
                Item::create(tx, &scope, named("Apple", None))?;
                let mut off = named("Zed", None);
                off.is_active = Some(false);
                Item::create(tx, &scope, off)
            })
            .unwrap();

        let all = store
            .read(|c| Item::list(c, scope.company_id, &ItemFilter::default(), PageRequest::default()))
            .unwrap();
        let names: Vec<_> = all.data.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Apple", "Widget", "Zed"]);

        let active = store
            .read(|c| {
                Item::list(
                    c,
                    scope.company_id,
                    &ItemFilter {
                        active: Some(true),
                        search: None,
                    },
                    PageRequest::default(),
                )
            })
            .unwrap();
        assert_eq!(active.total, 2);

        let by_code = store
            .read(|c| {
                Item::list(
                    c,
                    scope.company_id,
                    &ItemFilter {
                        active: None,
                        search: Some("W-".into()),
                    },
                    PageRequest::default(),
                )
            })
            .unwrap();
        assert_eq!(by_code.data[0].name, "Widget");
    }

    #[test]
    fn delete_logs_activity() {
        let (store, scope) = setup();
        let item = store
            .write(|tx| Item::create(tx, &scope, named("Box", None)))
            .unwrap();
        store.write(|tx| Item::delete(tx, &scope, item.id)).unwrap();
        let logs = store.read(|c| activity::recent(c, scope.company_id, 1)).unwrap();
        assert_eq!(logs[0].description, "Item 'Box' deleted");
    }
}
