//! Per-company audit trail of user actions.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::db::{Page, PageRequest};
use crate::error::Result;

/// Who is acting, for which tenant, from where. Every company-side write
/// carries one so the activity row can be attributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyScope {
    pub company_id: i64,
    pub user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl CompanyScope {
    pub fn new(company_id: i64, user_id: Option<i64>) -> Self {
        Self {
            company_id,
            user_id,
            ..Self::default()
        }
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// The record an activity row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject<'a> {
    pub kind: &'a str,
    pub id: i64,
}

impl<'a> Subject<'a> {
    pub fn new(kind: &'a str, id: i64) -> Self {
        Self { kind, id }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    pub id: i64,
    pub company_id: i64,
    pub user_id: Option<i64>,
    pub user_name: Option<String>,
    pub action: String,
    pub description: String,
    pub subject_type: Option<String>,
    pub subject_id: Option<i64>,
    pub properties: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

const SELECT: &str = "SELECT l.id, l.company_id, l.user_id, u.name, l.action, l.description,
        l.subject_type, l.subject_id, l.properties, l.ip_address, l.user_agent, l.created_at
    FROM company_activity_logs l
    LEFT JOIN company_users u ON u.id = l.user_id";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ActivityLog> {
    Ok(ActivityLog {
        id: row.get(0)?,
        company_id: row.get(1)?,
        user_id: row.get(2)?,
        user_name: row.get(3)?,
        action: row.get(4)?,
        description: row.get(5)?,
        subject_type: row.get(6)?,
        subject_id: row.get(7)?,
        properties: row.get(8)?,
        ip_address: row.get(9)?,
        user_agent: row.get(10)?,
        created_at: row.get(11)?,
    })
}

pub fn record(
    conn: &Connection,
    scope: &CompanyScope,
    action: &str,
    description: &str,
    subject: Option<Subject<'_>>,
    properties: Option<serde_json::Value>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO company_activity_logs
            (company_id, user_id, action, description, subject_type, subject_id,
             properties, ip_address, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            scope.company_id,
            scope.user_id,
            action,
            description,
            subject.map(|s| s.kind),
            subject.map(|s| s.id),
            properties,
            scope.ip_address,
            scope.user_agent,
            Utc::now(),
        ],
    )?;
    tracing::debug!(company_id = scope.company_id, action, "activity recorded");
    Ok(conn.last_insert_rowid())
}

/// Newest first, at most `limit` rows.
pub fn recent(conn: &Connection, company_id: i64, limit: u32) -> Result<Vec<ActivityLog>> {
    let sql = format!("{SELECT} WHERE l.company_id = ?1 ORDER BY l.created_at DESC, l.id DESC LIMIT ?2");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![company_id, limit], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list(
    conn: &Connection,
    company_id: i64,
    action: Option<&str>,
    page: PageRequest,
) -> Result<Page<ActivityLog>> {
    let total: u64 = conn.query_row(
        "SELECT COUNT(*) FROM company_activity_logs
         WHERE company_id = ?1 AND (?2 IS NULL OR action = ?2)",
        params![company_id, action],
        |r| r.get(0),
    )?;
    let sql = format!(
        "{SELECT} WHERE l.company_id = ?1 AND (?2 IS NULL OR l.action = ?2)
         ORDER BY l.created_at DESC, l.id DESC LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![company_id, action, page.limit(), page.offset()],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Page::new(rows, page, total))
}

// ---------------------------------------------------------------------------
// Description templates
// ---------------------------------------------------------------------------

pub fn delivery_description(
    action: &str,
    tracking_number: &str,
    customer_name: Option<&str>,
    delivery_man_name: Option<&str>,
    status: &str,
) -> String {
    let customer = customer_name.unwrap_or("Unknown Customer");
    let man = delivery_man_name.unwrap_or("unassigned");
    match action {
        "delivery_created" => format!("New delivery {tracking_number} created for {customer}"),
        "delivery_assigned" => format!("Delivery {tracking_number} assigned to {man}"),
        "delivery_status_changed" => {
            format!("Delivery {tracking_number} status changed to {status}")
        }
        "delivery_completed" => format!("Delivery {tracking_number} completed for {customer}"),
        "delivery_updated" => format!("Delivery {tracking_number} updated"),
        "delivery_deleted" => format!("Delivery {tracking_number} deleted"),
        other => format!("Delivery action: {other}"),
    }
}

pub fn customer_description(action: &str, customer_name: &str) -> String {
    match action {
        "customer_created" => format!("New customer created: {customer_name}"),
        "customer_updated" => format!("Customer {customer_name} updated"),
        "customer_deleted" => format!("Customer {customer_name} deleted"),
        other => format!("Customer action: {other}"),
    }
}

pub fn delivery_man_description(action: &str, name: &str) -> String {
    match action {
        "delivery_man_linked" => format!("Delivery man {name} linked to company"),
        "delivery_man_unlinked" => format!("Delivery man {name} unlinked from company"),
        other => format!("Delivery man action: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::company::{Company, NewCompany};
    use crate::db::Store;

    fn seed(store: &Store) -> i64 {
        store
            .write(|tx| Ok(Company::create(tx, &NewCompany::named("Acme"))?.id))
            .unwrap()
    }

    #[test]
    fn record_and_read_back() {
        let store = Store::in_memory().unwrap();
        let company_id = seed(&store);
        let scope = CompanyScope::new(company_id, None)
            .with_client(Some("10.0.0.1".into()), Some("curl/8".into()));

        store
            .write(|tx| {
                record(
                    tx,
                    &scope,
                    "item_created",
                    "Item 'Box' created",
                    Some(Subject::new("item", 7)),
                    Some(serde_json::json!({ "name": "Box" })),
                )
            })
            .unwrap();

        let logs = store.read(|c| recent(c, company_id, 5)).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "item_created");
        assert_eq!(logs[0].subject_type.as_deref(), Some("item"));
        assert_eq!(logs[0].subject_id, Some(7));
        assert_eq!(logs[0].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(logs[0].properties.as_ref().unwrap()["name"], "Box");
        assert!(logs[0].user_name.is_none());
    }

    #[test]
    fn list_filters_by_action_and_pages() {
        let store = Store::in_memory().unwrap();
        let company_id = seed(&store);
        let scope = CompanyScope::new(company_id, None);
        store
            .write(|tx| {
                for i in 0..3 {
                    record(tx, &scope, "item_created", &format!("i{i}"), None, None)?;
                }
                record(tx, &scope, "item_deleted", "gone", None, None)?;
                Ok(())
            })
            .unwrap();

        let page = store
            .read(|c| list(c, company_id, Some("item_created"), PageRequest::new(Some(1), Some(2))))
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.last_page, 2);

        let all = store
            .read(|c| list(c, company_id, None, PageRequest::default()))
            .unwrap();
        assert_eq!(all.total, 4);
        assert_eq!(all.data[0].action, "item_deleted");
    }

    #[test]
    fn recent_is_tenant_scoped() {
        let store = Store::in_memory().unwrap();
        let a = seed(&store);
        let b = seed(&store);
        store
            .write(|tx| record(tx, &CompanyScope::new(a, None), "x", "x", None, None))
            .unwrap();
        assert!(store.read(|c| recent(c, b, 5)).unwrap().is_empty());
    }

    #[test]
    fn description_templates() {
        assert_eq!(
            delivery_description("delivery_assigned", "DLV-1", Some("Ann"), None, "assigned"),
            "Delivery DLV-1 assigned to unassigned"
        );
        assert_eq!(
            delivery_description("delivery_created", "DLV-1", None, None, "pending"),
            "New delivery DLV-1 created for Unknown Customer"
        );
        assert_eq!(
            customer_description("customer_deleted", "Ann"),
            "Customer Ann deleted"
        );
        assert_eq!(
            delivery_man_description("delivery_man_linked", "Bo"),
            "Delivery man Bo linked to company"
        );
    }
}
