//! Company dashboard: headline counters, recent work and the month's top
//! delivery men. Day and month boundaries are UTC.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::activity::{self, ActivityLog};
use crate::delivery::{Delivery, DeliveryView};
use crate::error::Result;
use crate::types::DeliveryStatus;

const RECENT: u32 = 5;
const TOP_PERFORMERS: u32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_deliveries: u64,
    pub active_deliverymen: u64,
    pub total_customers: u64,
    pub delivery_status_counts: BTreeMap<DeliveryStatus, u64>,
    pub delivered_today: u64,
    pub revenue_today: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub id: i64,
    pub action: String,
    pub description: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    pub subject_type: Option<String>,
    pub subject_id: Option<i64>,
}

impl From<ActivityLog> for RecentActivity {
    fn from(log: ActivityLog) -> Self {
        Self {
            id: log.id,
            action: log.action,
            description: log.description,
            user_name: log.user_name.unwrap_or_else(|| "System".to_string()),
            created_at: log.created_at,
            subject_type: log.subject_type,
            subject_id: log.subject_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopPerformer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub mobile_no: String,
    pub delivered_deliveries: u64,
    pub on_time_rate: f64,
    pub total_deliveries_this_month: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub summary: Summary,
    pub recent_deliveries: Vec<DeliveryView>,
    pub recent_activity: Vec<RecentActivity>,
    pub top_performers: Vec<TopPerformer>,
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc())
        .unwrap_or(now)
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| Utc.from_utc_datetime(&n))
        .unwrap_or(now)
}

/// Percentage with one decimal place.
fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<u64> {
    Ok(conn.query_row(sql, params, |r| r.get(0))?)
}

pub fn summary(conn: &Connection, company_id: i64, now: DateTime<Utc>) -> Result<Summary> {
    let today = start_of_day(now);

    let mut delivery_status_counts: BTreeMap<DeliveryStatus, u64> =
        DeliveryStatus::all().iter().map(|s| (*s, 0)).collect();
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM deliveries
         WHERE company_id = ?1 AND deleted_at IS NULL GROUP BY status",
    )?;
    let rows = stmt
        .query_map([company_id], |r| Ok((r.get::<_, DeliveryStatus>(0)?, r.get::<_, u64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for (status, n) in rows {
        delivery_status_counts.insert(status, n);
    }

    Ok(Summary {
        total_deliveries: delivery_status_counts.values().sum(),
        active_deliverymen: count(
            conn,
            "SELECT COUNT(*) FROM company_delivery_man WHERE company_id = ?1",
            [company_id],
        )?,
        total_customers: count(
            conn,
            "SELECT COUNT(*) FROM customers WHERE company_id = ?1",
            [company_id],
        )?,
        delivered_today: count(
            conn,
            "SELECT COUNT(*) FROM deliveries
             WHERE company_id = ?1 AND deleted_at IS NULL
               AND status = 'delivered' AND delivered_at >= ?2",
            params![company_id, today],
        )?,
        revenue_today: conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM deliveries
             WHERE company_id = ?1 AND deleted_at IS NULL
               AND status = 'delivered' AND delivered_at >= ?2",
            params![company_id, today],
            |r| r.get(0),
        )?,
        delivery_status_counts,
    })
}

/// Linked delivery men ranked by deliveries completed this month. Anyone
/// with nothing delivered yet is left out.
pub fn top_performers(conn: &Connection, company_id: i64, now: DateTime<Utc>) -> Result<Vec<TopPerformer>> {
    let month = start_of_month(now);
    let mut stmt = conn.prepare(
        "SELECT m.id, m.name, m.email, m.mobile_no,
                SUM(CASE WHEN d.status = 'delivered' THEN 1 ELSE 0 END) AS delivered,
                SUM(CASE WHEN d.status = 'delivered'
                          AND d.expected_delivery_time IS NOT NULL
                          AND d.delivered_at <= d.expected_delivery_time THEN 1 ELSE 0 END) AS on_time,
                COUNT(d.id) AS total
         FROM delivery_men m
         JOIN company_delivery_man p ON p.delivery_man_id = m.id AND p.company_id = ?1
         JOIN deliveries d ON d.delivery_man_id = m.id AND d.company_id = ?1
              AND d.deleted_at IS NULL AND d.delivered_at >= ?2
         GROUP BY m.id
         HAVING delivered > 0
         ORDER BY delivered DESC, m.id
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![company_id, month, TOP_PERFORMERS], |r| {
            let delivered: u64 = r.get(4)?;
            let on_time: u64 = r.get(5)?;
            let total: u64 = r.get(6)?;
            Ok(TopPerformer {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
                mobile_no: r.get(3)?,
                delivered_deliveries: delivered,
                on_time_rate: rate(on_time, total),
                total_deliveries_this_month: total,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn load(conn: &Connection, company_id: i64, now: DateTime<Utc>) -> Result<Dashboard> {
    Ok(Dashboard {
        summary: summary(conn, company_id, now)?,
        recent_deliveries: Delivery::recent(conn, company_id, RECENT)?,
        recent_activity: activity::recent(conn, company_id, RECENT)?
            .into_iter()
            .map(RecentActivity::from)
            .collect(),
        top_performers: top_performers(conn, company_id, now)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::CompanyScope;
    use crate::company::{Company, NewCompany};
    use crate::customer::{Customer, CustomerInput};
    use crate::db::Store;
    use crate::delivery::{DeliveryUpdate, NewDelivery};
    use crate::delivery_man::{DeliveryMan, DeliveryManInput};
    use crate::types::Actor;

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(2, 3), 66.7);
        assert_eq!(rate(4, 4), 100.0);
    }

    #[test]
    fn month_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 15, 4, 5).unwrap();
        assert_eq!(
            start_of_month(now),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2025, 3, 17, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn empty_company_has_all_status_keys() {
        let store = Store::in_memory().unwrap();
        let id = store
            .write(|tx| Ok(Company::create(tx, &NewCompany::named("Acme"))?.id))
            .unwrap();
        let d = store.read(|c| load(c, id, Utc::now())).unwrap();
        assert_eq!(d.summary.delivery_status_counts.len(), 5);
        assert_eq!(d.summary.total_deliveries, 0);
        assert_eq!(d.summary.revenue_today, 0.0);
        assert!(d.top_performers.is_empty());

        let json = serde_json::to_value(&d.summary).unwrap();
        assert_eq!(json["delivery_status_counts"]["in_progress"], 0);
    }

    #[test]
    fn counts_revenue_and_performers() {
        let store = Store::in_memory().unwrap();
        let company_id = store
            .write(|tx| Ok(Company::create(tx, &NewCompany::named("Acme"))?.id))
            .unwrap();
        let scope = CompanyScope::new(company_id, None);
        let actor = Actor::system();

        let (customer, fast, idle) = store
            .write(|tx| {
                let c = Customer::create(
                    tx,
                    &scope,
                    CustomerInput {
                        name: Some("Ann".into()),
                        mobile_no: Some("555".into()),
                        ..CustomerInput::default()
                    },
                )?;
                let fast = DeliveryMan::create_and_link(
                    tx,
                    &scope,
                    DeliveryManInput {
                        name: Some("Fast".into()),
                        mobile_no: Some("1".into()),
                        email: None,
                    },
                )?;
                let idle = DeliveryMan::create_and_link(
                    tx,
                    &scope,
                    DeliveryManInput {
                        name: Some("Idle".into()),
                        mobile_no: Some("2".into()),
                        email: None,
                    },
                )?;
                Ok((c.id, fast.id, idle.id))
            })
            .unwrap();

        let book = |man: i64, amount: f64, expected: &str| {
            store
                .write(|tx| {
                    Delivery::create(
                        tx,
                        &scope,
                        actor,
                        NewDelivery {
                            customer_id: Some(customer),
                            drop_address: Some("5 Elm".into()),
                            delivery_man_id: Some(man),
                            amount: Some(amount),
                            expected_delivery_time: Some(expected.into()),
                            ..NewDelivery::default()
                        },
                    )
                })
                .unwrap()
                .record
                .view
                .delivery
                .id
        };
        let deliver = |id: i64| {
            store
                .write(|tx| {
                    Delivery::update(
                        tx,
                        &scope,
                        actor,
                        id,
                        DeliveryUpdate {
                            status: Some("delivered".into()),
                            ..DeliveryUpdate::default()
                        },
                    )
                })
                .unwrap()
        };

        // One on time (far future deadline), one late (deadline long past).
        deliver(book(fast, 10.0, "2999-01-01 00:00:00"));
        deliver(book(fast, 5.5, "2000-01-01 00:00:00"));
        book(idle, 99.0, "2999-01-01 00:00:00");

        let d = store.read(|c| load(c, company_id, Utc::now())).unwrap();
        assert_eq!(d.summary.total_deliveries, 3);
        assert_eq!(d.summary.active_deliverymen, 2);
        assert_eq!(d.summary.total_customers, 1);
        assert_eq!(d.summary.delivered_today, 2);
        assert_eq!(d.summary.revenue_today, 15.5);
        assert_eq!(d.summary.delivery_status_counts[&DeliveryStatus::Assigned], 1);
        assert_eq!(d.recent_deliveries.len(), 3);
        assert_eq!(d.recent_activity.len(), 5);
        assert_eq!(d.recent_activity[0].user_name, "System");

        assert_eq!(d.top_performers.len(), 1);
        let top = &d.top_performers[0];
        assert_eq!(top.id, fast);
        assert_eq!(top.delivered_deliveries, 2);
        assert_eq!(top.total_deliveries_this_month, 2);
        assert_eq!(top.on_time_rate, 50.0);
    }
}
