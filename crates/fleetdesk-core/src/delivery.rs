//! Delivery orders: booking, assignment, the status lifecycle, line items
//! and the per-delivery status history.
//!
//! Pickup and drop locations are snapshotted onto the delivery row when it
//! is booked, so later edits to a saved address never rewrite history.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::activity::{self, CompanyScope, Subject};
use crate::address::Address;
use crate::customer::{self, Customer, CustomerInput};
use crate::db::{Page, PageRequest};
use crate::delivery_man::DeliveryMan;
use crate::error::{DeskError, Result, ValidationErrors};
use crate::geocode::{GeocodeJob, GeocodeTarget, Saved};
use crate::item::Item;
use crate::types::{Actor, ActorKind, DeliveryMode, DeliveryStatus, DeliveryType};
use crate::validate;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub id: i64,
    pub tracking_number: String,
    pub company_id: i64,
    pub delivery_man_id: Option<i64>,
    pub customer_id: i64,
    pub pickup_address_id: Option<i64>,
    pub drop_address_id: Option<i64>,
    pub pickup_label: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub drop_label: Option<String>,
    pub drop_address: String,
    pub drop_latitude: Option<f64>,
    pub drop_longitude: Option<f64>,
    pub delivery_notes: Option<String>,
    pub delivery_type: Option<DeliveryType>,
    pub expected_delivery_time: Option<DateTime<Utc>>,
    pub delivery_mode: Option<DeliveryMode>,
    pub status: DeliveryStatus,
    pub proof_notes: Option<String>,
    pub proof_image_url: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub in_progress_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Name and phone of a customer or delivery man, embedded in listings.
#[derive(Debug, Clone, Serialize)]
pub struct PartySummary {
    pub id: i64,
    pub name: String,
    pub mobile_no: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryView {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub customer: Option<PartySummary>,
    pub delivery_man: Option<PartySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryLine {
    pub id: i64,
    pub item_id: i64,
    pub name: String,
    pub code: Option<String>,
    pub unit: Option<String>,
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusLog {
    pub id: i64,
    pub delivery_id: i64,
    pub status: DeliveryStatus,
    pub changed_by_id: Option<i64>,
    pub changed_by_type: Option<ActorKind>,
    pub remarks: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryDetail {
    #[serde(flatten)]
    pub view: DeliveryView,
    pub items: Vec<DeliveryLine>,
    pub status_logs: Vec<StatusLog>,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineInput {
    pub id: i64,
    pub quantity: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDelivery {
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_mobile_no: Option<String>,
    pub customer_address: Option<String>,
    pub pickup_address_id: Option<i64>,
    pub pickup_address: Option<String>,
    pub drop_address_id: Option<i64>,
    #[serde(alias = "delivery_address")]
    pub drop_address: Option<String>,
    pub delivery_man_id: Option<i64>,
    pub delivery_notes: Option<String>,
    pub delivery_type: Option<String>,
    pub delivery_mode: Option<String>,
    pub expected_delivery_time: Option<String>,
    pub amount: Option<f64>,
    pub items: Option<Vec<LineInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryUpdate {
    pub status: Option<String>,
    pub delivery_man_id: Option<i64>,
    pub remarks: Option<String>,
    pub delivery_notes: Option<String>,
    pub delivery_type: Option<String>,
    pub delivery_mode: Option<String>,
    pub expected_delivery_time: Option<String>,
    pub amount: Option<f64>,
    pub items: Option<Vec<LineInput>>,
}

impl DeliveryUpdate {
    fn edits_fields(&self) -> bool {
        self.delivery_notes.is_some()
            || self.delivery_type.is_some()
            || self.delivery_mode.is_some()
            || self.expected_delivery_time.is_some()
            || self.amount.is_some()
            || self.items.is_some()
    }
}

/// Status change reported from the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProofUpdate {
    pub status: Option<String>,
    pub proof_notes: Option<String>,
    pub proof_image_url: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub status: Option<DeliveryStatus>,
    pub delivery_man_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub search: Option<String>,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const COLS: &str = "d.id, d.tracking_number, d.company_id, d.delivery_man_id, d.customer_id,
    d.pickup_address_id, d.drop_address_id, d.pickup_label, d.pickup_address,
    d.pickup_latitude, d.pickup_longitude, d.drop_label, d.drop_address, d.drop_latitude,
    d.drop_longitude, d.delivery_notes, d.delivery_type, d.expected_delivery_time,
    d.delivery_mode, d.status, d.proof_notes, d.proof_image_url, d.assigned_at,
    d.in_progress_at, d.delivered_at, d.amount, d.created_at, d.updated_at,
    c.name, c.mobile_no, m.name, m.mobile_no";

const FROM: &str = "FROM deliveries d
    LEFT JOIN customers c ON c.id = d.customer_id
    LEFT JOIN delivery_men m ON m.id = d.delivery_man_id";

/// Rider access ends when the company unlinks them.
const LINKED: &str = "EXISTS (SELECT 1 FROM company_delivery_man p
    WHERE p.company_id = d.company_id AND p.delivery_man_id = d.delivery_man_id)";

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryView> {
    let delivery = Delivery {
        id: row.get(0)?,
        tracking_number: row.get(1)?,
        company_id: row.get(2)?,
        delivery_man_id: row.get(3)?,
        customer_id: row.get(4)?,
        pickup_address_id: row.get(5)?,
        drop_address_id: row.get(6)?,
        pickup_label: row.get(7)?,
        pickup_address: row.get(8)?,
        pickup_latitude: row.get(9)?,
        pickup_longitude: row.get(10)?,
        drop_label: row.get(11)?,
        drop_address: row.get(12)?,
        drop_latitude: row.get(13)?,
        drop_longitude: row.get(14)?,
        delivery_notes: row.get(15)?,
        delivery_type: row.get(16)?,
        expected_delivery_time: row.get(17)?,
        delivery_mode: row.get(18)?,
        status: row.get(19)?,
        proof_notes: row.get(20)?,
        proof_image_url: row.get(21)?,
        assigned_at: row.get(22)?,
        in_progress_at: row.get(23)?,
        delivered_at: row.get(24)?,
        amount: row.get(25)?,
        created_at: row.get(26)?,
        updated_at: row.get(27)?,
    };
    let customer = match (row.get::<_, Option<String>>(28)?, row.get::<_, Option<String>>(29)?) {
        (Some(name), Some(mobile_no)) => Some(PartySummary {
            id: delivery.customer_id,
            name,
            mobile_no,
        }),
        _ => None,
    };
    let delivery_man = match (
        delivery.delivery_man_id,
        row.get::<_, Option<String>>(30)?,
        row.get::<_, Option<String>>(31)?,
    ) {
        (Some(id), Some(name), Some(mobile_no)) => Some(PartySummary { id, name, mobile_no }),
        _ => None,
    };
    Ok(DeliveryView {
        delivery,
        customer,
        delivery_man,
    })
}

fn collect_views(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<DeliveryView>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, view_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `DLV-YYYYMMDD-XXXXXX`, unique across all tenants.
pub fn generate_tracking_number(conn: &Connection) -> Result<String> {
    loop {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        let candidate = format!("DLV-{}-{suffix}", Utc::now().format("%Y%m%d"));
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deliveries WHERE tracking_number = ?1",
            [&candidate],
            |r| r.get(0),
        )?;
        if exists == 0 {
            return Ok(candidate);
        }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (read as UTC) and bare dates.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let v = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn check_expected_time(errors: &mut ValidationErrors, value: Option<&str>) -> Option<DateTime<Utc>> {
    let v = value?;
    let parsed = parse_datetime(v);
    if parsed.is_none() {
        errors.add(
            "expected_delivery_time",
            "The expected delivery time is not a valid date.",
        );
    }
    parsed
}

/// Validate line items against the tenant's catalogue.
fn check_lines(
    conn: &Connection,
    errors: &mut ValidationErrors,
    company_id: i64,
    lines: &[LineInput],
) -> Result<()> {
    let ids: Vec<i64> = lines.iter().map(|l| l.id).collect();
    validate::no_duplicate_items(errors, "items", &ids);
    for (i, line) in lines.iter().enumerate() {
        match Item::get(conn, company_id, line.id) {
            Ok(_) => {}
            Err(DeskError::NotFound(_)) => {
                errors.add(format!("items.{i}.id"), "The selected item is invalid.")
            }
            Err(e) => return Err(e),
        }
        if line.quantity.unwrap_or(1) < 1 {
            errors.add(
                format!("items.{i}.quantity"),
                "The quantity must be at least 1.",
            );
        }
    }
    Ok(())
}

fn write_lines(conn: &Connection, company_id: i64, delivery_id: i64, lines: &[LineInput]) -> Result<()> {
    conn.execute("DELETE FROM delivery_items WHERE delivery_id = ?1", [delivery_id])?;
    let now = Utc::now();
    for line in lines {
        conn.execute(
            "INSERT INTO delivery_items (company_id, delivery_id, item_id, quantity, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                company_id,
                delivery_id,
                line.id,
                line.quantity.unwrap_or(1),
                validate::normalize(line.notes.clone()),
                now
            ],
        )?;
    }
    Ok(())
}

fn log_status(
    conn: &Connection,
    delivery_id: i64,
    status: DeliveryStatus,
    actor: Actor,
    remarks: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO delivery_status_logs (delivery_id, status, changed_by_id, changed_by_type, remarks, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![delivery_id, status, actor.id, actor.kind, remarks, Utc::now()],
    )?;
    Ok(())
}

fn log_activity(conn: &Connection, scope: &CompanyScope, action: &str, view: &DeliveryView) -> Result<i64> {
    let d = &view.delivery;
    activity::record(
        conn,
        scope,
        action,
        &activity::delivery_description(
            action,
            &d.tracking_number,
            view.customer.as_ref().map(|c| c.name.as_str()),
            view.delivery_man.as_ref().map(|m| m.name.as_str()),
            d.status.as_str(),
        ),
        Some(Subject::new("delivery", d.id)),
        Some(serde_json::json!({
            "tracking_number": d.tracking_number,
            "status": d.status,
            "delivery_man_id": d.delivery_man_id,
        })),
    )
}

/// Timestamp columns a transition into `status` sets.
fn stamp_column(status: DeliveryStatus) -> Option<&'static str> {
    match status {
        DeliveryStatus::Assigned => Some("assigned_at"),
        DeliveryStatus::InProgress => Some("in_progress_at"),
        DeliveryStatus::Delivered => Some("delivered_at"),
        _ => None,
    }
}

fn set_status(conn: &Connection, id: i64, status: DeliveryStatus, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE deliveries SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status, now],
    )?;
    if let Some(col) = stamp_column(status) {
        conn.execute(
            &format!("UPDATE deliveries SET {col} = ?2 WHERE id = ?1"),
            params![id, now],
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Company operations
// ---------------------------------------------------------------------------

/// Where a delivery picks up or drops off, resolved from a saved address or
/// free text.
struct Location {
    address_id: Option<i64>,
    label: Option<String>,
    text: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl Location {
    fn saved(a: Address) -> Self {
        Self {
            address_id: Some(a.id),
            label: a.label,
            text: Some(a.address),
            latitude: a.latitude,
            longitude: a.longitude,
        }
    }

    fn text(text: Option<String>) -> Self {
        Self {
            address_id: None,
            label: None,
            text,
            latitude: None,
            longitude: None,
        }
    }

    fn needs_lookup(&self) -> bool {
        self.latitude.is_none() || self.longitude.is_none()
    }
}

impl Delivery {
    pub fn get(conn: &Connection, company_id: i64, id: i64) -> Result<DeliveryView> {
        conn.query_row(
            &format!("SELECT {COLS} {FROM} WHERE d.company_id = ?1 AND d.id = ?2 AND d.deleted_at IS NULL"),
            params![company_id, id],
            view_from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("Delivery"))
    }

    pub fn items(conn: &Connection, delivery_id: i64) -> Result<Vec<DeliveryLine>> {
        let mut stmt = conn.prepare(
            "SELECT di.id, di.item_id, i.name, i.code, i.unit, di.quantity, di.notes
             FROM delivery_items di JOIN items i ON i.id = di.item_id
             WHERE di.delivery_id = ?1 ORDER BY di.id",
        )?;
        let rows = stmt
            .query_map([delivery_id], |r| {
                Ok(DeliveryLine {
                    id: r.get(0)?,
                    item_id: r.get(1)?,
                    name: r.get(2)?,
                    code: r.get(3)?,
                    unit: r.get(4)?,
                    quantity: r.get(5)?,
                    notes: r.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn logs(conn: &Connection, delivery_id: i64) -> Result<Vec<StatusLog>> {
        let mut stmt = conn.prepare(
            "SELECT id, delivery_id, status, changed_by_id, changed_by_type, remarks, changed_at
             FROM delivery_status_logs WHERE delivery_id = ?1 ORDER BY changed_at, id",
        )?;
        let rows = stmt
            .query_map([delivery_id], |r| {
                Ok(StatusLog {
                    id: r.get(0)?,
                    delivery_id: r.get(1)?,
                    status: r.get(2)?,
                    changed_by_id: r.get(3)?,
                    changed_by_type: r.get(4)?,
                    remarks: r.get(5)?,
                    changed_at: r.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Status history, oldest first.
    pub fn status_logs(conn: &Connection, company_id: i64, id: i64) -> Result<Vec<StatusLog>> {
        Self::get(conn, company_id, id)?;
        Self::logs(conn, id)
    }

    pub fn detail(conn: &Connection, company_id: i64, id: i64) -> Result<DeliveryDetail> {
        let view = Self::get(conn, company_id, id)?;
        Ok(DeliveryDetail {
            items: Self::items(conn, id)?,
            status_logs: Self::logs(conn, id)?,
            view,
        })
    }

    /// Newest first.
    pub fn list(
        conn: &Connection,
        company_id: i64,
        filter: &DeliveryFilter,
        page: PageRequest,
    ) -> Result<Page<DeliveryView>> {
        let pattern = filter.search.as_deref().map(crate::db::like_pattern);
        let filter_sql = "d.company_id = ?1 AND d.deleted_at IS NULL
            AND (?2 IS NULL OR d.status = ?2)
            AND (?3 IS NULL OR d.delivery_man_id = ?3)
            AND (?4 IS NULL OR d.customer_id = ?4)
            AND (?5 IS NULL OR d.tracking_number LIKE ?5 ESCAPE '\\')";
        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) {FROM} WHERE {filter_sql}"),
            params![
                company_id,
                filter.status,
                filter.delivery_man_id,
                filter.customer_id,
                pattern
            ],
            |r| r.get(0),
        )?;
        let rows = collect_views(
            conn,
            &format!(
                "SELECT {COLS} {FROM} WHERE {filter_sql}
                 ORDER BY d.created_at DESC, d.id DESC LIMIT ?6 OFFSET ?7"
            ),
            params![
                company_id,
                filter.status,
                filter.delivery_man_id,
                filter.customer_id,
                pattern,
                page.limit(),
                page.offset()
            ],
        )?;
        Ok(Page::new(rows, page, total))
    }

    /// The `limit` most recently booked deliveries of a company.
    pub fn recent(conn: &Connection, company_id: i64, limit: u32) -> Result<Vec<DeliveryView>> {
        collect_views(
            conn,
            &format!(
                "SELECT {COLS} {FROM} WHERE d.company_id = ?1 AND d.deleted_at IS NULL
                 ORDER BY d.created_at DESC, d.id DESC LIMIT ?2"
            ),
            params![company_id, limit],
        )
    }

    pub fn create(
        conn: &Connection,
        scope: &CompanyScope,
        actor: Actor,
        input: NewDelivery,
    ) -> Result<Saved<DeliveryDetail>> {
        let company_id = scope.company_id;
        let mut errors = ValidationErrors::new();

        // Customer: existing, or typed in inline.
        let existing = match input.customer_id {
            Some(id) => match Customer::get(conn, company_id, id) {
                Ok(c) => Some(c),
                Err(DeskError::NotFound(_)) => {
                    errors.add("customer_id", "The selected customer id is invalid.");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };
        let inline_name = validate::normalize(input.customer_name);
        let inline_mobile = validate::normalize(input.customer_mobile_no);
        let inline_address = validate::normalize(input.customer_address);
        if input.customer_id.is_none() {
            validate::required(&mut errors, "customer_name", inline_name.as_deref(), Some(255));
            validate::required(&mut errors, "customer_mobile_no", inline_mobile.as_deref(), Some(32));
            validate::required(&mut errors, "customer_address", inline_address.as_deref(), None);
            if let Some(m) = inline_mobile.as_deref() {
                if customer::mobile_taken(conn, company_id, m, None)? {
                    errors.add(
                        "customer_mobile_no",
                        "The customer mobile no has already been taken.",
                    );
                }
            }
        }

        // Pickup: a company address, or free text.
        let pickup = match input.pickup_address_id {
            Some(id) => match Address::get_company(conn, company_id, id) {
                Ok(a) => Location::saved(a),
                Err(DeskError::NotFound(_)) => {
                    errors.add("pickup_address_id", "The selected pickup address is invalid.");
                    Location::text(None)
                }
                Err(e) => return Err(e),
            },
            None => Location::text(validate::normalize(input.pickup_address)),
        };

        // Drop: one of the customer's saved addresses, or free text.
        let drop = match (input.drop_address_id, existing.as_ref()) {
            (Some(id), Some(c)) => match Address::get_for_customer(conn, company_id, c.id, id) {
                Ok(a) => Location::saved(a),
                Err(DeskError::NotFound(_)) => {
                    errors.add("drop_address_id", "The selected drop address is invalid.");
                    Location::text(None)
                }
                Err(e) => return Err(e),
            },
            (Some(_), None) => {
                errors.add("drop_address_id", "The selected drop address is invalid.");
                Location::text(None)
            }
            (None, _) => {
                let text = validate::normalize(input.drop_address);
                validate::required(&mut errors, "drop_address", text.as_deref(), None);
                Location::text(text)
            }
        };

        if let Some(man_id) = input.delivery_man_id {
            if !DeliveryMan::is_linked(conn, company_id, man_id)? {
                errors.add("delivery_man_id", "The selected delivery man id is invalid.");
            }
        }
        let delivery_type: Option<DeliveryType> = validate::one_of(
            &mut errors,
            "delivery_type",
            validate::normalize(input.delivery_type).as_deref(),
            &DeliveryType::values(),
        );
        let delivery_mode: Option<DeliveryMode> = validate::one_of(
            &mut errors,
            "delivery_mode",
            validate::normalize(input.delivery_mode).as_deref(),
            &DeliveryMode::values(),
        );
        let expected =
            check_expected_time(&mut errors, validate::normalize(input.expected_delivery_time).as_deref());
        validate::non_negative(&mut errors, "amount", input.amount);
        let lines = input.items.unwrap_or_default();
        check_lines(conn, &mut errors, company_id, &lines)?;
        errors.into_result()?;

        let customer = match existing {
            Some(c) => c,
            None => Customer::create(
                conn,
                scope,
                CustomerInput {
                    name: inline_name,
                    mobile_no: inline_mobile,
                    email: None,
                    address: inline_address,
                },
            )?,
        };

        let now = Utc::now();
        let (status, assigned_at) = match input.delivery_man_id {
            Some(_) => (DeliveryStatus::Assigned, Some(now)),
            None => (DeliveryStatus::Pending, None),
        };
        let tracking_number = generate_tracking_number(conn)?;
        conn.execute(
            "INSERT INTO deliveries (
                tracking_number, company_id, delivery_man_id, customer_id,
                pickup_address_id, drop_address_id, pickup_label, pickup_address,
                pickup_latitude, pickup_longitude, drop_label, drop_address,
                drop_latitude, drop_longitude, delivery_notes, delivery_type,
                expected_delivery_time, delivery_mode, status, assigned_at, amount,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?22)",
            params![
                tracking_number,
                company_id,
                input.delivery_man_id,
                customer.id,
                pickup.address_id,
                drop.address_id,
                pickup.label,
                pickup.text,
                pickup.latitude,
                pickup.longitude,
                drop.label,
                drop.text,
                drop.latitude,
                drop.longitude,
                validate::normalize(input.delivery_notes),
                delivery_type,
                expected,
                delivery_mode,
                status,
                assigned_at,
                input.amount,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        write_lines(conn, company_id, id, &lines)?;
        log_status(conn, id, status, actor, Some("Delivery created"))?;

        let view = Self::get(conn, company_id, id)?;
        log_activity(conn, scope, "delivery_created", &view)?;
        tracing::info!(
            delivery_id = id,
            tracking_number = %view.delivery.tracking_number,
            company_id,
            %status,
            "delivery created"
        );

        let mut jobs = Vec::new();
        if let (true, Some(text)) = (pickup.needs_lookup(), pickup.text.clone()) {
            jobs.push(GeocodeJob::new(GeocodeTarget::DeliveryPickup(id), text));
        }
        if let (true, Some(text)) = (drop.needs_lookup(), drop.text.clone()) {
            jobs.push(GeocodeJob::new(GeocodeTarget::DeliveryDrop(id), text));
        }
        let detail = Self::detail(conn, company_id, id)?;
        Ok(Saved {
            record: detail,
            geocode: jobs,
        })
    }

    /// Company-side edit: status, assignment, and the editable fields.
    pub fn update(
        conn: &Connection,
        scope: &CompanyScope,
        actor: Actor,
        id: i64,
        input: DeliveryUpdate,
    ) -> Result<DeliveryDetail> {
        let company_id = scope.company_id;
        let current = Self::get(conn, company_id, id)?.delivery;

        let mut errors = ValidationErrors::new();
        let target: Option<DeliveryStatus> = validate::one_of(
            &mut errors,
            "status",
            validate::normalize(input.status.clone()).as_deref(),
            &DeliveryStatus::values(),
        );
        if let Some(man_id) = input.delivery_man_id {
            if !DeliveryMan::is_linked(conn, company_id, man_id)? {
                errors.add("delivery_man_id", "The selected delivery man id is invalid.");
            }
        }
        let delivery_type: Option<DeliveryType> = validate::one_of(
            &mut errors,
            "delivery_type",
            validate::normalize(input.delivery_type.clone()).as_deref(),
            &DeliveryType::values(),
        );
        let delivery_mode: Option<DeliveryMode> = validate::one_of(
            &mut errors,
            "delivery_mode",
            validate::normalize(input.delivery_mode.clone()).as_deref(),
            &DeliveryMode::values(),
        );
        let expected = check_expected_time(
            &mut errors,
            validate::normalize(input.expected_delivery_time.clone()).as_deref(),
        );
        validate::non_negative(&mut errors, "amount", input.amount);
        if let Some(lines) = input.items.as_deref() {
            check_lines(conn, &mut errors, company_id, lines)?;
        }
        errors.into_result()?;

        if current.status.is_terminal() && (input.edits_fields() || input.delivery_man_id.is_some()) {
            return Err(DeskError::Conflict(format!(
                "Cannot modify a delivery that is {}.",
                current.status
            )));
        }

        let mut status = current.status;
        if let Some(to) = target {
            if !status.can_transition_to(to) {
                return Err(DeskError::InvalidTransition {
                    from: status.to_string(),
                    to: to.to_string(),
                });
            }
            status = to;
        }

        let now = Utc::now();
        let remarks = validate::normalize(input.remarks.clone());
        let mut actions: Vec<&str> = Vec::new();

        if let Some(man_id) = input.delivery_man_id {
            conn.execute(
                "UPDATE deliveries SET delivery_man_id = ?2, assigned_at = ?3, updated_at = ?3 WHERE id = ?1",
                params![id, man_id, now],
            )?;
            if status == DeliveryStatus::Pending {
                status = DeliveryStatus::Assigned;
            }
            actions.push("delivery_assigned");
        }

        if status != current.status {
            set_status(conn, id, status, now)?;
            log_status(conn, id, status, actor, remarks.as_deref())?;
            actions.push("delivery_status_changed");
            if status == DeliveryStatus::Delivered {
                actions.push("delivery_completed");
            }
        }

        if input.edits_fields() {
            conn.execute(
                "UPDATE deliveries SET
                    delivery_notes = COALESCE(?2, delivery_notes),
                    delivery_type = COALESCE(?3, delivery_type),
                    delivery_mode = COALESCE(?4, delivery_mode),
                    expected_delivery_time = COALESCE(?5, expected_delivery_time),
                    amount = COALESCE(?6, amount),
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    validate::normalize(input.delivery_notes.clone()),
                    delivery_type,
                    delivery_mode,
                    expected,
                    input.amount,
                    now
                ],
            )?;
            if let Some(lines) = input.items.as_deref() {
                write_lines(conn, company_id, id, lines)?;
            }
            actions.push("delivery_updated");
        }

        let view = Self::get(conn, company_id, id)?;
        for action in actions {
            log_activity(conn, scope, action, &view)?;
        }
        Self::detail(conn, company_id, id)
    }

    /// Soft delete. Only deliveries that never got going can go.
    pub fn delete(conn: &Connection, scope: &CompanyScope, id: i64) -> Result<()> {
        let view = Self::get(conn, scope.company_id, id)?;
        if !matches!(
            view.delivery.status,
            DeliveryStatus::Pending | DeliveryStatus::Cancelled
        ) {
            return Err(DeskError::Conflict(
                "Only pending or cancelled deliveries can be deleted.".to_string(),
            ));
        }
        conn.execute(
            "UPDATE deliveries SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now()],
        )?;
        log_activity(conn, scope, "delivery_deleted", &view)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delivery man operations
    // -----------------------------------------------------------------------

    /// Deliveries assigned to `delivery_man_id` across every company they are
    /// still linked to. Without a status filter only unfinished ones are
    /// returned.
    pub fn list_for_delivery_man(
        conn: &Connection,
        delivery_man_id: i64,
        status: Option<DeliveryStatus>,
    ) -> Result<Vec<DeliveryView>> {
        collect_views(
            conn,
            &format!(
                "SELECT {COLS} {FROM}
                 WHERE d.delivery_man_id = ?1 AND d.deleted_at IS NULL
                   AND {LINKED}
                   AND ((?2 IS NULL AND d.status NOT IN ('delivered', 'cancelled')) OR d.status = ?2)
                 ORDER BY d.expected_delivery_time IS NULL, d.expected_delivery_time, d.id"
            ),
            params![delivery_man_id, status],
        )
    }

    pub fn get_for_delivery_man(conn: &Connection, delivery_man_id: i64, id: i64) -> Result<DeliveryView> {
        conn.query_row(
            &format!(
                "SELECT {COLS} {FROM}
                 WHERE d.delivery_man_id = ?1 AND d.id = ?2 AND d.deleted_at IS NULL AND {LINKED}"
            ),
            params![delivery_man_id, id],
            view_from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("Delivery"))
    }

    /// Field update: the assignee may start or complete their own delivery.
    pub fn update_by_delivery_man(
        conn: &Connection,
        delivery_man_id: i64,
        id: i64,
        input: ProofUpdate,
    ) -> Result<DeliveryDetail> {
        let current = Self::get_for_delivery_man(conn, delivery_man_id, id)?.delivery;

        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "status", input.status.as_deref(), None);
        let allowed = [DeliveryStatus::InProgress.as_str(), DeliveryStatus::Delivered.as_str()];
        let target: Option<DeliveryStatus> = validate::one_of(
            &mut errors,
            "status",
            validate::normalize(input.status).as_deref(),
            &allowed,
        );
        if target.is_some_and(|t| !matches!(t, DeliveryStatus::InProgress | DeliveryStatus::Delivered)) {
            errors.add(
                "status",
                format!("The selected status is invalid. Allowed: {}.", allowed.join(", ")),
            );
        }
        validate::max_len(&mut errors, "proof_image_url", input.proof_image_url.as_deref(), Some(2048));
        errors.into_result()?;
        let Some(to) = target else {
            return Err(DeskError::invalid("status", "The status field is required."));
        };

        if !current.status.can_transition_to(to) {
            return Err(DeskError::InvalidTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now();
        set_status(conn, id, to, now)?;
        conn.execute(
            "UPDATE deliveries SET
                proof_notes = COALESCE(?2, proof_notes),
                proof_image_url = COALESCE(?3, proof_image_url)
             WHERE id = ?1",
            params![
                id,
                validate::normalize(input.proof_notes),
                validate::normalize(input.proof_image_url)
            ],
        )?;
        let remarks = validate::normalize(input.remarks);
        log_status(conn, id, to, Actor::delivery_man(delivery_man_id), remarks.as_deref())?;

        let view = Self::get(conn, current.company_id, id)?;
        let scope = CompanyScope::new(current.company_id, None);
        log_activity(conn, &scope, "delivery_status_changed", &view)?;
        if to == DeliveryStatus::Delivered {
            log_activity(conn, &scope, "delivery_completed", &view)?;
        }
        tracing::info!(delivery_id = id, delivery_man_id, status = %to, "delivery status reported");
        Self::detail(conn, current.company_id, id)
    }
}
