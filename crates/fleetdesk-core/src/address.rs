//! Saved addresses for companies (pickup points, warehouses, ...) and
//! customers (drop-off locations). One table, owner given by
//! `(owner_kind, owner_id)`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::activity::{self, CompanyScope, Subject};
use crate::customer::Customer;
use crate::db::like_pattern;
use crate::error::{DeskError, Result, ValidationErrors};
use crate::geocode::{GeocodeJob, GeocodeTarget, Saved};
use crate::types::{CompanyAddressType, OwnerKind};
use crate::validate;

#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub id: i64,
    pub company_id: Option<i64>,
    pub owner_kind: OwnerKind,
    pub owner_id: i64,
    pub address_type: Option<String>,
    pub label: Option<String>,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressInput {
    pub address_type: Option<String>,
    pub label: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompanyAddressFilter {
    pub address_type: Option<CompanyAddressType>,
    pub search: Option<String>,
}

const COLS: &str = "id, company_id, owner_kind, owner_id, address_type, label, address,
    latitude, longitude, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Address> {
    Ok(Address {
        id: row.get(0)?,
        company_id: row.get(1)?,
        owner_kind: row.get(2)?,
        owner_id: row.get(3)?,
        address_type: row.get(4)?,
        label: row.get(5)?,
        address: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn collect(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Address>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn insert(
    conn: &Connection,
    company_id: i64,
    owner: OwnerKind,
    owner_id: i64,
    address_type: Option<&str>,
    label: Option<&str>,
    address: &str,
) -> Result<i64> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO addresses
            (company_id, owner_kind, owner_id, address_type, label, address, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            company_id,
            owner.as_str(),
            owner_id,
            address_type,
            label,
            address,
            now
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Apply a partial edit. Changing the text clears the coordinates and
/// returns the lookup to run.
fn apply_edit(
    conn: &Connection,
    current: &Address,
    address_type: Option<String>,
    label: Option<String>,
    text: Option<String>,
) -> Result<Option<GeocodeJob>> {
    let address_type = address_type.or_else(|| current.address_type.clone());
    let label = label.or_else(|| current.label.clone());
    let moved = text.as_ref().is_some_and(|t| *t != current.address);
    let text = text.unwrap_or_else(|| current.address.clone());
    let (lat, lon) = if moved {
        (None, None)
    } else {
        (current.latitude, current.longitude)
    };

    conn.execute(
        "UPDATE addresses SET address_type = ?2, label = ?3, address = ?4,
             latitude = ?5, longitude = ?6, updated_at = ?7
         WHERE id = ?1",
        params![current.id, address_type, label, text, lat, lon, Utc::now()],
    )?;
    Ok(moved.then(|| GeocodeJob::new(GeocodeTarget::Address(current.id), text)))
}

impl Address {
    fn by_id(conn: &Connection, id: i64) -> Result<Option<Address>> {
        Ok(conn
            .query_row(
                &format!("SELECT {COLS} FROM addresses WHERE id = ?1"),
                [id],
                from_row,
            )
            .optional()?)
    }

    pub fn list_for_owner(conn: &Connection, owner: OwnerKind, owner_id: i64) -> Result<Vec<Address>> {
        collect(
            conn,
            &format!(
                "SELECT {COLS} FROM addresses WHERE owner_kind = ?1 AND owner_id = ?2
                 ORDER BY created_at DESC, id DESC"
            ),
            params![owner.as_str(), owner_id],
        )
    }

    // -----------------------------------------------------------------------
    // Customer addresses
    // -----------------------------------------------------------------------

    pub fn list_for_customer(conn: &Connection, company_id: i64, customer_id: i64) -> Result<Vec<Address>> {
        Customer::get(conn, company_id, customer_id)?;
        Self::list_for_owner(conn, OwnerKind::Customer, customer_id)
    }

    /// A saved address of a customer inside the tenant.
    pub fn get_for_customer(
        conn: &Connection,
        company_id: i64,
        customer_id: i64,
        id: i64,
    ) -> Result<Address> {
        Customer::get(conn, company_id, customer_id)?;
        Self::by_id(conn, id)?
            .filter(|a| a.owner_kind == OwnerKind::Customer && a.owner_id == customer_id)
            .ok_or_else(|| DeskError::not_found("Address"))
    }

    pub fn add_for_customer(
        conn: &Connection,
        scope: &CompanyScope,
        customer_id: i64,
        input: AddressInput,
    ) -> Result<Saved<Address>> {
        let customer = Customer::get(conn, scope.company_id, customer_id)?;
        let text = validate::normalize(input.address);
        let label = validate::normalize(input.label);
        let address_type = validate::normalize(input.address_type);

        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "address", text.as_deref(), None);
        validate::max_len(&mut errors, "label", label.as_deref(), Some(255));
        errors.into_result()?;
        let text = text.unwrap_or_default();

        let id = insert(
            conn,
            scope.company_id,
            OwnerKind::Customer,
            customer.id,
            address_type.as_deref(),
            label.as_deref(),
            &text,
        )?;
        activity::record(
            conn,
            scope,
            "customer_address_added",
            &format!(
                "New address '{}' added for customer {}",
                label.as_deref().unwrap_or_default(),
                customer.name
            ),
            Some(Subject::new("customer", customer.id)),
            Some(serde_json::json!({ "address_id": id })),
        )?;

        let address = Self::get_for_customer(conn, scope.company_id, customer.id, id)?;
        Ok(Saved::new(address).with_job(Some(GeocodeJob::new(GeocodeTarget::Address(id), text))))
    }

    pub fn update_for_customer(
        conn: &Connection,
        scope: &CompanyScope,
        customer_id: i64,
        id: i64,
        input: AddressInput,
    ) -> Result<Saved<Address>> {
        let customer = Customer::get(conn, scope.company_id, customer_id)?;
        let current = Self::get_for_customer(conn, scope.company_id, customer_id, id)?;

        let mut errors = ValidationErrors::new();
        if input.address.is_some() {
            validate::required(&mut errors, "address", input.address.as_deref(), None);
        }
        validate::max_len(&mut errors, "label", input.label.as_deref(), Some(255));
        errors.into_result()?;

        let job = apply_edit(
            conn,
            &current,
            validate::normalize(input.address_type),
            validate::normalize(input.label),
            validate::normalize(input.address),
        )?;
        let address = Self::get_for_customer(conn, scope.company_id, customer_id, id)?;
        activity::record(
            conn,
            scope,
            "customer_address_updated",
            &format!(
                "Address '{}' updated for customer {}",
                address.label.as_deref().unwrap_or_default(),
                customer.name
            ),
            Some(Subject::new("customer", customer.id)),
            Some(serde_json::json!({ "address_id": id })),
        )?;
        Ok(Saved::new(address).with_job(job))
    }

    pub fn delete_for_customer(
        conn: &Connection,
        scope: &CompanyScope,
        customer_id: i64,
        id: i64,
    ) -> Result<()> {
        let customer = Customer::get(conn, scope.company_id, customer_id)?;
        let address = Self::get_for_customer(conn, scope.company_id, customer_id, id)?;
        activity::record(
            conn,
            scope,
            "customer_address_deleted",
            &format!(
                "Address '{}' deleted for customer {}",
                address.label.as_deref().unwrap_or_default(),
                customer.name
            ),
            Some(Subject::new("customer", customer.id)),
            Some(serde_json::json!({ "address_id": id })),
        )?;
        conn.execute("DELETE FROM addresses WHERE id = ?1", [id])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Company addresses
    // -----------------------------------------------------------------------

    /// Ordered by type, then label.
    pub fn list_company(
        conn: &Connection,
        company_id: i64,
        filter: &CompanyAddressFilter,
    ) -> Result<Vec<Address>> {
        let pattern = filter.search.as_deref().map(like_pattern);
        collect(
            conn,
            &format!(
                "SELECT {COLS} FROM addresses
                 WHERE owner_kind = 'company' AND owner_id = ?1 AND company_id = ?1
                   AND (?2 IS NULL OR address_type = ?2)
                   AND (?3 IS NULL OR label LIKE ?3 ESCAPE '\\' OR address LIKE ?3 ESCAPE '\\')
                 ORDER BY address_type, label"
            ),
            params![
                company_id,
                filter.address_type.map(CompanyAddressType::as_str),
                pattern
            ],
        )
    }

    pub fn list_company_by_type(
        conn: &Connection,
        company_id: i64,
        address_type: CompanyAddressType,
    ) -> Result<Vec<Address>> {
        collect(
            conn,
            &format!(
                "SELECT {COLS} FROM addresses
                 WHERE owner_kind = 'company' AND owner_id = ?1 AND company_id = ?1
                   AND address_type = ?2
                 ORDER BY label"
            ),
            params![company_id, address_type.as_str()],
        )
    }

    pub fn get_company(conn: &Connection, company_id: i64, id: i64) -> Result<Address> {
        Self::by_id(conn, id)?
            .filter(|a| a.owner_kind == OwnerKind::Company && a.owner_id == company_id)
            .ok_or_else(|| DeskError::not_found("Address"))
    }

    fn label_taken(conn: &Connection, company_id: i64, label: &str, except: Option<i64>) -> Result<bool> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM addresses
             WHERE owner_kind = 'company' AND owner_id = ?1 AND label = ?2
               AND (?3 IS NULL OR id <> ?3)",
            params![company_id, label, except],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    fn duplicate_label(label: &str) -> DeskError {
        DeskError::Conflict(format!(
            "An address with the label '{label}' already exists for your company."
        ))
    }

    pub fn create_company(
        conn: &Connection,
        scope: &CompanyScope,
        input: AddressInput,
    ) -> Result<Saved<Address>> {
        let label = validate::normalize(input.label);
        let text = validate::normalize(input.address);

        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "address_type", input.address_type.as_deref(), None);
        let address_type: Option<CompanyAddressType> = validate::one_of(
            &mut errors,
            "address_type",
            input.address_type.as_deref(),
            &CompanyAddressType::values(),
        );
        validate::required(&mut errors, "label", label.as_deref(), Some(255));
        validate::required(&mut errors, "address", text.as_deref(), None);
        errors.into_result()?;
        let (Some(address_type), Some(label), Some(text)) = (address_type, label, text) else {
            return Err(DeskError::BadRequest("incomplete address".into()));
        };

        if Self::label_taken(conn, scope.company_id, &label, None)? {
            return Err(Self::duplicate_label(&label));
        }

        let id = insert(
            conn,
            scope.company_id,
            OwnerKind::Company,
            scope.company_id,
            Some(address_type.as_str()),
            Some(&label),
            &text,
        )?;
        activity::record(
            conn,
            scope,
            "company_address_created",
            &format!("New {address_type} address '{label}' added to company"),
            Some(Subject::new("address", id)),
            Some(serde_json::json!({ "address_type": address_type, "label": label })),
        )?;
        let address = Self::get_company(conn, scope.company_id, id)?;
        Ok(Saved::new(address).with_job(Some(GeocodeJob::new(GeocodeTarget::Address(id), text))))
    }

    pub fn update_company(
        conn: &Connection,
        scope: &CompanyScope,
        id: i64,
        input: AddressInput,
    ) -> Result<Saved<Address>> {
        let current = Self::get_company(conn, scope.company_id, id)?;

        let mut errors = ValidationErrors::new();
        if input.address_type.is_some() {
            validate::required(&mut errors, "address_type", input.address_type.as_deref(), None);
        }
        let address_type: Option<CompanyAddressType> = validate::one_of(
            &mut errors,
            "address_type",
            validate::normalize(input.address_type.clone()).as_deref(),
            &CompanyAddressType::values(),
        );
        if input.label.is_some() {
            validate::required(&mut errors, "label", input.label.as_deref(), Some(255));
        }
        if input.address.is_some() {
            validate::required(&mut errors, "address", input.address.as_deref(), None);
        }
        errors.into_result()?;

        let label = validate::normalize(input.label);
        if let Some(l) = label.as_deref() {
            if current.label.as_deref() != Some(l)
                && Self::label_taken(conn, scope.company_id, l, Some(id))?
            {
                return Err(Self::duplicate_label(l));
            }
        }

        let job = apply_edit(
            conn,
            &current,
            address_type.map(|t| t.as_str().to_string()),
            label,
            validate::normalize(input.address),
        )?;
        let address = Self::get_company(conn, scope.company_id, id)?;
        activity::record(
            conn,
            scope,
            "company_address_updated",
            &format!(
                "Company address '{}' updated",
                address.label.as_deref().unwrap_or_default()
            ),
            Some(Subject::new("address", id)),
            None,
        )?;
        Ok(Saved::new(address).with_job(job))
    }

    /// Refused while any delivery uses the address as pickup or drop.
    pub fn delete_company(conn: &Connection, scope: &CompanyScope, id: i64) -> Result<()> {
        let address = Self::get_company(conn, scope.company_id, id)?;
        let in_use: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deliveries
             WHERE company_id = ?1 AND (pickup_address_id = ?2 OR drop_address_id = ?2)",
            params![scope.company_id, id],
            |r| r.get(0),
        )?;
        if in_use > 0 {
            return Err(DeskError::Conflict(
                "Cannot delete address that is being used in deliveries.".to_string(),
            ));
        }

        activity::record(
            conn,
            scope,
            "company_address_deleted",
            &format!(
                "Company address '{}' deleted",
                address.label.as_deref().unwrap_or_default()
            ),
            None,
            Some(serde_json::json!({ "address_id": id })),
        )?;
        conn.execute("DELETE FROM addresses WHERE id = ?1", [id])?;
        Ok(())
    }
}
