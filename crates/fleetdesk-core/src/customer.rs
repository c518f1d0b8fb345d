use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::activity::{self, CompanyScope, Subject};
use crate::address::Address;
use crate::db::{Page, PageRequest};
use crate::error::{DeskError, Result, ValidationErrors};
use crate::types::{DeliveryStatus, OwnerKind};
use crate::validate;

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub mobile_no: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub customer_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for create and (partial) update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerInput {
    pub name: Option<String>,
    pub mobile_no: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// A customer's delivery as listed on the customer detail page.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDelivery {
    pub id: i64,
    pub tracking_number: String,
    pub status: DeliveryStatus,
    pub drop_address: String,
    pub amount: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    pub deliveries: Vec<CustomerDelivery>,
    pub addresses: Vec<Address>,
}

const COLS: &str =
    "id, company_id, name, mobile_no, email, address, customer_code, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        mobile_no: row.get(3)?,
        email: row.get(4)?,
        address: row.get(5)?,
        customer_code: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(crate) fn mobile_taken(
    conn: &Connection,
    company_id: i64,
    mobile_no: &str,
    except: Option<i64>,
) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM customers
         WHERE company_id = ?1 AND mobile_no = ?2 AND (?3 IS NULL OR id <> ?3)",
        params![company_id, mobile_no, except],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

impl Customer {
    pub fn list(conn: &Connection, company_id: i64, page: PageRequest) -> Result<Page<Customer>> {
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM customers WHERE company_id = ?1",
            [company_id],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM customers WHERE company_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
            .query_map(params![company_id, page.limit(), page.offset()], from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Page::new(rows, page, total))
    }

    /// Tenant-scoped lookup; another company's customer is reported as missing.
    pub fn get(conn: &Connection, company_id: i64, id: i64) -> Result<Customer> {
        conn.query_row(
            &format!("SELECT {COLS} FROM customers WHERE company_id = ?1 AND id = ?2"),
            params![company_id, id],
            from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("Customer"))
    }

    pub fn detail(conn: &Connection, company_id: i64, id: i64) -> Result<CustomerDetail> {
        let customer = Self::get(conn, company_id, id)?;
        let mut stmt = conn.prepare(
            "SELECT id, tracking_number, status, drop_address, amount, created_at
             FROM deliveries
             WHERE customer_id = ?1 AND deleted_at IS NULL
             ORDER BY id DESC",
        )?;
        let deliveries = stmt
            .query_map([id], |r| {
                Ok(CustomerDelivery {
                    id: r.get(0)?,
                    tracking_number: r.get(1)?,
                    status: r.get(2)?,
                    drop_address: r.get(3)?,
                    amount: r.get(4)?,
                    created_at: r.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let addresses = Address::list_for_owner(conn, OwnerKind::Customer, id)?;
        Ok(CustomerDetail {
            customer,
            deliveries,
            addresses,
        })
    }

    pub fn create(conn: &Connection, scope: &CompanyScope, input: CustomerInput) -> Result<Customer> {
        let name = validate::normalize(input.name);
        let mobile_no = validate::normalize(input.mobile_no);
        let email = validate::normalize(input.email);
        let address = validate::normalize(input.address);

        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "name", name.as_deref(), Some(255));
        validate::required(&mut errors, "mobile_no", mobile_no.as_deref(), Some(32));
        validate::email(&mut errors, "email", email.as_deref());
        if let Some(m) = mobile_no.as_deref() {
            if mobile_taken(conn, scope.company_id, m, None)? {
                errors.add("mobile_no", "The mobile no has already been taken.");
            }
        }
        errors.into_result()?;

        let now = Utc::now();
        conn.execute(
            "INSERT INTO customers (company_id, name, mobile_no, email, address, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![scope.company_id, name, mobile_no, email, address, now],
        )?;
        let customer = Self::get(conn, scope.company_id, conn.last_insert_rowid())?;
        log(conn, scope, "customer_created", &customer)?;
        Ok(customer)
    }

    /// Only the fields present in `input` change.
    pub fn update(
        conn: &Connection,
        scope: &CompanyScope,
        id: i64,
        input: CustomerInput,
    ) -> Result<Customer> {
        let mut customer = Self::get(conn, scope.company_id, id)?;

        let mut errors = ValidationErrors::new();
        if input.name.is_some() {
            validate::required(&mut errors, "name", input.name.as_deref(), Some(255));
        }
        if input.mobile_no.is_some() {
            validate::required(&mut errors, "mobile_no", input.mobile_no.as_deref(), Some(32));
        }
        let email = validate::normalize(input.email);
        validate::email(&mut errors, "email", email.as_deref());
        if let Some(m) = validate::normalize(input.mobile_no.clone()) {
            if mobile_taken(conn, scope.company_id, &m, Some(id))? {
                errors.add("mobile_no", "The mobile no has already been taken.");
            }
        }
        errors.into_result()?;

        if let Some(name) = validate::normalize(input.name) {
            customer.name = name;
        }
        if let Some(mobile_no) = validate::normalize(input.mobile_no) {
            customer.mobile_no = mobile_no;
        }
        if email.is_some() {
            customer.email = email;
        }
        if input.address.is_some() {
            customer.address = validate::normalize(input.address);
        }

        conn.execute(
            "UPDATE customers SET name = ?2, mobile_no = ?3, email = ?4, address = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                customer.name,
                customer.mobile_no,
                customer.email,
                customer.address,
                Utc::now()
            ],
        )?;
        let customer = Self::get(conn, scope.company_id, id)?;
        log(conn, scope, "customer_updated", &customer)?;
        Ok(customer)
    }

    /// Refused while deliveries reference the customer. Saved addresses go
    /// with it.
    pub fn delete(conn: &Connection, scope: &CompanyScope, id: i64) -> Result<()> {
        let customer = Self::get(conn, scope.company_id, id)?;
        let deliveries: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deliveries WHERE customer_id = ?1",
            [id],
            |r| r.get(0),
        )?;
        if deliveries > 0 {
            return Err(DeskError::Conflict(
                "Cannot delete customer with existing deliveries.".to_string(),
            ));
        }

        log(conn, scope, "customer_deleted", &customer)?;
        conn.execute(
            "DELETE FROM addresses WHERE owner_kind = ?1 AND owner_id = ?2",
            params![OwnerKind::Customer.as_str(), id],
        )?;
        conn.execute("DELETE FROM customers WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn log(conn: &Connection, scope: &CompanyScope, action: &str, customer: &Customer) -> Result<i64> {
    activity::record(
        conn,
        scope,
        action,
        &activity::customer_description(action, &customer.name),
        Some(Subject::new("customer", customer.id)),
        Some(serde_json::json!({
            "customer_name": customer.name,
            "customer_mobile": customer.mobile_no,
        })),
    )
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

    fn input(name: &str, mobile: &str) -> CustomerInput {
        CustomerInput {
            name: Some(name.into()),
            mobile_no: Some(mobile.into()),
            ..CustomerInput::default()
        }
    }

    #[test]
    fn create_requires_name_and_mobile() {
        let (store, scope) = setup();
        let err = store
            .write(|tx| Customer::create(tx, &scope, CustomerInput::default()))
            .unwrap_err();
        match err {
            DeskError::Validation(v) => {
                assert!(v.has("name"));
                assert!(v.has("mobile_no"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mobile_unique_per_company() {
        let (store, scope) = setup();
        let other = store
            .write(|tx| Ok(Company::create(tx, &NewCompany::named("Other"))?.id))
            .unwrap();
        store
            .write(|tx| Customer::create(tx, &scope, input("Ann", "555")))
            .unwrap();
        let dup = store.write(|tx| Customer::create(tx, &scope, input("Bob", "555")));
        assert!(matches!(dup, Err(DeskError::Validation(ref v)) if v.has("mobile_no")));

        // Same number in another tenant is fine.
        let elsewhere = store.write(|tx| {
            Customer::create(tx, &CompanyScope::new(other, None), input("Bob", "555"))
        });
        assert!(elsewhere.is_ok());
    }

    #[test]
    fn update_is_partial_and_excludes_self() {
        let (store, scope) = setup();
        let c = store
            .write(|tx| Customer::create(tx, &scope, input("Ann", "555")))
            .unwrap();
        let updated = store
            .write(|tx| {
                Customer::update(
                    tx,
                    &scope,
                    c.id,
                    CustomerInput {
                        mobile_no: Some("555".into()),
                        address: Some("1 Main St".into()),
                        ..CustomerInput::default()
                    },
                )
            })
            .unwrap();
        assert_eq!(updated.name, "Ann");
        assert_eq!(updated.address.as_deref(), Some("1 Main St"));
    }

    #[test]
    fn list_newest_first_and_scoped() {
        let (store, scope) = setup();
        store
            .write(|tx| {
                Customer::create(tx, &scope, input("Ann", "1"))?;
                Customer::create(tx, &scope, input("Bob", "2"))
            })
            .unwrap();
        let page = store
            .read(|c| Customer::list(c, scope.company_id, PageRequest::default()))
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].name, "Bob");

        let missing = store.read(|c| Customer::get(c, scope.company_id + 1, page.data[0].id));
        assert!(matches!(missing, Err(DeskError::NotFound(_))));
    }

    #[test]
    fn delete_logs_activity() {
        let (store, scope) = setup();
        let c = store
            .write(|tx| Customer::create(tx, &scope, input("Ann", "1")))
            .unwrap();
        store
            .write(|tx| Customer::delete(tx, &scope, c.id))
            .unwrap();
        let logs = store
            .read(|conn| activity::recent(conn, scope.company_id, 10))
            .unwrap();
        assert_eq!(logs[0].action, "customer_deleted");
        assert_eq!(logs[0].description, "Customer Ann deleted");
        assert_eq!(logs[1].description, "New customer created: Ann");
    }
}
