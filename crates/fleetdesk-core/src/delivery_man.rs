//! Delivery personnel. A delivery man exists once globally and is linked to
//! any number of companies.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::activity::{self, CompanyScope, Subject};
use crate::company::MIN_PASSWORD_LEN;
use crate::error::{DeskError, Result, ValidationErrors};
use crate::password;
use crate::validate;

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryMan {
    pub id: i64,
    pub name: String,
    pub mobile_no: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryManInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
}

const COLS: &str = "d.id, d.name, d.mobile_no, d.email, d.photo_url, d.password_hash, d.created_at, d.updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryMan> {
    Ok(DeliveryMan {
        id: row.get(0)?,
        name: row.get(1)?,
        mobile_no: row.get(2)?,
        email: row.get(3)?,
        photo_url: row.get(4)?,
        password_hash: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl DeliveryMan {
    pub fn get(conn: &Connection, id: i64) -> Result<DeliveryMan> {
        conn.query_row(
            &format!("SELECT {COLS} FROM delivery_men d WHERE d.id = ?1"),
            [id],
            from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("Delivery man"))
    }

    pub fn is_linked(conn: &Connection, company_id: i64, id: i64) -> Result<bool> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM company_delivery_man WHERE company_id = ?1 AND delivery_man_id = ?2",
            params![company_id, id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    /// A delivery man linked to the company; anyone else is reported missing.
    pub fn get_linked(conn: &Connection, company_id: i64, id: i64) -> Result<DeliveryMan> {
        conn.query_row(
            &format!(
                "SELECT {COLS} FROM delivery_men d
                 JOIN company_delivery_man p ON p.delivery_man_id = d.id
                 WHERE p.company_id = ?1 AND d.id = ?2"
            ),
            params![company_id, id],
            from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("Delivery man"))
    }

    pub fn list_for_company(conn: &Connection, company_id: i64) -> Result<Vec<DeliveryMan>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM delivery_men d
             JOIN company_delivery_man p ON p.delivery_man_id = d.id
             WHERE p.company_id = ?1
             ORDER BY d.name, d.id"
        ))?;
        let rows = stmt
            .query_map([company_id], from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Create a new delivery man and link them to the scope's company. An
    /// email or mobile number already on file is refused outright.
    pub fn create_and_link(
        conn: &Connection,
        scope: &CompanyScope,
        input: DeliveryManInput,
    ) -> Result<DeliveryMan> {
        let name = validate::normalize(input.name);
        let email = validate::normalize(input.email).map(|e| e.to_lowercase());
        let mobile_no = validate::normalize(input.mobile_no);

        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "name", name.as_deref(), Some(255));
        validate::email(&mut errors, "email", email.as_deref());
        validate::required(&mut errors, "mobile_no", mobile_no.as_deref(), Some(32));
        errors.into_result()?;

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM delivery_men
             WHERE mobile_no = ?1 OR (?2 IS NOT NULL AND email = ?2)",
            params![mobile_no, email],
            |r| r.get(0),
        )?;
        if exists > 0 {
            return Err(DeskError::Conflict(
                "Email or mobile number already exists.".to_string(),
            ));
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO delivery_men (name, mobile_no, email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, mobile_no, email, now],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "INSERT OR IGNORE INTO company_delivery_man (company_id, delivery_man_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![scope.company_id, id, now],
        )?;

        let man = Self::get(conn, id)?;
        log(conn, scope, "delivery_man_linked", &man)?;
        Ok(man)
    }

    pub fn unlink(conn: &Connection, scope: &CompanyScope, id: i64) -> Result<()> {
        let man = Self::get_linked(conn, scope.company_id, id)?;
        conn.execute(
            "DELETE FROM company_delivery_man WHERE company_id = ?1 AND delivery_man_id = ?2",
            params![scope.company_id, id],
        )?;
        log(conn, scope, "delivery_man_unlinked", &man)?;
        Ok(())
    }

    pub fn set_password(conn: &Connection, id: i64, new_password: &str) -> Result<()> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DeskError::invalid(
                "password",
                format!("The password must be at least {MIN_PASSWORD_LEN} characters."),
            ));
        }
        let hash = password::hash(new_password)?;
        let n = conn.execute(
            "UPDATE delivery_men SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, hash, Utc::now()],
        )?;
        if n == 0 {
            return Err(DeskError::not_found("Delivery man"));
        }
        tracing::info!(delivery_man_id = id, "delivery man password set");
        Ok(())
    }

    /// Accounts without a password cannot log in.
    pub fn authenticate(conn: &Connection, email: &str, password: &str) -> Result<DeliveryMan> {
        let man = conn
            .query_row(
                &format!("SELECT {COLS} FROM delivery_men d WHERE d.email = ?1"),
                [email.trim().to_lowercase()],
                from_row,
            )
            .optional()?
            .ok_or(DeskError::InvalidCredentials)?;
        match man.password_hash.as_deref() {
            Some(hash) if password::verify(password, hash) => Ok(man),
            _ => Err(DeskError::InvalidCredentials),
        }
    }

    /// Ids of the companies this delivery man works for.
    pub fn company_ids(conn: &Connection, id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT company_id FROM company_delivery_man WHERE delivery_man_id = ?1 ORDER BY company_id",
        )?;
        let ids = stmt
            .query_map([id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}

fn log(conn: &Connection, scope: &CompanyScope, action: &str, man: &DeliveryMan) -> Result<i64> {
    activity::record(
        conn,
        scope,
        action,
        &activity::delivery_man_description(action, &man.name),
        Some(Subject::new("delivery_man", man.id)),
        Some(serde_json::json!({
            "delivery_man_name": man.name,
            "delivery_man_mobile": man.mobile_no,
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

    fn input(name: &str, mobile: &str, email: Option<&str>) -> DeliveryManInput {
        DeliveryManInput {
            name: Some(name.into()),
            mobile_no: Some(mobile.into()),
            email: email.map(Into::into),
        }
    }

    #[test]
    fn create_links_to_company() {
        let (store, scope) = setup();
        let man = store
            .write(|tx| DeliveryMan::create_and_link(tx, &scope, input("Bo", "700", Some("bo@x.io"))))
            .unwrap();
        let linked = store
            .read(|c| DeliveryMan::list_for_company(c, scope.company_id))
            .unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, man.id);
        assert!(store.read(|c| DeliveryMan::is_linked(c, scope.company_id, man.id)).unwrap());
        assert!(serde_json::to_value(&man).unwrap().get("password_hash").is_none());
    }

    #[test]
    fn existing_mobile_or_email_refused() {
        let (store, scope) = setup();
        store
            .write(|tx| DeliveryMan::create_and_link(tx, &scope, input("Bo", "700", Some("bo@x.io"))))
            .unwrap();
        for dup in [input("X", "700", None), input("Y", "701", Some("bo@x.io"))] {
            let err = store
                .write(|tx| DeliveryMan::create_and_link(tx, &scope, dup))
                .unwrap_err();
            assert_eq!(err.to_string(), "Email or mobile number already exists.");
        }
    }

    #[test]
    fn unlink_requires_link() {
        let (store, scope) = setup();
        let man = store
            .write(|tx| DeliveryMan::create_and_link(tx, &scope, input("Bo", "700", None)))
            .unwrap();
        store
            .write(|tx| DeliveryMan::unlink(tx, &scope, man.id))
            .unwrap();
        let again = store.write(|tx| DeliveryMan::unlink(tx, &scope, man.id));
        assert!(matches!(again, Err(DeskError::NotFound(_))));

        let logs = store.read(|c| activity::recent(c, scope.company_id, 1)).unwrap();
        assert_eq!(logs[0].description, "Delivery man Bo unlinked from company");
    }

    #[test]
    fn login_needs_password() {
        let (store, scope) = setup();
        let man = store
            .write(|tx| DeliveryMan::create_and_link(tx, &scope, input("Bo", "700", Some("bo@x.io"))))
            .unwrap();
        let before = store.read(|c| DeliveryMan::authenticate(c, "bo@x.io", "whatever1"));
        assert!(matches!(before, Err(DeskError::InvalidCredentials)));

        store
            .write(|tx| DeliveryMan::set_password(tx, man.id, "ride-safe-1"))
            .unwrap();
        let ok = store
            .read(|c| DeliveryMan::authenticate(c, "BO@x.io", "ride-safe-1"))
            .unwrap();
        assert_eq!(ok.id, man.id);

        assert_eq!(
            store.read(|c| DeliveryMan::company_ids(c, man.id)).unwrap(),
            vec![scope.company_id]
        );
    }
}
