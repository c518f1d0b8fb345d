//! Tenants and the people who log in on their behalf.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{DeskError, Result, ValidationErrors};
use crate::password;
use crate::validate;

pub const MIN_PASSWORD_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCompany {
    pub name: String,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
    pub address: Option<String>,
}

impl NewCompany {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

const COMPANY_COLS: &str =
    "id, name, email, mobile_no, address, is_active, created_at, updated_at";

fn company_from_row(row: &Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        mobile_no: row.get(3)?,
        address: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Company {
    pub fn create(conn: &Connection, input: &NewCompany) -> Result<Company> {
        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "name", Some(&input.name), Some(255));
        validate::email(&mut errors, "email", input.email.as_deref());
        errors.into_result()?;

        let now = Utc::now();
        conn.execute(
            "INSERT INTO companies (name, email, mobile_no, address, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            params![
                input.name.trim(),
                input.email,
                input.mobile_no,
                input.address,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(company_id = id, name = %input.name, "company created");
        Self::get(conn, id)
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Company> {
        conn.query_row(
            &format!("SELECT {COMPANY_COLS} FROM companies WHERE id = ?1"),
            [id],
            company_from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("Company"))
    }

    pub fn list(conn: &Connection) -> Result<Vec<Company>> {
        let mut stmt = conn.prepare(&format!("SELECT {COMPANY_COLS} FROM companies ORDER BY id"))?;
        let rows = stmt
            .query_map([], company_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_active(conn: &Connection, id: i64, active: bool) -> Result<()> {
        let n = conn.execute(
            "UPDATE companies SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, Utc::now()],
        )?;
        if n == 0 {
            return Err(DeskError::not_found("Company"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CompanyUser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CompanyUser {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub device_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCompanyUser {
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

const USER_COLS: &str = "id, company_id, name, email, role, password_hash, device_token, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<CompanyUser> {
    Ok(CompanyUser {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        role: row.get(4)?,
        password_hash: row.get(5)?,
        device_token: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl CompanyUser {
    pub fn has_device_token(&self) -> bool {
        self.device_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn create(conn: &Connection, input: &NewCompanyUser) -> Result<CompanyUser> {
        let email = input.email.trim().to_lowercase();
        let mut errors = ValidationErrors::new();
        validate::required(&mut errors, "name", Some(&input.name), Some(255));
        validate::required(&mut errors, "email", Some(&email), Some(255));
        validate::email(&mut errors, "email", Some(&email));
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("The password must be at least {MIN_PASSWORD_LEN} characters."),
            );
        }
        if !email.is_empty() && Self::find_by_email(conn, &email)?.is_some() {
            errors.add("email", "The email has already been taken.");
        }
        errors.into_result()?;

        // Surfaces NotFound for an unknown tenant before the FK does.
        Company::get(conn, input.company_id)?;

        let hash = password::hash(&input.password)?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO company_users (company_id, name, email, password_hash, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                input.company_id,
                input.name.trim(),
                email,
                hash,
                input.role.as_deref().unwrap_or("admin"),
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(user_id = id, company_id = input.company_id, "company user created");
        Self::get(conn, id)
    }

    pub fn get(conn: &Connection, id: i64) -> Result<CompanyUser> {
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM company_users WHERE id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?
        .ok_or_else(|| DeskError::not_found("User"))
    }

    pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<CompanyUser>> {
        Ok(conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM company_users WHERE email = ?1"),
                [email.trim().to_lowercase()],
                user_from_row,
            )
            .optional()?)
    }

    /// Check credentials and the owning company's status.
    pub fn authenticate(
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<(CompanyUser, Company)> {
        let user = Self::find_by_email(conn, email)?.ok_or(DeskError::InvalidCredentials)?;
        if !password::verify(password, &user.password_hash) {
            return Err(DeskError::InvalidCredentials);
        }
        let company = Company::get(conn, user.company_id)?;
        if !company.is_active {
            return Err(DeskError::Forbidden(
                "Your company account is inactive.".to_string(),
            ));
        }
        Ok((user, company))
    }

    pub fn list_for_company(conn: &Connection, company_id: i64) -> Result<Vec<CompanyUser>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLS} FROM company_users WHERE company_id = ?1 ORDER BY name, id"
        ))?;
        let rows = stmt
            .query_map([company_id], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Users of `company_id` that have registered a device. With `ids`, only
    /// those users are considered; ids outside the company are ignored.
    pub fn with_device_tokens(
        conn: &Connection,
        company_id: i64,
        ids: Option<&[i64]>,
    ) -> Result<Vec<CompanyUser>> {
        let users = Self::list_for_company(conn, company_id)?;
        Ok(users
            .into_iter()
            .filter(|u| u.has_device_token())
            .filter(|u| ids.map_or(true, |ids| ids.contains(&u.id)))
            .collect())
    }

    pub fn set_device_token(conn: &Connection, id: i64, token: &str) -> Result<()> {
        let n = conn.execute(
            "UPDATE company_users SET device_token = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, token, Utc::now()],
        )?;
        if n == 0 {
            return Err(DeskError::not_found("User"));
        }
        Ok(())
    }
}
