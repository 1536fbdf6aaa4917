use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::hash_password;

const USER_COLUMNS: &str =
    "id, email, password_hash, name, is_active, is_staff, is_superuser, created_at";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2, never exposed
    pub name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("users must have an email address")]
    EmptyEmail,
}

/// Lower-cases the domain part only; the local part is case-sensitive.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// A user about to be inserted. Built only through [`NewUser::regular`] or
/// [`NewUser::superuser`], so the email is always present and normalized.
#[derive(Debug, Clone)]
pub struct NewUser {
    email: String,
    password: String,
    name: String,
    is_staff: bool,
    is_superuser: bool,
}

impl NewUser {
    pub fn regular(email: &str, password: &str) -> Result<Self, UserError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(UserError::EmptyEmail);
        }
        Ok(Self {
            email,
            password: password.to_string(),
            name: String::new(),
            is_staff: false,
            is_superuser: false,
        })
    }

    pub fn superuser(email: &str, password: &str) -> Result<Self, UserError> {
        let mut user = Self::regular(email, password)?;
        user.is_staff = true;
        user.is_superuser = true;
        Ok(user)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_staff(&self) -> bool {
        self.is_staff
    }

    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }
}

/// Profile fields to overwrite; `None` leaves the column alone.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    /// True when the id belongs to an existing, active user.
    pub async fn is_active_id(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let active: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND is_active)",
        )
        .bind(id)
        .fetch_one(db)
        .await
        .context("check active user")?;
        Ok(active)
    }

    pub async fn email_taken(db: &PgPool, email: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(except)
        .fetch_one(db)
        .await
        .context("check email")?;
        Ok(taken)
    }

    /// Hashes the password and inserts the row.
    pub async fn create(db: &PgPool, new: NewUser) -> anyhow::Result<User> {
        let hash = hash_password(&new.password)?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(hash)
        .bind(&new.name)
        .bind(new.is_staff)
        .bind(new.is_superuser)
        .fetch_one(db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    pub async fn update(db: &PgPool, id: Uuid, changes: UserChanges) -> anyhow::Result<User> {
        let hash = changes.password.as_deref().map(hash_password).transpose()?;
        let email = changes.email.as_deref().map(normalize_email);
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   name = COALESCE($3, name),
                   password_hash = COALESCE($4, password_hash)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(email)
        .bind(changes.name)
        .bind(hash)
        .fetch_one(db)
        .await
        .context("update user")?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::testing;

    #[test]
    fn email_domain_is_normalized() {
        let samples = [
            ("test1@EXAMPLE.com", "test1@example.com"),
            ("Test2@Example.com", "Test2@example.com"),
            ("TEST3@EXAMPLE.COM", "TEST3@example.com"),
            ("test4@example.COM", "test4@example.com"),
        ];
        for (raw, expected) in samples {
            assert_eq!(normalize_email(raw), expected);
            assert_eq!(NewUser::regular(raw, "sample123").unwrap().email(), expected);
        }
    }

    #[test]
    fn empty_email_is_rejected() {
        assert_eq!(NewUser::regular("", "sample123").unwrap_err(), UserError::EmptyEmail);
        assert_eq!(NewUser::regular("   ", "sample123").unwrap_err(), UserError::EmptyEmail);
        assert_eq!(NewUser::superuser("", "sample123").unwrap_err(), UserError::EmptyEmail);
    }

    #[test]
    fn superuser_has_staff_and_superuser_flags() {
        let user = NewUser::superuser("admin@example.com", "password123").unwrap();
        assert!(user.is_staff());
        assert!(user.is_superuser());

        let user = NewUser::regular("user@example.com", "password123").unwrap();
        assert!(!user.is_staff());
        assert!(!user.is_superuser());
    }

    #[tokio::test]
    async fn create_and_update_user() {
        let Some(db) = testing::pool().await else { return };

        let email = testing::unique_email();
        let user = User::create(&db, NewUser::regular(&email, "qweewq").unwrap().with_name("Cook"))
            .await
            .unwrap();
        assert_eq!(user.email, email);
        assert_eq!(user.name, "Cook");
        assert!(user.is_active);
        assert!(verify_password("qweewq", &user.password_hash).unwrap());

        let found = User::find_by_email(&db, &email).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(User::email_taken(&db, &email, None).await.unwrap());
        assert!(!User::email_taken(&db, &email, Some(user.id)).await.unwrap());

        let updated = User::update(
            &db,
            user.id,
            UserChanges {
                name: Some("Chef".into()),
                password: Some("new-password".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Chef");
        assert_eq!(updated.email, email);
        assert!(verify_password("new-password", &updated.password_hash).unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_unique_violation() {
        let Some(db) = testing::pool().await else { return };

        let email = testing::unique_email();
        User::create(&db, NewUser::regular(&email, "pass123").unwrap())
            .await
            .unwrap();
        let err = User::create(&db, NewUser::regular(&email, "pass123").unwrap())
            .await
            .unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn created_superuser_flags_persist() {
        let Some(db) = testing::pool().await else { return };

        let user = User::create(
            &db,
            NewUser::superuser(&testing::unique_email(), "password123").unwrap(),
        )
        .await
        .unwrap();
        assert!(user.is_staff);
        assert!(user.is_superuser);
    }
}
