use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String, // opaque placeholder, not exposed in JSON
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

/// Fields of a user before storage has assigned id and created_at.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: bool,
}

/// Storage seam for user records. The Postgres implementation backs the
/// running service; the in-memory one backs `AppState::fake()` and tests.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn exists_by_username(&self, username: &str) -> anyhow::Result<bool>;
    async fn exists_by_email(&self, email: &str) -> anyhow::Result<bool>;
    async fn exists_by_id(&self, id: i64) -> anyhow::Result<bool>;
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_all(&self) -> anyhow::Result<Vec<User>>;
    async fn insert(&self, user: NewUser) -> anyhow::Result<User>;
    async fn update(&self, user: &User) -> anyhow::Result<User>;
    async fn delete_by_id(&self, id: i64) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str = "id, username, email, password, first_name, last_name, active, created_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn exists_by_username(&self, username: &str) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)"#,
        )
        .bind(username)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn exists_by_email(&self, email: &str) -> anyhow::Result<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>(r#"SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn exists_by_id(&self, id: i64) -> anyhow::Result<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>(r#"SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)"#)
                .bind(id)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE username = $1"#
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_all(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users ORDER BY id"#
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, user: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password, first_name, last_name, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.active)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn update(&self, user: &User) -> anyhow::Result<User> {
        // id, password and created_at are deliberately not part of the SET list.
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = $1, email = $2, first_name = $3, last_name = $4, active = $5
            WHERE id = $6
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.active)
        .bind(user.id)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// In-memory store assigning its own ids and timestamps.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: std::sync::Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    rows: std::collections::BTreeMap<i64, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("user store poisoned")
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn exists_by_username(&self, username: &str) -> anyhow::Result<bool> {
        Ok(self.lock().rows.values().any(|u| u.username == username))
    }

    async fn exists_by_email(&self, email: &str) -> anyhow::Result<bool> {
        Ok(self.lock().rows.values().any(|u| u.email == email))
    }

    async fn exists_by_id(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.lock().rows.contains_key(&id))
    }

    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.lock().rows.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .lock()
            .rows
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_all(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.lock().rows.values().cloned().collect())
    }

    async fn insert(&self, user: NewUser) -> anyhow::Result<User> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let row = User {
            id: inner.next_id,
            username: user.username,
            email: user.email,
            password: user.password,
            first_name: user.first_name,
            last_name: user.last_name,
            active: user.active,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, user: &User) -> anyhow::Result<User> {
        let mut inner = self.lock();
        let row = inner
            .rows
            .get_mut(&user.id)
            .ok_or_else(|| anyhow::anyhow!("no user row with id {}", user.id))?;
        row.username = user.username.clone();
        row.email = user.email.clone();
        row.first_name = user.first_name.clone();
        row.last_name = user.last_name.clone();
        row.active = user.active;
        Ok(row.clone())
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<()> {
        self.lock().rows.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password: "x".into(),
            first_name: None,
            last_name: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn memory_store_assigns_sequential_ids() {
        let store = MemoryUserStore::new();
        let a = store.insert(new_user("a", "a@x.com")).await.unwrap();
        let b = store.insert(new_user("b", "b@x.com")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(store.exists_by_id(1).await.unwrap());
        assert!(store.exists_by_username("b").await.unwrap());
        assert!(store.exists_by_email("a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_update_preserves_id_password_and_timestamp() {
        let store = MemoryUserStore::new();
        let created = store.insert(new_user("a", "a@x.com")).await.unwrap();

        let mut changed = created.clone();
        changed.username = "a2".into();
        changed.password = "should-be-ignored".into();
        let updated = store.update(&changed).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.username, "a2");
        assert_eq!(updated.password, created.password);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn memory_store_delete_removes_row() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a", "a@x.com")).await.unwrap();
        store.delete_by_id(user.id).await.unwrap();
        assert!(!store.exists_by_id(user.id).await.unwrap());
        assert!(store.find_all().await.unwrap().is_empty());
    }
}
