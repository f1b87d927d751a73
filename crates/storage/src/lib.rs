use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use tabi_core::{CollaboratorError, CompanyRecordStore, LocationKind, LocationRecord};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub prefecture: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prefecture: None,
            city: None,
            address: None,
            postal_code: None,
            updated_at: Utc::now(),
        }
    }

    pub fn located(mut self, prefecture: &str, city: &str) -> Self {
        self.prefecture = Some(prefecture.to_string());
        self.city = Some(city.to_string());
        self
    }

    pub fn location_row(&self) -> CompanyLocationRow {
        CompanyLocationRow {
            prefecture: self.prefecture.clone(),
            city: self.city.clone(),
            address: self.address.clone(),
            postal_code: self.postal_code.clone(),
        }
    }
}

/// Shape of the base-location query. Normalized into a [`LocationRecord`]
/// here so nothing above the storage layer sees nullable columns.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CompanyLocationRow {
    pub prefecture: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
}

impl CompanyLocationRow {
    /// `None` when neither prefecture nor city is set. Region is left for the
    /// resolver, which owns the prefecture table.
    pub fn into_record(self) -> Option<LocationRecord> {
        let prefecture = non_blank(self.prefecture).unwrap_or_default();
        let city = non_blank(self.city).unwrap_or_default();
        if prefecture.is_empty() && city.is_empty() {
            return None;
        }
        Some(LocationRecord {
            city,
            prefecture,
            region: String::new(),
            postal_code: non_blank(self.postal_code),
            address: non_blank(self.address),
            kind: LocationKind::Database,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub trait CompanyRepository: Send + Sync {
    async fn load_company(&self, company_id: &str) -> Result<Option<Company>>;
    async fn upsert_company(&self, company: &Company) -> Result<()>;
    async fn list_companies(&self) -> Result<Vec<Company>>;
    async fn company_location(&self, company_id: &str) -> Result<Option<CompanyLocationRow>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    companies: Arc<RwLock<HashMap<String, Company>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompanyRepository for MemoryStore {
    async fn load_company(&self, company_id: &str) -> Result<Option<Company>> {
        Ok(self.companies.read().get(company_id).cloned())
    }

    async fn upsert_company(&self, company: &Company) -> Result<()> {
        self.companies
            .write()
            .insert(company.id.clone(), company.clone());
        Ok(())
    }

    async fn list_companies(&self) -> Result<Vec<Company>> {
        let mut companies = self.companies.read().values().cloned().collect::<Vec<_>>();
        companies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(companies)
    }

    async fn company_location(&self, company_id: &str) -> Result<Option<CompanyLocationRow>> {
        Ok(self
            .companies
            .read()
            .get(company_id)
            .map(Company::location_row))
    }
}

#[derive(Debug, FromRow)]
struct CompanyRow {
    id: String,
    name: String,
    prefecture: Option<String>,
    city: Option<String>,
    address: Option<String>,
    postal_code: Option<String>,
    updated_at: String,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            prefecture: row.prefecture,
            city: row.city,
            address: row.address,
            postal_code: row.postal_code,
            updated_at: row.updated_at.parse().unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // every in-memory connection is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
              id TEXT PRIMARY KEY,
              name TEXT NOT NULL,
              prefecture TEXT,
              city TEXT,
              address TEXT,
              postal_code TEXT,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl CompanyRepository for SqliteStore {
    async fn load_company(&self, company_id: &str) -> Result<Option<Company>> {
        let row = sqlx::query_as::<_, CompanyRow>(
            r#"
            SELECT id, name, prefecture, city, address, postal_code, updated_at
            FROM companies
            WHERE id = ?1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Company::from))
    }

    async fn upsert_company(&self, company: &Company) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO companies (id, name, prefecture, city, address, postal_code, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
              name=excluded.name,
              prefecture=excluded.prefecture,
              city=excluded.city,
              address=excluded.address,
              postal_code=excluded.postal_code,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(&company.id)
        .bind(&company.name)
        .bind(&company.prefecture)
        .bind(&company.city)
        .bind(&company.address)
        .bind(&company.postal_code)
        .bind(company.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_companies(&self) -> Result<Vec<Company>> {
        let rows = sqlx::query_as::<_, CompanyRow>(
            r#"
            SELECT id, name, prefecture, city, address, postal_code, updated_at
            FROM companies
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Company::from).collect())
    }

    async fn company_location(&self, company_id: &str) -> Result<Option<CompanyLocationRow>> {
        let row = sqlx::query_as::<_, CompanyLocationRow>(
            r#"
            SELECT prefecture, city, address, postal_code
            FROM companies
            WHERE id = ?1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }
}

impl CompanyRepository for Store {
    async fn load_company(&self, company_id: &str) -> Result<Option<Company>> {
        match self {
            Store::Memory(store) => store.load_company(company_id).await,
            Store::Sqlite(store) => store.load_company(company_id).await,
        }
    }

    async fn upsert_company(&self, company: &Company) -> Result<()> {
        match self {
            Store::Memory(store) => store.upsert_company(company).await,
            Store::Sqlite(store) => store.upsert_company(company).await,
        }
    }

    async fn list_companies(&self) -> Result<Vec<Company>> {
        match self {
            Store::Memory(store) => store.list_companies().await,
            Store::Sqlite(store) => store.list_companies().await,
        }
    }

    async fn company_location(&self, company_id: &str) -> Result<Option<CompanyLocationRow>> {
        match self {
            Store::Memory(store) => store.company_location(company_id).await,
            Store::Sqlite(store) => store.company_location(company_id).await,
        }
    }
}

/// Synchronous snapshot of company base locations for the pipeline, which
/// never awaits. Filled from a repository at startup and on refresh.
#[derive(Clone, Default)]
pub struct CompanyDirectory {
    records: Arc<RwLock<HashMap<String, LocationRecord>>>,
}

impl CompanyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot with every company that has a usable location.
    pub async fn hydrate<R: CompanyRepository>(&self, repository: &R) -> Result<usize> {
        let mut fresh = HashMap::new();
        for company in repository.list_companies().await? {
            if let Some(record) = company.location_row().into_record() {
                fresh.insert(company.id, record);
            }
        }
        let count = fresh.len();
        *self.records.write() = fresh;
        info!(companies = count, "company directory hydrated");
        Ok(count)
    }

    /// Re-reads a single company, e.g. after an admin edit.
    pub async fn refresh<R: CompanyRepository>(&self, repository: &R, company_id: &str) -> Result<bool> {
        let record = repository
            .company_location(company_id)
            .await?
            .and_then(CompanyLocationRow::into_record);
        let mut records = self.records.write();
        Ok(match record {
            Some(record) => {
                records.insert(company_id.to_string(), record);
                true
            }
            None => {
                records.remove(company_id);
                false
            }
        })
    }

    pub fn insert(&self, company_id: impl Into<String>, record: LocationRecord) {
        self.records.write().insert(company_id.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl CompanyRecordStore for CompanyDirectory {
    fn base_location(&self, company_id: &str) -> Result<Option<LocationRecord>, CollaboratorError> {
        Ok(self.records.read().get(company_id).cloned())
    }
}
