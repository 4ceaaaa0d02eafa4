//! SQLite-backed DataStore.

use std::path::Path;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::model::{Route, RouteTable, Subnet, SyncScope, Vendor};

use super::error::{Result, StoreError};
use super::traits::{
    CreateRouteRequest, CreateRouteTableRequest, CreateSubnetRequest, DEFAULT_MAX_BATCH,
    DataStore, RouteStore, RouteTableFilter, RouteTableStore, SubnetStore, UpdateRouteRequest,
    UpdateRouteTableRequest, UpdateSubnetLinkRequest, check_batch,
};
use super::{new_id, now};

/// SQLite-backed inventory store for route tables, routes and subnets
pub struct SqliteStore {
    pool: SqlitePool,
    max_batch: usize,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self {
            pool,
            max_batch: DEFAULT_MAX_BATCH,
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // Route tables
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS route_tables (
                id TEXT PRIMARY KEY,
                vendor TEXT NOT NULL,
                account_id TEXT NOT NULL,
                cloud_id TEXT NOT NULL,
                name TEXT NOT NULL,
                region TEXT NOT NULL,
                resource_group TEXT,
                cloud_vpc_id TEXT NOT NULL,
                memo TEXT,
                bk_biz_id INTEGER NOT NULL DEFAULT -1,
                extension TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (vendor, cloud_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Routes
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS routes (
                id TEXT PRIMARY KEY,
                vendor TEXT NOT NULL,
                route_table_id TEXT NOT NULL,
                cloud_route_table_id TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                spec TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (route_table_id, natural_key),
                FOREIGN KEY (route_table_id) REFERENCES route_tables(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Subnets
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subnets (
                id TEXT PRIMARY KEY,
                vendor TEXT NOT NULL,
                account_id TEXT NOT NULL,
                cloud_id TEXT NOT NULL,
                name TEXT NOT NULL,
                cloud_route_table_id TEXT,
                route_table_id TEXT,
                bk_biz_id INTEGER NOT NULL DEFAULT -1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (vendor, cloud_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subnets_route_table ON subnets(vendor, route_table_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_route_table(&self, row: &SqliteRow) -> Result<RouteTable> {
        let extension: String = row.try_get("extension")?;
        Ok(RouteTable {
            id: row.try_get("id")?,
            vendor: parse_vendor(row)?,
            account_id: row.try_get("account_id")?,
            cloud_id: row.try_get("cloud_id")?,
            name: row.try_get("name")?,
            region: row.try_get("region")?,
            resource_group: row.try_get("resource_group")?,
            cloud_vpc_id: row.try_get("cloud_vpc_id")?,
            memo: row.try_get("memo")?,
            bk_biz_id: row.try_get("bk_biz_id")?,
            extension: serde_json::from_str(&extension)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_route(&self, row: &SqliteRow) -> Result<Route> {
        let spec: String = row.try_get("spec")?;
        Ok(Route {
            id: row.try_get("id")?,
            vendor: parse_vendor(row)?,
            route_table_id: row.try_get("route_table_id")?,
            cloud_route_table_id: row.try_get("cloud_route_table_id")?,
            natural_key: row.try_get("natural_key")?,
            spec: serde_json::from_str(&spec)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_subnet(&self, row: &SqliteRow) -> Result<Subnet> {
        Ok(Subnet {
            id: row.try_get("id")?,
            vendor: parse_vendor(row)?,
            account_id: row.try_get("account_id")?,
            cloud_id: row.try_get("cloud_id")?,
            name: row.try_get("name")?,
            cloud_route_table_id: row.try_get("cloud_route_table_id")?,
            route_table_id: row.try_get("route_table_id")?,
            bk_biz_id: row.try_get("bk_biz_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn parse_vendor(row: &SqliteRow) -> Result<Vendor> {
    let vendor: String = row.try_get("vendor")?;
    vendor.parse().map_err(StoreError::Corrupt)
}

/// `?, ?, ?` for an `IN (...)` list.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Unique violations become conflicts, everything else stays a driver error.
fn write_error(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return StoreError::Conflict(format!("{} already exists", what));
    }
    StoreError::Database(err)
}

#[async_trait]
impl RouteTableStore for SqliteStore {
    async fn list_route_tables_by_cloud_ids(
        &self,
        vendor: Vendor,
        cloud_ids: &[String],
    ) -> Result<Vec<RouteTable>> {
        check_batch(cloud_ids.len(), self.max_batch)?;
        if cloud_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM route_tables WHERE vendor = ? AND cloud_id IN ({}) ORDER BY rowid",
            placeholders(cloud_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(vendor.as_str());
        for id in cloud_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_to_route_table(r)).collect()
    }

    async fn list_route_tables(
        &self,
        filter: &RouteTableFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RouteTable>> {
        check_batch(limit, self.max_batch)?;
        let (column, value) = match &filter.scope {
            SyncScope::Region(r) => ("region", r),
            SyncScope::ResourceGroup(g) => ("resource_group", g),
        };
        let sql = format!(
            "SELECT * FROM route_tables WHERE vendor = ? AND account_id = ? AND {} = ? \
             ORDER BY rowid LIMIT ? OFFSET ?",
            column
        );
        let rows = sqlx::query(&sql)
            .bind(filter.vendor.as_str())
            .bind(&filter.account_id)
            .bind(value)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| self.row_to_route_table(r)).collect()
    }

    async fn batch_create_route_tables(
        &self,
        reqs: Vec<CreateRouteTableRequest>,
    ) -> Result<Vec<String>> {
        check_batch(reqs.len(), self.max_batch)?;
        let ts = now();
        let mut ids = Vec::with_capacity(reqs.len());
        let mut tx = self.pool.begin().await?;

        for req in &reqs {
            let id = new_id();
            let extension = serde_json::to_string(&req.extension)?;
            sqlx::query(
                r#"
                INSERT INTO route_tables (id, vendor, account_id, cloud_id, name, region,
                    resource_group, cloud_vpc_id, memo, bk_biz_id, extension, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(req.vendor.as_str())
            .bind(&req.account_id)
            .bind(&req.cloud_id)
            .bind(&req.name)
            .bind(&req.region)
            .bind(&req.resource_group)
            .bind(&req.cloud_vpc_id)
            .bind(&req.memo)
            .bind(req.bk_biz_id)
            .bind(&extension)
            .bind(&ts)
            .bind(&ts)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, &format!("route table {}/{}", req.vendor, req.cloud_id)))?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn batch_update_route_tables(&self, reqs: Vec<UpdateRouteTableRequest>) -> Result<()> {
        check_batch(reqs.len(), self.max_batch)?;
        let ts = now();
        let mut tx = self.pool.begin().await?;

        for req in &reqs {
            let result =
                sqlx::query("UPDATE route_tables SET name = ?, memo = ?, updated_at = ? WHERE id = ?")
                    .bind(&req.name)
                    .bind(&req.memo)
                    .bind(&ts)
                    .bind(&req.id)
                    .execute(&mut *tx)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("route table {}", req.id)));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn batch_delete_route_tables(&self, ids: &[String]) -> Result<u64> {
        check_batch(ids.len(), self.max_batch)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let list = placeholders(ids.len());
        let delete_routes = format!("DELETE FROM routes WHERE route_table_id IN ({})", list);
        let delete_tables = format!("DELETE FROM route_tables WHERE id IN ({})", list);
        let mut tx = self.pool.begin().await?;

        let mut query = sqlx::query(&delete_routes);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&mut *tx).await?;

        let mut query = sqlx::query(&delete_tables);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RouteStore for SqliteStore {
    async fn list_routes(&self, route_table_id: &str) -> Result<Vec<Route>> {
        let rows = sqlx::query("SELECT * FROM routes WHERE route_table_id = ? ORDER BY rowid")
            .bind(route_table_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| self.row_to_route(r)).collect()
    }

    async fn batch_create_routes(
        &self,
        route_table_id: &str,
        reqs: Vec<CreateRouteRequest>,
    ) -> Result<Vec<String>> {
        check_batch(reqs.len(), self.max_batch)?;
        let ts = now();
        let mut ids = Vec::with_capacity(reqs.len());
        let mut tx = self.pool.begin().await?;

        let parent = sqlx::query("SELECT id FROM route_tables WHERE id = ?")
            .bind(route_table_id)
            .fetch_optional(&mut *tx)
            .await?;
        if parent.is_none() {
            return Err(StoreError::NotFound(format!("route table {}", route_table_id)));
        }

        for req in &reqs {
            let id = new_id();
            let spec = serde_json::to_string(&req.spec)?;
            sqlx::query(
                r#"
                INSERT INTO routes (id, vendor, route_table_id, cloud_route_table_id, natural_key,
                    spec, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(req.spec.vendor().as_str())
            .bind(route_table_id)
            .bind(&req.cloud_route_table_id)
            .bind(&req.natural_key)
            .bind(&spec)
            .bind(&ts)
            .bind(&ts)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, &format!("route {}", req.natural_key)))?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn batch_update_routes(
        &self,
        route_table_id: &str,
        reqs: Vec<UpdateRouteRequest>,
    ) -> Result<()> {
        check_batch(reqs.len(), self.max_batch)?;
        let ts = now();
        let mut tx = self.pool.begin().await?;

        for req in &reqs {
            let spec = serde_json::to_string(&req.spec)?;
            let result = sqlx::query(
                "UPDATE routes SET spec = ?, updated_at = ? WHERE id = ? AND route_table_id = ?",
            )
            .bind(&spec)
            .bind(&ts)
            .bind(&req.id)
            .bind(route_table_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("route {}", req.id)));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn batch_delete_routes(&self, route_table_id: &str, ids: &[String]) -> Result<u64> {
        check_batch(ids.len(), self.max_batch)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM routes WHERE route_table_id = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(route_table_id);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SubnetStore for SqliteStore {
    async fn list_subnets_by_cloud_ids(
        &self,
        vendor: Vendor,
        cloud_ids: &[String],
    ) -> Result<Vec<Subnet>> {
        check_batch(cloud_ids.len(), self.max_batch)?;
        if cloud_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM subnets WHERE vendor = ? AND cloud_id IN ({}) ORDER BY rowid",
            placeholders(cloud_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(vendor.as_str());
        for id in cloud_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_to_subnet(r)).collect()
    }

    async fn list_subnets_by_route_table_ids(
        &self,
        vendor: Vendor,
        route_table_ids: &[String],
    ) -> Result<Vec<Subnet>> {
        check_batch(route_table_ids.len(), self.max_batch)?;
        if route_table_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM subnets WHERE vendor = ? AND route_table_id IN ({}) ORDER BY rowid",
            placeholders(route_table_ids.len())
        );
        let mut query = sqlx::query(&sql).bind(vendor.as_str());
        for id in route_table_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_to_subnet(r)).collect()
    }

    async fn batch_create_subnets(&self, reqs: Vec<CreateSubnetRequest>) -> Result<Vec<String>> {
        check_batch(reqs.len(), self.max_batch)?;
        let ts = now();
        let mut ids = Vec::with_capacity(reqs.len());
        let mut tx = self.pool.begin().await?;

        for req in &reqs {
            let id = new_id();
            sqlx::query(
                r#"
                INSERT INTO subnets (id, vendor, account_id, cloud_id, name, cloud_route_table_id,
                    route_table_id, bk_biz_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(req.vendor.as_str())
            .bind(&req.account_id)
            .bind(&req.cloud_id)
            .bind(&req.name)
            .bind(&req.cloud_route_table_id)
            .bind(req.bk_biz_id)
            .bind(&ts)
            .bind(&ts)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, &format!("subnet {}/{}", req.vendor, req.cloud_id)))?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn batch_update_subnet_links(&self, reqs: Vec<UpdateSubnetLinkRequest>) -> Result<()> {
        check_batch(reqs.len(), self.max_batch)?;
        let ts = now();
        let mut tx = self.pool.begin().await?;

        for req in &reqs {
            let (cloud_route_table_id, route_table_id) = match &req.link {
                Some(link) => (
                    Some(link.cloud_route_table_id.as_str()),
                    Some(link.route_table_id.as_str()),
                ),
                None => (None, None),
            };
            let result = sqlx::query(
                "UPDATE subnets SET cloud_route_table_id = ?, route_table_id = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(cloud_route_table_id)
            .bind(route_table_id)
            .bind(&ts)
            .bind(&req.id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("subnet {}", req.id)));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

impl DataStore for SqliteStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}
