use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod store;

pub use store::PgStore;

pub const ENV_DB_URL: &str = "PFC_DATABASE_URL";

/// Connect to Postgres using PFC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Tables the embedded migrations create.
pub const SCHEMA_TABLES: &[&str] = &["challenges", "trades"];

/// Connectivity, schema presence and the live workload the scheduler sees.
///
/// Counts are only queried once every table in [`SCHEMA_TABLES`] exists.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let wanted: Vec<String> = SCHEMA_TABLES.iter().map(|t| t.to_string()).collect();
    let missing: Vec<(String,)> = sqlx::query_as::<_, (String,)>(
        r#"
        select t
        from unnest($1::text[]) as t
        where not exists (
            select 1
            from information_schema.tables
            where table_schema = current_schema() and table_name = t
        )
        order by t
        "#,
    )
    .bind(wanted)
    .fetch_all(pool)
    .await
    .context("status table-exists query failed")?;
    let missing_tables: Vec<String> = missing.into_iter().map(|(t,)| t).collect();

    let mut st = DbStatus {
        ok,
        missing_tables,
        active_challenges: None,
        open_trades: None,
    };
    if !st.schema_ready() {
        return Ok(st);
    }

    let (active, open): (i64, i64) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        select
          (select count(*) from challenges where status = 'active'),
          (select count(*) from trades where is_open)
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status workload query failed")?;
    st.active_challenges = Some(active);
    st.open_trades = Some(open);
    Ok(st)
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    /// Entries of [`SCHEMA_TABLES`] not present in the current schema.
    pub missing_tables: Vec<String>,
    pub active_challenges: Option<i64>,
    pub open_trades: Option<i64>,
}

impl DbStatus {
    pub fn schema_ready(&self) -> bool {
        self.missing_tables.is_empty()
    }
}
