use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;

use crate::error::AppResult;

pub(crate) type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

const BUSY_TIMEOUT_MS: u32 = 5000;

#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        // sqlite leaves foreign keys off unless asked, per connection
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Builds the connection pool and makes sure the schema exists.
pub(crate) fn init_pool(database_url: &str, max_size: u32) -> AppResult<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)?;

    let mut conn = pool.get()?;
    create_schema(&mut conn)?;
    log::info!("database ready at {}", database_url);
    Ok(pool)
}

pub(crate) fn create_schema(conn: &mut SqliteConnection) -> diesel::QueryResult<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS user (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ingredient (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS recipe (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            meal_type TEXT CHECK (meal_type IN ('Entrée', 'Plat', 'Dessert')),
            steps TEXT,
            servings INTEGER
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ingredient_quantity (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_id INTEGER NOT NULL REFERENCES recipe(id) ON DELETE CASCADE,
            ingredient_id INTEGER NOT NULL REFERENCES ingredient(id),
            quantity REAL NOT NULL,
            unit TEXT,
            UNIQUE (recipe_id, ingredient_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS meal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meal_type TEXT NOT NULL CHECK (meal_type IN ('Entrée', 'Plat', 'Dessert')),
            recipe_id INTEGER NOT NULL REFERENCES recipe(id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS menu (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            entree_id INTEGER REFERENCES meal(id) ON DELETE SET NULL,
            plat_id INTEGER REFERENCES meal(id) ON DELETE SET NULL,
            dessert_id INTEGER REFERENCES meal(id) ON DELETE SET NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS favorite (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES user(id),
            recipe_id INTEGER NOT NULL REFERENCES recipe(id),
            UNIQUE (user_id, recipe_id)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_ingredient_quantity_ingredient ON ingredient_quantity(ingredient_id)",
        "CREATE INDEX IF NOT EXISTS idx_recipe_servings ON recipe(servings)",
        "CREATE INDEX IF NOT EXISTS idx_favorite_recipe ON favorite(recipe_id)",
    ];

    for statement in statements {
        conn.batch_execute(statement)?;
    }
    Ok(())
}

/// Single-connection in-memory pool; every checkout sees the same database.
#[cfg(test)]
pub(crate) fn test_pool() -> DbPool {
    init_pool(":memory:", 1).expect("in-memory pool")
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::prelude::*;
    use diesel::sql_types::Integer;

    #[derive(QueryableByName)]
    struct Flag {
        #[diesel(sql_type = Integer)]
        foreign_keys: i32,
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        create_schema(&mut conn).unwrap();
        create_schema(&mut conn).unwrap();
    }

    #[test]
    fn pooled_connections_enforce_foreign_keys() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        let flag: Flag = diesel::sql_query("PRAGMA foreign_keys")
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(flag.foreign_keys, 1);
    }
}
