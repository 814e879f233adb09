use std::io;

use actix_web::{middleware, web, App, HttpServer};

mod config;
mod db;
mod error;
mod models;
mod password;
mod query;
mod routes;
mod schema;

use crate::config::Config;
use crate::routes::IngredientSeed;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // set up database connection pool, creating the schema on first run
    let pool = db::init_pool(&config.database_url, config.pool_size)
        .map_err(io::Error::other)?;
    let seed = web::Data::new(IngredientSeed::new(config.seed_ingredients));

    log::info!(
        "starting HTTP server at http://{}:{}",
        config.host,
        config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(seed.clone())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
