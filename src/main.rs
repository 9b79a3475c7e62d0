// src/main.rs
mod api;
mod auth;
mod config;
mod db;
mod error;
mod gateway;
mod intraday;
mod models;
mod portfolio;
mod store;
mod valuation;
mod views;

#[cfg(test)]
mod testing;

use crate::api::{AppState, Settings};
use crate::auth::SessionKeys;
use crate::config::{Config, DatabaseUrl};
use crate::db::ScyllaStore;
use crate::gateway::{MarketData, TcbsClient};
use crate::portfolio::Portfolio;
use crate::store::{MemoryStore, StockStore, UserStore};
use crate::valuation::Valuation;
use env_logger::Builder;
use log::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    Builder::new()
        .filter_level(Config::log_level())
        .format_timestamp_secs()
        .parse_default_env()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let (stocks, users): (Arc<dyn StockStore>, Arc<dyn UserStore>) = match &config.database {
        DatabaseUrl::Memory => {
            warn!("Using the in-memory store; data is lost on restart.");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
        DatabaseUrl::Scylla(nodes) => match ScyllaStore::connect(nodes).await {
            Ok(store) => {
                let store = Arc::new(store);
                (store.clone(), store)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                return;
            }
        },
    };
    info!("Connected to database...");

    let market: Arc<dyn MarketData> = match TcbsClient::new(&config.provider) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to initialize market data client: {}", e);
            return;
        }
    };

    let valuation = Valuation::new(market.clone(), config.provider.market_offset);
    let state = AppState {
        portfolio: Arc::new(Portfolio::new(stocks, valuation)),
        users,
        market,
        keys: Arc::new(SessionKeys::new(
            &config.session.secret,
            config.session.ttl_hours,
        )),
        settings: Arc::new(Settings {
            assets_root: config.server.assets_root.clone(),
            allow_admin_signup: config.session.allow_admin_signup,
            intraday_page_size: config.provider.intraday_page_size,
        }),
    };

    info!("Starting the portfolio tracker application...");
    let routes = api::routes(state, config.server.static_dir.clone());

    info!("Server running on http://{}", config.server.bind);
    warp::serve(routes).run(config.server.bind).await;
}
