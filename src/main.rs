#[macro_use]
extern crate rocket;

mod api;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use env_logger::Env;
use log::{error, info};
use rocket::{
    figment::{
        providers::{Format, Toml},
        Figment, Profile,
    },
    Config,
};
use skinservice::config::AppConfig;
use skinservice::SkinRepository;

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

// Environment variables that override repository settings from App.toml.
const REPOSITORY_OVERRIDES: [(&str, &str); 4] = [
    ("SKIN_PATH", "repository.skin_path"),
    ("CAPE_PATH", "repository.cape_path"),
    ("REPOSITORY_ACCESS", "repository.access"),
    ("REPOSITORY_TYPE", "repository.type"),
];

#[launch]
async fn rocket() -> _ {
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    // Load config
    let mut figment = Figment::from(Config::default())
        .merge(Toml::file("App.toml").nested());

    for (var, key) in REPOSITORY_OVERRIDES {
        if let Ok(value) = env::var(var) {
            figment = figment.merge((key, value));
        }
    }

    figment = figment.select(Profile::from_env_or("APP_PROFILE", "default"));

    let config = match figment.extract::<AppConfig>() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.repository.validate() {
        error!("Invalid repository configuration: {}", e);
        std::process::exit(1);
    }

    info!("Configuration loaded successfully");

    // The service can't answer fallback requests without the default skin.
    let repository = match SkinRepository::new(&config.repository) {
        Ok(repository) => Arc::new(repository),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    repository.spawn_sweeper(SWEEP_PERIOD);

    info!(
        "Starting skin service on {}:{}",
        config.address, config.port
    );

    rocket::custom(figment)
        .manage(repository)
        .mount(
            "/",
            routes![
                api::skins::get_skin,
                api::skins::get_cape,
                api::skins::invalidate_skin,
                api::skins::invalidate_cape,
            ],
        )
}
