pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use crate::services::{
    attempt_service::AttemptService, entity_service::EntityService,
    generation_service::GenerationService, test_service::StudyTestService,
};
use reqwest::Client;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub test_service: StudyTestService,
    pub attempt_service: AttemptService,
    pub entity_service: EntityService,
    pub generation_service: GenerationService,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        let config = crate::config::get_config();
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .unwrap();

        let test_service = StudyTestService::new(pool.clone());
        let attempt_service = AttemptService::new(pool.clone());
        let entity_service = EntityService::new(pool.clone());
        let generation_service = GenerationService::new(
            config.generation_api_url.clone(),
            config.generation_api_key.clone(),
            config.generation_model.clone(),
            http_client,
        );

        Self {
            pool,
            test_service,
            attempt_service,
            entity_service,
            generation_service,
        }
    }
}
