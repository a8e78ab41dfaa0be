use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::logic::LineageService;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<Arc<LineageService<S>>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Plants
        .route("/plants", post(handlers::register_plant::<S>))
        .route("/plants/:plant_id", get(handlers::get_plant::<S>))
        .route("/plants/:plant_id/archive", post(handlers::archive_plant::<S>))
        // Flowering cycles
        .route(
            "/plants/:plant_id/flowering",
            get(handlers::list_flowering_cycles::<S>).post(handlers::upsert_flowering_cycle::<S>),
        )
        .route(
            "/plants/:plant_id/flowering/:cycle_id",
            get(handlers::get_flowering_cycle::<S>)
                .patch(handlers::patch_flowering_cycle::<S>)
                .delete(handlers::delete_flowering_cycle::<S>),
        )
        // Crosses
        .route(
            "/breeding",
            get(handlers::list_crosses::<S>).post(handlers::create_cross::<S>),
        )
        .route(
            "/breeding/:cross_id",
            get(handlers::get_cross::<S>)
                .patch(handlers::update_cross::<S>)
                .delete(handlers::delete_cross::<S>),
        )
        .route("/breeding/:cross_id/archive", post(handlers::archive_cross::<S>))
        .route("/breeding/:cross_id/yield", get(handlers::cross_yield::<S>))
        // Harvests
        .route(
            "/breeding/:cross_id/harvests/next-number",
            get(handlers::next_harvest_number::<S>),
        )
        .route(
            "/breeding/:cross_id/harvests",
            get(handlers::list_harvests::<S>).post(handlers::create_harvest::<S>),
        )
        .route(
            "/breeding/:cross_id/harvests/:harvest_id",
            get(handlers::get_harvest::<S>)
                .patch(handlers::update_harvest::<S>)
                .delete(handlers::delete_harvest::<S>),
        )
        // Seed batches
        .route(
            "/seed-batches",
            get(handlers::list_seed_batches::<S>).post(handlers::create_seed_batch::<S>),
        )
        .route(
            "/seed-batches/:batch_id",
            get(handlers::get_seed_batch::<S>).delete(handlers::delete_seed_batch::<S>),
        )
        // Seedlings
        .route(
            "/seedlings",
            get(handlers::list_seedlings::<S>).post(handlers::create_seedlings::<S>),
        )
        .route(
            "/seedlings/:seedling_id",
            get(handlers::get_seedling::<S>)
                .patch(handlers::update_seedling::<S>)
                .delete(handlers::delete_seedling::<S>),
        )
        .route(
            "/seedlings/:seedling_id/graduate",
            post(handlers::graduate_seedling::<S>),
        )
}
