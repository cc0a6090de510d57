mod activity;
mod budgets;
mod collaborators;
mod extract;
mod geocode;
mod invitations;
mod itinerary;
mod presence;
mod share;
mod trips;
mod webhooks;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::require_identity;
use crate::config::Config;
use crate::db::DbPool;
use crate::services::notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub notifier: Arc<dyn Notifier>,
    pub http: reqwest::Client,
}

async fn health() -> &'static str {
    "ok"
}

pub fn create_router(state: AppState) -> Router {
    // Rate limit: public share/invite pages and webhooks, 30 requests per 60 seconds per IP
    let public_governor = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(30)
        .finish()
        .unwrap();

    // Rate limit: geocoding proxies a third-party service, 20 requests per 60 seconds per IP
    let geocode_governor = GovernorConfigBuilder::default()
        .per_second(3)
        .burst_size(20)
        .finish()
        .unwrap();

    // Rate limit: protected API, 120 requests per 60 seconds per IP
    let api_governor = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(120)
        .finish()
        .unwrap();

    // Health checks, no rate limit
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health));

    let public_routes = Router::new()
        .route("/api/v1/share/{share_id}", get(share::view))
        .route("/api/v1/invite/{token}", get(invitations::preview))
        .route(
            "/api/webhooks/identity",
            get(webhooks::status).post(webhooks::identity_event),
        )
        .layer(GovernorLayer::new(Arc::new(public_governor)));

    let geocode_routes = Router::new()
        .route("/api/v1/geocode", get(geocode::search))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ))
        .layer(GovernorLayer::new(Arc::new(geocode_governor)));

    let protected = Router::new()
        // Trips
        .route("/api/v1/trips", get(trips::list).post(trips::create))
        .route(
            "/api/v1/trips/{trip_id}",
            get(trips::get).put(trips::update).delete(trips::delete),
        )
        .route("/api/v1/trips/{trip_id}/share", put(trips::share))
        // Itinerary
        .route(
            "/api/v1/trips/{trip_id}/items",
            get(itinerary::list).post(itinerary::add),
        )
        .route(
            "/api/v1/trips/{trip_id}/items/{item_id}",
            delete(itinerary::remove),
        )
        .route(
            "/api/v1/trips/{trip_id}/items/{item_id}/cost",
            put(itinerary::update_cost),
        )
        .route("/api/v1/trips/{trip_id}/reorder", put(itinerary::reorder))
        // Budget and expenses
        .route("/api/v1/trips/{trip_id}/budget", get(budgets::summary))
        .route(
            "/api/v1/trips/{trip_id}/budget/days",
            put(budgets::set_day),
        )
        .route(
            "/api/v1/trips/{trip_id}/expenses",
            get(budgets::list_expenses).post(budgets::add_expense),
        )
        .route(
            "/api/v1/trips/{trip_id}/expenses/csv",
            get(budgets::export_csv),
        )
        .route(
            "/api/v1/trips/{trip_id}/expenses/{expense_id}",
            delete(budgets::delete_expense),
        )
        .route(
            "/api/v1/trips/{trip_id}/rates",
            get(budgets::list_rates).put(budgets::set_rate),
        )
        // Collaboration
        .route(
            "/api/v1/trips/{trip_id}/collaborators",
            get(collaborators::list).post(collaborators::invite),
        )
        .route(
            "/api/v1/trips/{trip_id}/collaborators/{collaborator_id}",
            put(collaborators::change_role).delete(collaborators::remove),
        )
        .route(
            "/api/v1/trips/{trip_id}/invitations",
            get(invitations::list),
        )
        .route(
            "/api/v1/trips/{trip_id}/invitations/{invitation_id}",
            delete(invitations::cancel),
        )
        .route("/api/v1/invite/{token}/accept", post(invitations::accept))
        // Activity and presence
        .route("/api/v1/trips/{trip_id}/activity", get(activity::list))
        .route(
            "/api/v1/trips/{trip_id}/presence",
            get(presence::active).post(presence::heartbeat),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ))
        .layer(GovernorLayer::new(Arc::new(api_governor)));

    Router::new()
        .merge(health_routes)
        .merge(public_routes)
        .merge(geocode_routes)
        .merge(protected)
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::test_support::{json_body, request, send, test_state};

    #[tokio::test]
    async fn health_is_open() {
        let (state, _) = test_state();
        let response = send(&state, request("GET", "/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_identity() {
        let (state, _) = test_state();
        let response = send(&state, request("GET", "/api/v1/trips", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["sign_in_url"], "/");
    }

    #[tokio::test]
    async fn trip_lifecycle_over_http() {
        let (state, notifier) = test_state();

        let created = send(
            &state,
            request(
                "POST",
                "/api/v1/trips",
                Some("ana"),
                Some(json!({ "destination": "Paris" })),
            ),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let trip_id = json_body(created).await["id"].as_str().unwrap().to_string();

        let needs_dates = send(
            &state,
            request(
                "POST",
                &format!("/api/v1/trips/{trip_id}/items"),
                Some("ana"),
                Some(json!({ "name": "Eiffel Tower", "date": "2024-06-01" })),
            ),
        )
        .await;
        assert_eq!(needs_dates.status(), StatusCode::OK);
        assert_eq!(json_body(needs_dates).await["status"], "needs_dates");

        let updated = send(
            &state,
            request(
                "PUT",
                &format!("/api/v1/trips/{trip_id}"),
                Some("ana"),
                Some(json!({ "start_date": "2024-06-01", "end_date": "2024-06-02" })),
            ),
        )
        .await;
        assert_eq!(updated.status(), StatusCode::OK);

        let added = send(
            &state,
            request(
                "POST",
                &format!("/api/v1/trips/{trip_id}/items"),
                Some("ana"),
                Some(json!({ "name": "Eiffel Tower", "date": "2024-06-01", "latitude": 48.8584, "longitude": 2.2945 })),
            ),
        )
        .await;
        assert_eq!(added.status(), StatusCode::CREATED);
        let body = json_body(added).await;
        assert_eq!(body["status"], "added");
        assert_eq!(body["item"]["order"], 1);

        let detail = send(
            &state,
            request("GET", &format!("/api/v1/trips/{trip_id}"), Some("ana"), None),
        )
        .await;
        let detail = json_body(detail).await;
        assert_eq!(detail["role"], "owner");
        assert_eq!(detail["days"], json!(["2024-06-01", "2024-06-02"]));

        let stranger = send(
            &state,
            request("GET", &format!("/api/v1/trips/{trip_id}"), Some("eve"), None),
        )
        .await;
        assert_eq!(stranger.status(), StatusCode::UNAUTHORIZED);

        let deleted = send(
            &state,
            request("DELETE", &format!("/api/v1/trips/{trip_id}"), Some("ana"), None),
        )
        .await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        assert!(notifier
            .events()
            .iter()
            .any(|e| e.payload["type"] == "trip-deleted"));
    }

    #[tokio::test]
    async fn shared_trip_is_public_only_when_shared() {
        let (state, _) = test_state();
        let created = send(
            &state,
            request(
                "POST",
                "/api/v1/trips",
                Some("ana"),
                Some(json!({ "destination": "Rome" })),
            ),
        )
        .await;
        let trip_id = json_body(created).await["id"].as_str().unwrap().to_string();

        let shared = send(
            &state,
            request(
                "PUT",
                &format!("/api/v1/trips/{trip_id}/share"),
                Some("ana"),
                Some(json!({ "is_public": true })),
            ),
        )
        .await;
        let share_id = json_body(shared).await["share_id"].as_str().unwrap().to_string();

        let public = send(&state, request("GET", &format!("/api/v1/share/{share_id}"), None, None)).await;
        assert_eq!(public.status(), StatusCode::OK);
        assert_eq!(json_body(public).await["destination"], "Rome");

        send(
            &state,
            request(
                "PUT",
                &format!("/api/v1/trips/{trip_id}/share"),
                Some("ana"),
                Some(json!({ "is_public": false })),
            ),
        )
        .await;
        let hidden = send(&state, request("GET", &format!("/api/v1/share/{share_id}"), None, None)).await;
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
    }
}
