use abuse_guard::AbuseGuard;
use audit::AuditLogger;
use authz::RoleStore;
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use database::Database;
use identity::IdentityVerifier;
use raffle::RaffleEngine;
use std::net::IpAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

pub mod error;
pub mod handlers;
pub mod middleware_hooks;
pub mod models;
pub mod route_guard;
pub mod server;


pub use route_guard::{GuardOutcome, RouteGuard};
pub use server::{start_server, start_server_with_config, ApiConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub roles: Arc<dyn RoleStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub guard: Arc<AbuseGuard>,
    pub audit: Arc<AuditLogger>,
    pub raffles: Arc<RaffleEngine>,
    pub route_guard: Arc<RouteGuard>,
    /// Peers whose forwarding headers name the real client
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    /// Wire the state from its services. Roles are read from the database.
    pub fn new(
        db: Database,
        verifier: Arc<dyn IdentityVerifier>,
        guard: Arc<AbuseGuard>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let roles: Arc<dyn RoleStore> = Arc::new(db.admins());
        Self::with_role_store(db, roles, verifier, guard, audit)
    }

    pub fn with_role_store(
        db: Database,
        roles: Arc<dyn RoleStore>,
        verifier: Arc<dyn IdentityVerifier>,
        guard: Arc<AbuseGuard>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        let raffles = Arc::new(RaffleEngine::new(db.clone(), audit.clone()));
        let route_guard = Arc::new(RouteGuard::new(
            verifier.clone(),
            roles.clone(),
            guard.clone(),
            audit.clone(),
        ));
        Self {
            db,
            roles,
            verifier,
            guard,
            audit,
            raffles,
            route_guard,
            trusted_proxies: Arc::from(Vec::<IpAddr>::new()),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = Arc::from(proxies);
        self
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::verify,
        handlers::guard::check_route,
        handlers::admins::list_admins,
        handlers::admins::add_admin,
        handlers::admins::update_admin,
        handlers::admins::delete_admin,
        handlers::audit_logs::list_audit_logs,
        handlers::raffles::list_raffles,
        handlers::raffles::raffle_stats,
        handlers::raffles::get_raffle,
        handlers::raffles::list_participants,
        handlers::raffles::create_raffle,
        handlers::raffles::draw_winner,
        handlers::raffles::change_winner,
        handlers::raffles::end_raffle,
        handlers::raffles::announce_result,
        handlers::raffles::delete_raffle,
        handlers::raffles::enroll_post,
    ),
    components(
        schemas(
            models::AddAdminRequest,
            models::UpdateAdminRequest,
            models::AdminListResponse,
            models::SuccessResponse,
            models::AuditLogsResponse,
            models::RaffleListResponse,
            models::ParticipantListResponse,
            models::ChangeWinnerRequest,
            models::EnrollPostRequest,
            models::EnrollPostResponse,
            models::VerifyRequest,
            models::VerifyResponse,
            models::GuardRequest,
            models::GuardResponse,
            models::HealthResponse,
            models::DatabaseHealth,
            models::AuditHealth,
            database::AdminRecord,
            database::Raffle,
            database::RaffleParticipant,
            database::Announcement,
            raffle::NewRaffle,
            raffle::CreatedRaffle,
            raffle::DeletedRaffle,
            raffle::RaffleStats,
            raffle::RaffleScopeStats,
            error::ApiErrorResponse,
        )
    ),
    tags(
        (name = "admins", description = "Role record management"),
        (name = "audit", description = "Audit trail"),
        (name = "raffles", description = "Event raffles"),
        (name = "auth", description = "Login verification and route guard"),
        (name = "health", description = "Health check endpoints"),
    ),
    info(
        title = "Clubhouse Admin API",
        version = "1.0.0",
        description = "Access control, audit trail and raffles for the club admin",
    ),
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Create the main API router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        // Role records
        .route(
            "/admin/admins",
            get(handlers::admins::list_admins)
                .post(handlers::admins::add_admin)
                .put(handlers::admins::update_admin)
                .delete(handlers::admins::delete_admin),
        )
        .route("/admin/audit-logs", get(handlers::audit_logs::list_audit_logs))
        // Raffles
        .route(
            "/admin/raffles",
            get(handlers::raffles::list_raffles).post(handlers::raffles::create_raffle),
        )
        .route("/admin/raffles/stats", get(handlers::raffles::raffle_stats))
        .route(
            "/admin/raffles/enrollments",
            post(handlers::raffles::enroll_post),
        )
        .route(
            "/admin/raffles/:id",
            get(handlers::raffles::get_raffle).delete(handlers::raffles::delete_raffle),
        )
        .route(
            "/admin/raffles/:id/participants",
            get(handlers::raffles::list_participants),
        )
        .route("/admin/raffles/:id/draw", post(handlers::raffles::draw_winner))
        .route("/admin/raffles/:id/winner", post(handlers::raffles::change_winner))
        .route("/admin/raffles/:id/end", post(handlers::raffles::end_raffle))
        .route(
            "/admin/raffles/:id/announce",
            post(handlers::raffles::announce_result),
        )
        // Login and route guard
        .route("/auth/verify", post(handlers::auth::verify))
        .route("/guard", post(handlers::guard::check_route))
        // Health check and API document
        .route("/health", get(handlers::health::health_check))
        .route("/openapi.json", get(openapi_json))
        // Apply middleware to all API routes
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::access_gate,
        ))
        .layer(middleware::from_fn(middleware_hooks::request_middleware))
        .layer(middleware::from_fn(middleware_hooks::response_middleware));

    // Main router
    Router::new()
        .nest("/api/v1", api_v1)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
