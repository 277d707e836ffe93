use axum::{
    routing::{delete, get},
    Router,
};

use super::handlers::{
    authorize, callback, create_calendar_event, disconnect, get_message, list_calendar_events,
    list_connections, list_messages, send_email, IntegrationsState,
};

/// Connection management and provider API routes (any authenticated user)
pub fn routes(state: IntegrationsState) -> Router {
    Router::new()
        .route("/api/integrations", get(list_connections))
        .route(
            "/api/integrations/google_calendar/events",
            get(list_calendar_events).post(create_calendar_event),
        )
        .route("/api/integrations/{provider}", delete(disconnect))
        .route("/api/integrations/{provider}/authorize", get(authorize))
        .route("/api/integrations/{provider}/callback", get(callback))
        .route(
            "/api/integrations/{provider}/messages",
            get(list_messages).post(send_email),
        )
        .route(
            "/api/integrations/{provider}/messages/{message_id}",
            get(get_message),
        )
        .with_state(state)
}
