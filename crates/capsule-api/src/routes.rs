use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{MethodRouter, delete, get, post, put},
};

use crate::files::UPLOAD_BODY_LIMIT;
use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, capsules, content, files};

/// Every HTTP route. Everything except registration, login and object
/// downloads requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/objects/{*object_name}", get(files::fetch_object));

    let mut user_route: MethodRouter<AppState> =
        get(auth::current_user).put(auth::update_user);
    if state.config.dev_mode {
        user_route = user_route.delete(auth::delete_user);
    }

    let protected_routes = Router::new()
        .route("/auth/user", user_route)
        .route("/auth/user/password", put(auth::update_password))
        // Capsules
        .route("/capsules", get(capsules::list_capsules).post(capsules::create_capsule))
        .route("/capsules/join", post(capsules::join_capsule))
        .route(
            "/capsules/{capsule_id}",
            get(capsules::get_capsule).delete(capsules::delete_capsule),
        )
        .route("/capsules/{capsule_id}/name", put(capsules::name_capsule))
        .route("/capsules/{capsule_id}/seal", post(capsules::seal_capsule))
        .route("/capsules/{capsule_id}/open", post(capsules::open_capsule))
        // Content
        .route(
            "/capsules/{capsule_id}/songs",
            get(content::list_songs).post(content::create_song),
        )
        .route("/capsules/{capsule_id}/songs/{song_id}", delete(content::delete_song))
        .route(
            "/capsules/{capsule_id}/question-answers",
            get(content::list_question_answers).post(content::create_question_answer),
        )
        .route(
            "/capsules/{capsule_id}/question-answers/{question_answer_id}",
            put(content::update_question_answer).delete(content::delete_question_answer),
        )
        .route(
            "/capsules/{capsule_id}/writings",
            get(content::list_writings).post(content::create_writing),
        )
        .route(
            "/capsules/{capsule_id}/writings/{writing_id}",
            put(content::update_writing).delete(content::delete_writing),
        )
        .route(
            "/capsules/{capsule_id}/files/{kind}",
            get(content::list_files).post(content::create_file),
        )
        .route(
            "/capsules/{capsule_id}/files/{kind}/{item_id}",
            delete(content::delete_file),
        )
        // Uploads
        .route(
            "/files/upload",
            post(files::upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/files/delete", post(files::delete_file))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
