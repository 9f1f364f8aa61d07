use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, FromRef, Path, State},
    routing::get,
    Json, Router,
};
use clap::Parser;
use gatekeep_axum::{method_not_allowed, not_found, permission_guards, ApiError};
use gatekeep_oauth2::{Authority, AuthorityConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

permission_guards! {
    permission GetActors = "get:actors";
    permission PostActors = "post:actors";
    permission PatchActors = "patch:actors";
    permission DeleteActors = "delete:actors";
    permission GetMovies = "get:movies";
    permission PostMovies = "post:movies";
    permission PatchMovies = "patch:movies";
    permission DeleteMovies = "delete:movies";
}

#[derive(Debug, Parser)]
#[command(about = "A casting agency API guarded by per-endpoint permissions")]
struct Opts {
    /// The identity provider's domain, such as `example.us.auth0.com`
    #[arg(long, env = "AUTH0_DOMAIN")]
    domain: String,

    /// The audience access tokens must be issued for
    #[arg(long, env = "API_AUDIENCE")]
    audience: String,

    /// The address to listen on
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Seconds between background refreshes of the signing keys
    #[arg(long, env = "JWKS_REFRESH_SECS", default_value_t = 600)]
    jwks_refresh: u64,

    /// Seconds of grace allowed past a token's expiration
    #[arg(long, env = "TOKEN_LEEWAY_SECS", default_value_t = 0)]
    leeway: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,gatekeep_oauth2=debug")),
        )
        .init();

    let opts = Opts::parse();

    let config = AuthorityConfig::new(opts.domain, opts.audience)
        .with_leeway(Duration::from_secs(opts.leeway));
    let authority = Authority::from_config(&config)?;

    if let Err(error) = authority.cache().refresh().await {
        let error: &dyn std::error::Error = &error;
        tracing::warn!(error, "initial key set fetch failed; keys will be fetched on demand");
    }
    let refresher = authority
        .cache()
        .spawn_refresh(Duration::from_secs(opts.jwks_refresh));

    let state = AppState {
        authority,
        store: Arc::default(),
    };

    let listener = tokio::net::TcpListener::bind(opts.listen).await?;
    tracing::info!(addr = %opts.listen, issuer = %config.issuer(), "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    refresher.abort();
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health).fallback(method_not_allowed))
        .route(
            "/actors",
            get(list_actors)
                .post(create_actor)
                .fallback(method_not_allowed),
        )
        .route(
            "/actors/:id",
            get(get_actor)
                .patch(update_actor)
                .delete(delete_actor)
                .fallback(method_not_allowed),
        )
        .route(
            "/movies",
            get(list_movies)
                .post(create_movie)
                .fallback(method_not_allowed),
        )
        .route(
            "/movies/:id",
            get(get_movie)
                .patch(update_movie)
                .delete(delete_movie)
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
        .with_state(state)
}

#[derive(Clone)]
struct AppState {
    authority: Authority,
    store: Arc<RwLock<Store>>,
}

impl FromRef<AppState> for Authority {
    fn from_ref(state: &AppState) -> Self {
        state.authority.clone()
    }
}

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    actors: BTreeMap<u64, Actor>,
    movies: BTreeMap<u64, Movie>,
}

impl Store {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Actor {
    name: String,
    age: u32,
    gender: String,
}

#[derive(Debug, Deserialize)]
struct ActorPatch {
    name: Option<String>,
    age: Option<u32>,
    gender: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Movie {
    title: String,
    release_date: String,
}

#[derive(Debug, Deserialize)]
struct MoviePatch {
    title: Option<String>,
    release_date: Option<String>,
}

type ApiResult = Result<Json<Value>, ApiError>;

fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(%rejection, "request body rejected");
        ApiError::Unprocessable
    })
}

async fn health() -> Json<Value> {
    Json(json!({ "success": true, "status": "ok" }))
}

async fn list_actors(_: GetActors, State(state): State<AppState>) -> ApiResult {
    let store = state.store.read().await;
    let actors: Vec<_> = store
        .actors
        .iter()
        .map(|(id, actor)| json!({ "id": id, "actor": actor }))
        .collect();
    Ok(Json(json!({ "success": true, "actors": actors })))
}

async fn get_actor(_: GetActors, State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult {
    let store = state.store.read().await;
    let actor = store.actors.get(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "success": true, "id": id, "actor": actor })))
}

async fn create_actor(
    PostActors(claims): PostActors,
    State(state): State<AppState>,
    actor: Result<Json<Actor>, JsonRejection>,
) -> ApiResult {
    let actor = body(actor)?;
    let mut store = state.store.write().await;
    let id = store.next_id();
    tracing::info!(id, subject = ?claims.subject(), "actor created");
    store.actors.insert(id, actor.clone());
    Ok(Json(json!({ "success": true, "created": id, "actor": actor })))
}

async fn update_actor(
    _: PatchActors,
    State(state): State<AppState>,
    Path(id): Path<u64>,
    patch: Result<Json<ActorPatch>, JsonRejection>,
) -> ApiResult {
    let patch = body(patch)?;
    let mut store = state.store.write().await;
    let actor = store.actors.get_mut(&id).ok_or(ApiError::NotFound)?;
    if let Some(name) = patch.name {
        actor.name = name;
    }
    if let Some(age) = patch.age {
        actor.age = age;
    }
    if let Some(gender) = patch.gender {
        actor.gender = gender;
    }
    Ok(Json(json!({ "success": true, "id": id, "actor": actor })))
}

async fn delete_actor(
    DeleteActors(claims): DeleteActors,
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult {
    let mut store = state.store.write().await;
    store.actors.remove(&id).ok_or(ApiError::NotFound)?;
    tracing::info!(id, subject = ?claims.subject(), "actor deleted");
    Ok(Json(json!({ "success": true, "delete": id })))
}

async fn list_movies(_: GetMovies, State(state): State<AppState>) -> ApiResult {
    let store = state.store.read().await;
    let movies: Vec<_> = store
        .movies
        .iter()
        .map(|(id, movie)| json!({ "id": id, "movie": movie }))
        .collect();
    Ok(Json(json!({ "success": true, "movies": movies })))
}

async fn get_movie(_: GetMovies, State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult {
    let store = state.store.read().await;
    let movie = store.movies.get(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "success": true, "id": id, "movie": movie })))
}

async fn create_movie(
    PostMovies(claims): PostMovies,
    State(state): State<AppState>,
    movie: Result<Json<Movie>, JsonRejection>,
) -> ApiResult {
    let movie = body(movie)?;
    let mut store = state.store.write().await;
    let id = store.next_id();
    tracing::info!(id, subject = ?claims.subject(), "movie created");
    store.movies.insert(id, movie.clone());
    Ok(Json(json!({ "success": true, "created": id, "movie": movie })))
}

async fn update_movie(
    _: PatchMovies,
    State(state): State<AppState>,
    Path(id): Path<u64>,
    patch: Result<Json<MoviePatch>, JsonRejection>,
) -> ApiResult {
    let patch = body(patch)?;
    let mut store = state.store.write().await;
    let movie = store.movies.get_mut(&id).ok_or(ApiError::NotFound)?;
    if let Some(title) = patch.title {
        movie.title = title;
    }
    if let Some(release_date) = patch.release_date {
        movie.release_date = release_date;
    }
    Ok(Json(json!({ "success": true, "id": id, "movie": movie })))
}

async fn delete_movie(
    DeleteMovies(claims): DeleteMovies,
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult {
    let mut store = state.store.write().await;
    store.movies.remove(&id).ok_or(ApiError::NotFound)?;
    tracing::info!(id, subject = ?claims.subject(), "movie deleted");
    Ok(Json(json!({ "success": true, "delete": id })))
}
