use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use mongodb::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use opensplit::api::{self, ApiState};
use opensplit::auth::{AuthSession, TokenIdentityProvider};
use opensplit::config::Config;
use opensplit::gateway::RemoteCollectionGateway;
use opensplit::store::{MongoStore, RemoteStore};

fn cors(allowed_origin: Option<&str>) -> Cors {
    match allowed_origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allow_any_method()
            .allow_any_header(),
        None => Cors::permissive(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(database = %config.database, "using mongodb");

    let client = Client::with_uri_str(&config.mongodb_uri)
        .await
        .context("failed to connect to mongodb")?;
    info!("connected");

    let store: Arc<dyn RemoteStore> = Arc::new(MongoStore::new(client.database(&config.database)));
    let gateway = Arc::new(RemoteCollectionGateway::new(store));
    let provider = Arc::new(TokenIdentityProvider::new(
        &config.session_secret,
        config.session_token.clone(),
    ));
    let auth = Arc::new(AuthSession::new(provider.clone()));
    let state = web::Data::new(ApiState::new(gateway, auth.clone(), provider));

    let (subscription, changes) = auth.subscribe()?;
    let follower = actix_web::rt::spawn(api::follow_identity(state.clone(), changes));
    auth.bootstrap().await;

    info!(bind = %config.bind, "starting server");
    let allowed_origin = config.allowed_origin.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors(allowed_origin.as_deref()))
            .app_data(state.clone())
            .configure(api::configure)
    })
    .bind(config.bind)?
    .run()
    .await?;

    subscription.unsubscribe();
    let _ = follower.await;
    info!("stopped");
    Ok(())
}
