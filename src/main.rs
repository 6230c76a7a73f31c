use std::{net::SocketAddr, path::Path, time::Duration};

use clap::Parser;
use destinations::{db::Db, media::MediaStore, outbox, remote::ApiClient, render};
use shadow_rs::shadow;
use tracing_subscriber::EnvFilter;
use url::Url;

shadow!(build);

#[derive(Parser, Debug)]
#[command(version = build::VERSION, long_version = build::CLAP_LONG_VERSION, about = "Tourist destination catalogue", long_about = "")]
struct Args {
    #[arg(long, env = "HOST", default_value = "127.0.0.1:8000")]
    host: SocketAddr,
    #[arg(long, env = "SQLITE_PATH", default_value = ".")]
    sqlite_path: String,
    #[arg(long, env = "TEMPLATES_DIR", default_value = "templates")]
    templates_dir: String,
    #[arg(long, env = "ASSETS_DIR", default_value = "assets")]
    assets_dir: String,
    #[arg(long, env = "MEDIA_DIR", default_value = "media")]
    media_dir: String,
    /// REST API the HTML pages read from and replicate writes to. The default
    /// is this server itself, so every HTML create stores a second copy through
    /// the API; point it at another instance to mirror instead.
    #[arg(long, env = "API_BASE_URL", default_value = "http://127.0.0.1:8000/")]
    api_base_url: Url,
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 5)]
    api_timeout_secs: u64,
    #[arg(long, env = "REPLICATE_INTERVAL_SECS", default_value_t = 30)]
    replicate_interval_secs: u64,
    #[arg(long, env = "REPLICATE_MAX_ATTEMPTS", default_value_t = 10)]
    replicate_max_attempts: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // construct a subscriber that prints formatted traces to stdout
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber)?;

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }

    let args = Args::parse();
    tracing::info!("{:?}", &args);

    // database config
    let db_path = Path::new(&args.sqlite_path).join("destinations.db");
    let connection = rusqlite::Connection::open(&db_path)?; // we want this to fail loudly
    let db = Db::new(connection)?;

    // templating config
    let handlebars = render::load_templates(&args.templates_dir)?;

    // the API client is bounded so a slow API never hangs a page
    let api = ApiClient::new(args.api_base_url.clone(), Duration::from_secs(args.api_timeout_secs))?;
    let media = MediaStore::new(&args.media_dir);

    let replicator = outbox::spawn_replicator(
        db.clone(),
        api.clone(),
        Duration::from_secs(args.replicate_interval_secs),
        args.replicate_max_attempts,
    );

    let renderer = render::Renderer::new(db.clone(), handlebars, api, media);
    let routes = destinations::routes::get_routes(db, renderer, args.assets_dir, args.media_dir);

    tracing::info!("starting warp server: {}", &args.host);
    tracing::info!("sqlitedb: {}", db_path.display());
    tracing::info!("api: {}", &args.api_base_url);
    warp::serve(routes)
        .bind(args.host)
        .await
        .graceful(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to install CTRL+C signal handler: {e}");
            }
        })
        .run()
        .await;

    replicator.abort();
    tracing::info!("gracefully exited.");

    Ok(())
}
