use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use popcorn_client::{
    client::{HttpMovieApi, MovieApi, ResourceClient},
    config::Config,
    session::{resolve_session, MemoryTokenStore, Session},
    store::LoadOutcome,
    views::{AppContext, MovieBrowser, RecommendationsView},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = match &config.token {
        Some(token) => MemoryTokenStore::with_token(token.clone()),
        None => MemoryTokenStore::new(),
    };
    let session = Session::new(Arc::new(store));
    let client = ResourceClient::from_config(&config, session.clone())?;
    let api: Arc<dyn MovieApi> = Arc::new(HttpMovieApi::new(client));

    tracing::info!(api_url = %config.api_url, "Resolving session");
    let state = resolve_session(&session, api.as_ref()).await;
    match state.user.as_ref() {
        Some(user) => println!("Signed in as {}", user.username),
        None => println!("Browsing anonymously"),
    }

    let ctx = AppContext::new(api, session, config);
    let home = RecommendationsView::new(&ctx);
    let browser = MovieBrowser::new(&ctx);

    let (personal, movies) = tokio::join!(home.mount(), browser.mount());

    match personal {
        LoadOutcome::Committed => {
            if let Some(set) = home.personal().data {
                println!(
                    "Recommended for you ({}): {} movies",
                    set.algorithm,
                    set.items.len()
                );
                if let Some(notice) = set.notice {
                    println!("  {}", notice);
                }
                for item in set.items.iter().take(5) {
                    println!("  - {}", item.movie.title);
                }
            }
        }
        LoadOutcome::AwaitingAuth => println!("Sign in for personal recommendations"),
        other => println!("Recommendations unavailable: {:?}", other),
    }

    for (label, row) in [("Popular", home.popular()), ("New releases", home.new_releases())] {
        match row.data {
            Some(movies) => println!("{}: {} movies", label, movies.len()),
            None => println!(
                "{}: {}",
                label,
                row.error
                    .map(|e| e.user_message())
                    .unwrap_or_else(|| "not loaded".to_string())
            ),
        }
    }

    let snapshot = browser.movies();
    match movies {
        LoadOutcome::Failed(e) => println!("Movies unavailable: {}", e.user_message()),
        _ => {
            println!(
                "Movies page 1: {} titles{}",
                snapshot.page.items.len(),
                if snapshot.page.has_more { " (more available)" } else { "" }
            );
            for movie in snapshot.page.items.iter().take(5) {
                let year = movie.year.map(|y| format!(" ({})", y)).unwrap_or_default();
                println!("  - {}{} {:.1}", movie.title, year, movie.avg_rating);
            }
        }
    }
    if let Some(genres) = browser.genres().data {
        println!("Genres: {}", genres.join(", "));
    }

    home.unmount();
    browser.unmount();
    Ok(())
}
