// src/web.rs
//! One-shot OAuth callback listener.
//!
//! The only network surface this crate ever opens: a single route on
//! the loopback interface that receives the authorization code, trades
//! it for a token set and shuts the server down. A failed exchange
//! keeps the listener alive so the user can retry from the browser.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::response::status;
use rocket::{get, routes, Shutdown, State};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::core::database::{Profile, ProfileRepository};
use crate::core::error::ClientError;
use crate::core::token::TokenManager;

const SUCCESS_PAGE: &str =
    "<h1>Success!</h1><p>You can close this tab and return to the terminal.</p>";

struct CallbackContext {
    token: TokenManager,
    profile_name: String,
    result: Mutex<Option<Result<Profile, ClientError>>>,
}

#[get("/oauth_callback?<code>")]
async fn oauth_callback(
    code: Option<String>,
    context: &State<Arc<CallbackContext>>,
    shutdown: Shutdown,
) -> Result<RawHtml<&'static str>, status::Custom<String>> {
    let Some(code) = code else {
        return Err(status::Custom(
            Status::BadRequest,
            "Missing authorization code in callback.".to_string(),
        ));
    };

    let exchanged = context.token.exchange_code(&code).await;
    let persisted = match exchanged {
        Ok((credentials, user)) => {
            context
                .token
                .persist(&context.profile_name, &user, &credentials)
                .await
        }
        Err(e) => Err(e),
    };

    match persisted {
        Ok(profile) => {
            *context.result.lock().expect("callback result poisoned") = Some(Ok(profile));
            shutdown.notify();
            Ok(RawHtml(SUCCESS_PAGE))
        }
        Err(e) => {
            error!("Authorization callback failed: {}", e);
            Err(status::Custom(
                Status::InternalServerError,
                format!("Token exchange failed: {e}"),
            ))
        }
    }
}

/// Drive the interactive browser authorization: print the authorize
/// URL, wait for the one-shot callback, persist the profile and return
/// it. Blocks until the exchange succeeds or the listener is aborted.
pub async fn run_authorization_flow(
    config: &AppConfig,
    profiles: ProfileRepository,
    profile_name: &str,
) -> Result<Profile> {
    config.require_oauth_credentials()?;

    let http = reqwest::Client::builder()
        .user_agent(&config.api.user_agent)
        .build()
        .context("Failed to create HTTP client")?;
    let token = TokenManager::new(
        http,
        config.oauth.clone(),
        config.api.base_url.clone(),
        profiles,
    );

    let context = Arc::new(CallbackContext {
        token,
        profile_name: profile_name.to_string(),
        result: Mutex::new(None),
    });

    println!(
        "Open this URL in your browser to authorize:\n\n  {}\n",
        context.token.authorize_url()
    );
    info!(
        "Waiting for the OAuth callback on port {}",
        config.oauth.redirect_port
    );

    let figment = rocket::Config::figment()
        .merge(("address", "127.0.0.1"))
        .merge(("port", config.oauth.redirect_port))
        .merge(("log_level", "off"));

    rocket::custom(figment)
        .manage(context.clone())
        .mount("/", routes![oauth_callback])
        .launch()
        .await
        .context("Callback listener failed")?;

    let result = context
        .result
        .lock()
        .expect("callback result poisoned")
        .take()
        .context("Authorization was interrupted before completion")?;
    let profile = result.context("Authorization failed")?;

    info!("Authorization complete for profile {}", profile.profile_name);
    Ok(profile)
}
