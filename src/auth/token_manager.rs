use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::token_store::{self, Secret};
use crate::auth::{oauth, tokens_file};
use crate::config::Config;

/// Decides how to obtain a valid access token: cached file, refresh token
/// from the keyring, or the interactive PKCE flow as a last resort.
#[derive(Clone)]
pub struct TokenManager {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub user_email: String,
}

impl TokenManager {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client_id = cfg.client_id.clone();
        let user_email = cfg
            .user_email
            .clone()
            .ok_or_else(|| anyhow!("user_email not set in config"))?;
        let redirect_uri = cfg
            .redirect_uri
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8080/callback".to_string());

        let client_secret = token_store::load(Secret::ClientSecret {
            client_id: &client_id,
        })?
        .or_else(|| std::env::var("OAUTH_CLIENT_SECRET").ok());

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            user_email,
        })
    }

    /// Returns a valid access token; refreshes or runs PKCE if needed.
    pub fn get_access_token(&self) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;

        // 1) cached & not expired
        if let Some(tf) = tokens_file::load_tokens()?
            && let (Some(at), Some(exp)) = (tf.access_token, tf.expires_at_epoch)
            && now < exp
        {
            debug!("using cached access token ({}s left)", exp - now);
            return Ok(at);
        }

        // 2) refresh if possible
        let refresh_key = Secret::RefreshToken {
            user_email: &self.user_email,
        };
        if let Some(rt) = token_store::load(refresh_key)? {
            info!("access token missing or expired; refreshing");
            let t =
                oauth::refresh_access_token(&self.client_id, self.client_secret.as_deref(), &rt)?;
            self.cache(&t, now)?;
            return Ok(t.access_token);
        }

        // 3) otherwise PKCE
        info!("no refresh token; starting interactive authorization");
        let t = oauth::perform_pkce_flow(
            &self.client_id,
            self.client_secret.as_deref(),
            &self.redirect_uri,
            oauth::MAIL_SCOPE,
        )?;
        if let Some(rt) = &t.refresh_token
            && let Err(e) = token_store::save(refresh_key, rt)
        {
            warn!("could not store refresh token in keyring: {e}");
        }
        self.cache(&t, now)?;
        Ok(t.access_token)
    }

    fn cache(&self, t: &oauth::Tokens, now: i64) -> Result<()> {
        // Providers omitting expires_in still rotate hourly; assume just under.
        let exp = t.expires_in.map(|s| now + s as i64).unwrap_or(now + 3500);
        tokens_file::save_tokens(Some(&t.access_token), Some(exp))
    }
}
