use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "mailgram";

/// A credential held in the OS keyring, keyed by what identifies it: the
/// refresh token by the mailbox it grants access to, the OAuth client secret
/// by its client id.
#[derive(Clone, Copy)]
pub enum Secret<'a> {
    RefreshToken { user_email: &'a str },
    ClientSecret { client_id: &'a str },
}

impl Secret<'_> {
    fn account(&self) -> String {
        match self {
            Secret::RefreshToken { user_email } => format!("refresh-token:{user_email}"),
            Secret::ClientSecret { client_id } => format!("client-secret:{client_id}"),
        }
    }
}

pub fn save(secret: Secret<'_>, value: &str) -> Result<()> {
    Entry::new(SERVICE, &secret.account())?
        .set_password(value)
        .map_err(|e| anyhow!(e.to_string()))
}

/// `Ok(None)` when the keyring has no entry for this secret.
pub fn load(secret: Secret<'_>) -> Result<Option<String>> {
    match Entry::new(SERVICE, &secret.account())?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_keyed_by_their_own_account() {
        let rt = Secret::RefreshToken {
            user_email: "me@example.com",
        };
        let cs = Secret::ClientSecret {
            client_id: "me@example.com",
        };
        // same identifier, distinct keyring accounts
        assert_ne!(rt.account(), cs.account());
        assert_eq!(rt.account(), "refresh-token:me@example.com");
        assert_eq!(cs.account(), "client-secret:me@example.com");
    }
}
