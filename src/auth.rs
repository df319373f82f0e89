//! C9 Auth Broker: OIDC identity token for the model-facing endpoint, plus
//! a session cookie obtained via `POST /login`. In local mode both are
//! no-ops and callers must tolerate their absence.

use std::time::Duration;

use url::form_urlencoded;

use crate::config::{Config, Mode};

#[derive(Debug, Clone, Default)]
pub(crate) struct Credentials {
    pub(crate) oidc_token: Option<String>,
    pub(crate) session_cookie: Option<String>,
}

fn fetch_oidc_token(config: &Config) -> Option<String> {
    let audience = config.oidc_audience.as_deref()?;
    let metadata_url = "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity";
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(5))
        .build();
    let url = format!("{metadata_url}?audience={}", urlencoding::encode(audience));
    match agent.get(&url).set("Metadata-Flavor", "Google").call() {
        Ok(resp) => resp.into_string().ok(),
        Err(err) => {
            eprintln!("[auth] OIDC token fetch failed: {err}");
            None
        }
    }
}

fn login_for_session_cookie(config: &Config) -> Option<String> {
    let endpoint = config.warehouse_endpoint.as_deref()?;
    let password = config.service_password.as_deref()?;
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(10))
        .build();
    let body = form_urlencoded::Serializer::new(String::new())
        .append_pair("password", password)
        .finish();
    let url = format!("{endpoint}/login");
    match agent
        .post(&url)
        .set("content-type", "application/x-www-form-urlencoded")
        .send_string(&body)
    {
        Ok(resp) => resp
            .header("set-cookie")
            .map(|c| c.split(';').next().unwrap_or(c).to_string()),
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            eprintln!("[auth] login error {code}: {text}");
            None
        }
        Err(ureq::Error::Transport(err)) => {
            eprintln!("[auth] login transport error: {err}");
            None
        }
    }
}

/// Acquires both credentials in order: OIDC token, then session cookie. In
/// `Mode::Local` this is a no-op returning empty credentials — callers in
/// local mode must tolerate absent credentials entirely.
pub(crate) fn refresh(config: &Config) -> Credentials {
    if config.mode == Mode::Local {
        return Credentials::default();
    }
    let oidc_token = fetch_oidc_token(config);
    let session_cookie = login_for_session_cookie(config);
    if oidc_token.is_none() {
        eprintln!("[auth] refresh completed without an OIDC token");
    }
    if session_cookie.is_none() {
        eprintln!("[auth] refresh completed without a session cookie");
    }
    Credentials { oidc_token, session_cookie }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    fn local_config() -> Config {
        Config {
            mode: Mode::Local,
            workers: 10,
            batch_deadline_secs: 120,
            cam_deadline_secs: 30,
            batch_size_cap: 500,
            model_name: "tyre-rec-model".to_string(),
            model_endpoint: None,
            warehouse_endpoint: None,
            cache_dir: "./cache".to_string(),
            local_csv_path: None,
            service_password: None,
            oidc_audience: None,
            price_in_per_token: 0.0,
            price_out_per_token: 0.0,
            bind_addr: "0.0.0.0:8080".to_string(),
            manifest_path: "./manifest.json".to_string(),
            benchmark_mode: false,
        }
    }

    #[test]
    fn local_mode_refresh_is_a_no_op() {
        let creds = refresh(&local_config());
        assert!(creds.oidc_token.is_none());
        assert!(creds.session_cookie.is_none());
    }
}
