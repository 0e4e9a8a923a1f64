use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::json;

use dashboard_ai::api::is_usable;
use dashboard_ai::auth::oauth::{load_tokens, store_tokens};
use dashboard_ai::auth::OAuthTokens;
use dashboard_ai::config::{AuthConfig, OAuthConfig, ProviderConfig};
use dashboard_ai::store::{MemoryCache, MemorySecretStore, MemoryStateStore, SecretStore};
use dashboard_ai::{ProviderError, ProviderState};

type FormLog = Arc<Mutex<Vec<Vec<(String, String)>>>>;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

async fn spawn_token_endpoint(forms: FormLog, accept: bool) -> (String, tokio::task::JoinHandle<()>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/oauth/token",
        post(move |body: String| {
            let forms = Arc::clone(&forms);
            let seq = hits.fetch_add(1, Ordering::SeqCst);
            async move {
                let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
                    .into_owned()
                    .collect();
                forms.lock().push(pairs);
                if !accept {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "invalid_grant"})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "access_token": format!("access-{seq}"),
                        "refresh_token": format!("refresh-{seq}"),
                        "expires_in": 3600,
                        "token_type": "Bearer"
                    })),
                )
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

fn build_state(base_url: String, secrets: Arc<MemorySecretStore>) -> ProviderState {
    let mut config = ProviderConfig::new(base_url, "42", "unused");
    config.auth = AuthConfig {
        api_key_id: None,
        oauth: Some(OAuthConfig {
            client_id: "dashboard-ai-client".into(),
            client_secret_key_id: Some("client_secret".into()),
            redirect_uri: "https://site.example.com/callback".into(),
            scope: "ai".into(),
            token_key_id: "oauth_tokens".into(),
        }),
    };
    ProviderState::new(
        config,
        secrets,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryStateStore::new()),
    )
    .unwrap()
}

fn field<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
    form.iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

#[tokio::test]
async fn test_authorization_code_flow_persists_tokens() {
    let forms: FormLog = Arc::new(Mutex::new(Vec::new()));
    let (base_url, server) = spawn_token_endpoint(Arc::clone(&forms), true).await;
    let secrets = Arc::new(MemorySecretStore::new().with_value("client_secret", "s3cret"));
    let state = build_state(base_url, Arc::clone(&secrets));
    assert!(!is_usable(&state));

    let (url, expected_state) = state
        .authenticator
        .begin_authorization(&state.endpoints)
        .unwrap();
    assert_eq!(url.path(), "/oauth/authorize");

    let tokens = state
        .authenticator
        .complete_authorization(
            &state.transport,
            &state.endpoints,
            "the-code",
            &expected_state,
            &expected_state,
        )
        .await
        .unwrap();
    assert_eq!(tokens.access_token, "access-0");

    {
        let forms = forms.lock();
        assert_eq!(field(&forms[0], "grant_type"), Some("authorization_code"));
        assert_eq!(field(&forms[0], "code"), Some("the-code"));
        assert_eq!(field(&forms[0], "client_secret"), Some("s3cret"));
        assert_eq!(
            field(&forms[0], "redirect_uri"),
            Some("https://site.example.com/callback")
        );
    }

    assert_eq!(load_tokens(secrets.as_ref(), "oauth_tokens"), Some(tokens));
    assert!(is_usable(&state));
    assert_eq!(state.bearer_token().await.unwrap(), "access-0");
    assert_eq!(forms.lock().len(), 1);

    server.abort();
}

#[tokio::test]
async fn test_expiring_token_refreshed_once_under_contention() {
    let forms: FormLog = Arc::new(Mutex::new(Vec::new()));
    let (base_url, server) = spawn_token_endpoint(Arc::clone(&forms), true).await;
    let secrets = Arc::new(MemorySecretStore::new());
    store_tokens(
        secrets.as_ref(),
        "oauth_tokens",
        &OAuthTokens {
            access_token: "stale".into(),
            refresh_token: Some("refresh-old".into()),
            expires_at: now_secs() + 10,
            token_type: "Bearer".into(),
        },
    )
    .unwrap();
    let state = build_state(base_url, Arc::clone(&secrets));

    let (a, b) = tokio::join!(state.bearer_token(), state.bearer_token());
    assert_eq!(a.unwrap(), "access-0");
    assert_eq!(b.unwrap(), "access-0");

    let forms = forms.lock();
    assert_eq!(forms.len(), 1);
    assert_eq!(field(&forms[0], "grant_type"), Some("refresh_token"));
    assert_eq!(field(&forms[0], "refresh_token"), Some("refresh-old"));
    drop(forms);

    let stored = load_tokens(secrets.as_ref(), "oauth_tokens").unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-0"));
    assert!(stored.expires_at > now_secs() + 3000);

    server.abort();
}

#[tokio::test]
async fn test_rejected_grant_is_auth_error() {
    let forms: FormLog = Arc::new(Mutex::new(Vec::new()));
    let (base_url, server) = spawn_token_endpoint(Arc::clone(&forms), false).await;
    let secrets = Arc::new(MemorySecretStore::new());
    secrets
        .set_value(
            "oauth_tokens",
            &serde_json::to_string(&OAuthTokens {
                access_token: "old".into(),
                refresh_token: Some("r".into()),
                expires_at: 0,
                token_type: "Bearer".into(),
            })
            .unwrap(),
        )
        .unwrap();
    let state = build_state(base_url, secrets);

    let err = state.bearer_token().await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth(_)), "{err:?}");

    server.abort();
}
