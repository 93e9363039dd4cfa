//! Per-IP rate limiting on the credential endpoints.

mod common;

use boardroom::Config;
use common::TestApp;
use reqwest::StatusCode;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn login_is_throttled_once_the_auth_quota_is_spent() {
    let mut config = Config::default_for_testing();
    config.security.rate_limiting_enabled = true;
    config.security.auth_rate_limit_requests_per_minute = 3;
    let app = TestApp::spawn_with(config).await;

    let mut throttled = false;
    for i in 0..10 {
        let response = app
            .login(&format!("nobody{}@example.com", i), "wrongpassword")
            .await;
        match response.status() {
            StatusCode::UNAUTHORIZED => {}
            StatusCode::TOO_MANY_REQUESTS => {
                throttled = true;
                break;
            }
            other => panic!("unexpected status {}", other),
        }
    }
    assert!(throttled, "auth quota was never enforced");
}

#[tokio::test]
#[serial]
async fn disabled_rate_limiting_never_throttles() {
    let app = TestApp::spawn().await;

    for _ in 0..30 {
        let response = app.get_public("/health").await;
        assert!(response.status().is_success());
    }
}
