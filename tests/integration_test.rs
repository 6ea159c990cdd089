// Integration tests for the PokitDok platform client
//
// These tests run the full request pipeline (token acquisition, request
// encoding, status classification) against a mockito server.

use chrono::Utc;
use mockito::{Matcher, Mock, ServerGuard};
use reqwest::Method;
use serde_json::{json, Value};

use pokitdok::{
    ApiClient, Body, ClientConfig, ClientError, Credentials, Multipart, Params, PlatformClient,
    RequestSpec,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

/// Base64 of `test-client:test-secret`
const BASIC_AUTH: &str = "Basic dGVzdC1jbGllbnQ6dGVzdC1zZWNyZXQ=";

fn credentials() -> Credentials {
    Credentials::new("test-client", "test-secret")
}

fn config_for(server: &ServerGuard) -> ClientConfig {
    ClientConfig::for_site(&server.url(), "/api/v4")
}

fn token_body(access_token: &str, expires_in: i64) -> String {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires": Utc::now().timestamp() + expires_in,
        "expires_in": expires_in
    })
    .to_string()
}

/// Token endpoint mock expecting exactly `hits` client-credentials requests
async fn mock_token(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", "/oauth2/token")
        .match_header("authorization", BASIC_AUTH)
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body("grant_type=client_credentials")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("test-access-token", 3600))
        .expect(hits)
        .create_async()
        .await
}

fn platform_body(data: Value) -> String {
    json!({
        "meta": {"credits_billed": 1, "credits_remaining": 99},
        "data": data
    })
    .to_string()
}

async fn api_client(server: &ServerGuard) -> ApiClient {
    ApiClient::new(credentials(), config_for(server), None).expect("Failed to create client")
}

async fn platform_client(server: &ServerGuard) -> PlatformClient {
    PlatformClient::with_config(credentials(), config_for(server), None)
        .expect("Failed to create platform client")
}

// ==================================================================================================
// Token Lifecycle Tests
// ==================================================================================================

#[tokio::test]
async fn test_init_acquires_token() {
    let mut server = mockito::Server::new_async().await;
    let token = mock_token(&mut server, 1).await;

    let client = api_client(&server).await;
    client.init().await.unwrap();

    token.assert_async().await;
    assert_eq!(client.access_token().await, "test-access-token");
}

#[tokio::test]
async fn test_token_reused_within_validity_window() {
    let mut server = mockito::Server::new_async().await;
    let token = mock_token(&mut server, 1).await;
    let payers = server
        .mock("GET", "/api/v4/payers/")
        .match_header("authorization", "Bearer test-access-token")
        .with_status(200)
        .with_body(platform_body(json!([])))
        .expect(2)
        .create_async()
        .await;

    let client = api_client(&server).await;
    client
        .execute(RequestSpec::new(Method::GET, "/payers/"))
        .await
        .unwrap();
    client
        .execute(RequestSpec::new(Method::GET, "/payers/"))
        .await
        .unwrap();

    token.assert_async().await;
    payers.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_calls_share_one_token_request() {
    let mut server = mockito::Server::new_async().await;
    let token = mock_token(&mut server, 1).await;
    let payers = server
        .mock("GET", "/api/v4/payers/")
        .with_status(200)
        .with_body(platform_body(json!([])))
        .expect(3)
        .create_async()
        .await;

    let client = api_client(&server).await;
    let (a, b, c) = tokio::join!(
        client.execute(RequestSpec::new(Method::GET, "/payers/")),
        client.execute(RequestSpec::new(Method::GET, "/payers/")),
        client.execute(RequestSpec::new(Method::GET, "/payers/")),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    token.assert_async().await;
    payers.assert_async().await;
}

#[tokio::test]
async fn test_fresh_saved_token_skips_token_request() {
    let mut server = mockito::Server::new_async().await;
    let token = mock_token(&mut server, 0).await;
    let plans = server
        .mock("GET", "/api/v4/plans/")
        .match_header("authorization", "Bearer saved-token")
        .with_status(200)
        .with_body(platform_body(json!([])))
        .create_async()
        .await;

    let saved = token_body("saved-token", 3600);
    let client = ApiClient::new(credentials(), config_for(&server), Some(&saved)).unwrap();
    client
        .execute(RequestSpec::new(Method::GET, "/plans/"))
        .await
        .unwrap();

    token.assert_async().await;
    plans.assert_async().await;
}

#[tokio::test]
async fn test_saved_token_inside_margin_is_refreshed() {
    let mut server = mockito::Server::new_async().await;
    let token = mock_token(&mut server, 1).await;
    let plans = server
        .mock("GET", "/api/v4/plans/")
        .match_header("authorization", "Bearer test-access-token")
        .with_status(200)
        .with_body(platform_body(json!([])))
        .create_async()
        .await;

    // Expires in 30 seconds; the 90 second request timeout is the margin
    let saved = token_body("saved-token", 30);
    let client = ApiClient::new(credentials(), config_for(&server), Some(&saved)).unwrap();
    client
        .execute(RequestSpec::new(Method::GET, "/plans/"))
        .await
        .unwrap();

    token.assert_async().await;
    plans.assert_async().await;
}

#[tokio::test]
async fn test_token_error_payload_is_auth_error() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/oauth2/token")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_client"}"#)
        .create_async()
        .await;
    let payers = server
        .mock("GET", "/api/v4/payers/")
        .expect(0)
        .create_async()
        .await;

    let client = api_client(&server).await;
    let err = client
        .execute(RequestSpec::new(Method::GET, "/payers/"))
        .await
        .unwrap_err();

    match err {
        ClientError::Auth(message) => assert_eq!(message, "invalid_client"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(client.token_manager().token().await.is_none());

    token.assert_async().await;
    payers.assert_async().await;
}

// ==================================================================================================
// Request Encoding Tests
// ==================================================================================================

#[tokio::test]
async fn test_get_mapping_becomes_query_string() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let providers = server
        .mock("GET", "/api/v4/providers/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state".into(), "CA".into()),
            Matcher::UrlEncoded("specialty".into(), "RHEUMATOLOGY".into()),
        ]))
        .match_header("authorization", "Bearer test-access-token")
        .match_header("content-type", "application/json")
        .with_status(200)
        .with_body(platform_body(json!([{"provider": {"npi": "1467560003"}}])))
        .create_async()
        .await;

    let client = platform_client(&server).await;
    let response = client
        .providers(json!({"state": "CA", "specialty": "RHEUMATOLOGY"}))
        .await
        .unwrap();

    providers.assert_async().await;
    let body = response.body().into_value();
    assert_eq!(body["data"][0]["provider"]["npi"], "1467560003");
}

#[tokio::test]
async fn test_get_string_is_appended_verbatim() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let provider = server
        .mock("GET", "/api/v4/providers/1467560003")
        .with_status(200)
        .with_body(platform_body(json!({"npi": "1467560003"})))
        .create_async()
        .await;

    let client = platform_client(&server).await;
    client.providers("1467560003").await.unwrap();

    provider.assert_async().await;
}

#[tokio::test]
async fn test_no_content_type_when_empty() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let activities = server
        .mock("GET", "/api/v4/activities/")
        .match_header("content-type", Matcher::Missing)
        .match_header("authorization", "Bearer test-access-token")
        .with_status(200)
        .with_body(platform_body(json!([])))
        .create_async()
        .await;

    let client = api_client(&server).await;
    client
        .request(Method::GET, "/activities/", Params::None, "")
        .await
        .unwrap();

    activities.assert_async().await;
}

#[tokio::test]
async fn test_post_json_body() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let request = json!({
        "member": {"id": "W000000000", "birth_date": "1970-01-01", "last_name": "Doe"},
        "provider": {"npi": "1467560003", "last_name": "AYA-AY", "first_name": "JEROME"},
        "service_types": ["health_benefit_plan_coverage"],
        "trading_partner_id": "MOCKPAYER"
    });
    let eligibility = server
        .mock("POST", "/api/v4/eligibility/")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(request.clone()))
        .with_status(200)
        .with_body(platform_body(json!({"coverage": {"active": true}})))
        .create_async()
        .await;

    let client = platform_client(&server).await;
    let response = client.eligibility(request).await.unwrap();

    eligibility.assert_async().await;
    assert_eq!(response.body().into_value()["data"]["coverage"]["active"], true);
    assert_eq!(
        client.cached_usage().await,
        Some(json!({"credits_billed": 1, "credits_remaining": 99}))
    );
}

#[tokio::test]
async fn test_file_upload_is_multipart() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let files = server
        .mock("POST", "/api/v4/files/")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="trading_partner_id""#.to_string()),
            Matcher::Regex("MOCKPAYER".to_string()),
            Matcher::Regex(r#"filename="general-physician-office-visit.270""#.to_string()),
            Matcher::Regex(r"ISA\*00\*".to_string()),
        ]))
        .with_status(200)
        .with_body(platform_body(json!({"status": "PENDING"})))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("general-physician-office-visit.270");
    std::fs::write(&path, "ISA*00*          *00*          *ZZ*MOCKPAYER~").unwrap();

    let client = platform_client(&server).await;
    client.files(&path, "MOCKPAYER").await.unwrap();

    files.assert_async().await;
}

#[tokio::test]
async fn test_deductible_uploads_enrollment_file() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let deductible = server
        .mock("POST", "/api/v4/deductible/")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="enrollment""#.to_string()),
            Matcher::Regex(r#"filename="deductible.270""#.to_string()),
            Matcher::Regex("(?i)content-type: text/plain".to_string()),
            Matcher::Regex(r"ISA\*00\*".to_string()),
        ]))
        .with_status(200)
        .with_body(platform_body(json!({"deductible": {"remaining": 500}})))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deductible.270");
    std::fs::write(&path, "ISA*00*          *00*          *ZZ*MOCKPAYER~").unwrap();

    let client = platform_client(&server).await;
    let response = client.deductible(&path).await.unwrap();

    deductible.assert_async().await;
    assert_eq!(
        response.body().into_value()["data"]["deductible"]["remaining"],
        500
    );
}

#[tokio::test]
async fn test_multipart_fields_without_attachments() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let upload = server
        .mock("POST", "/api/v4/files/")
        .match_body(Matcher::Regex(r#"name="note""#.to_string()))
        .with_status(200)
        .with_body(platform_body(json!({})))
        .create_async()
        .await;

    let client = api_client(&server).await;
    client
        .execute(
            RequestSpec::new(Method::POST, "/files/")
                .params(Multipart::new().field("note", "hello")),
        )
        .await
        .unwrap();

    upload.assert_async().await;
}

#[tokio::test]
async fn test_delete_appointment() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let cancel = server
        .mock("DELETE", "/api/v4/schedule/appointments/ef987695-0a19-447f-814d-f8f3abbf4860")
        .with_status(200)
        .with_body(platform_body(json!({})))
        .create_async()
        .await;

    let client = platform_client(&server).await;
    client
        .cancel_appointment("ef987695-0a19-447f-814d-f8f3abbf4860")
        .await
        .unwrap();

    cancel.assert_async().await;
}

// ==================================================================================================
// Response Classification Tests
// ==================================================================================================

#[tokio::test]
async fn test_404_is_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let _missing = server
        .mock("GET", "/api/v4/tradingpartners/NOPE")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"errors":{"query":"Unknown trading partner"}}}"#)
        .create_async()
        .await;

    let client = platform_client(&server).await;
    let err = client.trading_partners(Some("NOPE")).await.unwrap_err();

    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body["data"]["errors"]["query"], "Unknown trading partner");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_with_text_body() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let _bad_gateway = server
        .mock("GET", "/api/v4/payers/")
        .with_status(502)
        .with_body("Bad Gateway")
        .create_async()
        .await;

    let client = api_client(&server).await;
    let err = client
        .execute(RequestSpec::new(Method::GET, "/payers/"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(502));
    match err {
        ClientError::Api { body, .. } => assert_eq!(body, json!("Bad Gateway")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_errors_field_on_200_is_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let _claims = server
        .mock("POST", "/api/v4/claims/status")
        .with_status(200)
        .with_body(r#"{"errors": ["bad"], "meta": {}}"#)
        .create_async()
        .await;

    let client = platform_client(&server).await;
    let err = client
        .claims_status(json!({"trading_partner_id": "MOCKPAYER"}))
        .await
        .unwrap_err();

    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, 200);
            assert_eq!(body, json!(["bad"]));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_errors_field_passes_through_raw_executor() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let _claims = server
        .mock("POST", "/api/v4/claims/status")
        .with_status(200)
        .with_body(r#"{"errors": ["bad"]}"#)
        .create_async()
        .await;

    // Only the facade inspects `errors`; the executor returns the response
    let client = api_client(&server).await;
    let response = client
        .request(Method::POST, "/claims/status", json!({}), "application/json")
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_non_json_body_and_headers() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let _edi = server
        .mock("GET", "/api/v4/activities/abc")
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_header("x-request-id", "req-42")
        .with_body("ISA*00*~")
        .create_async()
        .await;

    let client = api_client(&server).await;
    let response = client
        .execute(RequestSpec::new(Method::GET, "/activities/").params("abc"))
        .await
        .unwrap();

    assert_eq!(response.body(), Body::Raw(bytes::Bytes::from_static(b"ISA*00*~")));
    let headers = response.headers();
    assert_eq!(headers["x-request-id"], "req-42");
    assert!(response.header_block().starts_with("HTTP/1.1 200"));
}

#[tokio::test]
async fn test_transport_error() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;

    let mut client = api_client(&server).await;
    client.set_api_base_url("http://127.0.0.1:1/api/v4");
    client.set_request_timeout(5).unwrap();

    let err = client
        .execute(RequestSpec::new(Method::GET, "/payers/"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

// ==================================================================================================
// Usage Tests
// ==================================================================================================

#[tokio::test]
async fn test_usage_fetches_once() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let eligibility = server
        .mock("POST", "/api/v4/eligibility/")
        .match_body(Matcher::Json(json!({})))
        .with_status(200)
        .with_body(r#"{"meta":{"credits_remaining":99},"data":{"errors":{"query":"missing"}}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = platform_client(&server).await;
    let first = client.usage().await.unwrap();
    let second = client.usage().await.unwrap();

    assert_eq!(first, Some(json!({"credits_remaining": 99})));
    assert_eq!(first, second);
    eligibility.assert_async().await;
}
