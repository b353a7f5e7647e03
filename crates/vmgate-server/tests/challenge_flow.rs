//! HTTP-level tests against the assembled router, using `tower::ServiceExt`
//! the way a client would drive the challenge protocol. The WASM-solving
//! step itself is out of scope here since it never executes server-side.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;

use vmgate_crypto::{derive_session_key, pack_decrypt, pack_encrypt, EphemeralKeyPair};
use vmgate_kv::InMemoryKv;
use vmgate_risk::{AsnLookup, AsnTable};
use vmgate_server::config::Config;
use vmgate_server::routes::build_router;
use vmgate_server::state::AppState;

fn test_config() -> Config {
    Config {
        challenge_verify_secret: "0123456789abcdef0123456789abcdef".into(),
        kv_url: "memory".into(),
        risk_debug: false,
        bind_addr: "127.0.0.1:0".into(),
        manifest_path: String::new(),
        wasm_path: String::new(),
        asn_table_path: String::new(),
        challenge_ttl_secs: 300,
        session_ttl_secs: 300,
        asn_lookup_url: "http://localhost:9".into(),
    }
}

fn test_state() -> AppState {
    let manifest = vmgate_bytecode::generate().expect("manifest generation");
    AppState {
        config: Arc::new(test_config()),
        kv: Arc::new(InMemoryKv::new()),
        manifest: Arc::new(manifest),
        // Never decoded server-side, only encrypted and shipped, so a
        // placeholder blob stands in for a real compiled module.
        wasm_bytes: Arc::new(vec![0u8; 64]),
        asn_table: Arc::new(AsnTable::default()),
        asn_lookup: Arc::new(AsnLookup::new("http://localhost:9".into())),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Build the `IV ‖ ephemeralPubKey ‖ (CT ‖ TAG)` request envelope (§6) for
/// `plaintext`, ECDH'd against the session's advertised public key.
fn encrypt_request_body(server_pub: &[u8; 32], plaintext: &[u8]) -> String {
    let ephemeral = EphemeralKeyPair::generate();
    let shared = ephemeral.shared_secret(server_pub);
    let packed = pack_encrypt(&shared, plaintext).unwrap();
    let iv = &packed[..12];
    let ct_and_tag = &packed[12..];

    let mut raw = Vec::with_capacity(12 + 32 + ct_and_tag.len());
    raw.extend_from_slice(iv);
    raw.extend_from_slice(&ephemeral.public_bytes());
    raw.extend_from_slice(ct_and_tag);
    STANDARD.encode(raw)
}

async fn establish_session(router: &axum::Router) -> (String, [u8; 32], [u8; 32]) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri("/challenge").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    let id = body["id"].as_str().unwrap().to_string();

    let session_key = derive_session_key(&id).unwrap();
    let packed = STANDARD.decode(body["encryptedPublicKey"].as_str().unwrap()).unwrap();
    let plaintext = pack_decrypt(&session_key, &packed).unwrap();
    let server_pub: [u8; 32] = plaintext.try_into().unwrap();

    (id, session_key, server_pub)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let router = build_router(test_state());
    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn get_challenge_issues_a_decryptable_session_key() {
    let router = build_router(test_state());
    let (_id, _session_key, server_pub) = establish_session(&router).await;
    assert_eq!(server_pub.len(), 32);
}

#[tokio::test]
async fn post_challenge_with_unknown_session_is_rejected() {
    let router = build_router(test_state());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/challenge")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "id": "deadbeef", "body": "not-base64-or-real" })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_challenge_rejects_a_forged_fingerprint() {
    let router = build_router(test_state());
    let (id, _session_key, server_pub) = establish_session(&router).await;

    let request_body = json!({
        "entropy": [0.1, 0.42, 0.73, 0.05],
        "fingerprint": {
            "payload": {},
            "timestamp": 0,
            "signature": "",
            "token": "unknown-token",
        },
    });
    let encrypted = encrypt_request_body(&server_pub, &serde_json::to_vec(&request_body).unwrap());

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/challenge")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "id": id, "body": encrypted })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_verify_with_garbage_token_is_rejected() {
    let router = build_router(test_state());
    let (id, _session_key, server_pub) = establish_session(&router).await;

    let verify_body = json!({ "token": "not-a-real-jwt", "solved": 7 });
    let encrypted = encrypt_request_body(&server_pub, &serde_json::to_vec(&verify_body).unwrap());

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/challenge/verify")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "id": id, "body": encrypted })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn manager_requests_reflects_issued_sessions() {
    let router = build_router(test_state());
    let _ = establish_session(&router).await;

    let response = router
        .oneshot(Request::builder().uri("/manager/requests").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"].as_u64().unwrap(), 1);
    assert_eq!(body["requests"].as_array().unwrap().len(), 1);
}
