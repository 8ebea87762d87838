#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use common::*;
use dinamis_sdk::{
	error::{Error, TransientError},
	http::RetryPolicy,
	session::ConnectionMethod,
	store::ApiKeyStorage,
};

#[tokio::test]
async fn retryable_statuses_use_the_whole_budget() {
	let server = MockServer::start_async().await;
	let session = session(&server, ConnectionMethod::Bare, RetryPolicy::new(2, 0.));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/sign_urls");
			then.status(503).body("maintenance");
		})
		.await;
	let err = session.post("sign_urls", &[("urls", "x")]).await.expect_err("503 should persist.");

	mock.assert_calls_async(3).await;

	assert!(matches!(
		err,
		Error::Transient(TransientError::Endpoint { status: Some(503), .. })
	));
}

#[tokio::test]
async fn other_statuses_fail_without_retry() {
	let server = MockServer::start_async().await;
	let session = session(&server, ConnectionMethod::Bare, RetryPolicy::new(5, 0.));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/sign_urls");
			then.status(403).body("forbidden bucket");
		})
		.await;
	let err = session.post("sign_urls", &[]).await.expect_err("403 should fail.");

	mock.assert_calls_async(1).await;

	match err {
		Error::Http { status, message, .. } => {
			assert_eq!(status, 403);
			assert!(message.contains("forbidden bucket"));
		},
		other => panic!("Unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn api_keys_are_managed_with_oauth2_credentials() {
	let server = MockServer::start_async().await;
	let dir = temp_dir("api_keys");
	let key_ring = ApiKeyStorage::in_dir(&dir).expect("Key ring should open.");
	let session = session(&server, ConnectionMethod::Bare, RetryPolicy::none())
		.with_credentials(Arc::new(FixedToken("manager-token")))
		.with_key_ring(key_ring.clone());
	let create = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/create_api_key")
				.header("authorization", "Bearer manager-token");
			then.status(200).json_body(json!({ "access-key": "ak-1", "secret-key": "sk-1" }));
		})
		.await;
	let list = server
		.mock_async(|when, then| {
			when.method(GET).path("/list_api_keys").header("authorization", "Bearer manager-token");
			then.status(200).json_body(json!(["ak-1", "ak-0"]));
		})
		.await;
	let revoke = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/revoke_api_key")
				.query_param("access_key", "ak-1")
				.header("authorization", "Bearer manager-token");
			then.status(200).json_body(json!({}));
		})
		.await;
	let key = session.register_api_key().await.expect("Key registration should succeed.");

	create.assert_calls_async(1).await;

	assert_eq!(key.access_key, "ak-1");
	assert_eq!(key.secret_key.expose(), "sk-1");
	assert_eq!(
		key_ring.get(session.endpoint().as_str()).expect("Key ring should be readable."),
		Some(key.clone())
	);
	assert_eq!(
		session.list_api_keys().await.expect("Listing should succeed."),
		["ak-1", "ak-0"]
	);

	list.assert_calls_async(1).await;

	let removed =
		session.delete_stored_api_key(true).await.expect("Stored key removal should succeed.");

	revoke.assert_calls_async(1).await;

	assert_eq!(removed, Some(key));
	assert_eq!(
		key_ring.get(session.endpoint().as_str()).expect("Key ring should be readable."),
		None
	);
	assert_eq!(
		session.delete_stored_api_key(true).await.expect("Nothing left to remove."),
		None
	);

	revoke.assert_calls_async(1).await;
}

#[tokio::test]
async fn revoking_all_keys_revokes_each_listed_key() {
	let server = MockServer::start_async().await;
	let session = session(&server, ConnectionMethod::Bare, RetryPolicy::none())
		.with_credentials(Arc::new(FixedToken("manager-token")));
	let list = server
		.mock_async(|when, then| {
			when.method(GET).path("/list_api_keys").header("authorization", "Bearer manager-token");
			then.status(200).json_body(json!(["ak-1", "ak-2"]));
		})
		.await;
	let mut revokes = Vec::new();

	for access_key in ["ak-1", "ak-2"] {
		let mock = server
			.mock_async(|when, then| {
				when.method(GET)
					.path("/revoke_api_key")
					.query_param("access_key", access_key)
					.header("authorization", "Bearer manager-token");
				then.status(200).json_body(json!({}));
			})
			.await;

		revokes.push(mock);
	}

	let revoked = session.revoke_all_api_keys().await.expect("Revoking all keys should succeed.");

	list.assert_calls_async(1).await;

	for mock in &revokes {
		mock.assert_calls_async(1).await;
	}

	assert_eq!(revoked, ["ak-1", "ak-2"]);
}

#[tokio::test]
async fn revoking_all_keys_stops_at_the_first_failure() {
	let server = MockServer::start_async().await;
	let session = session(&server, ConnectionMethod::Bare, RetryPolicy::none());
	let _list = server
		.mock_async(|when, then| {
			when.method(GET).path("/list_api_keys");
			then.status(200).json_body(json!(["ak-1", "ak-2"]));
		})
		.await;
	let revoke = server
		.mock_async(|when, then| {
			when.method(GET).path("/revoke_api_key");
			then.status(403).body("not yours");
		})
		.await;
	let err = session.revoke_all_api_keys().await.expect_err("A refused revocation should fail.");

	revoke.assert_calls_async(1).await;

	assert!(matches!(err, Error::Http { status: 403, .. }));
}

#[tokio::test]
async fn malformed_management_bodies_are_protocol_errors() {
	let server = MockServer::start_async().await;
	let session = session(&server, ConnectionMethod::Bare, RetryPolicy::none());
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/list_api_keys");
			then.status(200).json_body(json!({ "keys": "nope" }));
		})
		.await;
	let err = session.list_api_keys().await.expect_err("Object body should be rejected.");

	assert!(matches!(err, Error::Protocol(_)));
}
