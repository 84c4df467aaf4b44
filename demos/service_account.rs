//! Demonstrates loading a service-account key file, scoping it, and minting access tokens against
//! a local token endpoint with the default reqwest transport.
//!
//! Pass a key file path as the first argument to use your own key; the bundled test key is used
//! otherwise.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::Value;
// self
use oauth2_service_account::{
	ServiceAccountCredentials,
	auth::ScopeList,
	crypt::RsaSignerBackend,
	exchange::ReqwestTokenExchanger,
	jwt::ExtraClaims,
	url::Url,
};

const BUNDLED_KEYFILE: &str = include_str!("../tests/data/service_account.json");

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let keyfile: Value = match env::args().nth(1) {
		Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
		None => serde_json::from_str(BUNDLED_KEYFILE)?,
	};
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let base = ServiceAccountCredentials::from_keyfile_dict(
		&keyfile,
		ScopeList::default(),
		ExtraClaims::new(),
		&RsaSignerBackend,
	)?;

	println!("scoping required: {}", base.create_scoped_required());

	let creds = Arc::new(
		base.create_scoped(ScopeList::new(["https://www.googleapis.com/auth/cloud-platform"])?)
			.with_token_uri(Url::parse(&server.url("/token"))?)
			.with_user_agent("service-account-demo/0.1"),
	);
	let exchanger = ReqwestTokenExchanger::new();
	let tasks = (0..3)
		.map(|_| {
			let creds = Arc::clone(&creds);
			let exchanger = exchanger.clone();

			tokio::spawn(async move { creds.get_access_token(&exchanger).await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let token = task.await??;

		println!("bearer expires in {}s", token.expires_in);
	}

	let (key_id, signature) = creds.sign_blob(b"hello")?;

	println!("signed with key {key_id:?}: {} bytes", signature.len());

	token_mock.assert_async().await;

	Ok(())
}
