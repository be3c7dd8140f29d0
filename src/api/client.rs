use reqwest::{
    Client,
    ClientBuilder,
    header::{HeaderMap, HeaderName, HeaderValue},
};

use crate::prelude::*;

/// Build a client with the portal API key attached to every request.
pub fn try_new(api_key: &str) -> Result<Client> {
    let mut api_key = HeaderValue::from_str(api_key).context("invalid API key")?;
    api_key.set_sensitive(true);
    let headers = HeaderMap::from_iter([(HeaderName::from_static("apikey"), api_key)]);
    Ok(ClientBuilder::new()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .build()?)
}
