use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("wardrobe-stylist/", env!("CARGO_PKG_VERSION"));

// Per-request timeouts override the ceiling set here.
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(180))
        .build()
        .expect("Failed to build HTTP client")
});

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
