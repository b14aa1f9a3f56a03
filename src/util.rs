use std::net::SocketAddr;

const PULSE_API_KEY: &str = "PULSE_API_KEY";

pub fn get_api_key() -> Option<String> {
    std::env::var(PULSE_API_KEY).ok().filter(|key| !key.is_empty())
}

const PULSE_HUB_URL: &str = "PULSE_HUB_URL";

pub fn get_hub_url() -> Option<String> {
    std::env::var(PULSE_HUB_URL)
        .ok()
        .map(|url| url.trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
}

const PULSE_BIND_ADDR: &str = "PULSE_BIND_ADDR";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

pub fn get_default_bind_addr() -> SocketAddr {
    DEFAULT_BIND_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080)))
}

pub fn get_bind_addr() -> Option<SocketAddr> {
    std::env::var(PULSE_BIND_ADDR)
        .ok()
        .and_then(|addr| addr.parse().ok())
}
