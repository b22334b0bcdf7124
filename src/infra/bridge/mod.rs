pub mod http_bridge_client;

pub use http_bridge_client::HttpBridgeClient;
