// Google Workspace REST clients used behind the service factory.

pub mod google_api_client;

pub use google_api_client::GoogleRestConnector;
