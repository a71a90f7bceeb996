mod client;
mod http_client;
mod jwt;
mod oauth_client;
mod service_account;


pub use client::FirebaseAuth;
pub use service_account::ServiceAccountKey;
