use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use dashmap::DashSet;

/// An authenticated client connection.
///
/// Created by the AddConnection handshake and bound to the transport it
/// arrived on. The set of authorized applications only grows while the
/// connection lives.
#[derive(Debug)]
pub struct Connection {
    id: String,
    transport_id: String,
    address: SocketAddr,
    app: String,
    language: Option<String>,
    version: Option<String>,
    authorized_apps: DashSet<String>,
    created_at: DateTime<Utc>,
}

impl Connection {
    /// Create a connection authenticated for `app`.
    pub fn new(
        transport_id: impl Into<String>,
        address: SocketAddr,
        app: impl Into<String>,
    ) -> Self {
        let app = app.into();
        let authorized_apps = DashSet::new();
        authorized_apps.insert(app.clone());
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            transport_id: transport_id.into(),
            address,
            app,
            language: None,
            version: None,
            authorized_apps,
            created_at: Utc::now(),
        }
    }

    /// Attach the client library language and version reported in the handshake.
    pub fn with_client_info(mut self, language: Option<String>, version: Option<String>) -> Self {
        self.language = language;
        self.version = version;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport_id(&self) -> &str {
        &self.transport_id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Application that opened the connection.
    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record an additional application authenticated on this connection.
    ///
    /// Returns `false` if the app was already authorized.
    pub fn authorize(&self, app: impl Into<String>) -> bool {
        self.authorized_apps.insert(app.into())
    }

    /// True only if the handshake (or a later [`authorize`](Self::authorize))
    /// recorded `app`.
    pub fn is_authorized(&self, app: &str) -> bool {
        self.authorized_apps.contains(app)
    }

    pub fn authorized_apps(&self) -> Vec<String> {
        let mut apps: Vec<String> = self.authorized_apps.iter().map(|a| a.clone()).collect();
        apps.sort();
        apps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.0.0.7:50123".parse().unwrap()
    }

    #[test]
    fn test_handshake_app_is_authorized() {
        let conn = Connection::new("t-1", addr(), "billing");
        assert!(conn.is_authorized("billing"));
        assert!(!conn.is_authorized("audit"));
        assert_eq!(conn.app(), "billing");
        assert_eq!(conn.transport_id(), "t-1");
        assert_eq!(conn.address(), addr());
    }

    #[test]
    fn test_authorize_additional_app() {
        let conn = Connection::new("t-1", addr(), "billing");
        assert!(conn.authorize("audit"));
        assert!(!conn.authorize("audit"));
        assert!(conn.is_authorized("audit"));
        assert_eq!(conn.authorized_apps(), vec!["audit", "billing"]);
    }

    #[test]
    fn test_connection_ids_are_unique_and_separator_free() {
        let a = Connection::new("t-1", addr(), "billing");
        let b = Connection::new("t-1", addr(), "billing");
        assert_ne!(a.id(), b.id());
        assert!(!a.id().contains('_'));
    }

    #[test]
    fn test_client_info() {
        let conn = Connection::new("t-1", addr(), "billing")
            .with_client_info(Some("rust".into()), Some("1.2.0".into()));
        assert_eq!(conn.language(), Some("rust"));
        assert_eq!(conn.version(), Some("1.2.0"));
    }
}
