//! Endpoint table: exact-match mapping from request path to session kind.
//!
//! The table is built once at startup and never mutated. Lookups are
//! exact; there is no prefix or wildcard routing.

use std::collections::HashMap;

/// One of the WebSocket endpoints served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `/foo`: echo.
    Foo,
    /// `/bar`: echo.
    Bar,
    /// `/rtt`: one-shot round-trip-time exchange.
    Rtt,
    /// `/`: echo, used when no endpoint is given.
    Root,
}

impl Endpoint {
    /// Every endpoint, in registration order.
    pub const ALL: [Self; 4] = [Self::Foo, Self::Bar, Self::Rtt, Self::Root];

    /// Returns the exact path this endpoint is served on.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Foo => "/foo",
            Self::Bar => "/bar",
            Self::Rtt => "/rtt",
            Self::Root => "/",
        }
    }

    /// Returns the text frame sent right after the upgrade, if any.
    ///
    /// The RTT endpoint stays silent so the first frame the client sees
    /// is the reply to its timestamp.
    #[must_use]
    pub const fn greeting(self) -> Option<&'static str> {
        match self {
            Self::Foo => Some("Connected to \"/foo\"..."),
            Self::Bar => Some("Connected to \"/bar\"..."),
            Self::Root => Some("Connected to \"/\". No endpoint specified..."),
            Self::Rtt => None,
        }
    }
}

/// Immutable path → [`Endpoint`] table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<&'static str, Endpoint>,
}

impl RouteTable {
    /// Builds the table with every [`Endpoint`].
    #[must_use]
    pub fn new() -> Self {
        let routes = Endpoint::ALL
            .into_iter()
            .map(|endpoint| (endpoint.path(), endpoint))
            .collect();
        Self { routes }
    }

    /// Resolves a request path. An empty path resolves to `/`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<Endpoint> {
        let path = if path.is_empty() { "/" } else { path };
        self.routes.get(path).copied()
    }

    /// Iterates over the registered endpoints.
    pub fn endpoints(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.routes.values().copied()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}
