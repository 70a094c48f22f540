//! # Zeta4G Routing
//!
//! Cluster-aware client runtime for [Zeta4G](https://github.com/zeta9044/zeta4g) drivers:
//! connection pooling, routing table discovery and transaction retry.
//!
//! ## Features
//!
//! - **Connection Pooling** - Per-address pools with a hard size limit, FIFO waiters and acquisition timeouts
//! - **Cluster Routing** - Per-database routing tables, discovery through known routers and the seed address
//! - **Load Balancing** - Round-robin (default), least-connected or random server selection
//! - **Transaction Retry** - Exponential backoff with jitter inside a total retry budget
//! - **Causal Chaining** - Bookmarks passed from one transaction to the next within a session
//! - **Pluggable I/O** - Sockets and wire protocol live behind the [`Connector`](driver::Connector)
//!   and [`Transport`](driver::Transport) traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use zeta4g_routing::{AuthToken, Driver, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // `connector` opens Bolt connections; see the `Connector` trait
//!     let driver = Driver::new(
//!         "zeta4g://cluster.example.com:7687",
//!         AuthToken::basic("zeta4g", "password"),
//!         connector,
//!     )?;
//!
//!     let session = driver.session(SessionConfig::builder().with_database("movies").build())?;
//!
//!     // Routed to a writer and retried on leader switches
//!     session
//!         .write_transaction(|tx| {
//!             Box::pin(async move {
//!                 tx.run("CREATE (n:Person {name: 'Alice'})").await?;
//!                 Ok(())
//!             })
//!         })
//!         .await?;
//!
//!     // Routed to a reader; sees the write above through the session bookmark
//!     let people = session
//!         .read_transaction(|tx| Box::pin(async move { tx.run("MATCH (n:Person) RETURN n").await }))
//!         .await?;
//!     println!("{} records", people.len());
//!
//!     driver.close();
//!     Ok(())
//! }
//! ```
//!
//! ## URI Schemes
//!
//! | Scheme | Mode |
//! |--------|------|
//! | `bolt://`, `bolt+s://`, `bolt+ssc://` | Direct connection to a single server |
//! | `zeta4g://`, `neo4j://` (and `+s` / `+ssc` variants) | Cluster routing |
//!
//! Query parameters of a routing URI become the routing context sent with every
//! discovery request.
//!
//! ## Configuration
//!
//! ```rust
//! use std::time::Duration;
//! use zeta4g_routing::{AuthToken, DriverConfig, LoadBalancingStrategy};
//!
//! let config = DriverConfig::builder("zeta4g://localhost:7687?region=eu", AuthToken::basic("u", "p"))
//!     .unwrap()
//!     .with_max_connection_pool_size(50)
//!     .with_connection_acquisition_timeout(Duration::from_secs(10))
//!     .with_max_transaction_retry_time(Duration::from_secs(15))
//!     .with_load_balancing_strategy(LoadBalancingStrategy::LeastConnected)
//!     .build();
//!
//! assert!(config.is_routing());
//! assert_eq!(config.routing_context.get("region"), Some("eu"));
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`DriverResult`]. Errors carry a stable code:
//!
//! ```rust
//! use zeta4g_routing::DriverError;
//!
//! let err = DriverError::server("Neo.TransientError.General.DatabaseUnavailable", "try later");
//! assert!(err.is_retryable());
//! assert_eq!(err.code(), "Neo.TransientError.General.DatabaseUnavailable");
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events and never installs a subscriber.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod driver;

// Re-exports for convenience
pub use driver::routing::{LoadBalancingStrategy, RoutingTable, ServerRole};
pub use driver::{
    AccessMode, AuthToken, Bookmarks, ConnectionProvider, Connector, DatabaseUnavailablePolicy,
    Driver, DriverConfig, DriverConfigBuilder, DriverError, DriverMetrics, DriverResult, Query,
    Record, RetryConfig, ServerAddress, ServerAddressResolver, Session, SessionConfig,
    Transaction, Transport, TrustStrategy, Value,
};

/// Config alias for convenience
pub type Config = DriverConfig;
