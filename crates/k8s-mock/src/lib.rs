//! Mock Kubernetes API server for testing.
//!
//! Provides an HTTP server that can be used with kubeconfig-based connections.
//! Several servers can be started side by side to impersonate a control plane
//! and its member clusters, each with its own discovery data and objects.

pub mod discovery;
pub mod http;
pub mod openapi;

pub use discovery::{MockApiResource, MockDiscovery};
pub use http::{merged_kubeconfig, HttpMockK8sServer, RunningHttpMockK8sServer};
