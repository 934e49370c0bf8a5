pub mod oxigraph_adapter;
pub mod query_processing;
pub mod retry;
pub mod sparql_client;

pub use query_processing::{Binding, SparqlStore, StoreError};
