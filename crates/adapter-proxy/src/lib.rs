//! Transformer pipeline between the client and the debug adapter.
//!
//! [`AdapterProxy`] decodes each client request, passes its arguments forward through
//! every [`Transformer`], dispatches to the adapter, and passes the response body back
//! through the chain in reverse. Adapter events take the reverse path as well. A
//! transformer may park a request until the script it names is loaded; such requests are
//! released by script-parsed events and abandoned when the client context is cleared.

pub mod error;
pub mod line_numbers;
pub mod path_mapping;
pub mod pending;
pub mod proxy;
pub mod source_mapping;
pub mod transformer;

pub use error::TransformError;
pub use line_numbers::LineNumberTransformer;
pub use path_mapping::PathTransformer;
pub use pending::PendingRequests;
pub use proxy::{default_chain, AdapterProxy};
pub use source_mapping::SourceMapTransformer;
pub use transformer::Transformer;
