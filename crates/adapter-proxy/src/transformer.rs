use async_trait::async_trait;
use bridge_core_types::{AdapterEvent, RequestArgs, ResponseBody};

use crate::error::TransformError;

/// One stage of the pipeline. Every hook defaults to a no-op, so a transformer only
/// implements the traffic it rewrites.
///
/// Requests run through the stages in order; responses and events run through them in
/// reverse, so each stage undoes its own rewrite after the stages closer to the adapter
/// have undone theirs. `seq` identifies the client request a response belongs to.
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transform_request(
        &self,
        _seq: i64,
        _args: &mut RequestArgs,
    ) -> Result<(), TransformError> {
        Ok(())
    }

    async fn transform_response(
        &self,
        _seq: i64,
        _body: &mut ResponseBody,
    ) -> Result<(), TransformError> {
        Ok(())
    }

    async fn transform_event(&self, _event: &mut AdapterEvent) -> Result<(), TransformError> {
        Ok(())
    }

    /// The adapter failed request `seq`; drop anything remembered for its response.
    fn discard_request(&self, _seq: i64) {}
}
