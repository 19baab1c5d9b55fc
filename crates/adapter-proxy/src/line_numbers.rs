use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bridge_core_types::{RequestArgs, ResponseBody};

use crate::error::TransformError;
use crate::transformer::Transformer;

/// Converts client line/column numbering to the target's zero-based numbering and back.
#[derive(Debug)]
pub struct LineNumberTransformer {
    lines_start_at1: AtomicBool,
    columns_start_at1: AtomicBool,
}

impl Default for LineNumberTransformer {
    fn default() -> Self {
        Self {
            lines_start_at1: AtomicBool::new(true),
            columns_start_at1: AtomicBool::new(true),
        }
    }
}

impl LineNumberTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    fn line_offset(&self) -> i64 {
        i64::from(self.lines_start_at1.load(Ordering::Relaxed))
    }

    fn column_offset(&self) -> i64 {
        i64::from(self.columns_start_at1.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl Transformer for LineNumberTransformer {
    fn name(&self) -> &'static str {
        "line-numbers"
    }

    async fn transform_request(
        &self,
        _seq: i64,
        args: &mut RequestArgs,
    ) -> Result<(), TransformError> {
        match args {
            RequestArgs::Initialize(init) => {
                self.lines_start_at1
                    .store(init.lines_start_at1, Ordering::Relaxed);
                self.columns_start_at1
                    .store(init.columns_start_at1, Ordering::Relaxed);
            }
            RequestArgs::SetBreakpoints(set) => {
                let (lines, columns) = (self.line_offset(), self.column_offset());
                for breakpoint in &mut set.breakpoints {
                    breakpoint.line -= lines;
                    if let Some(column) = breakpoint.column.as_mut() {
                        *column -= columns;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn transform_response(
        &self,
        _seq: i64,
        body: &mut ResponseBody,
    ) -> Result<(), TransformError> {
        let (lines, columns) = (self.line_offset(), self.column_offset());
        match body {
            ResponseBody::SetBreakpoints(set) => {
                for breakpoint in &mut set.breakpoints {
                    breakpoint.line += lines;
                    if let Some(column) = breakpoint.column.as_mut() {
                        *column += columns;
                    }
                }
            }
            ResponseBody::StackTrace(trace) => {
                for frame in &mut trace.stack_frames {
                    frame.line += lines;
                    frame.column += columns;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
