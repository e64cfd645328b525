//! Stage and sink traits.

use crate::{PipelineContext, PipelineError};

/// A synchronous transform between two pipeline channels.
///
/// `process` is called once per input item, in arrival order, and may emit any
/// number of outputs. `finish` is called once after the input is exhausted and
/// must emit everything the stage still holds.
pub trait Stage: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &'static str;

    fn process(
        &mut self,
        context: &PipelineContext,
        input: Self::Input,
        output: &mut dyn FnMut(Self::Output) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;

    fn finish(
        &mut self,
        context: &PipelineContext,
        output: &mut dyn FnMut(Self::Output) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;
}

/// The terminal consumer of a pipeline.
pub trait Sink: Send + 'static {
    type Item: Send + 'static;

    fn name(&self) -> &'static str;

    fn accept(&mut self, context: &PipelineContext, item: Self::Item) -> Result<(), PipelineError>;
}
