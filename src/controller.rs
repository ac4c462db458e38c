/*!
 # Controller

 Owns the frame compiler and a transport, and runs operations against the
 device strictly in the order given. Validation happens for the whole batch
 before anything is written; a transport failure stops the batch and the
 remaining operations are never sent.
*/

use tracing::{debug, error, info, instrument};

use crate::frame::{Frame, FrameCompiler};
use crate::operation::Operation;
use crate::transport::Transport;
use crate::Result;

pub struct Controller<T: Transport> {
    transport: T,
    compiler: FrameCompiler,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: T) -> Self {
        Self::with_compiler(transport, FrameCompiler::new())
    }

    pub fn with_compiler(transport: T, compiler: FrameCompiler) -> Self {
        Self {
            transport,
            compiler,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn compiler(&self) -> &FrameCompiler {
        &self.compiler
    }

    /// Validates, compiles and transmits a single operation
    #[instrument(skip(self, op), fields(op = op.name()))]
    pub async fn execute(&mut self, op: &Operation) -> Result<Frame> {
        op.validate()?;
        self.send(op).await
    }

    /// Runs `ops` in order. Nothing is sent if any operation fails
    /// validation; the first transport error aborts the rest.
    #[instrument(skip(self, ops), fields(count = ops.len()))]
    pub async fn execute_batch(&mut self, ops: &[Operation]) -> Result<Vec<Frame>> {
        for op in ops {
            op.validate()?;
        }

        let mut frames = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            match self.send(op).await {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    error!(
                        "Operation {} of {} ({}) failed, {} not sent: {}",
                        i + 1,
                        ops.len(),
                        op.name(),
                        ops.len() - i - 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
        info!("Sent {} operation(s)", frames.len());
        Ok(frames)
    }

    /// Sets the device clock to the local time
    pub async fn sync_time(&mut self) -> Result<Frame> {
        self.execute(&Operation::time_sync_now()).await
    }

    async fn send(&mut self, op: &Operation) -> Result<Frame> {
        let frame = self.compiler.compile(op);
        debug!("Sending {} frame seq={:#04x}", op.name(), frame.sequence);
        self.transport.transmit(&frame).await?;
        Ok(frame)
    }
}
