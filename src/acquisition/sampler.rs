//! The background sampling loop
//!
//! Reads `chunk` samples at a time, pacing each read with the sample clock,
//! and commits every chunk to the rolling window in one locked step. A stop
//! request is honoured between samples; whatever part of the chunk was
//! already read is still committed.

use super::{ExitReason, Shared};
use crate::adc::{AdcTransport, to_sample};
use crate::clock::{Clock, SampleClock};
use crate::error::AdcError;
use std::sync::Arc;

pub(crate) enum ChunkOutcome {
    Complete,
    Stopped,
    Failed(AdcError),
}

pub(crate) struct Sampler {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    pacer: SampleClock,
    chunk: usize,
    channel: u8,
}

impl Sampler {
    pub(crate) fn new(
        shared: Arc<Shared>,
        clock: Arc<dyn Clock>,
        rate: u32,
        chunk: usize,
        channel: u8,
    ) -> Self {
        Self {
            shared,
            clock,
            pacer: SampleClock::new(rate),
            chunk,
            channel,
        }
    }

    /// Run until stopped or the transport fails
    pub(crate) fn run<T: AdcTransport>(&self, transport: &mut T) -> ExitReason {
        let mut chunk = Vec::with_capacity(self.chunk);
        loop {
            let outcome = self.read_chunk(transport, &mut chunk);
            self.commit(&chunk);

            match outcome {
                ChunkOutcome::Complete => {}
                ChunkOutcome::Stopped => return ExitReason::Requested,
                ChunkOutcome::Failed(err) => {
                    tracing::error!(error = %err, "ADC read failed, terminating acquisition");
                    return ExitReason::Failed(err.to_string());
                }
            }
        }
    }

    /// Fill `chunk` with up to `self.chunk` paced samples
    pub(crate) fn read_chunk<T: AdcTransport>(
        &self,
        transport: &mut T,
        chunk: &mut Vec<i16>,
    ) -> ChunkOutcome {
        chunk.clear();
        while chunk.len() < self.chunk {
            if self.shared.stop_requested() {
                return ChunkOutcome::Stopped;
            }

            let started = self.clock.now();
            match transport
                .read(self.channel)
                .and_then(|raw| to_sample(self.channel, raw))
            {
                Ok(sample) => chunk.push(sample),
                Err(err) => return ChunkOutcome::Failed(err),
            }
            let elapsed = self.clock.now().saturating_duration_since(started);
            self.pacer
                .pace(self.clock.as_ref(), elapsed, &self.shared.deadlines);
        }
        ChunkOutcome::Complete
    }

    pub(crate) fn commit(&self, chunk: &[i16]) {
        if chunk.is_empty() {
            return;
        }
        let dropped = self.shared.buffer.push_chunk(chunk);
        if dropped > 0 {
            tracing::trace!(dropped, "Too much data in memory, dumped oldest samples");
        }
    }
}
