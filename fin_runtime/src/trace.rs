// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for the runtime.
//!
//! Tracing is optional and `no_std` friendly. The runtime only emits events
//! requested by a [`TraceMask`]; with [`TraceMask::NONE`] the dispatch loop
//! pays a single branch per event site.

use crate::error::RuntimeError;
use crate::opcode::Opcode;
use crate::value::Pc;

/// A set of trace events requested by a [`TraceSink`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceMask(u32);

impl TraceMask {
    /// No tracing.
    pub const NONE: Self = Self(0);
    /// Emit [`TraceEvent::LoadStart`], [`TraceEvent::LoadEnd`],
    /// [`TraceEvent::RunStart`], and [`TraceEvent::RunEnd`].
    pub const RUN: Self = Self(1 << 0);
    /// Emit [`TraceEvent::Instr`] for each dispatched instruction.
    pub const INSTR: Self = Self(1 << 1);
    /// Emit [`TraceEvent::CallEnter`] and [`TraceEvent::CallExit`].
    pub const CALL: Self = Self(1 << 2);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl core::ops::BitOr for TraceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// A trace event emitted by the runtime.
#[derive(Clone, Debug)]
pub enum TraceEvent<'a> {
    /// A `load` call began decoding at `pc`.
    LoadStart {
        /// First pc of the appended stream.
        pc: Pc,
    },
    /// A `load` call finished.
    LoadEnd,
    /// A `run` call began.
    RunStart,
    /// A single instruction dispatch.
    Instr {
        /// The pc of the opcode byte.
        pc: Pc,
        /// The decoded opcode.
        opcode: Opcode,
    },
    /// A contract was entered.
    CallEnter {
        /// Frame depth after entering.
        depth: usize,
        /// Activation name.
        name: &'a str,
        /// Whether the activation is a native.
        native: bool,
    },
    /// A contract returned.
    CallExit {
        /// Frame depth before exiting.
        depth: usize,
    },
    /// A `run` call finished.
    RunEnd {
        /// The failure, if the run trapped.
        error: Option<&'a RuntimeError>,
    },
}

/// A sink that receives runtime events.
pub trait TraceSink {
    /// Receives one event.
    fn event(&mut self, event: TraceEvent<'_>);
}

/// A mask plus an optional sink, threaded through the dispatch loop.
pub(crate) struct Tracer<'a> {
    mask: TraceMask,
    sink: Option<&'a mut dyn TraceSink>,
}

impl<'a> Tracer<'a> {
    pub(crate) fn new(mask: TraceMask, sink: Option<&'a mut dyn TraceSink>) -> Self {
        Self { mask, sink }
    }

    /// Emits `event` if `bit` is requested; the closure keeps event
    /// construction off the fast path.
    pub(crate) fn emit<'e>(&mut self, bit: TraceMask, event: impl FnOnce() -> TraceEvent<'e>) {
        if self.mask.contains(bit)
            && let Some(sink) = self.sink.as_mut()
        {
            sink.event(event());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct Recorder {
        opcodes: Vec<Opcode>,
    }

    impl TraceSink for Recorder {
        fn event(&mut self, event: TraceEvent<'_>) {
            if let TraceEvent::Instr { opcode, .. } = event {
                self.opcodes.push(opcode);
            }
        }
    }

    #[test]
    fn mask_gates_emission() {
        let mut recorder = Recorder::default();
        let mut tracer = Tracer::new(TraceMask::RUN, Some(&mut recorder));
        tracer.emit(TraceMask::INSTR, || TraceEvent::Instr {
            pc: 0,
            opcode: Opcode::Term,
        });
        assert!(recorder.opcodes.is_empty());

        let mut tracer = Tracer::new(TraceMask::RUN | TraceMask::INSTR, Some(&mut recorder));
        tracer.emit(TraceMask::INSTR, || TraceEvent::Instr {
            pc: 0,
            opcode: Opcode::Term,
        });
        assert_eq!(recorder.opcodes, [Opcode::Term]);
    }

    #[test]
    fn missing_sink_is_silent() {
        let mut tracer = Tracer::new(TraceMask::RUN, None);
        tracer.emit(TraceMask::RUN, || TraceEvent::RunStart);
    }
}
