//! Instruction cursor
//!
//! Branch offsets in decoded bytecode are byte-relative, so the stream keeps a
//! prefix sum of instruction sizes next to the instruction slice and maps byte
//! positions back to indices.

use std::rc::Rc;

use crate::error::VmError;
use crate::instruction::{Instruction, Opcode};

/// Read cursor over a shared, immutable instruction sequence
#[derive(Debug, Clone)]
pub struct InstructionStream {
    instructions: Rc<[Instruction]>,
    /// Byte position of every instruction, followed by the total byte length
    positions: Rc<[usize]>,
    /// `None` once invalidated
    cursor: Option<usize>,
}

impl Default for InstructionStream {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InstructionStream {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let mut positions = Vec::with_capacity(instructions.len() + 1);
        let mut total = 0usize;
        for inst in &instructions {
            positions.push(total);
            total += inst.size;
        }
        positions.push(total);
        Self {
            instructions: instructions.into(),
            positions: positions.into(),
            cursor: Some(0),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn total_bytes(&self) -> usize {
        self.positions.last().copied().unwrap_or(0)
    }

    /// Current instruction index
    pub fn index(&self) -> Option<usize> {
        self.cursor
    }

    /// Byte position of the current instruction; the total length at the end
    pub fn position(&self) -> Option<usize> {
        self.cursor.and_then(|i| self.position_of(i))
    }

    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.positions.get(index).copied()
    }

    /// Index of the instruction starting at `position`; `len()` for the end of the stream
    pub fn index_at_position(&self, position: usize) -> Option<usize> {
        self.positions.binary_search(&position).ok()
    }

    pub fn current(&self) -> Option<&Instruction> {
        self.cursor.and_then(|i| self.instructions.get(i))
    }

    pub fn advance(&mut self) {
        if let Some(i) = self.cursor {
            self.cursor = Some((i + 1).min(self.len()));
        }
    }

    /// Move to an instruction index; out-of-range indices invalidate the cursor
    pub fn seek_index(&mut self, index: usize) {
        self.cursor = (index <= self.len()).then_some(index);
    }

    pub fn invalidate(&mut self) {
        self.cursor = None;
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.is_none_or(|i| i >= self.len())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Branching
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Resolve a byte offset taken from the instruction at `from`
    fn resolve(&self, from: usize, offset: i64) -> Result<usize, VmError> {
        let base = self.position_of(from).unwrap_or_else(|| self.total_bytes());
        let invalid = VmError::InvalidBranch {
            offset,
            position: base,
        };
        let base = i64::try_from(base).map_err(|_| invalid.clone())?;
        let target = usize::try_from(base + offset).map_err(|_| invalid.clone())?;
        self.index_at_position(target).ok_or(invalid)
    }

    /// Index a branch from the current instruction would land on
    pub fn target_index(&self, offset: i64) -> Result<usize, VmError> {
        self.resolve(self.cursor.unwrap_or(self.len()), offset)
    }

    /// Reposition relative to the current instruction's byte position.
    /// Landing on the end of the stream finishes it.
    pub fn branch(&mut self, offset: i64) -> Result<(), VmError> {
        let target = self.target_index(offset)?;
        self.cursor = Some(target);
        Ok(())
    }

    /// Check every branch in the stream lands on an instruction boundary
    pub fn validate_branches(&self) -> Result<(), VmError> {
        for (index, inst) in self.instructions.iter().enumerate() {
            if inst.opcode.is_branch() {
                self.resolve(index, inst.branch_offset()?)?;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // Sub-ranges
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Carve out the instructions spanning exactly `byte_length` bytes from the
    /// cursor. Used for function bodies.
    pub fn extract_subrange(
        &mut self,
        byte_length: usize,
        advance: bool,
        append_end: bool,
    ) -> Result<InstructionStream, VmError> {
        let start = self.cursor.unwrap_or(self.len());
        let start_position = self.position_of(start).unwrap_or_else(|| self.total_bytes());
        let invalid = VmError::InvalidSubrange {
            length: byte_length,
            position: start_position,
        };
        let end = self
            .index_at_position(start_position + byte_length)
            .ok_or(invalid.clone())?;
        let mut body = self.instructions.get(start..end).ok_or(invalid)?.to_vec();
        if append_end {
            body.push(Instruction::simple(Opcode::End));
        }
        if advance {
            self.cursor = Some(end);
        }
        Ok(InstructionStream::new(body))
    }
}
