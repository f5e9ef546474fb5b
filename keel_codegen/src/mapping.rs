//! Memo tables from source entities to their target counterparts.
//!
//! Every lookup creates on first miss and returns the same handle afterwards,
//! so a source variable, block or constant has exactly one target
//! counterpart per method.

use std::collections::HashMap;

use keel_ir::types::Kind;
use keel_ir::value::{BlockRef, ConstValue, Constant, VarRef};
use keel_target::method::TargetMethod;
use keel_target::value::{BlockId, ConstId, ConstPayload, TargetConstant, VarId};
use num_traits::ToPrimitive;

use crate::error::LoweringError;

/// Widen a source literal to a target constant.
///
/// Integers narrower than 64 bits become sign-extended `Word`s. `Word`
/// literals may use the full unsigned range.
pub fn widen_constant(c: &Constant) -> Result<TargetConstant, LoweringError> {
    let kind = c.kind.widened();
    let payload = match &c.value {
        ConstValue::Int(v) => {
            let bits = v
                .to_i64()
                .map(|x| x as u64)
                .or_else(|| if c.kind == Kind::Word { v.to_u64() } else { None })
                .ok_or_else(|| LoweringError::ConstantOutOfRange(v.to_string()))?;
            ConstPayload::Bits(bits)
        }
        ConstValue::Float(bits) => ConstPayload::Bits(*bits),
        ConstValue::Null => ConstPayload::Null,
        ConstValue::Object(h) => ConstPayload::Object(*h),
    };
    Ok(TargetConstant { kind, payload })
}

/// Whether a zero literal of `kind` must be materialized instead of being
/// used as an immediate.
pub fn needs_materialized_zero(c: &Constant) -> bool {
    let wide_integral = c.kind.is_integral() && c.kind.width() == 64;
    c.is_zero() && (wide_integral || c.kind.is_floating())
}

/// Per-method memo tables.
#[derive(Debug)]
pub struct ValueMap {
    vars: Vec<Option<VarId>>,
    blocks: Vec<Option<BlockId>>,
    constants: HashMap<TargetConstant, ConstId>,
}

impl ValueMap {
    pub fn new(var_count: usize, block_count: usize) -> Self {
        Self {
            vars: vec![None; var_count],
            blocks: vec![None; block_count],
            constants: HashMap::new(),
        }
    }

    /// Bind a source variable to an existing target variable.
    pub fn bind_var(&mut self, src: VarRef, dst: VarId) -> Result<(), LoweringError> {
        let slot = self
            .vars
            .get_mut(src.index() as usize)
            .ok_or(LoweringError::UnmappedVariable(src.index()))?;
        *slot = Some(dst);
        Ok(())
    }

    /// The target variable of `src`, created with `kind` on first use.
    pub fn var(
        &mut self,
        src: VarRef,
        kind: Kind,
        out: &mut TargetMethod,
    ) -> Result<VarId, LoweringError> {
        let slot = self
            .vars
            .get_mut(src.index() as usize)
            .ok_or(LoweringError::UnmappedVariable(src.index()))?;
        Ok(*slot.get_or_insert_with(|| out.new_var(kind)))
    }

    pub fn bind_block(&mut self, src: BlockRef, dst: BlockId) -> Result<(), LoweringError> {
        let slot = self
            .blocks
            .get_mut(src.index() as usize)
            .ok_or(LoweringError::UnmappedBlock(src.index()))?;
        *slot = Some(dst);
        Ok(())
    }

    /// Blocks are all created up front, so a miss is a fault.
    pub fn block(&self, src: BlockRef) -> Result<BlockId, LoweringError> {
        self.blocks
            .get(src.index() as usize)
            .copied()
            .flatten()
            .ok_or(LoweringError::UnmappedBlock(src.index()))
    }

    /// Intern a literal, deduplicated by widened kind and bit pattern.
    pub fn constant(
        &mut self,
        c: &Constant,
        out: &mut TargetMethod,
    ) -> Result<ConstId, LoweringError> {
        let widened = widen_constant(c)?;
        Ok(*self
            .constants
            .entry(widened)
            .or_insert_with(|| out.new_constant(widened)))
    }

    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }
}
