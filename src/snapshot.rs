//! Module state snapshots
//!
//! Every module serializes its tunable parameters into a fixed-size,
//! little-endian blob. The same blob is written to project files and kept
//! in undo records, so a destroyed node can be rebuilt through the factory.

use crate::dsp::registry::ModuleRegistry;
use crate::error::{Result, SongrackError};
use crate::graph::module::Module;

// ============================================================================
// Writer
// ============================================================================

/// Appends little-endian fields to a blob.
pub struct StateWriter<'a> {
    out: &'a mut Vec<u8>,
}

impl<'a> StateWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self { out }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.out.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(v as u8)
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.out.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.out.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.out.extend_from_slice(&v.to_le_bytes());
        self
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Reads little-endian fields from a blob. Every read returns `None` past
/// the end, so a short blob can never be half-applied.
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    /// Start reading `data`, but only if it is exactly `expected` bytes.
    pub fn exact(data: &'a [u8], expected: usize) -> Option<Self> {
        (data.len() == expected).then_some(Self { data, pos: 0 })
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn bool(&mut self) -> Option<bool> {
        self.u8().map(|b| b != 0)
    }

    pub fn i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    pub fn f32(&mut self) -> Option<f32> {
        self.take().map(f32::from_le_bytes)
    }

    pub fn f64(&mut self) -> Option<f64> {
        self.take().map(f64::from_le_bytes)
    }
}

// ============================================================================
// ModuleData
// ============================================================================

/// A module's type id together with its saved state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleData {
    pub module_id: String,
    pub blob: Vec<u8>,
}

impl ModuleData {
    /// Snapshot a live module.
    pub fn capture(module: &dyn Module) -> Self {
        let mut blob = Vec::with_capacity(module.state_size());
        module.save_state(&mut blob);
        Self {
            module_id: module.module_id().to_string(),
            blob,
        }
    }

    /// Build a fresh module of the captured type and load the saved state.
    pub fn restore(&self, registry: &ModuleRegistry, sample_rate: u32) -> Result<Box<dyn Module>> {
        let mut module = registry.create(&self.module_id, sample_rate).ok_or_else(|| {
            SongrackError::UnknownModule {
                id: self.module_id.clone(),
            }
        })?;
        load_into(module.as_mut(), &self.blob)?;
        Ok(module)
    }
}

/// Load a blob into a module, turning a rejection into an error.
pub fn load_into(module: &mut dyn Module, blob: &[u8]) -> Result<()> {
    if module.load_state(blob) {
        Ok(())
    } else {
        tracing::warn!(
            module = module.module_id(),
            expected = module.state_size(),
            actual = blob.len(),
            "state blob rejected"
        );
        Err(SongrackError::CorruptedState {
            module_id: module.module_id().to_string(),
            expected: module.state_size(),
            actual: blob.len(),
        })
    }
}
