//! Atomic parameters
//!
//! Scalar parameters the control thread writes and the render thread reads
//! once per block, without locks.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe atomic parameter using bit-cast f32.
#[derive(Debug)]
pub struct AtomicParam {
    value: AtomicU32,
    min: f32,
    max: f32,
    default: f32,
}

impl AtomicParam {
    /// Create a new atomic parameter with range and default.
    pub fn new(default: f32, min: f32, max: f32) -> Self {
        Self {
            value: AtomicU32::new(default.to_bits()),
            min,
            max,
            default,
        }
    }

    /// Set the parameter value, clamped to its range.
    #[inline]
    pub fn set(&self, v: f32) {
        let clamped = v.clamp(self.min, self.max);
        self.value.store(clamped.to_bits(), Ordering::Release);
    }

    /// Get the parameter value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Restore the default value.
    pub fn reset(&self) {
        self.set(self.default);
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn default_value(&self) -> f32 {
        self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clamps_to_range() {
        let param = AtomicParam::new(0.5, 0.0, 1.0);
        param.set(2.0);
        assert_eq!(param.get(), 1.0);
        param.set(-1.0);
        assert_eq!(param.get(), 0.0);
        param.reset();
        assert_eq!(param.get(), 0.5);
    }

    #[test]
    fn test_shared_across_threads() {
        let param = std::sync::Arc::new(AtomicParam::new(0.0, -1.0, 1.0));
        let writer = std::sync::Arc::clone(&param);
        std::thread::spawn(move || writer.set(0.25)).join().unwrap();
        assert_eq!(param.get(), 0.25);
    }
}
