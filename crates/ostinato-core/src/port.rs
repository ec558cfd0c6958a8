//! Ports: named, typed parameter cells owned by recall templates.
//!
//! All reads and writes go through [`Port::safe_read`] / [`Port::safe_write`],
//! serialized by the port's own lock. That lock is also what marshals a value
//! written from a non-real-time thread (a UI spin button, a protocol handler)
//! into the tick-synchronous world; visibility at the next tick is guaranteed
//! by the lock, no extra fencing.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Value held by a port.
#[derive(Clone)]
pub enum PortValue {
    Float(f32),
    Double(f64),
    Bool(bool),
    /// Opaque pointer-valued payload (e.g. a wave table, an envelope shape).
    Object(Arc<dyn Any + Send + Sync>),
}

impl core::fmt::Debug for PortValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PortValue::Float(v) => write!(f, "Float({v})"),
            PortValue::Double(v) => write!(f, "Double({v})"),
            PortValue::Bool(v) => write!(f, "Bool({v})"),
            PortValue::Object(_) => write!(f, "Object(..)"),
        }
    }
}

/// How a port value maps between its normalized and real form.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PortScale {
    /// `real = min + normalized * (max - min)`
    #[default]
    Linear,

    /// `real = min * (max/min)^normalized`; requires `min > 0`.
    Logarithmic,
}

/// Unit-conversion hints attached to a port: value range, scale, and an
/// optional samplerate reference for rate-dependent units (delay lengths,
/// filter coefficients tuned at a reference rate).
#[derive(Debug, Clone, Copy)]
pub struct PortConversion {
    pub min: f32,
    pub max: f32,
    pub scale: PortScale,
    /// Samplerate the min/max/default were specified at, if the unit scales
    /// with the rate.
    pub reference_samplerate: Option<u32>,
}

impl PortConversion {
    pub fn linear(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            scale: PortScale::Linear,
            reference_samplerate: None,
        }
    }

    pub fn logarithmic(min: f32, max: f32) -> Self {
        debug_assert!(min > 0.0, "logarithmic scale requires min > 0");
        Self {
            min,
            max,
            scale: PortScale::Logarithmic,
            reference_samplerate: None,
        }
    }

    pub fn with_reference_samplerate(mut self, samplerate: u32) -> Self {
        self.reference_samplerate = Some(samplerate);
        self
    }

    /// Convert a real value to normalized (0.0-1.0).
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let value = value.clamp(self.min, self.max);
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }

        match self.scale {
            PortScale::Linear => (value - self.min) / range,
            PortScale::Logarithmic => {
                if self.min <= 0.0 {
                    (value - self.min) / range
                } else {
                    let log_min = self.min.ln();
                    let log_max = self.max.ln();
                    (value.ln() - log_min) / (log_max - log_min)
                }
            }
        }
    }

    /// Convert a normalized value (0.0-1.0) to a real value.
    #[inline]
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        let range = self.max - self.min;

        match self.scale {
            PortScale::Linear => self.min + normalized * range,
            PortScale::Logarithmic => {
                if self.min <= 0.0 {
                    self.min + normalized * range
                } else {
                    let log_min = self.min.ln();
                    let log_max = self.max.ln();
                    (log_min + normalized * (log_max - log_min)).exp()
                }
            }
        }
    }

    /// Rescale a real value from the reference samplerate to `samplerate`.
    /// Identity when no reference is set.
    #[inline]
    pub fn scale_to_samplerate(&self, value: f32, samplerate: u32) -> f32 {
        match self.reference_samplerate {
            Some(reference) if reference != 0 => {
                value * samplerate as f32 / reference as f32
            }
            _ => value,
        }
    }
}

/// A named, typed parameter cell.
///
/// A port belongs to a recall template and is shared by reference with every
/// instance duplicated from that template. It may mirror a native plugin's
/// control port 1:1, in which case `plugin_port` holds the control index the
/// hosting recall connects at instantiation time.
pub struct Port {
    name: String,
    conversion: Option<PortConversion>,
    plugin_port: Option<u32>,
    value: Mutex<PortValue>,
}

impl Port {
    pub fn new(name: impl Into<String>, value: PortValue) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            conversion: None,
            plugin_port: None,
            value: Mutex::new(value),
        })
    }

    pub fn with_conversion(
        name: impl Into<String>,
        value: PortValue,
        conversion: PortConversion,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            conversion: Some(conversion),
            plugin_port: None,
            value: Mutex::new(value),
        })
    }

    /// A float port mirrored to a native plugin control port.
    pub fn plugin_control(name: impl Into<String>, plugin_port: u32, default: f32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            conversion: None,
            plugin_port: Some(plugin_port),
            value: Mutex::new(PortValue::Float(default)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conversion(&self) -> Option<&PortConversion> {
        self.conversion.as_ref()
    }

    /// Control-port index of the mirrored plugin port, if any.
    pub fn plugin_port(&self) -> Option<u32> {
        self.plugin_port
    }

    /// Read the current value under the port's lock.
    pub fn safe_read(&self) -> PortValue {
        self.value.lock().clone()
    }

    /// Write a value under the port's lock.
    pub fn safe_write(&self, value: PortValue) {
        *self.value.lock() = value;
    }

    /// Read as f32, accepting Float or Double.
    pub fn safe_read_float(&self) -> Result<f32> {
        match self.safe_read() {
            PortValue::Float(v) => Ok(v),
            PortValue::Double(v) => Ok(v as f32),
            _ => Err(Error::PortTypeMismatch {
                port: self.name.clone(),
                expected: "float",
            }),
        }
    }

    /// Read as bool.
    pub fn safe_read_bool(&self) -> Result<bool> {
        match self.safe_read() {
            PortValue::Bool(v) => Ok(v),
            _ => Err(Error::PortTypeMismatch {
                port: self.name.clone(),
                expected: "bool",
            }),
        }
    }
}

impl core::fmt::Debug for Port {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("value", &*self.value.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_read_write() {
        let port = Port::new("volume", PortValue::Float(1.0));
        assert_eq!(port.safe_read_float().unwrap(), 1.0);

        port.safe_write(PortValue::Float(0.5));
        assert_eq!(port.safe_read_float().unwrap(), 0.5);
    }

    #[test]
    fn test_type_mismatch() {
        let port = Port::new("muted", PortValue::Bool(false));
        assert!(port.safe_read_float().is_err());
        assert!(port.safe_read_bool().is_ok());
    }

    #[test]
    fn test_shared_between_threads() {
        let port = Port::new("volume", PortValue::Float(0.0));
        let writer = port.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                writer.safe_write(PortValue::Float(i as f32));
            }
        });

        for _ in 0..100 {
            let _ = port.safe_read_float().unwrap();
        }
        handle.join().unwrap();
        assert_eq!(port.safe_read_float().unwrap(), 99.0);
    }

    #[test]
    fn test_logarithmic_conversion() {
        let conv = PortConversion::logarithmic(20.0, 20000.0);

        // Midpoint of a log range is the geometric mean.
        let mid = conv.denormalize(0.5);
        let expected = (20.0_f32 * 20000.0).sqrt();
        assert!((mid - expected).abs() / expected < 1e-4);

        for value in [20.0, 100.0, 1000.0, 20000.0] {
            let back = conv.denormalize(conv.normalize(value));
            assert!((value - back).abs() / value < 1e-3);
        }
    }

    #[test]
    fn test_samplerate_scaling() {
        let conv = PortConversion::linear(0.0, 4096.0).with_reference_samplerate(44100);
        let scaled = conv.scale_to_samplerate(441.0, 88200);
        assert!((scaled - 882.0).abs() < 1e-3);

        let unscaled = PortConversion::linear(0.0, 1.0).scale_to_samplerate(0.5, 96000);
        assert_eq!(unscaled, 0.5);
    }
}
