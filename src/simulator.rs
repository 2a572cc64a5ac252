//! Built-in statevector simulator and the stock backend set.
//!
//! The simulator applies circuit gates to a dense vector of `2^n` amplitudes
//! in single or double precision. The GPU configurations exist so a sweep can
//! name them; this build carries no GPU kernels, so they fail to initialize
//! and are excluded by the registry.

use num_complex::Complex;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use tracing::debug;

use crate::backend::{Backend, Completion};
use crate::config::{Precision, SweepConfig};
use crate::error::{ConfigError, ExecutionError, InitError};
use crate::registry::BackendRegistry;
use crate::workload::{Circuit, Gate};

/// Default widest circuit the simulator accepts (2^28 amplitudes).
pub const DEFAULT_MAX_QUBITS: usize = 28;

/// Scalar type of amplitude components.
pub trait Real:
    Copy
    + fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;
    /// Allowed drift of the total probability from 1.
    const NORM_TOLERANCE: f64;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Real for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const NORM_TOLERANCE: f64 = 1e-3;

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Real for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const NORM_TOLERANCE: f64 = 1e-8;

    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }
}

#[inline]
fn cmul<T: Real>(a: Complex<T>, b: Complex<T>) -> Complex<T> {
    Complex::new(a.re * b.re - a.im * b.im, a.re * b.im + a.im * b.re)
}

#[inline]
fn cadd<T: Real>(a: Complex<T>, b: Complex<T>) -> Complex<T> {
    Complex::new(a.re + b.re, a.im + b.im)
}

#[inline]
fn cscale<T: Real>(a: Complex<T>, s: T) -> Complex<T> {
    Complex::new(a.re * s, a.im * s)
}

fn polar<T: Real>(theta: f64) -> Complex<T> {
    Complex::new(T::from_f64(theta.cos()), T::from_f64(theta.sin()))
}

/// A dense statevector.
pub struct Statevector<T: Real> {
    amplitudes: Vec<Complex<T>>,
    num_qubits: usize,
}

impl<T: Real> Statevector<T> {
    /// |0...0⟩ on `num_qubits` qubits.
    ///
    /// Fails instead of aborting when `2^num_qubits` amplitudes cannot be
    /// addressed or allocated.
    pub fn try_new(num_qubits: usize) -> Result<Self, ExecutionError> {
        let len = u32::try_from(num_qubits)
            .ok()
            .and_then(|n| 1usize.checked_shl(n))
            .ok_or_else(|| {
                ExecutionError::new(format!(
                    "{num_qubits} qubits exceed the addressable statevector size"
                ))
            })?;

        let mut amplitudes = Vec::new();
        amplitudes.try_reserve_exact(len).map_err(|err| {
            ExecutionError::new(format!(
                "insufficient memory for {num_qubits}-qubit statevector: {err}"
            ))
        })?;
        amplitudes.resize(len, Complex::new(T::ZERO, T::ZERO));
        amplitudes[0] = Complex::new(T::ONE, T::ZERO);

        Ok(Self {
            amplitudes,
            num_qubits,
        })
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn amplitudes(&self) -> &[Complex<T>] {
        &self.amplitudes
    }

    /// Total probability, accumulated in f64.
    pub fn norm_sqr(&self) -> f64 {
        self.amplitudes
            .iter()
            .map(|a| {
                let (re, im) = (a.re.to_f64(), a.im.to_f64());
                re * re + im * im
            })
            .sum()
    }

    pub fn apply(&mut self, gate: &Gate) {
        let frac_1_sqrt2 = T::from_f64(std::f64::consts::FRAC_1_SQRT_2);
        match *gate {
            Gate::X(q) => self.for_pairs(q, |a, b| (b, a)),
            Gate::Y(q) => self.for_pairs(q, |a, b| {
                // Y = [[0, -i], [i, 0]]
                (Complex::new(b.im, -b.re), Complex::new(-a.im, a.re))
            }),
            Gate::Z(q) => self.phase(q, Complex::new(-T::ONE, T::ZERO)),
            Gate::H(q) => self.for_pairs(q, |a, b| {
                (
                    cscale(cadd(a, b), frac_1_sqrt2),
                    cscale(Complex::new(a.re - b.re, a.im - b.im), frac_1_sqrt2),
                )
            }),
            Gate::S(q) => self.phase(q, polar(std::f64::consts::FRAC_PI_2)),
            Gate::T(q) => self.phase(q, polar(std::f64::consts::FRAC_PI_4)),
            Gate::Rx(q, theta) => {
                let c = Complex::new(T::from_f64((theta / 2.0).cos()), T::ZERO);
                let neg_i_s = Complex::new(T::ZERO, T::from_f64(-(theta / 2.0).sin()));
                self.for_pairs(q, |a, b| {
                    (
                        cadd(cmul(c, a), cmul(neg_i_s, b)),
                        cadd(cmul(neg_i_s, a), cmul(c, b)),
                    )
                })
            }
            Gate::Ry(q, theta) => {
                let c = T::from_f64((theta / 2.0).cos());
                let s = T::from_f64((theta / 2.0).sin());
                self.for_pairs(q, |a, b| {
                    (
                        Complex::new(c * a.re - s * b.re, c * a.im - s * b.im),
                        Complex::new(s * a.re + c * b.re, s * a.im + c * b.im),
                    )
                })
            }
            Gate::Rz(q, theta) => {
                let p0 = polar(-theta / 2.0);
                let p1 = polar(theta / 2.0);
                self.for_pairs(q, |a, b| (cmul(a, p0), cmul(b, p1)))
            }
            Gate::Cx { control, target } => {
                let cmask = 1 << control;
                let tmask = 1 << target;
                for i in 0..self.amplitudes.len() {
                    if i & cmask != 0 && i & tmask == 0 {
                        self.amplitudes.swap(i, i | tmask);
                    }
                }
            }
        }
    }

    /// Apply a 2x2 update to every amplitude pair differing in bit `qubit`.
    fn for_pairs<F>(&mut self, qubit: usize, f: F)
    where
        F: Fn(Complex<T>, Complex<T>) -> (Complex<T>, Complex<T>),
    {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let (a, b) = f(self.amplitudes[i], self.amplitudes[j]);
                self.amplitudes[i] = a;
                self.amplitudes[j] = b;
            }
        }
    }

    /// Multiply every amplitude with bit `qubit` set by `phase`.
    fn phase(&mut self, qubit: usize, phase: Complex<T>) {
        let mask = 1 << qubit;
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            if i & mask != 0 {
                *amp = cmul(*amp, phase);
            }
        }
    }
}

/// Where the statevector lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu { custatevec: bool },
}

impl Device {
    /// The stock backend name for this device configuration.
    pub fn backend_name(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu { custatevec: false } => "gpu_default",
            Device::Gpu { custatevec: true } => "gpu_custatevec",
        }
    }

    pub fn from_backend_name(name: &str) -> Option<Self> {
        match name {
            "cpu" => Some(Device::Cpu),
            "gpu_default" => Some(Device::Gpu { custatevec: false }),
            "gpu_custatevec" => Some(Device::Gpu { custatevec: true }),
            _ => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu { custatevec: false } => write!(f, "GPU (default)"),
            Device::Gpu { custatevec: true } => write!(f, "GPU (cuStateVec)"),
        }
    }
}

/// Statevector simulation of [`Circuit`]s.
#[derive(Debug)]
pub struct StatevectorBackend {
    device: Device,
    precision: Precision,
    max_qubits: usize,
}

impl StatevectorBackend {
    /// Acquire a simulator on `device`.
    pub fn initialize(device: Device, precision: Precision) -> Result<Self, InitError> {
        if let Device::Gpu { .. } = device {
            return Err(InitError::new(format!(
                "{device} statevector simulation is not supported: no GPU kernels in this build"
            )));
        }
        Ok(Self {
            device,
            precision,
            max_qubits: DEFAULT_MAX_QUBITS,
        })
    }

    pub fn with_max_qubits(mut self, max_qubits: usize) -> Self {
        self.max_qubits = max_qubits;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    fn simulate<T: Real>(circuit: &Circuit) -> Result<Completion, ExecutionError> {
        let mut state = Statevector::<T>::try_new(circuit.num_qubits())?;
        for gate in circuit.gates() {
            state.apply(gate);
        }

        let drift = (state.norm_sqr() - 1.0).abs();
        if drift > T::NORM_TOLERANCE {
            return Ok(Completion::Failed(format!(
                "statevector lost normalization (|1 - norm| = {drift:.3e})"
            )));
        }
        std::hint::black_box(state.amplitudes());
        Ok(Completion::Succeeded)
    }
}

impl Backend<Circuit> for StatevectorBackend {
    fn execute(&mut self, circuit: &Circuit) -> Result<Completion, ExecutionError> {
        if circuit.num_qubits() > self.max_qubits {
            return Err(ExecutionError::new(format!(
                "circuit has {} qubits but {} supports at most {}",
                circuit.num_qubits(),
                self.device,
                self.max_qubits
            )));
        }
        debug!(
            device = %self.device,
            qubits = circuit.num_qubits(),
            gates = circuit.gates().len(),
            "simulating circuit"
        );
        match self.precision {
            Precision::Single => Self::simulate::<f32>(circuit),
            Precision::Double => Self::simulate::<f64>(circuit),
        }
    }
}

/// Register the selected stock backends in canonical order.
pub fn standard_registry(config: &SweepConfig) -> Result<BackendRegistry<Circuit>, ConfigError> {
    let mut registry = BackendRegistry::new();
    for name in config.backends.resolve()? {
        let device = Device::from_backend_name(name)
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_string()))?;
        let precision = config.precision;
        registry
            .register(name, move || StatevectorBackend::initialize(device, precision))
            .map_err(|err| ConfigError::InvalidValue {
                key: "backends",
                value: err.to_string(),
            })?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSelection;
    use crate::trial::{run_trial, UnitSource};

    fn probabilities<T: Real>(state: &Statevector<T>) -> Vec<f64> {
        state
            .amplitudes()
            .iter()
            .map(|a| a.re.to_f64().powi(2) + a.im.to_f64().powi(2))
            .collect()
    }

    #[test]
    fn should_prepare_bell_state() {
        let mut state = Statevector::<f64>::try_new(2).unwrap();
        state.apply(&Gate::H(0));
        state.apply(&Gate::Cx {
            control: 0,
            target: 1,
        });

        let p = probabilities(&state);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!(p[1].abs() < 1e-12);
        assert!(p[2].abs() < 1e-12);
        assert!((p[3] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn should_flip_with_x_and_y() {
        let mut state = Statevector::<f64>::try_new(1).unwrap();
        state.apply(&Gate::X(0));
        assert!((probabilities(&state)[1] - 1.0).abs() < 1e-12);

        state.apply(&Gate::Y(0));
        // Y|1⟩ = -i|0⟩
        let a0 = state.amplitudes()[0];
        assert!(a0.re.abs() < 1e-12);
        assert!((a0.im + 1.0).abs() < 1e-12);
    }

    #[test]
    fn should_preserve_norm_through_rotations() {
        let mut state = Statevector::<f32>::try_new(3).unwrap();
        for q in 0..3 {
            state.apply(&Gate::H(q));
            state.apply(&Gate::Rx(q, 0.3));
            state.apply(&Gate::Ry(q, 1.1));
            state.apply(&Gate::Rz(q, 2.7));
            state.apply(&Gate::T(q));
            state.apply(&Gate::S(q));
            state.apply(&Gate::Z(q));
        }
        assert!((state.norm_sqr() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn should_fail_to_initialize_gpu_devices() {
        let err = StatevectorBackend::initialize(Device::Gpu { custatevec: true }, Precision::Double)
            .unwrap_err();
        assert!(err.reason.contains("cuStateVec"));
    }

    #[test]
    fn should_reject_circuit_wider_than_limit() {
        let mut backend = StatevectorBackend::initialize(Device::Cpu, Precision::Double)
            .unwrap()
            .with_max_qubits(2);
        let err = backend.execute(&Circuit::new(3)).unwrap_err();
        assert!(err.message.contains("at most 2"));
        assert_eq!(backend.execute(&Circuit::new(2)), Ok(Completion::Succeeded));
    }

    #[test]
    fn should_report_error_when_statevector_cannot_be_allocated() {
        let mut backend = StatevectorBackend::initialize(Device::Cpu, Precision::Double)
            .unwrap()
            .with_max_qubits(128);

        // 2^60 amplitudes of 16 bytes overflow the address space.
        let err = backend.execute(&Circuit::new(60)).unwrap_err();
        assert!(err.message.contains("insufficient memory"));

        let err = backend.execute(&Circuit::new(64)).unwrap_err();
        assert!(err.message.contains("addressable"));
    }

    #[test]
    fn should_fail_only_the_cell_when_allocation_fails() {
        let mut backend = StatevectorBackend::initialize(Device::Cpu, Precision::Single)
            .unwrap()
            .with_max_qubits(128);
        let wide = Circuit::new(62);

        let outcome = run_trial(&mut backend, UnitSource::Shared(&wide), 2, true);
        assert!(outcome.failure_message().unwrap().contains("insufficient memory"));

        let narrow = Circuit::new(2);
        let outcome = run_trial(&mut backend, UnitSource::Shared(&narrow), 2, false);
        assert!(outcome.is_success());
    }

    #[test]
    fn should_register_only_cpu_as_active_in_stock_registry() {
        let registry = standard_registry(&SweepConfig::default()).unwrap();
        assert_eq!(registry.active_names(), vec!["cpu"]);
        assert_eq!(registry.excluded().count(), 2);
    }

    #[test]
    fn should_reject_unknown_backend_selection() {
        let config = SweepConfig::default().backends(BackendSelection::Only(vec!["tpu".into()]));
        assert!(matches!(
            standard_registry(&config),
            Err(ConfigError::UnknownBackend(_))
        ));
    }
}
