//! Workloads: what gets timed.
//!
//! The sweep core only sees [`WorkloadProvider`] and its opaque unit type.
//! [`RandomCircuitProvider`] is the stock provider producing random circuits
//! over a fixed basis for a given qubit count.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::error::WorkloadError;

/// One row of the sweep (here: a qubit count).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkloadSize(pub usize);

impl WorkloadSize {
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkloadSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for WorkloadSize {
    fn from(n: usize) -> Self {
        Self(n)
    }
}

/// Produces runnable units for a size.
///
/// Must be deterministic for a fixed configuration, and safe to call once per
/// `(size, repeat)` when units are single-use.
pub trait WorkloadProvider {
    /// The runnable unit handed to backends.
    type Unit;

    fn produce(&self, size: WorkloadSize) -> Result<Self::Unit, WorkloadError>;
}

/// A gate from the benchmark basis `{x, y, z, h, s, t, cx, rx, ry, rz}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gate {
    X(usize),
    Y(usize),
    Z(usize),
    H(usize),
    S(usize),
    T(usize),
    Rx(usize, f64),
    Ry(usize, f64),
    Rz(usize, f64),
    Cx { control: usize, target: usize },
}

impl Gate {
    /// Highest qubit index touched by this gate.
    pub fn max_qubit(&self) -> usize {
        match *self {
            Gate::X(q)
            | Gate::Y(q)
            | Gate::Z(q)
            | Gate::H(q)
            | Gate::S(q)
            | Gate::T(q)
            | Gate::Rx(q, _)
            | Gate::Ry(q, _)
            | Gate::Rz(q, _) => q,
            Gate::Cx { control, target } => control.max(target),
        }
    }
}

/// A circuit over `num_qubits` qubits starting in |0...0⟩.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    num_qubits: usize,
    gates: Vec<Gate>,
}

impl Circuit {
    pub fn new(num_qubits: usize) -> Self {
        Self {
            num_qubits,
            gates: Vec::new(),
        }
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Append a gate. Gates touching qubits outside the circuit are rejected.
    pub fn push(&mut self, gate: Gate) -> bool {
        if gate.max_qubit() >= self.num_qubits {
            return false;
        }
        self.gates.push(gate);
        true
    }
}

/// Seeded random circuits of fixed depth.
#[derive(Debug, Clone)]
pub struct RandomCircuitProvider {
    depth: usize,
    seed: u64,
}

impl RandomCircuitProvider {
    pub fn new(depth: usize, seed: u64) -> Self {
        Self { depth, seed }
    }

    /// Generate a random circuit of `num_qubits` width.
    ///
    /// Each layer shuffles the qubits and greedily covers them with one- and
    /// two-qubit gates, so every qubit is acted on once per layer.
    pub fn generate(&self, num_qubits: usize) -> Circuit {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut circuit = Circuit::new(num_qubits);
        let mut qubits: Vec<usize> = (0..num_qubits).collect();

        for _layer in 0..self.depth {
            qubits.shuffle(&mut rng);
            let mut remaining = qubits.as_slice();

            while !remaining.is_empty() {
                let two_qubit = remaining.len() >= 2 && rng.gen_bool(0.5);
                if two_qubit {
                    circuit.push(Gate::Cx {
                        control: remaining[0],
                        target: remaining[1],
                    });
                    remaining = &remaining[2..];
                } else {
                    let q = remaining[0];
                    let angle = rng.gen_range(0.0..2.0 * PI);
                    let gate = match rng.gen_range(0..9) {
                        0 => Gate::X(q),
                        1 => Gate::Y(q),
                        2 => Gate::Z(q),
                        3 => Gate::H(q),
                        4 => Gate::S(q),
                        5 => Gate::T(q),
                        6 => Gate::Rx(q, angle),
                        7 => Gate::Ry(q, angle),
                        _ => Gate::Rz(q, angle),
                    };
                    circuit.push(gate);
                    remaining = &remaining[1..];
                }
            }
        }

        circuit
    }
}

impl WorkloadProvider for RandomCircuitProvider {
    type Unit = Circuit;

    fn produce(&self, size: WorkloadSize) -> Result<Circuit, WorkloadError> {
        if size.get() == 0 {
            return Err(WorkloadError::new(size, "a circuit needs at least one qubit"));
        }
        Ok(self.generate(size.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_generate_identical_circuits_when_seed_fixed() {
        let provider = RandomCircuitProvider::new(10, 42);
        let a = provider.produce(WorkloadSize(6)).unwrap();
        let b = provider.produce(WorkloadSize(6)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn should_cover_every_qubit_once_per_layer() {
        let provider = RandomCircuitProvider::new(3, 7);
        let circuit = provider.generate(5);

        let mut touched = 0;
        for gate in circuit.gates() {
            touched += match gate {
                Gate::Cx { .. } => 2,
                _ => 1,
            };
        }
        assert_eq!(touched, 5 * 3);
        assert!(circuit.gates().iter().all(|g| g.max_qubit() < 5));
    }

    #[test]
    fn should_reject_zero_width_workload() {
        let provider = RandomCircuitProvider::new(10, 42);
        assert!(provider.produce(WorkloadSize(0)).is_err());
    }

    #[test]
    fn should_reject_gate_outside_circuit() {
        let mut circuit = Circuit::new(2);
        assert!(circuit.push(Gate::H(1)));
        assert!(!circuit.push(Gate::Cx {
            control: 0,
            target: 2
        }));
        assert_eq!(circuit.gates().len(), 1);
    }
}
