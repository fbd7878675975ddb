// 2D smoothing kernels, all normalised so they integrate to one over the disc
use std::f32::consts::PI;

/// Analytic scaling factors of the kernels for one smoothing radius.
/// Computed once per settings change, never per step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelFactors {
    pub radius: f32,
    pub sqr_radius: f32,
    pub poly6: f32,
    pub spiky_pow3: f32,
    pub spiky_pow2: f32,
    pub spiky_pow3_derivative: f32,
    pub spiky_pow2_derivative: f32,
}

impl KernelFactors {
    pub fn new(h: f32) -> Self {
        Self {
            radius: h,
            sqr_radius: h * h,
            poly6: 4.0 / (PI * h.powi(8)),
            spiky_pow3: 10.0 / (PI * h.powi(5)),
            spiky_pow2: 6.0 / (PI * h.powi(4)),
            spiky_pow3_derivative: 30.0 / (PI * h.powi(5)),
            spiky_pow2_derivative: 12.0 / (PI * h.powi(4)),
        }
    }
}

#[inline]
pub fn poly6(dst: f32, k: &KernelFactors) -> f32 {
    if dst < k.radius {
        let v = k.sqr_radius - dst * dst;
        v * v * v * k.poly6
    } else {
        0.0
    }
}

#[inline]
pub fn spiky_pow3(dst: f32, k: &KernelFactors) -> f32 {
    if dst < k.radius {
        let v = k.radius - dst;
        v * v * v * k.spiky_pow3
    } else {
        0.0
    }
}

#[inline]
pub fn spiky_pow2(dst: f32, k: &KernelFactors) -> f32 {
    if dst < k.radius {
        let v = k.radius - dst;
        v * v * k.spiky_pow2
    } else {
        0.0
    }
}

#[inline]
pub fn derivative_spiky_pow3(dst: f32, k: &KernelFactors) -> f32 {
    if dst <= k.radius {
        let v = k.radius - dst;
        -v * v * k.spiky_pow3_derivative
    } else {
        0.0
    }
}

#[inline]
pub fn derivative_spiky_pow2(dst: f32, k: &KernelFactors) -> f32 {
    if dst <= k.radius {
        -(k.radius - dst) * k.spiky_pow2_derivative
    } else {
        0.0
    }
}
