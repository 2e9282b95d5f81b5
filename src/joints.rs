//! Joint-index permutation between hardware order and canonical order.
//!
//! The hand's motor bus numbers joints differently from the canonical
//! finger-major order used by saved gesture files, and hardware positions
//! carry a +π radian offset so that the canonical zero pose sits mid-range.
//! Every component that crosses that boundary goes through this one
//! mapping; no call site does its own index arithmetic.

pub const JOINT_COUNT: usize = 16;

/// A full 16-joint pose vector, in whichever order the context declares.
pub type Pose = [f64; JOINT_COUNT];

/// Hardware motor id for each canonical index.
const HARDWARE_OF_CANONICAL: [usize; JOINT_COUNT] =
    [9, 8, 10, 11, 5, 4, 6, 7, 1, 0, 2, 3, 12, 13, 14, 15];

/// Offset added when converting canonical radians to hardware positions.
pub const HARDWARE_OFFSET: f64 = 3.14159;

/// Bidirectional hardware ↔ canonical joint mapping.
#[derive(Debug, Clone, Copy)]
pub struct JointMap {
    hw_of_canon: [usize; JOINT_COUNT],
    canon_of_hw: [usize; JOINT_COUNT],
}

impl Default for JointMap {
    fn default() -> Self {
        Self::new()
    }
}

impl JointMap {
    pub fn new() -> Self {
        let hw_of_canon = HARDWARE_OF_CANONICAL;
        let mut canon_of_hw = [0usize; JOINT_COUNT];
        for (canon, &hw) in hw_of_canon.iter().enumerate() {
            canon_of_hw[hw] = canon;
        }
        Self {
            hw_of_canon,
            canon_of_hw,
        }
    }

    /// Canonical (saved-format) radians → absolute hardware positions.
    pub fn to_hardware(&self, canonical: &Pose) -> Pose {
        let mut hw = [0.0; JOINT_COUNT];
        for (canon, &value) in canonical.iter().enumerate() {
            hw[self.hw_of_canon[canon]] = value + HARDWARE_OFFSET;
        }
        hw
    }

    /// Absolute hardware positions → canonical (saved-format) radians.
    pub fn to_canonical(&self, hardware: &Pose) -> Pose {
        let mut canon = [0.0; JOINT_COUNT];
        for (hw, &value) in hardware.iter().enumerate() {
            canon[self.canon_of_hw[hw]] = value - HARDWARE_OFFSET;
        }
        canon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_a_permutation() {
        let map = JointMap::new();
        let mut seen = [false; JOINT_COUNT];
        for &hw in &map.hw_of_canon {
            assert!(!seen[hw], "duplicate hardware index {}", hw);
            seen[hw] = true;
        }
    }

    #[test]
    fn test_hardware_round_trip() {
        let map = JointMap::new();
        let mut canonical = [0.0; JOINT_COUNT];
        for (i, v) in canonical.iter_mut().enumerate() {
            *v = i as f64 * 0.1 - 0.8;
        }
        let back = map.to_canonical(&map.to_hardware(&canonical));
        for (a, b) in canonical.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_offset_applied_per_joint() {
        let map = JointMap::new();
        let hw = map.to_hardware(&[0.0; JOINT_COUNT]);
        for v in hw {
            assert!((v - HARDWARE_OFFSET).abs() < 1e-12);
        }
    }

    #[test]
    fn test_canonical_zero_lands_on_expected_motor() {
        let map = JointMap::new();
        let mut canonical = [0.0; JOINT_COUNT];
        canonical[0] = 0.5;
        let hw = map.to_hardware(&canonical);
        // Canonical index 0 is wired to motor 9.
        assert!((hw[9] - (0.5 + HARDWARE_OFFSET)).abs() < 1e-12);
    }
}
