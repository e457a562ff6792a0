use crate::input::Hand;
use crate::math::Pose;

/// Ordered cube poses. Entries 0 and 1 follow the left and right hands;
/// every later entry is a cube placed with the select action and never moves.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    cubes: Vec<Pose>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub const HAND_CUBES: usize = Hand::BOTH.len();

    pub fn new() -> Self {
        Self {
            cubes: vec![Pose::IDENTITY; Self::HAND_CUBES],
        }
    }

    pub fn cubes(&self) -> &[Pose] {
        &self.cubes
    }

    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    pub fn hand_cube(&self, hand: Hand) -> Pose {
        self.cubes[hand.index()]
    }

    pub fn set_hand_cube(&mut self, hand: Hand, pose: Pose) {
        self.cubes[hand.index()] = pose;
    }

    /// Appends a cube frozen at `pose`.
    pub fn place(&mut self, pose: Pose) {
        self.cubes.push(pose);
    }

    pub fn placed(&self) -> &[Pose] {
        &self.cubes[Self::HAND_CUBES..]
    }
}
