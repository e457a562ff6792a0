//! Hand pose and select polling.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::math::Pose;
use crate::runtime::{SelectState, XrRuntime};
use crate::scene::Scene;
use crate::session::SessionLifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }

    /// Top-level user path used as the action subaction path.
    pub fn user_path(self) -> &'static str {
        match self {
            Hand::Left => "/user/hand/left",
            Hand::Right => "/user/hand/right",
        }
    }
}

/// Cached per-hand input, refreshed every poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandInputState {
    pub pose_active: bool,
    /// Last pose predicted for display; kept while tracking is briefly lost.
    pub pose: Pose,
    pub select: SelectState,
}

impl Default for HandInputState {
    fn default() -> Self {
        Self {
            pose_active: false,
            pose: Pose::IDENTITY,
            select: SelectState::released(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InputPoller {
    hands: [HandInputState; 2],
}

impl InputPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hand(&self, hand: Hand) -> &HandInputState {
        &self.hands[hand.index()]
    }

    pub fn hand_mut(&mut self, hand: Hand) -> &mut HandInputState {
        &mut self.hands[hand.index()]
    }

    /// Syncs actions and places a cube for every fresh select press.
    ///
    /// Does nothing unless the session has input focus. Returns the number of
    /// cubes placed.
    pub fn poll<R: XrRuntime>(
        &mut self,
        runtime: &mut R,
        lifecycle: &SessionLifecycle,
        scene: &mut Scene,
    ) -> Result<usize> {
        if !lifecycle.is_focused() {
            return Ok(0);
        }

        runtime.sync_actions()?;

        let mut placed = 0;
        for hand in Hand::BOTH {
            let state = runtime.hand_action_state(hand)?;
            let cached = self.hand_mut(hand);
            cached.pose_active = state.pose_active;
            cached.select = state.select;

            if !state.select.just_pressed() {
                continue;
            }

            // The press happened in the past; place the cube where the hand was then.
            let location = match runtime.locate_hand(hand, state.select.last_change_time) {
                Ok(location) => location,
                Err(err) => {
                    warn!(?hand, %err, "couldn't locate hand for placement");
                    continue;
                }
            };
            match location.tracked_pose() {
                Some(pose) => {
                    scene.place(pose);
                    placed += 1;
                    info!(?hand, cubes = scene.placed().len(), "placed cube");
                }
                None => debug!(?hand, "select without a tracked pose, ignored"),
            }
        }

        Ok(placed)
    }
}
