//! Camera orientation policy.

use crate::types::{CameraFacing, WizardStep};

/// Camera orientation required by `step`.
///
/// Document steps use the rear camera, the selfie uses the front camera and
/// the review step needs no camera at all.
pub fn facing_for(step: WizardStep) -> Option<CameraFacing> {
    match step {
        WizardStep::Front | WizardStep::Back => Some(CameraFacing::Back),
        WizardStep::Selfie => Some(CameraFacing::Front),
        WizardStep::Review => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_per_step() {
        assert_eq!(facing_for(WizardStep::Front), Some(CameraFacing::Back));
        assert_eq!(facing_for(WizardStep::Back), Some(CameraFacing::Back));
        assert_eq!(facing_for(WizardStep::Selfie), Some(CameraFacing::Front));
        assert_eq!(facing_for(WizardStep::Review), None);
    }

    #[test]
    fn test_every_capturing_step_has_a_camera() {
        for step in WizardStep::ALL {
            assert_eq!(facing_for(step).is_some(), step.is_capturing());
        }
    }
}
