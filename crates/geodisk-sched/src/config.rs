// SPDX-License-Identifier: Apache-2.0
//! Runtime-tunable scheduler parameters: the numeric and boolean knobs
//! `setParameter` recognizes (disabled branches are handled separately,
//! at [`crate::engine::Engine::set_parameter`], since applying one
//! touches per-group state this module has no access to).

use geodisk_core::{CoreError, CoreResult};

use crate::health::NET_SPEED_CLASSES;
use crate::penalty::ScorePenalties;

/// One recognized `setParameter` request, already parsed out of its
/// `(name, value, idx?)` wire shape.
#[derive(Debug, Clone, Copy)]
pub enum Parameter {
    /// `skipSaturatedPlct`.
    SkipSaturatedPlct(bool),
    /// `skipSaturatedAccess`.
    SkipSaturatedAccess(bool),
    /// `skipSaturatedDrnAccess`.
    SkipSaturatedDrnAccess(bool),
    /// `skipSaturatedBlcAccess`.
    SkipSaturatedBlcAccess(bool),
    /// `skipSaturatedDrnPlct`.
    SkipSaturatedDrnPlct(bool),
    /// `skipSaturatedBlcPlct`.
    SkipSaturatedBlcPlct(bool),
    /// `plctDlScorePenalty[idx]`.
    PlctDlScorePenalty(usize, f64),
    /// `plctUlScorePenalty[idx]`.
    PlctUlScorePenalty(usize, f64),
    /// `accessDlScorePenalty[idx]`.
    AccessDlScorePenalty(usize, f64),
    /// `accessUlScorePenalty[idx]`.
    AccessUlScorePenalty(usize, f64),
    /// `fillRatioLimit`, `0..=100`.
    FillRatioLimit(f64),
    /// `fillRatioCompTol`, `0..=100`.
    FillRatioCompTol(f64),
    /// `saturationThres`, `0..=100`.
    SaturationThres(f64),
    /// `timeFrameDurationMs`, a positive integer.
    TimeFrameDurationMs(u64),
    /// `penaltyUpdateRate`, `0..=100`.
    PenaltyUpdateRate(f64),
}

/// The live value of every recognized scalar/vector parameter.
#[derive(Debug, Clone)]
pub struct SchedulerParams {
    /// Skip-saturated flags, one per operation class.
    pub skip_saturated_plct: bool,
    /// See [`Self::skip_saturated_plct`].
    pub skip_saturated_access: bool,
    /// See [`Self::skip_saturated_plct`].
    pub skip_saturated_drn_access: bool,
    /// See [`Self::skip_saturated_plct`].
    pub skip_saturated_blc_access: bool,
    /// See [`Self::skip_saturated_plct`].
    pub skip_saturated_drn_plct: bool,
    /// See [`Self::skip_saturated_plct`].
    pub skip_saturated_blc_plct: bool,
    /// Per-class score penalties applied after a selection.
    pub penalties: ScorePenalties,
    /// Fill ratio above which a leaf is considered full, `0..=100`.
    pub fill_ratio_limit: f64,
    /// Tolerance band around `fill_ratio_limit`, `0..=100`.
    pub fill_ratio_comp_tol: f64,
    /// Download/upload score floor below which a leaf is "saturated".
    pub saturation_thres: f64,
    /// Length of one penalty-update frame.
    pub time_frame_duration_ms: u64,
    /// Exponential-smoothing rate applied to in-band penalty updates.
    pub penalty_update_rate: f64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            skip_saturated_plct: true,
            skip_saturated_access: true,
            skip_saturated_drn_access: true,
            skip_saturated_blc_access: true,
            skip_saturated_drn_plct: true,
            skip_saturated_blc_plct: true,
            penalties: ScorePenalties::default(),
            fill_ratio_limit: 95.0,
            fill_ratio_comp_tol: 5.0,
            saturation_thres: 10.0,
            time_frame_duration_ms: 1_000,
            penalty_update_rate: 50.0,
        }
    }
}

fn require_percentage(name: &str, value: f64) -> CoreResult<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::PolicyViolation(format!("{name} must be in 0..=100, got {value}")))
    }
}

fn require_class_index(idx: usize) -> CoreResult<()> {
    if idx < NET_SPEED_CLASSES {
        Ok(())
    } else {
        Err(CoreError::PolicyViolation(format!("net-speed class index {idx} is out of range (0..{NET_SPEED_CLASSES})")))
    }
}

impl SchedulerParams {
    /// Applies one parsed parameter, validating its range first.
    ///
    /// # Errors
    ///
    /// [`CoreError::PolicyViolation`] if the value or index is out of
    /// range.
    pub fn apply(&mut self, parameter: Parameter) -> CoreResult<()> {
        match parameter {
            Parameter::SkipSaturatedPlct(v) => self.skip_saturated_plct = v,
            Parameter::SkipSaturatedAccess(v) => self.skip_saturated_access = v,
            Parameter::SkipSaturatedDrnAccess(v) => self.skip_saturated_drn_access = v,
            Parameter::SkipSaturatedBlcAccess(v) => self.skip_saturated_blc_access = v,
            Parameter::SkipSaturatedDrnPlct(v) => self.skip_saturated_drn_plct = v,
            Parameter::SkipSaturatedBlcPlct(v) => self.skip_saturated_blc_plct = v,
            Parameter::PlctDlScorePenalty(idx, v) => {
                require_class_index(idx)?;
                self.penalties.plct_dl[idx] = v;
            }
            Parameter::PlctUlScorePenalty(idx, v) => {
                require_class_index(idx)?;
                self.penalties.plct_ul[idx] = v;
            }
            Parameter::AccessDlScorePenalty(idx, v) => {
                require_class_index(idx)?;
                self.penalties.access_dl[idx] = v;
            }
            Parameter::AccessUlScorePenalty(idx, v) => {
                require_class_index(idx)?;
                self.penalties.access_ul[idx] = v;
            }
            Parameter::FillRatioLimit(v) => {
                require_percentage("fillRatioLimit", v)?;
                self.fill_ratio_limit = v;
            }
            Parameter::FillRatioCompTol(v) => {
                require_percentage("fillRatioCompTol", v)?;
                self.fill_ratio_comp_tol = v;
            }
            Parameter::SaturationThres(v) => {
                require_percentage("saturationThres", v)?;
                self.saturation_thres = v;
            }
            Parameter::TimeFrameDurationMs(v) => {
                if v == 0 {
                    return Err(CoreError::PolicyViolation("timeFrameDurationMs must be positive".into()));
                }
                self.time_frame_duration_ms = v;
            }
            Parameter::PenaltyUpdateRate(v) => {
                require_percentage("penaltyUpdateRate", v)?;
                self.penalty_update_rate = v;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_a_valid_percentage_updates_the_field() {
        let mut params = SchedulerParams::default();
        params.apply(Parameter::FillRatioLimit(90.0)).unwrap();
        assert!((params.fill_ratio_limit - 90.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_percentage_is_rejected_and_leaves_the_field_unchanged() {
        let mut params = SchedulerParams::default();
        let before = params.saturation_thres;
        assert!(params.apply(Parameter::SaturationThres(150.0)).is_err());
        assert!((params.saturation_thres - before).abs() < 1e-9);
    }

    #[test]
    fn zero_time_frame_duration_is_rejected() {
        let mut params = SchedulerParams::default();
        assert!(params.apply(Parameter::TimeFrameDurationMs(0)).is_err());
    }

    #[test]
    fn out_of_range_class_index_is_rejected() {
        let mut params = SchedulerParams::default();
        assert!(params.apply(Parameter::PlctDlScorePenalty(NET_SPEED_CLASSES, 5.0)).is_err());
        assert!(params.apply(Parameter::PlctDlScorePenalty(0, 5.0)).is_ok());
    }
}
