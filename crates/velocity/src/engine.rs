use chrono::{DateTime, Utc};

use crate::model::{
    format_display_time, Baseline, Capabilities, LastState, Reading, TelemetryPoint,
    VelocityResult, ZeroIntervalPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Initialized,
    Measured,
    ZeroInterval,
    Unmeasurable,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Measured => "measured",
            Self::ZeroInterval => "zero_interval",
            Self::Unmeasurable => "unmeasurable",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: VelocityResult,
    pub new_state: LastState,
    pub point: TelemetryPoint,
    pub kind: OutcomeKind,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityEngine {
    capabilities: Capabilities,
    zero_interval: ZeroIntervalPolicy,
}

impl VelocityEngine {
    pub fn new(capabilities: Capabilities, zero_interval: ZeroIntervalPolicy) -> Self {
        Self {
            capabilities,
            zero_interval,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn zero_interval(&self) -> ZeroIntervalPolicy {
        self.zero_interval
    }

    pub fn process(&self, reading: &Reading, previous: &LastState, now: DateTime<Utc>) -> Outcome {
        let now_secs = now.timestamp();
        let (total_velocity, kind) = match previous.baseline() {
            None => (None, OutcomeKind::Initialized),
            Some(baseline) => self.velocity_since(&baseline, reading, now_secs),
        };

        let (longitude, latitude) = if self.capabilities.geo {
            (reading.longitude, reading.latitude)
        } else {
            (None, None)
        };

        let result = VelocityResult {
            x: reading.x,
            y: reading.y,
            total_velocity,
            device_id: reading.device_id.clone(),
            battery: reading.battery,
            longitude,
            latitude,
            time: format_display_time(now),
        };

        let point = TelemetryPoint {
            device_id: reading.device_id.clone(),
            timestamp_micros: now.timestamp_micros(),
            x_axis: reading.x,
            y_axis: reading.y,
            total_velocity,
            battery: reading.battery,
            longitude,
            latitude,
        };

        Outcome {
            result,
            new_state: LastState::at(reading.x, reading.y, now_secs),
            point,
            kind,
        }
    }

    fn velocity_since(
        &self,
        baseline: &Baseline,
        reading: &Reading,
        now_secs: i64,
    ) -> (Option<f64>, OutcomeKind) {
        let delta_x = reading.x - baseline.x;
        let delta_y = reading.y - baseline.y;
        let distance = (delta_x * delta_x + delta_y * delta_y).sqrt();

        let (velocity, kind) = match now_secs.checked_sub(baseline.time_secs) {
            Some(elapsed) if elapsed > 0 => (distance / elapsed as f64, OutcomeKind::Measured),
            // Clock skew and an unrepresentable interval both count as zero.
            _ => match self.zero_interval {
                ZeroIntervalPolicy::Null => return (None, OutcomeKind::ZeroInterval),
                ZeroIntervalPolicy::Clamp => (distance, OutcomeKind::ZeroInterval),
            },
        };

        if velocity.is_finite() {
            (Some(velocity), kind)
        } else {
            (None, OutcomeKind::Unmeasurable)
        }
    }
}
