use foundation::time::Time;

/// Per-frame metadata handed to layers on every update.
///
/// Delta time varies with the host's render loop; the index is what the
/// update throttle counts.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Seconds since the previous frame.
    pub dt_s: f64,
    /// Accumulated time at the start of the frame.
    pub time: Time,
}

impl Frame {
    pub fn first() -> Self {
        Self {
            index: 0,
            dt_s: 0.0,
            time: Time(0.0),
        }
    }

    /// Next frame, `dt_s` seconds after this one.
    pub fn advance(self, dt_s: f64) -> Self {
        Self {
            index: self.index + 1,
            dt_s,
            time: Time(self.time.seconds() + self.dt_s.max(0.0)),
        }
    }
}
